//! Sequential multi-round election engine.
//!
//! Positions are filled one at a time. Members present for a position cast
//! one ballot per scrutiny round; a round is decided by absolute majority of
//! those present, and the final round by plurality. Results and an audit
//! timeline are always rebuilt from stored rows.

pub mod config;
pub mod db;
pub mod directory;
pub mod election;
pub mod error;
pub mod models;
pub mod voting;

pub use config::{Config, DatabaseConfig, ElectionRules};
pub use db::Database;
pub use directory::{MemberDirectory, MemberProfile, StaticDirectory};
pub use error::{ElectionError, Result};
