pub mod attendance;
pub mod audit;
pub mod ballot_box;
pub mod catalog;
pub mod nomination;
pub mod orchestrator;
pub mod position;

pub use attendance::{attendance, mark_present, present_count};
pub use audit::{project, ElectionReport};
pub use ballot_box::{cast_vote, tally, votes_for_round};
pub use catalog::{create_position, positions};
pub use nomination::{candidates, nominate};
pub use orchestrator::{active_election, advance, election, election_positions, open_election};
pub use position::{
    close_scrutiny_round, open_position, override_winner, reset_position, ClosedRound, ResetOptions, RoundOutcome,
};
