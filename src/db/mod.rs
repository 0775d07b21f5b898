mod rows;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use std::time::Duration;
use log::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::Result;

pub(crate) use rows::*;

// One statement per entry; sqlx prepares them individually.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS positions (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS elections (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TEXT NOT NULL,
        closed_at TEXT
    );
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS one_active_election
        ON elections (is_active) WHERE is_active = 1;
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS election_positions (
        id TEXT PRIMARY KEY,
        election_id TEXT NOT NULL,
        position_id TEXT NOT NULL,
        order_index INTEGER NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'active', 'completed')),
        scrutiny_round INTEGER NOT NULL DEFAULT 1,
        opened_at TEXT,
        closed_at TEXT,
        UNIQUE (election_id, position_id),
        UNIQUE (election_id, order_index),
        FOREIGN KEY (election_id) REFERENCES elections(id) ON DELETE CASCADE,
        FOREIGN KEY (position_id) REFERENCES positions(id)
    );
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS one_active_position_per_election
        ON election_positions (election_id) WHERE status = 'active';
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS election_attendance (
        election_position_id TEXT NOT NULL,
        member_id TEXT NOT NULL,
        present BOOLEAN NOT NULL,
        marked_at TEXT NOT NULL,
        PRIMARY KEY (election_position_id, member_id),
        FOREIGN KEY (election_position_id) REFERENCES election_positions(id) ON DELETE CASCADE
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS candidates (
        id TEXT PRIMARY KEY,
        election_id TEXT NOT NULL,
        position_id TEXT NOT NULL,
        member_id TEXT NOT NULL,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        ballot_order INTEGER NOT NULL,
        nominated_at TEXT NOT NULL,
        UNIQUE (election_id, position_id, member_id),
        FOREIGN KEY (election_id, position_id)
            REFERENCES election_positions(election_id, position_id) ON DELETE CASCADE
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS votes (
        id TEXT PRIMARY KEY,
        election_id TEXT NOT NULL,
        position_id TEXT NOT NULL,
        election_position_id TEXT NOT NULL,
        voter_id TEXT NOT NULL,
        candidate_id TEXT NOT NULL,
        scrutiny_round INTEGER NOT NULL,
        cast_at TEXT NOT NULL,
        UNIQUE (voter_id, election_id, position_id, scrutiny_round),
        FOREIGN KEY (election_position_id) REFERENCES election_positions(id) ON DELETE CASCADE,
        FOREIGN KEY (candidate_id) REFERENCES candidates(id)
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS votes_by_round
        ON votes (election_position_id, scrutiny_round);
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS election_winners (
        election_id TEXT NOT NULL,
        position_id TEXT NOT NULL,
        election_position_id TEXT NOT NULL,
        candidate_id TEXT NOT NULL,
        won_at_scrutiny INTEGER NOT NULL,
        decided_by TEXT NOT NULL,
        recorded_at TEXT NOT NULL,
        PRIMARY KEY (election_id, position_id),
        FOREIGN KEY (election_position_id) REFERENCES election_positions(id) ON DELETE CASCADE,
        FOREIGN KEY (candidate_id) REFERENCES candidates(id)
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS admin_actions (
        id TEXT PRIMARY KEY,
        election_id TEXT NOT NULL,
        election_position_id TEXT NOT NULL,
        action TEXT NOT NULL,
        actor_id TEXT NOT NULL,
        detail TEXT NOT NULL,
        recorded_at TEXT NOT NULL
    );
    "#,
];

/// Shared handle to the election store. Clones share one pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to the configured store and make sure the schema exists.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        let pool = if config.is_in_memory() {
            // Every connection to ":memory:" is its own database, so keep
            // exactly one alive for the life of the pool.
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .connect_with(options.journal_mode(SqliteJournalMode::Wal))
                .await?
        };

        Self::init_schema(&pool).await?;
        info!("Connected to election store at {}", config.url);

        Ok(Self { pool })
    }

    /// Fresh private store with the schema applied.
    pub async fn in_memory() -> Result<Self> {
        Self::connect(&DatabaseConfig::in_memory()).await
    }

    // Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a transaction that takes the write lock before its first read.
    ///
    /// Operations that read state and then write behind a compare-and-set
    /// start here, so concurrent writers queue (up to the busy timeout)
    /// and each one reads what the previous one committed.
    pub(crate) async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    async fn init_schema(pool: &SqlitePool) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(pool).await?;
        }
        debug!("Election schema is in place ({} statements)", SCHEMA.len());
        Ok(())
    }
}
