use thiserror::Error;

/// Every failure an election operation can report.
///
/// Store-backed operations run inside one transaction, so any of these
/// leaves the database exactly as it was before the call.
#[derive(Debug, Error)]
pub enum ElectionError {
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Voter {voter_id} already voted in round {round} of position {election_position_id}")]
    DuplicateVote {
        voter_id: String,
        election_position_id: String,
        round: u32,
    },
    #[error("Not eligible: {0}")]
    NotEligible(String),
    #[error("Out of order: {0}")]
    OutOfOrder(String),
    #[error("Election {election_id} is already active")]
    ElectionAlreadyActive { election_id: String },
    #[error("All positions of election {election_id} are completed")]
    AllPositionsCompleted { election_id: String },
    #[error("Round {round} of position {election_position_id} ended in an unresolved tie between {tied:?}")]
    TieUnresolved {
        election_position_id: String,
        round: u32,
        tied: Vec<String>,
    },
    #[error("Already processed: {0}")]
    AlreadyProcessed(String),
    #[error("Member {member_id} is already nominated for this position")]
    AlreadyNominated { member_id: String },
    #[error("Position named '{0}' already exists")]
    PositionExists(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl ElectionError {
    /// A concurrent request got there first. Callers should report this
    /// distinctly from success, but it is not a failure of their request.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::AlreadyProcessed(_))
    }
}

/// True when the store rejected a write because of a unique constraint.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

pub type Result<T> = std::result::Result<T, ElectionError>;
