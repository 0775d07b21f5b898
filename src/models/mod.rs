use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ElectionError;

/// An office being elected, e.g. "President".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Pending,
    Active,
    Completed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Pending => "pending",
            PositionStatus::Active => "active",
            PositionStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionStatus {
    type Err = ElectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PositionStatus::Pending),
            "active" => Ok(PositionStatus::Active),
            "completed" => Ok(PositionStatus::Completed),
            other => Err(ElectionError::Corrupt(format!("unknown position status '{}'", other))),
        }
    }
}

/// A position as it is being run within one election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionPosition {
    pub id: String,
    pub election_id: String,
    pub position_id: String,
    pub position_name: String,
    pub order_index: u32,
    pub status: PositionStatus,
    pub scrutiny_round: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendance {
    pub election_position_id: String,
    pub member_id: String,
    pub present: bool,
    pub marked_at: DateTime<Utc>,
}

/// A nominated member. Name and email are a snapshot taken at nomination
/// and never follow later changes to the member record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub election_id: String,
    pub position_id: String,
    pub member_id: String,
    pub name: String,
    pub email: String,
    pub ballot_order: u32,
    pub nominated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub id: String,
    pub election_id: String,
    pub position_id: String,
    pub election_position_id: String,
    pub voter_id: String,
    pub candidate_id: String,
    pub scrutiny_round: u32,
    pub cast_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecidedBy {
    Majority,
    Plurality,
    Override,
}

impl DecidedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecidedBy::Majority => "majority",
            DecidedBy::Plurality => "plurality",
            DecidedBy::Override => "override",
        }
    }
}

impl FromStr for DecidedBy {
    type Err = ElectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "majority" => Ok(DecidedBy::Majority),
            "plurality" => Ok(DecidedBy::Plurality),
            "override" => Ok(DecidedBy::Override),
            other => Err(ElectionError::Corrupt(format!("unknown decision kind '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionWinner {
    pub election_id: String,
    pub position_id: String,
    pub election_position_id: String,
    pub candidate_id: String,
    pub won_at_scrutiny: u32,
    pub decided_by: DecidedBy,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminActionKind {
    OverrideWinner,
    ResetPosition,
}

impl AdminActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminActionKind::OverrideWinner => "override_winner",
            AdminActionKind::ResetPosition => "reset_position",
        }
    }
}

impl FromStr for AdminActionKind {
    type Err = ElectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "override_winner" => Ok(AdminActionKind::OverrideWinner),
            "reset_position" => Ok(AdminActionKind::ResetPosition),
            other => Err(ElectionError::Corrupt(format!("unknown admin action '{}'", other))),
        }
    }
}

/// Audit row written by every administrative override or reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminAction {
    pub id: String,
    pub election_id: String,
    pub election_position_id: String,
    pub action: AdminActionKind,
    pub actor_id: String,
    pub detail: String,
    pub recorded_at: DateTime<Utc>,
}
