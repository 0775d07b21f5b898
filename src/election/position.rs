//! Lifecycle of one position within an election.
//!
//! `pending -> active -> completed`, with scrutiny rounds counted while the
//! position is active. Every status or round change is a compare-and-set on
//! `(status, scrutiny_round)`, so of two concurrent chair actions only the
//! first takes effect and the second reports `AlreadyProcessed`.

use log::{info, warn};
use serde::Serialize;
use sqlx::sqlite::SqliteConnection;

use crate::config::ElectionRules;
use crate::db::{self, Database};
use crate::error::{is_unique_violation, ElectionError, Result};
use crate::models::{AdminActionKind, DecidedBy, ElectionPosition, ElectionWinner, PositionStatus};
use crate::voting::{count_ballots, resolve, Decision, TallyEntry};

/// The result of closing a scrutiny round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClosedRound {
    pub election_position_id: String,
    pub scrutiny_round: u32,
    pub present_count: u32,
    pub tally: Vec<TallyEntry>,
    pub outcome: RoundOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RoundOutcome {
    /// A winner was recorded and the position is completed.
    Decided { winner: ElectionWinner },
    /// Nobody won; voting continues in `next_round`.
    NextScrutiny { next_round: u32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetOptions {
    /// Also forget who was marked present.
    pub clear_attendance: bool,
}

/// Open a pending position for voting.
pub async fn open_position(database: &Database, election_id: &str, position_id: &str) -> Result<ElectionPosition> {
    let mut tx = database.begin_write().await?;
    let position = db::find_election_position(&mut tx, election_id, position_id).await?;
    let opened = open_in(&mut tx, &position).await?;
    tx.commit().await?;
    Ok(opened)
}

pub(crate) async fn open_in(conn: &mut SqliteConnection, position: &ElectionPosition) -> Result<ElectionPosition> {
    let election = db::load_election(conn, &position.election_id).await?;
    if !election.is_active {
        return Err(ElectionError::InvalidState(format!("election '{}' is closed", election.name)));
    }

    match position.status {
        PositionStatus::Pending => {}
        PositionStatus::Active => {
            return Err(ElectionError::AlreadyProcessed(format!(
                "'{}' is already open",
                position.position_name
            )));
        }
        PositionStatus::Completed => {
            return Err(ElectionError::InvalidState(format!(
                "'{}' is already completed",
                position.position_name
            )));
        }
    }

    let siblings = db::list_election_positions(conn, &position.election_id).await?;
    if let Some(open) = siblings.iter().find(|p| p.status == PositionStatus::Active) {
        return Err(ElectionError::OutOfOrder(format!(
            "'{}' is still open; close it before opening '{}'",
            open.position_name, position.position_name
        )));
    }
    if let Some(blocking) = siblings
        .iter()
        .find(|p| p.order_index < position.order_index && p.status != PositionStatus::Completed)
    {
        return Err(ElectionError::OutOfOrder(format!(
            "'{}' comes before '{}' and is not completed",
            blocking.position_name, position.position_name
        )));
    }

    let opened_at = db::now();
    let updated = sqlx::query(
        r#"
        UPDATE election_positions
        SET status = 'active', scrutiny_round = 1, opened_at = ?, closed_at = NULL
        WHERE id = ? AND status = 'pending'
        "#,
    )
    .bind(db::to_timestamp(opened_at))
    .bind(&position.id)
    .execute(&mut *conn)
    .await;

    match updated {
        Ok(result) if result.rows_affected() == 1 => {}
        Ok(_) => {
            return Err(ElectionError::AlreadyProcessed(format!(
                "'{}' was opened by another request",
                position.position_name
            )));
        }
        // The one-active-position index caught a concurrent open
        Err(e) if is_unique_violation(&e) => {
            return Err(ElectionError::AlreadyProcessed(format!(
                "another position of election '{}' was opened concurrently",
                election.name
            )));
        }
        Err(e) => return Err(e.into()),
    }

    // Whoever was present for the previous position starts out present here.
    // Rows kept from before a reset take precedence.
    let previous = siblings
        .iter()
        .filter(|p| p.order_index < position.order_index)
        .max_by_key(|p| p.order_index);
    if let Some(previous) = previous {
        let seeded = sqlx::query(
            r#"
            INSERT OR IGNORE INTO election_attendance (election_position_id, member_id, present, marked_at)
            SELECT ?, member_id, present, ?
            FROM election_attendance
            WHERE election_position_id = ?
            "#,
        )
        .bind(&position.id)
        .bind(db::to_timestamp(opened_at))
        .bind(&previous.id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
        info!(
            "Carried {} attendance records from '{}' to '{}'",
            seeded, previous.position_name, position.position_name
        );
    }

    info!("Opened '{}' in election '{}'", position.position_name, election.name);

    Ok(ElectionPosition {
        status: PositionStatus::Active,
        scrutiny_round: 1,
        opened_at: Some(opened_at),
        closed_at: None,
        ..position.clone()
    })
}

/// Close `scrutiny_round` of an active position and act on the count.
///
/// The caller names the round it means to close, so a repeated or
/// concurrent request for a round that has already been closed reports
/// `AlreadyProcessed` instead of closing the next one.
pub async fn close_scrutiny_round(
    database: &Database,
    rules: &ElectionRules,
    election_position_id: &str,
    scrutiny_round: u32,
) -> Result<ClosedRound> {
    let mut tx = database.begin_write().await?;
    let position = db::load_election_position(&mut tx, election_position_id).await?;

    match position.status {
        PositionStatus::Active => {}
        PositionStatus::Pending => {
            return Err(ElectionError::InvalidState(format!(
                "'{}' has not been opened",
                position.position_name
            )));
        }
        PositionStatus::Completed => {
            return Err(ElectionError::AlreadyProcessed(format!(
                "'{}' is already completed",
                position.position_name
            )));
        }
    }

    if scrutiny_round < position.scrutiny_round {
        return Err(ElectionError::AlreadyProcessed(format!(
            "round {} of '{}' is already closed",
            scrutiny_round, position.position_name
        )));
    }
    if scrutiny_round > position.scrutiny_round {
        return Err(ElectionError::InvalidState(format!(
            "'{}' is in round {}, not {}",
            position.position_name, position.scrutiny_round, scrutiny_round
        )));
    }

    let candidates = db::list_candidates(&mut tx, &position.election_id, &position.position_id).await?;
    if candidates.is_empty() {
        return Err(ElectionError::InvalidState(format!(
            "'{}' has no candidates",
            position.position_name
        )));
    }

    let present_count = db::count_present(&mut tx, &position.id).await?;
    let ballots = db::list_round_votes(&mut tx, &position.id, scrutiny_round).await?;
    let tally = count_ballots(&candidates, &ballots);
    let decision = resolve(&tally, present_count, scrutiny_round, rules.final_scrutiny_round);

    let outcome = match decision {
        Decision::Elected { candidate_id } => {
            let winner = complete_in(&mut tx, &position, &candidate_id, DecidedBy::Majority).await?;
            RoundOutcome::Decided { winner }
        }
        Decision::DecidedByPlurality { candidate_id } => {
            let winner = complete_in(&mut tx, &position, &candidate_id, DecidedBy::Plurality).await?;
            RoundOutcome::Decided { winner }
        }
        Decision::NextScrutiny => {
            let next_round = advance_round_in(&mut tx, &position).await?;
            RoundOutcome::NextScrutiny { next_round }
        }
        Decision::TieUnresolved { tied } => {
            warn!(
                "Round {} of '{}' is tied between {:?} with {} present; waiting for the chair",
                scrutiny_round, position.position_name, tied, present_count
            );
            return Err(ElectionError::TieUnresolved {
                election_position_id: position.id.clone(),
                round: scrutiny_round,
                tied,
            });
        }
    };

    tx.commit().await?;

    match &outcome {
        RoundOutcome::Decided { winner } => info!(
            "'{}' decided in round {} by {}: candidate {}",
            position.position_name,
            scrutiny_round,
            winner.decided_by.as_str(),
            winner.candidate_id
        ),
        RoundOutcome::NextScrutiny { next_round } => info!(
            "No majority for '{}' in round {} ({} present); opening round {}",
            position.position_name, scrutiny_round, present_count, next_round
        ),
    }

    Ok(ClosedRound {
        election_position_id: position.id.clone(),
        scrutiny_round,
        present_count,
        tally,
        outcome,
    })
}

async fn advance_round_in(conn: &mut SqliteConnection, position: &ElectionPosition) -> Result<u32> {
    let next_round = position.scrutiny_round + 1;
    let updated = sqlx::query(
        r#"
        UPDATE election_positions
        SET scrutiny_round = ?
        WHERE id = ? AND status = 'active' AND scrutiny_round = ?
        "#,
    )
    .bind(next_round)
    .bind(&position.id)
    .bind(position.scrutiny_round)
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(ElectionError::AlreadyProcessed(format!(
            "round {} of '{}' was closed by another request",
            position.scrutiny_round, position.position_name
        )));
    }
    Ok(next_round)
}

// Record the winner at the position's current round and complete it.
async fn complete_in(
    conn: &mut SqliteConnection,
    position: &ElectionPosition,
    candidate_id: &str,
    decided_by: DecidedBy,
) -> Result<ElectionWinner> {
    let closed_at = db::now();
    let updated = sqlx::query(
        r#"
        UPDATE election_positions
        SET status = 'completed', closed_at = ?
        WHERE id = ? AND status = 'active' AND scrutiny_round = ?
        "#,
    )
    .bind(db::to_timestamp(closed_at))
    .bind(&position.id)
    .bind(position.scrutiny_round)
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(ElectionError::AlreadyProcessed(format!(
            "'{}' was decided by another request",
            position.position_name
        )));
    }

    let winner = ElectionWinner {
        election_id: position.election_id.clone(),
        position_id: position.position_id.clone(),
        election_position_id: position.id.clone(),
        candidate_id: candidate_id.to_string(),
        won_at_scrutiny: position.scrutiny_round,
        decided_by,
        recorded_at: closed_at,
    };

    match db::insert_winner(conn, &winner).await {
        Ok(()) => Ok(winner),
        Err(ElectionError::Storage(e)) if is_unique_violation(&e) => Err(ElectionError::AlreadyProcessed(
            format!("'{}' already has a winner", position.position_name),
        )),
        Err(e) => Err(e),
    }
}

/// Declare a winner by hand, bypassing the resolver. Used when the final
/// round is tied and the chair settles it (casting vote or re-vote).
pub async fn override_winner(
    database: &Database,
    election_position_id: &str,
    candidate_id: &str,
    actor_id: &str,
    reason: &str,
) -> Result<ElectionWinner> {
    let mut tx = database.begin_write().await?;
    let position = db::load_election_position(&mut tx, election_position_id).await?;

    if position.status != PositionStatus::Active {
        return Err(ElectionError::InvalidState(format!(
            "a winner can only be declared for an active position; '{}' is {}",
            position.position_name, position.status
        )));
    }

    let candidates = db::list_candidates(&mut tx, &position.election_id, &position.position_id).await?;
    let Some(candidate) = candidates.iter().find(|c| c.id == candidate_id) else {
        return Err(ElectionError::NotEligible(format!(
            "candidate {} is not standing for '{}'",
            candidate_id, position.position_name
        )));
    };

    let winner = complete_in(&mut tx, &position, &candidate.id, DecidedBy::Override).await?;
    let detail = format!(
        "declared {} ({}) winner at round {}: {}",
        candidate.name, candidate.id, position.scrutiny_round, reason
    );
    db::insert_admin_action(&mut tx, &position, AdminActionKind::OverrideWinner, actor_id, &detail).await?;
    tx.commit().await?;

    warn!(
        "Administrative override on '{}' by {}: {}",
        position.position_name, actor_id, detail
    );
    Ok(winner)
}

/// Undo everything recorded for a position and return it to `pending`.
///
/// Refused once a later position has been opened, so positions are still
/// completed strictly in order afterwards.
pub async fn reset_position(
    database: &Database,
    election_position_id: &str,
    actor_id: &str,
    options: ResetOptions,
) -> Result<ElectionPosition> {
    let mut tx = database.begin_write().await?;
    let position = db::load_election_position(&mut tx, election_position_id).await?;

    let election = db::load_election(&mut tx, &position.election_id).await?;
    if !election.is_active {
        return Err(ElectionError::InvalidState(format!(
            "election '{}' is closed and its results are final",
            election.name
        )));
    }

    let siblings = db::list_election_positions(&mut tx, &position.election_id).await?;
    if let Some(later) = siblings
        .iter()
        .find(|p| p.order_index > position.order_index && p.status != PositionStatus::Pending)
    {
        return Err(ElectionError::OutOfOrder(format!(
            "'{}' has already been opened after '{}'",
            later.position_name, position.position_name
        )));
    }

    sqlx::query("DELETE FROM election_winners WHERE election_position_id = ?")
        .bind(&position.id)
        .execute(&mut *tx)
        .await?;
    let discarded = sqlx::query("DELETE FROM votes WHERE election_position_id = ?")
        .bind(&position.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if options.clear_attendance {
        sqlx::query("DELETE FROM election_attendance WHERE election_position_id = ?")
            .bind(&position.id)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query(
        r#"
        UPDATE election_positions
        SET status = 'pending', scrutiny_round = 1, opened_at = NULL, closed_at = NULL
        WHERE id = ?
        "#,
    )
    .bind(&position.id)
    .execute(&mut *tx)
    .await?;

    let detail = format!(
        "reset from {} at round {}; {} votes discarded{}",
        position.status,
        position.scrutiny_round,
        discarded,
        if options.clear_attendance { "; attendance cleared" } else { "" }
    );
    db::insert_admin_action(&mut tx, &position, AdminActionKind::ResetPosition, actor_id, &detail).await?;
    tx.commit().await?;

    warn!("Position '{}' reset by {}: {}", position.position_name, actor_id, detail);

    Ok(ElectionPosition {
        status: PositionStatus::Pending,
        scrutiny_round: 1,
        opened_at: None,
        closed_at: None,
        ..position
    })
}
