use log::{info, warn};
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;

use crate::db::{self, Database};
use crate::error::{is_unique_violation, ElectionError, Result};
use crate::models::{ElectionPosition, PositionStatus, Vote};
use crate::voting::{count_ballots, TallyEntry};

/// Record one ballot in the position's current scrutiny round.
///
/// The open-position, presence and candidacy checks and the round number
/// all come from the same statement that inserts the vote, so a round that
/// advances concurrently can never receive a stale ballot. A second ballot
/// from the same voter in the same round hits the unique constraint on
/// `votes` and is rejected as `DuplicateVote`.
pub async fn cast_vote(
    database: &Database,
    election_position_id: &str,
    voter_id: &str,
    candidate_id: &str,
) -> Result<Vote> {
    let vote_id = db::new_id();
    let cast_at = db::now();
    let mut tx = database.begin_write().await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO votes
            (id, election_id, position_id, election_position_id, voter_id, candidate_id,
             scrutiny_round, cast_at)
        SELECT ?, ep.election_id, ep.position_id, ep.id, ?, c.id, ep.scrutiny_round, ?
        FROM election_positions ep
        JOIN candidates c
            ON c.id = ? AND c.election_id = ep.election_id AND c.position_id = ep.position_id
        JOIN election_attendance a
            ON a.election_position_id = ep.id AND a.member_id = ? AND a.present = TRUE
        WHERE ep.id = ? AND ep.status = 'active'
        RETURNING election_id, position_id, scrutiny_round
        "#,
    )
    .bind(&vote_id)
    .bind(voter_id)
    .bind(db::to_timestamp(cast_at))
    .bind(candidate_id)
    .bind(voter_id)
    .bind(election_position_id)
    .fetch_optional(&mut *tx)
    .await;

    let row = match inserted {
        Ok(Some(row)) => row,
        Ok(None) => return Err(explain_rejection(&mut tx, election_position_id, voter_id, candidate_id).await),
        Err(e) if is_unique_violation(&e) => {
            let position = db::load_election_position(&mut tx, election_position_id).await?;
            warn!(
                "Duplicate ballot from {} for '{}' round {}",
                voter_id, position.position_name, position.scrutiny_round
            );
            return Err(ElectionError::DuplicateVote {
                voter_id: voter_id.to_string(),
                election_position_id: election_position_id.to_string(),
                round: position.scrutiny_round,
            });
        }
        Err(e) => return Err(e.into()),
    };

    let vote = Vote {
        id: vote_id,
        election_id: row.try_get("election_id")?,
        position_id: row.try_get("position_id")?,
        election_position_id: election_position_id.to_string(),
        voter_id: voter_id.to_string(),
        candidate_id: candidate_id.to_string(),
        scrutiny_round: row.try_get("scrutiny_round")?,
        cast_at,
    };

    tx.commit().await?;
    info!(
        "Recorded ballot {} for position {} round {}",
        vote.id, election_position_id, vote.scrutiny_round
    );

    Ok(vote)
}

// Work out which precondition the guarded insert failed on.
async fn explain_rejection(
    conn: &mut SqliteConnection,
    election_position_id: &str,
    voter_id: &str,
    candidate_id: &str,
) -> ElectionError {
    let position = match db::load_election_position(conn, election_position_id).await {
        Ok(position) => position,
        Err(e) => return e,
    };

    if position.status != PositionStatus::Active {
        warn!("Ballot from {} refused: '{}' is {}", voter_id, position.position_name, position.status);
        return ElectionError::InvalidState(format!(
            "'{}' is {} and not open for voting",
            position.position_name, position.status
        ));
    }

    let present: Option<bool> = match sqlx::query_scalar(
        r#"
        SELECT present
        FROM election_attendance
        WHERE election_position_id = ? AND member_id = ?
        "#,
    )
    .bind(election_position_id)
    .bind(voter_id)
    .fetch_optional(&mut *conn)
    .await
    {
        Ok(present) => present,
        Err(e) => return e.into(),
    };

    if present != Some(true) {
        warn!("Ballot from {} refused: not present for '{}'", voter_id, position.position_name);
        return ElectionError::NotEligible(format!(
            "voter {} is not marked present for '{}'",
            voter_id, position.position_name
        ));
    }

    warn!(
        "Ballot from {} refused: candidate {} is not standing for '{}'",
        voter_id, candidate_id, position.position_name
    );
    ElectionError::NotEligible(format!(
        "candidate {} is not standing for '{}'",
        candidate_id, position.position_name
    ))
}

/// Ballots of one round, oldest first.
pub async fn votes_for_round(database: &Database, election_position_id: &str, scrutiny_round: u32) -> Result<Vec<Vote>> {
    let mut conn = database.pool().acquire().await?;
    db::load_election_position(&mut conn, election_position_id).await?;
    db::list_round_votes(&mut conn, election_position_id, scrutiny_round).await
}

/// Count a round as it stands. Safe to call while voting is still going on;
/// the result only becomes authoritative once the round is closed.
pub async fn tally(database: &Database, election_position_id: &str, scrutiny_round: u32) -> Result<Vec<TallyEntry>> {
    let mut conn = database.pool().acquire().await?;
    let position = db::load_election_position(&mut conn, election_position_id).await?;
    tally_round(&mut conn, &position, scrutiny_round).await
}

pub(crate) async fn tally_round(
    conn: &mut SqliteConnection,
    position: &ElectionPosition,
    scrutiny_round: u32,
) -> Result<Vec<TallyEntry>> {
    let candidates = db::list_candidates(conn, &position.election_id, &position.position_id).await?;
    let ballots = db::list_round_votes(conn, &position.id, scrutiny_round).await?;
    Ok(count_ballots(&candidates, &ballots))
}
