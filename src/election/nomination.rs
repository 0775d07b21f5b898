use log::info;

use crate::db::{self, Database};
use crate::directory::{require_member, MemberDirectory};
use crate::error::{is_unique_violation, ElectionError, Result};
use crate::models::{Candidate, PositionStatus};

/// Nominate a member for a position of an election.
///
/// The member's name and email are copied onto the candidate now, so the
/// election record reads the same even if the profile changes later.
pub async fn nominate(
    database: &Database,
    directory: &dyn MemberDirectory,
    election_id: &str,
    position_id: &str,
    member_id: &str,
) -> Result<Candidate> {
    let profile = require_member(directory, member_id).await?;

    let mut tx = database.begin_write().await?;
    let position = db::find_election_position(&mut tx, election_id, position_id).await?;
    if position.status == PositionStatus::Completed {
        return Err(ElectionError::InvalidState(format!(
            "'{}' is completed; nominations are closed",
            position.position_name
        )));
    }

    let candidate_id = db::new_id();
    let nominated_at = db::now();

    // Ballot order is taken in the inserting statement itself
    let inserted = sqlx::query_scalar::<_, u32>(
        r#"
        INSERT INTO candidates
            (id, election_id, position_id, member_id, name, email, ballot_order, nominated_at)
        SELECT ?, ?, ?, ?, ?, ?, COALESCE(MAX(ballot_order) + 1, 0), ?
        FROM candidates
        WHERE election_id = ? AND position_id = ?
        RETURNING ballot_order
        "#,
    )
    .bind(&candidate_id)
    .bind(election_id)
    .bind(position_id)
    .bind(member_id)
    .bind(&profile.name)
    .bind(&profile.email)
    .bind(db::to_timestamp(nominated_at))
    .bind(election_id)
    .bind(position_id)
    .fetch_one(&mut *tx)
    .await;

    let ballot_order = match inserted {
        Ok(order) => order,
        Err(e) if is_unique_violation(&e) => {
            return Err(ElectionError::AlreadyNominated {
                member_id: member_id.to_string(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    tx.commit().await?;
    info!(
        "Nominated {} ({}) for '{}' as candidate #{}",
        profile.name,
        member_id,
        position.position_name,
        ballot_order + 1
    );

    Ok(Candidate {
        id: candidate_id,
        election_id: election_id.to_string(),
        position_id: position_id.to_string(),
        member_id: member_id.to_string(),
        name: profile.name,
        email: profile.email,
        ballot_order,
        nominated_at,
    })
}

/// Candidates of a position in ballot order.
pub async fn candidates(database: &Database, election_position_id: &str) -> Result<Vec<Candidate>> {
    let mut conn = database.pool().acquire().await?;
    let position = db::load_election_position(&mut conn, election_position_id).await?;
    db::list_candidates(&mut conn, &position.election_id, &position.position_id).await
}
