use log::{debug, warn};

use crate::db::{self, Database};
use crate::directory::{require_member, MemberDirectory};
use crate::error::{ElectionError, Result};
use crate::models::Attendance;

/// Mark a member present (or absent) for a position that is open.
///
/// Only members the directory recognises can be marked present; anyone can
/// be marked absent.
pub async fn mark_present(
    database: &Database,
    directory: &dyn MemberDirectory,
    election_position_id: &str,
    member_id: &str,
    present: bool,
) -> Result<Attendance> {
    if present {
        require_member(directory, member_id).await?;
    }

    let marked_at = db::now();
    let mut tx = database.begin_write().await?;

    // Both writes carry the status guard, so a position that closes
    // concurrently can never gain attendance afterwards.
    let updated = sqlx::query(
        r#"
        UPDATE election_attendance
        SET present = ?, marked_at = ?
        WHERE election_position_id = ? AND member_id = ?
          AND EXISTS (SELECT 1 FROM election_positions WHERE id = ? AND status = 'active')
        "#,
    )
    .bind(present)
    .bind(db::to_timestamp(marked_at))
    .bind(election_position_id)
    .bind(member_id)
    .bind(election_position_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if updated == 0 {
        let inserted = sqlx::query(
            r#"
            INSERT INTO election_attendance (election_position_id, member_id, present, marked_at)
            SELECT ?, ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM election_positions WHERE id = ? AND status = 'active')
            "#,
        )
        .bind(election_position_id)
        .bind(member_id)
        .bind(present)
        .bind(db::to_timestamp(marked_at))
        .bind(election_position_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            let position = db::load_election_position(&mut tx, election_position_id).await?;
            warn!(
                "Rejected attendance change for {} on '{}': position is {}",
                member_id, position.position_name, position.status
            );
            return Err(ElectionError::InvalidState(format!(
                "attendance for '{}' can only change while it is active (it is {})",
                position.position_name, position.status
            )));
        }
    }

    tx.commit().await?;
    debug!(
        "Marked {} {} for position {}",
        member_id,
        if present { "present" } else { "absent" },
        election_position_id
    );

    Ok(Attendance {
        election_position_id: election_position_id.to_string(),
        member_id: member_id.to_string(),
        present,
        marked_at,
    })
}

/// Members currently present: the denominator of every majority.
pub async fn present_count(database: &Database, election_position_id: &str) -> Result<u32> {
    let mut conn = database.pool().acquire().await?;
    // Surface unknown positions instead of reporting zero
    db::load_election_position(&mut conn, election_position_id).await?;
    db::count_present(&mut conn, election_position_id).await
}

/// Every attendance row of a position, by member id.
pub async fn attendance(database: &Database, election_position_id: &str) -> Result<Vec<Attendance>> {
    let mut conn = database.pool().acquire().await?;
    db::load_election_position(&mut conn, election_position_id).await?;
    db::list_attendance(&mut conn, election_position_id).await
}
