use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

use crate::error::{ElectionError, Result};
use crate::models::{
    AdminAction, AdminActionKind, Attendance, Candidate, Election, ElectionPosition, ElectionWinner,
    Position, Vote,
};

const ELECTION_POSITION_COLUMNS: &str = r#"
    SELECT ep.id, ep.election_id, ep.position_id, p.name AS position_name, ep.order_index,
           ep.status, ep.scrutiny_round, ep.opened_at, ep.closed_at
    FROM election_positions ep
    JOIN positions p ON p.id = ep.position_id
"#;

const CANDIDATE_COLUMNS: &str = r#"
    SELECT id, election_id, position_id, member_id, name, email, ballot_order, nominated_at
    FROM candidates
"#;

const VOTE_COLUMNS: &str = r#"
    SELECT id, election_id, position_id, election_position_id, voter_id, candidate_id,
           scrutiny_round, cast_at
    FROM votes
"#;

pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current time at the precision we store, so a value read back compares
/// equal to the one written.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

// Fixed-width UTC text sorts chronologically.
pub(crate) fn to_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ElectionError::Corrupt(format!("timestamp '{}': {}", raw, e)))
}

fn parse_optional_timestamp(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_timestamp).transpose()
}

pub(crate) fn position_from_row(row: &SqliteRow) -> Result<Position> {
    Ok(Position {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn election_from_row(row: &SqliteRow) -> Result<Election> {
    Ok(Election {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        is_active: row.try_get("is_active")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
        closed_at: parse_optional_timestamp(row.try_get("closed_at")?)?,
    })
}

fn election_position_from_row(row: &SqliteRow) -> Result<ElectionPosition> {
    Ok(ElectionPosition {
        id: row.try_get("id")?,
        election_id: row.try_get("election_id")?,
        position_id: row.try_get("position_id")?,
        position_name: row.try_get("position_name")?,
        order_index: row.try_get("order_index")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        scrutiny_round: row.try_get("scrutiny_round")?,
        opened_at: parse_optional_timestamp(row.try_get("opened_at")?)?,
        closed_at: parse_optional_timestamp(row.try_get("closed_at")?)?,
    })
}

fn candidate_from_row(row: &SqliteRow) -> Result<Candidate> {
    Ok(Candidate {
        id: row.try_get("id")?,
        election_id: row.try_get("election_id")?,
        position_id: row.try_get("position_id")?,
        member_id: row.try_get("member_id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        ballot_order: row.try_get("ballot_order")?,
        nominated_at: parse_timestamp(&row.try_get::<String, _>("nominated_at")?)?,
    })
}

fn vote_from_row(row: &SqliteRow) -> Result<Vote> {
    Ok(Vote {
        id: row.try_get("id")?,
        election_id: row.try_get("election_id")?,
        position_id: row.try_get("position_id")?,
        election_position_id: row.try_get("election_position_id")?,
        voter_id: row.try_get("voter_id")?,
        candidate_id: row.try_get("candidate_id")?,
        scrutiny_round: row.try_get("scrutiny_round")?,
        cast_at: parse_timestamp(&row.try_get::<String, _>("cast_at")?)?,
    })
}

fn attendance_from_row(row: &SqliteRow) -> Result<Attendance> {
    Ok(Attendance {
        election_position_id: row.try_get("election_position_id")?,
        member_id: row.try_get("member_id")?,
        present: row.try_get("present")?,
        marked_at: parse_timestamp(&row.try_get::<String, _>("marked_at")?)?,
    })
}

fn winner_from_row(row: &SqliteRow) -> Result<ElectionWinner> {
    Ok(ElectionWinner {
        election_id: row.try_get("election_id")?,
        position_id: row.try_get("position_id")?,
        election_position_id: row.try_get("election_position_id")?,
        candidate_id: row.try_get("candidate_id")?,
        won_at_scrutiny: row.try_get("won_at_scrutiny")?,
        decided_by: row.try_get::<String, _>("decided_by")?.parse()?,
        recorded_at: parse_timestamp(&row.try_get::<String, _>("recorded_at")?)?,
    })
}

fn admin_action_from_row(row: &SqliteRow) -> Result<AdminAction> {
    Ok(AdminAction {
        id: row.try_get("id")?,
        election_id: row.try_get("election_id")?,
        election_position_id: row.try_get("election_position_id")?,
        action: row.try_get::<String, _>("action")?.parse()?,
        actor_id: row.try_get("actor_id")?,
        detail: row.try_get("detail")?,
        recorded_at: parse_timestamp(&row.try_get::<String, _>("recorded_at")?)?,
    })
}

pub(crate) async fn load_election(conn: &mut SqliteConnection, election_id: &str) -> Result<Election> {
    let row = sqlx::query(
        r#"
        SELECT id, name, is_active, created_at, closed_at
        FROM elections
        WHERE id = ?
        "#,
    )
    .bind(election_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ElectionError::NotFound(format!("election {}", election_id)))?;

    election_from_row(&row)
}

pub(crate) async fn find_active_election(conn: &mut SqliteConnection) -> Result<Option<Election>> {
    sqlx::query(
        r#"
        SELECT id, name, is_active, created_at, closed_at
        FROM elections
        WHERE is_active = TRUE
        "#,
    )
    .fetch_optional(&mut *conn)
    .await?
    .map(|row| election_from_row(&row))
    .transpose()
}

pub(crate) async fn load_election_position(
    conn: &mut SqliteConnection,
    election_position_id: &str,
) -> Result<ElectionPosition> {
    let sql = format!("{} WHERE ep.id = ?", ELECTION_POSITION_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(election_position_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ElectionError::NotFound(format!("election position {}", election_position_id)))?;

    election_position_from_row(&row)
}

pub(crate) async fn find_election_position(
    conn: &mut SqliteConnection,
    election_id: &str,
    position_id: &str,
) -> Result<ElectionPosition> {
    let sql = format!("{} WHERE ep.election_id = ? AND ep.position_id = ?", ELECTION_POSITION_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(election_id)
        .bind(position_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| {
            ElectionError::NotFound(format!("position {} in election {}", position_id, election_id))
        })?;

    election_position_from_row(&row)
}

/// All positions of an election in processing order.
pub(crate) async fn list_election_positions(
    conn: &mut SqliteConnection,
    election_id: &str,
) -> Result<Vec<ElectionPosition>> {
    let sql = format!("{} WHERE ep.election_id = ? ORDER BY ep.order_index", ELECTION_POSITION_COLUMNS);
    sqlx::query(&sql)
        .bind(election_id)
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(election_position_from_row)
        .collect()
}

/// Candidates of one position in ballot order.
pub(crate) async fn list_candidates(
    conn: &mut SqliteConnection,
    election_id: &str,
    position_id: &str,
) -> Result<Vec<Candidate>> {
    let sql = format!(
        "{} WHERE election_id = ? AND position_id = ? ORDER BY ballot_order",
        CANDIDATE_COLUMNS
    );
    sqlx::query(&sql)
        .bind(election_id)
        .bind(position_id)
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(candidate_from_row)
        .collect()
}

pub(crate) async fn count_present(conn: &mut SqliteConnection, election_position_id: &str) -> Result<u32> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM election_attendance
        WHERE election_position_id = ? AND present = TRUE
        "#,
    )
    .bind(election_position_id)
    .fetch_one(&mut *conn)
    .await?;

    u32::try_from(count).map_err(|_| ElectionError::Corrupt(format!("attendance count {}", count)))
}

pub(crate) async fn list_attendance(
    conn: &mut SqliteConnection,
    election_position_id: &str,
) -> Result<Vec<Attendance>> {
    sqlx::query(
        r#"
        SELECT election_position_id, member_id, present, marked_at
        FROM election_attendance
        WHERE election_position_id = ?
        ORDER BY member_id
        "#,
    )
    .bind(election_position_id)
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(attendance_from_row)
    .collect()
}

pub(crate) async fn list_round_votes(
    conn: &mut SqliteConnection,
    election_position_id: &str,
    scrutiny_round: u32,
) -> Result<Vec<Vote>> {
    let sql = format!(
        "{} WHERE election_position_id = ? AND scrutiny_round = ? ORDER BY cast_at, rowid",
        VOTE_COLUMNS
    );
    sqlx::query(&sql)
        .bind(election_position_id)
        .bind(scrutiny_round)
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(vote_from_row)
        .collect()
}

/// Every vote of an election in the order it was recorded.
pub(crate) async fn list_election_votes(conn: &mut SqliteConnection, election_id: &str) -> Result<Vec<Vote>> {
    let sql = format!("{} WHERE election_id = ? ORDER BY cast_at, rowid", VOTE_COLUMNS);
    sqlx::query(&sql)
        .bind(election_id)
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(vote_from_row)
        .collect()
}

pub(crate) async fn find_winner(
    conn: &mut SqliteConnection,
    election_position_id: &str,
) -> Result<Option<ElectionWinner>> {
    sqlx::query(
        r#"
        SELECT election_id, position_id, election_position_id, candidate_id,
               won_at_scrutiny, decided_by, recorded_at
        FROM election_winners
        WHERE election_position_id = ?
        "#,
    )
    .bind(election_position_id)
    .fetch_optional(&mut *conn)
    .await?
    .map(|row| winner_from_row(&row))
    .transpose()
}

pub(crate) async fn insert_winner(conn: &mut SqliteConnection, winner: &ElectionWinner) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO election_winners
            (election_id, position_id, election_position_id, candidate_id,
             won_at_scrutiny, decided_by, recorded_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&winner.election_id)
    .bind(&winner.position_id)
    .bind(&winner.election_position_id)
    .bind(&winner.candidate_id)
    .bind(winner.won_at_scrutiny)
    .bind(winner.decided_by.as_str())
    .bind(to_timestamp(winner.recorded_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn list_admin_actions(
    conn: &mut SqliteConnection,
    election_id: &str,
) -> Result<Vec<AdminAction>> {
    sqlx::query(
        r#"
        SELECT id, election_id, election_position_id, action, actor_id, detail, recorded_at
        FROM admin_actions
        WHERE election_id = ?
        ORDER BY recorded_at, rowid
        "#,
    )
    .bind(election_id)
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(admin_action_from_row)
    .collect()
}

pub(crate) async fn insert_admin_action(
    conn: &mut SqliteConnection,
    position: &ElectionPosition,
    action: AdminActionKind,
    actor_id: &str,
    detail: &str,
) -> Result<AdminAction> {
    let record = AdminAction {
        id: new_id(),
        election_id: position.election_id.clone(),
        election_position_id: position.id.clone(),
        action,
        actor_id: actor_id.to_string(),
        detail: detail.to_string(),
        recorded_at: now(),
    };

    sqlx::query(
        r#"
        INSERT INTO admin_actions
            (id, election_id, election_position_id, action, actor_id, detail, recorded_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.id)
    .bind(&record.election_id)
    .bind(&record.election_position_id)
    .bind(record.action.as_str())
    .bind(&record.actor_id)
    .bind(&record.detail)
    .bind(to_timestamp(record.recorded_at))
    .execute(&mut *conn)
    .await?;

    Ok(record)
}
