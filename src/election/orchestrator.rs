use log::info;
use std::collections::HashSet;

use crate::db::{self, Database};
use crate::election::position;
use crate::error::{is_unique_violation, ElectionError, Result};
use crate::models::{Election, ElectionPosition, PositionStatus};

/// Start a new election that will fill `position_ids`, in that order.
pub async fn open_election(database: &Database, name: &str, position_ids: &[&str]) -> Result<Election> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ElectionError::InvalidState("election name must not be blank".to_string()));
    }
    if position_ids.is_empty() {
        return Err(ElectionError::InvalidState(
            "an election needs at least one position".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    if let Some(repeated) = position_ids.iter().find(|id| !seen.insert(**id)) {
        return Err(ElectionError::InvalidState(format!(
            "position {} is listed more than once",
            repeated
        )));
    }

    let mut tx = database.begin_write().await?;

    if let Some(active) = db::find_active_election(&mut tx).await? {
        return Err(ElectionError::ElectionAlreadyActive { election_id: active.id });
    }

    for position_id in position_ids {
        let exists = sqlx::query("SELECT 1 FROM positions WHERE id = ?")
            .bind(*position_id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !exists {
            return Err(ElectionError::NotFound(format!("position {}", position_id)));
        }
    }

    let election = Election {
        id: db::new_id(),
        name: name.to_string(),
        is_active: true,
        created_at: db::now(),
        closed_at: None,
    };

    let inserted = sqlx::query(
        r#"
        INSERT INTO elections (id, name, is_active, created_at, closed_at)
        VALUES (?, ?, TRUE, ?, NULL)
        "#,
    )
    .bind(&election.id)
    .bind(&election.name)
    .bind(db::to_timestamp(election.created_at))
    .execute(&mut *tx)
    .await;

    match inserted {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(ElectionError::OutOfOrder(
                "another election was opened concurrently".to_string(),
            ));
        }
        Err(e) => return Err(e.into()),
    }

    for (order_index, position_id) in position_ids.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO election_positions (id, election_id, position_id, order_index, status, scrutiny_round)
            VALUES (?, ?, ?, ?, 'pending', 1)
            "#,
        )
        .bind(db::new_id())
        .bind(&election.id)
        .bind(*position_id)
        .bind(order_index as u32)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!(
        "Opened election '{}' ({}) with {} positions",
        election.name,
        election.id,
        position_ids.len()
    );

    Ok(election)
}

/// Open the next pending position of the election.
///
/// Once every position is completed the election is closed and
/// `AllPositionsCompleted` is returned, now and on every later call.
pub async fn advance(database: &Database, election_id: &str) -> Result<ElectionPosition> {
    let mut tx = database.begin_write().await?;
    let election = db::load_election(&mut tx, election_id).await?;
    if !election.is_active {
        return Err(ElectionError::AllPositionsCompleted {
            election_id: election.id,
        });
    }

    let positions = db::list_election_positions(&mut tx, election_id).await?;

    if let Some(next) = positions.iter().find(|p| p.status == PositionStatus::Pending) {
        let opened = position::open_in(&mut tx, next).await?;
        tx.commit().await?;
        return Ok(opened);
    }

    if let Some(open) = positions.iter().find(|p| p.status == PositionStatus::Active) {
        return Err(ElectionError::InvalidState(format!(
            "'{}' is still being voted on",
            open.position_name
        )));
    }

    let closed = sqlx::query(
        r#"
        UPDATE elections
        SET is_active = FALSE, closed_at = ?
        WHERE id = ? AND is_active = TRUE
        "#,
    )
    .bind(db::to_timestamp(db::now()))
    .bind(election_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    tx.commit().await?;

    if closed == 1 {
        info!("All positions of '{}' are completed; election closed", election.name);
    }

    Err(ElectionError::AllPositionsCompleted {
        election_id: election.id,
    })
}

/// The election currently running, if any.
pub async fn active_election(database: &Database) -> Result<Option<Election>> {
    let mut conn = database.pool().acquire().await?;
    db::find_active_election(&mut conn).await
}

pub async fn election(database: &Database, election_id: &str) -> Result<Election> {
    let mut conn = database.pool().acquire().await?;
    db::load_election(&mut conn, election_id).await
}

/// Positions of an election in the order they are run.
pub async fn election_positions(database: &Database, election_id: &str) -> Result<Vec<ElectionPosition>> {
    let mut conn = database.pool().acquire().await?;
    db::load_election(&mut conn, election_id).await?;
    db::list_election_positions(&mut conn, election_id).await
}
