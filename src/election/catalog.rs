use log::info;

use crate::db::{self, Database};
use crate::error::{is_unique_violation, ElectionError, Result};
use crate::models::Position;

/// Add an office to the catalog. Names are unique.
pub async fn create_position(database: &Database, name: &str) -> Result<Position> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ElectionError::InvalidState("position name must not be blank".to_string()));
    }

    let position = Position {
        id: db::new_id(),
        name: name.to_string(),
        created_at: db::now(),
    };

    let inserted = sqlx::query(
        r#"
        INSERT INTO positions (id, name, created_at)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(&position.id)
    .bind(&position.name)
    .bind(db::to_timestamp(position.created_at))
    .execute(database.pool())
    .await;

    match inserted {
        Ok(_) => {
            info!("Created position '{}' ({})", position.name, position.id);
            Ok(position)
        }
        Err(e) if is_unique_violation(&e) => Err(ElectionError::PositionExists(position.name)),
        Err(e) => Err(e.into()),
    }
}

/// The whole catalog, by name.
pub async fn positions(database: &Database) -> Result<Vec<Position>> {
    sqlx::query(
        r#"
        SELECT id, name, created_at
        FROM positions
        ORDER BY name
        "#,
    )
    .fetch_all(database.pool())
    .await?
    .iter()
    .map(db::position_from_row)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn names_are_unique_and_trimmed() {
        let database = Database::in_memory().await.unwrap();

        let president = create_position(&database, "  President ").await.unwrap();
        assert_eq!(president.name, "President");

        let err = create_position(&database, "President").await.unwrap_err();
        assert!(matches!(err, ElectionError::PositionExists(name) if name == "President"));

        create_position(&database, "Clerk").await.unwrap();
        let names: Vec<String> = positions(&database).await.unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Clerk", "President"]);
    }

    #[tokio::test]
    async fn blank_names_are_rejected() {
        let database = Database::in_memory().await.unwrap();
        let err = create_position(&database, "   ").await.unwrap_err();
        assert!(matches!(err, ElectionError::InvalidState(_)));
    }
}
