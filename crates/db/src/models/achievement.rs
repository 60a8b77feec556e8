use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// A badge a user earned from a challenge reward structure.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Achievement {
    pub id: Uuid,
    pub user_id: Uuid,
    pub challenge_id: Uuid,
    pub badge: String,
    pub awarded_at: DateTime<Utc>,
}

impl Achievement {
    /// Grant a badge. Re-granting the same badge for the same challenge is a
    /// no-op (`None`), so retried reward distribution stays idempotent.
    pub async fn grant(
        pool: &SqlitePool,
        user_id: Uuid,
        challenge_id: Uuid,
        badge: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Achievement>(
            r#"INSERT INTO achievements (id, user_id, challenge_id, badge)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT(user_id, challenge_id, badge) DO NOTHING
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(challenge_id)
        .bind(badge)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_user(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Achievement>(
            "SELECT * FROM achievements WHERE user_id = $1 ORDER BY awarded_at DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }
}
