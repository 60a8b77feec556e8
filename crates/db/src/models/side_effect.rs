use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "side_effect_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SideEffectStatus {
    #[default]
    Pending,
    Applied,
    Failed,
}

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, TS, EnumString, Display,
)]
#[sqlx(type_name = "side_effect_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SideEffectKind {
    WalletCredit,
    GrantBadge,
}

/// The deferred work a primary operation committed to.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SideEffectPayload {
    WalletCredit {
        user_id: Uuid,
        amount_cents: i64,
        reason: String,
        reference_id: Option<Uuid>,
    },
    GrantBadge {
        user_id: Uuid,
        challenge_id: Uuid,
        badge: String,
    },
}

impl SideEffectPayload {
    pub fn kind(&self) -> SideEffectKind {
        match self {
            SideEffectPayload::WalletCredit { .. } => SideEffectKind::WalletCredit,
            SideEffectPayload::GrantBadge { .. } => SideEffectKind::GrantBadge,
        }
    }
}

/// Queue row for a best-effort side effect (reward credit, badge grant).
/// Enqueued inside the primary operation's transaction; applied by the drain
/// path, which retries until the attempt cap and then parks the row as
/// `failed` for reconciliation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct SideEffect {
    pub id: Uuid,
    pub kind: SideEffectKind,
    pub payload: String, // JSON-serialized SideEffectPayload
    pub status: SideEffectStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub applied_at: Option<DateTime<Utc>>,
}

impl SideEffect {
    /// Executor-generic so callers enqueue within their own transaction: the
    /// effect becomes durable if and only if the primary write commits.
    pub async fn enqueue<'e, E>(
        executor: E,
        effect_id: Uuid,
        payload: &SideEffectPayload,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let json = serde_json::to_string(payload).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        sqlx::query_as::<_, SideEffect>(
            r#"INSERT INTO side_effects (id, kind, payload)
               VALUES ($1, $2, $3)
               RETURNING *"#,
        )
        .bind(effect_id)
        .bind(payload.kind())
        .bind(json)
        .fetch_one(executor)
        .await
    }

    pub async fn find_pending(
        pool: &SqlitePool,
        limit: i32,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, SideEffect>(
            r#"SELECT * FROM side_effects
               WHERE status = 'pending'
               ORDER BY created_at ASC
               LIMIT $1"#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Guarded flip to applied. `false` means the row was no longer pending:
    /// a concurrent drain settled it first, and that drain owns the count.
    pub async fn mark_applied(pool: &SqlitePool, effect_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"UPDATE side_effects
               SET status = 'applied',
                   attempts = attempts + 1,
                   last_error = NULL,
                   applied_at = datetime('now', 'subsec')
               WHERE id = $1 AND status = 'pending'"#,
        )
        .bind(effect_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a failed attempt; the row stays pending until `max_attempts`
    /// and is parked as failed after. Guarded so a row another drain already
    /// settled is left alone.
    pub async fn record_failure(
        pool: &SqlitePool,
        effect_id: Uuid,
        error: &str,
        max_attempts: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"UPDATE side_effects
               SET attempts = attempts + 1,
                   last_error = $2,
                   status = CASE WHEN attempts + 1 >= $3 THEN 'failed' ELSE 'pending' END
               WHERE id = $1 AND status = 'pending'"#,
        )
        .bind(effect_id)
        .bind(error)
        .bind(max_attempts)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn count_by_status(
        pool: &SqlitePool,
        status: SideEffectStatus,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM side_effects WHERE status = $1")
            .bind(status)
            .fetch_one(pool)
            .await
    }

    pub fn parsed_payload(&self) -> Result<SideEffectPayload, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}
