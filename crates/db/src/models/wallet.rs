use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct WalletAccount {
    pub user_id: Uuid,
    pub balance_cents: i64,
    pub updated_at: DateTime<Utc>,
}

/// Append-only record of every balance change.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct WalletEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount_cents: i64,
    pub reason: String,
    pub reference_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl WalletAccount {
    /// Apply a credit: ledger entry plus balance upsert in one transaction.
    /// `entry_id` is the caller's idempotency key: an id that already landed
    /// is a no-op (`Ok(None)`), so replays and overlapping retries cannot
    /// credit twice.
    pub async fn credit(
        pool: &SqlitePool,
        entry_id: Uuid,
        user_id: Uuid,
        amount_cents: i64,
        reason: &str,
        reference_id: Option<Uuid>,
    ) -> Result<Option<WalletEntry>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let Some(entry) = sqlx::query_as::<_, WalletEntry>(
            r#"INSERT INTO wallet_entries (id, user_id, amount_cents, reason, reference_id)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT(id) DO NOTHING
               RETURNING *"#,
        )
        .bind(entry_id)
        .bind(user_id)
        .bind(amount_cents)
        .bind(reason)
        .bind(reference_id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            // This credit already landed; the balance moved with it.
            return Ok(None);
        };

        sqlx::query(
            r#"INSERT INTO wallets (user_id, balance_cents)
               VALUES ($1, $2)
               ON CONFLICT(user_id) DO UPDATE SET
                   balance_cents = balance_cents + excluded.balance_cents,
                   updated_at = datetime('now', 'subsec')"#,
        )
        .bind(user_id)
        .bind(amount_cents)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(entry))
    }

    pub async fn balance(pool: &SqlitePool, user_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE((SELECT balance_cents FROM wallets WHERE user_id = $1), 0)",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }
}

impl WalletEntry {
    pub async fn recent_for_user(
        pool: &SqlitePool,
        user_id: Uuid,
        limit: i32,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, WalletEntry>(
            r#"SELECT * FROM wallet_entries
               WHERE user_id = $1
               ORDER BY created_at DESC
               LIMIT $2"#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}
