use async_trait::async_trait;
use db::models::wallet::WalletAccount;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("credit rejected: {0}")]
    Rejected(String),
}

/// Applies credits to user balances. Trait-shaped so tests and alternative
/// backends can stand in for the wallet tables.
///
/// `credit_id` is the idempotency key: retries and overlapping drains replay
/// credits, and an implementation must apply each id at most once.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn credit(
        &self,
        credit_id: Uuid,
        user_id: Uuid,
        amount_cents: i64,
        reason: &str,
        reference_id: Option<Uuid>,
    ) -> Result<(), LedgerError>;
}

/// Ledger backed by the local wallet tables.
#[derive(Clone)]
pub struct WalletLedger {
    pool: SqlitePool,
}

impl WalletLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CreditLedger for WalletLedger {
    async fn credit(
        &self,
        credit_id: Uuid,
        user_id: Uuid,
        amount_cents: i64,
        reason: &str,
        reference_id: Option<Uuid>,
    ) -> Result<(), LedgerError> {
        // The wallet entry's primary key carries the idempotency; a replayed
        // id comes back Ok(None) and moves no money.
        WalletAccount::credit(
            &self.pool,
            credit_id,
            user_id,
            amount_cents,
            reason,
            reference_id,
        )
        .await?;
        Ok(())
    }
}
