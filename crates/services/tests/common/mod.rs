use std::sync::Arc;

use db::models::user::{CreateUser, UserAccount};
use services::services::ledger::{CreditLedger, WalletLedger};
use sqlx::SqlitePool;
use uuid::Uuid;

pub async fn test_pool() -> SqlitePool {
    db::memory_pool().await.expect("in-memory database")
}

pub async fn seed_user(pool: &SqlitePool, name: &str) -> UserAccount {
    let data = CreateUser {
        display_name: name.to_string(),
        email: format!("{name}@example.com"),
    };
    UserAccount::create(pool, &data, Uuid::new_v4())
        .await
        .expect("seed user")
}

pub fn wallet_ledger(pool: &SqlitePool) -> Arc<dyn CreditLedger> {
    Arc::new(WalletLedger::new(pool.clone()))
}
