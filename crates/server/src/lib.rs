use std::sync::Arc;

use db::DBService;
use services::services::ledger::CreditLedger;

pub mod auth;
pub mod error;
pub mod routes;

/// Shared state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    db: DBService,
    ledger: Arc<dyn CreditLedger>,
}

impl AppState {
    pub fn new(db: DBService, ledger: Arc<dyn CreditLedger>) -> Self {
        Self { db, ledger }
    }

    pub fn db(&self) -> &DBService {
        &self.db
    }

    pub fn ledger(&self) -> &Arc<dyn CreditLedger> {
        &self.ledger
    }
}
