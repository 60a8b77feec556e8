//! Read model over the wallet ledger.

use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use db::models::wallet::{WalletAccount, WalletEntry};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{AppState, auth::AuthUser, error::ApiError};

const RECENT_ENTRY_LIMIT: i32 = 20;

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct WalletSummary {
    pub balance_cents: i64,
    pub recent_entries: Vec<WalletEntry>,
}

/// The calling user's balance and recent credits
pub async fn get_wallet(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<ResponseJson<ApiResponse<WalletSummary>>, ApiError> {
    let balance_cents = WalletAccount::balance(&state.db().pool, user_id).await?;
    let recent_entries =
        WalletEntry::recent_for_user(&state.db().pool, user_id, RECENT_ENTRY_LIMIT).await?;
    Ok(ResponseJson(ApiResponse::success(WalletSummary {
        balance_cents,
        recent_entries,
    })))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/wallet", get(get_wallet))
}
