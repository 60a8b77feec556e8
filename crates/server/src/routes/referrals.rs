//! Routes for referral invites, redemption, and rewards.

use axum::{
    Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::referral::{CreateReferral, Referral};
use serde::{Deserialize, Serialize};
use services::services::referrals::{ReferralService, ReferralSummary, RewardBreakdown};
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{AppState, auth::AuthUser, error::ApiError};

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct RedeemReferralRequest {
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ExpirySweepResponse {
    pub expired: u64,
}

/// Create a referral invite for the calling user
pub async fn create_referral(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    axum::Json(payload): axum::Json<CreateReferral>,
) -> Result<ResponseJson<ApiResponse<Referral>>, ApiError> {
    let referral = ReferralService::create_referral(&state.db().pool, user_id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(referral)))
}

/// The calling user's invites plus their current tier standing
pub async fn my_referrals(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<ResponseJson<ApiResponse<ReferralSummary>>, ApiError> {
    let summary = ReferralService::referral_summary(&state.db().pool, user_id).await?;
    Ok(ResponseJson(ApiResponse::success(summary)))
}

/// Redeem a referral code for the calling user
pub async fn redeem_referral(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    axum::Json(payload): axum::Json<RedeemReferralRequest>,
) -> Result<ResponseJson<ApiResponse<Referral>>, ApiError> {
    let referral =
        ReferralService::validate_referral_code(&state.db().pool, &payload.code, user_id).await?;
    Ok(ResponseJson(ApiResponse::success(referral)))
}

/// Settle referral rewards after the calling user's first purchase. Returns
/// `null` data when no referral was waiting on it.
pub async fn first_purchase(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<ResponseJson<ApiResponse<Option<RewardBreakdown>>>, ApiError> {
    let breakdown =
        ReferralService::process_first_purchase(&state.db().pool, state.ledger(), user_id).await?;
    Ok(ResponseJson(ApiResponse::success(breakdown)))
}

/// Manual trigger for the expiry sweep the background service runs hourly
pub async fn expiry_sweep(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<ExpirySweepResponse>>, ApiError> {
    let expired = ReferralService::expire_old_referrals(&state.db().pool).await?;
    Ok(ResponseJson(ApiResponse::success(ExpirySweepResponse {
        expired,
    })))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/referrals",
        Router::new()
            .route("/", post(create_referral))
            .route("/mine", get(my_referrals))
            .route("/redeem", post(redeem_referral))
            .route("/first-purchase", post(first_purchase))
            .route("/expiry-sweep", post(expiry_sweep)),
    )
}
