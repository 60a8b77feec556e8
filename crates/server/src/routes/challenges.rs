//! Routes for community challenges: browsing, membership, progress, stats.

use axum::{
    Router,
    extract::{Path, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::{
    challenge::{CommunityChallenge, CreateChallenge},
    participant::ChallengeParticipant,
};
use serde::{Deserialize, Serialize};
use services::services::challenges::{
    AddProgress, ChallengeError, ChallengeService, ChallengeStats, ProgressOutcome,
};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{AppState, auth::AuthUser, error::ApiError};

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct JoinChallengeRequest {
    /// Whether the participant shows up on public leaderboards.
    #[serde(default)]
    pub is_visible: Option<bool>,
}

/// Challenges open for browsing: active, public, featured first
pub async fn list_challenges(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Vec<CommunityChallenge>>>, ApiError> {
    let challenges = CommunityChallenge::find_active_public(&state.db().pool).await?;
    Ok(ResponseJson(ApiResponse::success(challenges)))
}

/// Seed a new challenge
pub async fn create_challenge(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<CreateChallenge>,
) -> Result<ResponseJson<ApiResponse<CommunityChallenge>>, ApiError> {
    let challenge = ChallengeService::create_challenge(&state.db().pool, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(challenge)))
}

pub async fn get_challenge(
    State(state): State<AppState>,
    Path(challenge_id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<CommunityChallenge>>, ApiError> {
    let challenge = CommunityChallenge::find_by_id(&state.db().pool, challenge_id)
        .await?
        .ok_or(ChallengeError::ChallengeNotFound)?;
    Ok(ResponseJson(ApiResponse::success(challenge)))
}

/// Enroll the calling user in a challenge
pub async fn join_challenge(
    State(state): State<AppState>,
    Path(challenge_id): Path<Uuid>,
    AuthUser(user_id): AuthUser,
    axum::Json(payload): axum::Json<JoinChallengeRequest>,
) -> Result<ResponseJson<ApiResponse<ChallengeParticipant>>, ApiError> {
    let participant = ChallengeService::join_challenge(
        &state.db().pool,
        user_id,
        challenge_id,
        payload.is_visible.unwrap_or(true),
    )
    .await?;
    Ok(ResponseJson(ApiResponse::success(participant)))
}

/// Log one day of progress for the calling user
pub async fn add_progress(
    State(state): State<AppState>,
    Path(challenge_id): Path<Uuid>,
    AuthUser(user_id): AuthUser,
    axum::Json(payload): axum::Json<AddProgress>,
) -> Result<ResponseJson<ApiResponse<ProgressOutcome>>, ApiError> {
    let outcome = ChallengeService::add_progress(
        &state.db().pool,
        state.ledger(),
        user_id,
        challenge_id,
        &payload,
    )
    .await?;
    Ok(ResponseJson(ApiResponse::success(outcome)))
}

/// Withdraw the calling user from a challenge
pub async fn withdraw(
    State(state): State<AppState>,
    Path(challenge_id): Path<Uuid>,
    AuthUser(user_id): AuthUser,
) -> Result<ResponseJson<ApiResponse<ChallengeParticipant>>, ApiError> {
    let participant = ChallengeService::withdraw(&state.db().pool, user_id, challenge_id).await?;
    Ok(ResponseJson(ApiResponse::success(participant)))
}

/// Aggregate stats; includes the caller's rank when they are identified
pub async fn challenge_stats(
    State(state): State<AppState>,
    Path(challenge_id): Path<Uuid>,
    user: Option<AuthUser>,
) -> Result<ResponseJson<ApiResponse<ChallengeStats>>, ApiError> {
    let stats =
        ChallengeService::challenge_stats(&state.db().pool, challenge_id, user.map(|u| u.0))
            .await?;
    Ok(ResponseJson(ApiResponse::success(stats)))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/challenges",
        Router::new()
            .route("/", get(list_challenges).post(create_challenge))
            .route("/{challenge_id}", get(get_challenge))
            .route("/{challenge_id}/join", post(join_challenge))
            .route("/{challenge_id}/progress", post(add_progress))
            .route("/{challenge_id}/withdraw", post(withdraw))
            .route("/{challenge_id}/stats", get(challenge_stats)),
    )
}
