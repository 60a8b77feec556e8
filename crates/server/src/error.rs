use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use services::services::{challenges::ChallengeError, referrals::ReferralError};
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Referral(#[from] ReferralError),
    #[error(transparent)]
    Challenge(#[from] ChallengeError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("missing or malformed X-User-Id header")]
    MissingUserHeader,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Referral(e) => match e {
                ReferralError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
                ReferralError::Unauthenticated => StatusCode::UNAUTHORIZED,
                ReferralError::CodeGenerationExhausted => StatusCode::SERVICE_UNAVAILABLE,
                ReferralError::InvalidOrExpiredCode => StatusCode::BAD_REQUEST,
                ReferralError::SelfReferral => StatusCode::BAD_REQUEST,
            },
            ApiError::Challenge(e) => match e {
                ChallengeError::Database(_) | ChallengeError::MalformedPayload(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                ChallengeError::Unauthenticated => StatusCode::UNAUTHORIZED,
                ChallengeError::ChallengeNotFound | ChallengeError::NotParticipating => {
                    StatusCode::NOT_FOUND
                }
                ChallengeError::InvalidChallenge(_) => StatusCode::BAD_REQUEST,
                ChallengeError::RequirementsNotMet(_) => StatusCode::FORBIDDEN,
                ChallengeError::ChallengeUnavailable
                | ChallengeError::AlreadyParticipating
                | ChallengeError::ChallengeFull
                | ChallengeError::InactiveParticipation
                | ChallengeError::DuplicateProgressToday => StatusCode::CONFLICT,
            },
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::MissingUserHeader => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            tracing::error!("Internal error handling request: {}", self);
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}
