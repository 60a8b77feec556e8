pub mod challenges;
pub mod health;
pub mod referrals;
pub mod wallet;

use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(referrals::router())
        .merge(challenges::router())
        .merge(wallet::router())
}
