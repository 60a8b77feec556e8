use std::sync::Arc;

use anyhow::Context;
use db::DBService;
use server::{AppState, routes};
use services::services::{
    config::Config,
    ledger::{CreditLedger, WalletLedger},
    referral_expiry::ReferralExpiryService,
    side_effects::SideEffectWorker,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    utils::logging::init("info,sqlx=warn");

    let config = Config::from_env();

    let db = DBService::new(&config.database_url)
        .await
        .context("failed to open database")?;
    let ledger: Arc<dyn CreditLedger> = Arc::new(WalletLedger::new(db.pool.clone()));

    SideEffectWorker::spawn(db.clone(), ledger.clone(), config.effect_retry_interval).await;
    ReferralExpiryService::spawn(db.clone(), config.expiry_sweep_interval).await;

    let state = AppState::new(db, ledger);
    let app = routes::router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Rewards service listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
