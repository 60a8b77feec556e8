use std::time::Duration;

use db::DBService;
use tokio::{task::JoinHandle, time::interval};
use tracing::info;

use super::referrals::ReferralService;

/// Background sweep that expires referral invites left unredeemed past the
/// redemption window.
pub struct ReferralExpiryService {
    db: DBService,
    poll_interval: Duration,
}

impl ReferralExpiryService {
    pub async fn spawn(db: DBService, poll_interval: Duration) -> JoinHandle<()> {
        let service = Self { db, poll_interval };
        tokio::spawn(async move {
            service.start().await;
        })
    }

    async fn start(&self) {
        info!(
            "Starting referral expiry sweep with poll interval {:?}",
            self.poll_interval
        );

        let mut interval = interval(self.poll_interval);
        loop {
            interval.tick().await;
            ReferralService::run_expiry_sweep(&self.db.pool).await;
        }
    }
}
