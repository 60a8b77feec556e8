use std::sync::Arc;
use std::time::Duration;

use db::{
    DBService,
    models::{
        achievement::Achievement,
        side_effect::{SideEffect, SideEffectPayload},
    },
};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::{task::JoinHandle, time::interval};
use tracing::{debug, error, info, warn};

use super::ledger::{CreditLedger, LedgerError};

/// After this many failed attempts an effect is parked as `failed` and left
/// for reconciliation instead of being retried forever.
pub const MAX_EFFECT_ATTEMPTS: i32 = 10;

const DRAIN_BATCH_SIZE: i32 = 50;

#[derive(Debug, Error)]
pub enum SideEffectError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}

pub struct SideEffectService;

impl SideEffectService {
    async fn apply(
        pool: &SqlitePool,
        ledger: &Arc<dyn CreditLedger>,
        effect: &SideEffect,
    ) -> Result<(), SideEffectError> {
        match effect.parsed_payload()? {
            SideEffectPayload::WalletCredit {
                user_id,
                amount_cents,
                reason,
                reference_id,
            } => {
                // The effect id keys the credit, so overlapping drains that
                // both reach the ledger still move the money once.
                ledger
                    .credit(effect.id, user_id, amount_cents, &reason, reference_id)
                    .await?;
            }
            SideEffectPayload::GrantBadge {
                user_id,
                challenge_id,
                badge,
            } => {
                Achievement::grant(pool, user_id, challenge_id, &badge).await?;
            }
        }
        Ok(())
    }

    /// Drain the pending queue once. Failures never reach the caller: each
    /// one is recorded on its row and picked up by the next drain, until the
    /// attempt cap parks it. Returns how many effects this drain settled.
    ///
    /// Drains overlap freely (the post-commit drain, the retry worker, a
    /// manual trigger): credits are keyed by effect id and the applied flip
    /// is guarded, so an effect lands at most once whoever races.
    pub async fn drain_now(pool: &SqlitePool, ledger: &Arc<dyn CreditLedger>) -> usize {
        let pending = match SideEffect::find_pending(pool, DRAIN_BATCH_SIZE).await {
            Ok(effects) => effects,
            Err(e) => {
                error!("Error loading pending side effects: {}", e);
                return 0;
            }
        };

        let mut applied = 0;
        for effect in pending {
            match Self::apply(pool, ledger, &effect).await {
                Ok(()) => match SideEffect::mark_applied(pool, effect.id).await {
                    Ok(true) => applied += 1,
                    Ok(false) => {
                        debug!(effect_id = %effect.id, "Side effect settled by a concurrent drain");
                    }
                    Err(e) => {
                        error!(effect_id = %effect.id, "Error marking side effect applied: {}", e);
                    }
                },
                Err(e) => {
                    warn!(
                        effect_id = %effect.id,
                        kind = %effect.kind,
                        attempts = effect.attempts + 1,
                        "Side effect failed, leaving for retry: {}",
                        e
                    );
                    if let Err(record_err) =
                        SideEffect::record_failure(pool, effect.id, &e.to_string(), MAX_EFFECT_ATTEMPTS)
                            .await
                    {
                        error!(effect_id = %effect.id, "Error recording side effect failure: {}", record_err);
                    }
                }
            }
        }
        applied
    }
}

/// Background retry loop for effects whose immediate drain did not land.
pub struct SideEffectWorker {
    db: DBService,
    ledger: Arc<dyn CreditLedger>,
    poll_interval: Duration,
}

impl SideEffectWorker {
    pub async fn spawn(
        db: DBService,
        ledger: Arc<dyn CreditLedger>,
        poll_interval: Duration,
    ) -> JoinHandle<()> {
        let worker = Self {
            db,
            ledger,
            poll_interval,
        };
        tokio::spawn(async move {
            worker.start().await;
        })
    }

    async fn start(&self) {
        info!(
            "Starting side effect worker with poll interval {:?}",
            self.poll_interval
        );

        let mut interval = interval(self.poll_interval);
        loop {
            interval.tick().await;
            let applied = SideEffectService::drain_now(&self.db.pool, &self.ledger).await;
            if applied > 0 {
                debug!(applied, "Side effect worker applied deferred effects");
            }
        }
    }
}
