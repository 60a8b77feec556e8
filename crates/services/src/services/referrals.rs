use std::sync::Arc;

use db::{
    is_unique_violation,
    models::{
        referral::{BonusTier, CreateReferral, Referral, ReferralStatus},
        side_effect::{SideEffect, SideEffectPayload},
        user::UserAccount,
    },
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{error, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::{ledger::CreditLedger, side_effects::SideEffectService};

/// Base reward for the referrer, before the tier multiplier.
pub const BASE_REFERRER_REWARD_CENTS: i64 = 1000;
/// Flat reward for the referee; tiers never touch it.
pub const BASE_REFEREE_REWARD_CENTS: i64 = 500;

pub const REFERRAL_CODE_LENGTH: usize = 8;
pub const REFERRAL_EXPIRY_DAYS: i64 = 30;

const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const MAX_CODE_ATTEMPTS: u32 = 10;

#[derive(Debug, Error)]
pub enum ReferralError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("user not found")]
    Unauthenticated,
    #[error("could not allocate a unique referral code")]
    CodeGenerationExhausted,
    #[error("referral code is invalid or expired")]
    InvalidOrExpiredCode,
    #[error("cannot redeem your own referral code")]
    SelfReferral,
}

/// What a qualifying first purchase paid out.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct RewardBreakdown {
    pub referral_id: Uuid,
    pub referrer_reward_cents: i64,
    pub referee_reward_cents: i64,
    pub bonus_multiplier: f64,
    pub total_cents: i64,
}

/// A referrer's dashboard view: their invites plus derived tier standing.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ReferralSummary {
    pub referrals: Vec<Referral>,
    pub total: i64,
    pub successful: i64,
    pub pending: i64,
    pub bonus_tier: BonusTier,
    pub bonus_multiplier: f64,
}

pub struct ReferralService;

impl ReferralService {
    /// Eight characters drawn uniformly from A-Z and 0-9. Uniqueness is not
    /// guaranteed here; the code column's unique index is the authority.
    pub fn generate_code() -> String {
        let mut rng = rand::thread_rng();
        (0..REFERRAL_CODE_LENGTH)
            .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
            .collect()
    }

    /// Create a referral invite for `requester_id`, stamped with their current
    /// bonus tier. Regenerates on code collision up to a bounded number of
    /// attempts.
    pub async fn create_referral(
        pool: &SqlitePool,
        requester_id: Uuid,
        data: &CreateReferral,
    ) -> Result<Referral, ReferralError> {
        let requester = UserAccount::find_by_id(pool, requester_id)
            .await?
            .ok_or(ReferralError::Unauthenticated)?;

        let successful = Referral::count_successful_by_referrer(pool, requester.id).await?;
        let bonus_tier = BonusTier::for_successful_count(successful);

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = Self::generate_code();
            match Referral::create(pool, Uuid::new_v4(), requester.id, &code, bonus_tier, data)
                .await
            {
                Ok(referral) => {
                    info!(
                        referral_id = %referral.id,
                        referrer_id = %requester.id,
                        bonus_tier = %bonus_tier,
                        "Created referral invite"
                    );
                    return Ok(referral);
                }
                Err(e) if is_unique_violation(&e) => {
                    warn!(attempt, "Referral code collided, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        error!(
            referrer_id = %requester.id,
            attempts = MAX_CODE_ATTEMPTS,
            "Referral code space exhausted"
        );
        Err(ReferralError::CodeGenerationExhausted)
    }

    /// Redeem a referral code for `candidate_id`. The final claim is a
    /// guarded update, so of two concurrent redemptions exactly one wins and
    /// the other sees the same error as an unknown code.
    pub async fn validate_referral_code(
        pool: &SqlitePool,
        code: &str,
        candidate_id: Uuid,
    ) -> Result<Referral, ReferralError> {
        let candidate = UserAccount::find_by_id(pool, candidate_id)
            .await?
            .ok_or(ReferralError::Unauthenticated)?;

        let referral = Referral::find_claimable_by_code(pool, code)
            .await?
            .ok_or(ReferralError::InvalidOrExpiredCode)?;

        if referral.referrer_id == candidate.id {
            return Err(ReferralError::SelfReferral);
        }

        let claimed = Referral::claim_for_referee(pool, referral.id, candidate.id)
            .await?
            .ok_or(ReferralError::InvalidOrExpiredCode)?;

        info!(
            referral_id = %claimed.id,
            referee_id = %candidate.id,
            "Referral code redeemed"
        );
        Ok(claimed)
    }

    /// Settle the pending referral qualified by `user_id`'s first purchase,
    /// if there is one. `Ok(None)` means nothing to do: the user was not
    /// referred, or an earlier call already settled it. Safe to call on every
    /// purchase.
    pub async fn process_first_purchase(
        pool: &SqlitePool,
        ledger: &Arc<dyn CreditLedger>,
        user_id: Uuid,
    ) -> Result<Option<RewardBreakdown>, ReferralError> {
        let Some(referral) = Referral::find_pending_by_referee(pool, user_id).await? else {
            return Ok(None);
        };

        let referrer_reward = referral.bonus_tier.apply_to_cents(BASE_REFERRER_REWARD_CENTS);
        let referee_reward = BASE_REFEREE_REWARD_CENTS;

        let mut tx = pool.begin().await?;
        let Some(settled) = Referral::mark_earned(&mut *tx, referral.id, referrer_reward).await?
        else {
            // Another purchase got here first.
            return Ok(None);
        };
        SideEffect::enqueue(
            &mut *tx,
            Uuid::new_v4(),
            &SideEffectPayload::WalletCredit {
                user_id: settled.referrer_id,
                amount_cents: referrer_reward,
                reason: "referral_reward".to_string(),
                reference_id: Some(settled.id),
            },
        )
        .await?;
        SideEffect::enqueue(
            &mut *tx,
            Uuid::new_v4(),
            &SideEffectPayload::WalletCredit {
                user_id,
                amount_cents: referee_reward,
                reason: "referral_signup_bonus".to_string(),
                reference_id: Some(settled.id),
            },
        )
        .await?;
        tx.commit().await?;

        info!(
            referral_id = %settled.id,
            referrer_reward_cents = referrer_reward,
            referee_reward_cents = referee_reward,
            bonus_tier = %settled.bonus_tier,
            "Referral rewards earned on first purchase"
        );

        // Crediting must never unwind the purchase. Whatever this drain does
        // not land stays queued for the retry worker.
        SideEffectService::drain_now(pool, ledger).await;

        Ok(Some(RewardBreakdown {
            referral_id: settled.id,
            referrer_reward_cents: referrer_reward,
            referee_reward_cents: referee_reward,
            bonus_multiplier: settled.bonus_tier.multiplier(),
            total_cents: referrer_reward + referee_reward,
        }))
    }

    /// Expire unredeemed invites older than the redemption window. Returns
    /// how many were swept.
    pub async fn expire_old_referrals(pool: &SqlitePool) -> Result<u64, ReferralError> {
        Ok(Referral::expire_older_than(pool, REFERRAL_EXPIRY_DAYS).await?)
    }

    /// Sweep wrapper for scheduled runs: errors are logged and count as zero
    /// swept, never propagated.
    pub async fn run_expiry_sweep(pool: &SqlitePool) -> u64 {
        match Self::expire_old_referrals(pool).await {
            Ok(0) => 0,
            Ok(expired) => {
                info!(expired, "Expired stale referral invites");
                expired
            }
            Err(e) => {
                error!("Error running referral expiry sweep: {}", e);
                0
            }
        }
    }

    pub async fn referral_summary(
        pool: &SqlitePool,
        user_id: Uuid,
    ) -> Result<ReferralSummary, ReferralError> {
        let user = UserAccount::find_by_id(pool, user_id)
            .await?
            .ok_or(ReferralError::Unauthenticated)?;

        let referrals = Referral::find_by_referrer(pool, user.id).await?;
        let successful = referrals
            .iter()
            .filter(|r| matches!(r.status, ReferralStatus::Earned | ReferralStatus::Credited))
            .count() as i64;
        let pending = referrals
            .iter()
            .filter(|r| r.status == ReferralStatus::Pending)
            .count() as i64;
        let bonus_tier = BonusTier::for_successful_count(successful);

        Ok(ReferralSummary {
            total: referrals.len() as i64,
            successful,
            pending,
            bonus_tier,
            bonus_multiplier: bonus_tier.multiplier(),
            referrals,
        })
    }
}
