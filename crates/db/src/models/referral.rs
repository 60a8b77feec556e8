use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "referral_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReferralStatus {
    #[default]
    Pending,
    Earned,
    Credited,
    Expired,
}

/// Reward multiplier band, earned by accumulated successful referrals.
///
/// Tiers carry an exact integer percent so cent amounts never go through
/// floating point: standard 100, silver 120, gold 150, platinum 200.
#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "bonus_tier", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BonusTier {
    #[default]
    Standard,
    Silver,
    Gold,
    Platinum,
}

impl BonusTier {
    /// Tier for a referrer with `count` referrals in earned/credited status.
    pub fn for_successful_count(count: i64) -> Self {
        match count {
            c if c >= 25 => BonusTier::Platinum,
            c if c >= 10 => BonusTier::Gold,
            c if c >= 5 => BonusTier::Silver,
            _ => BonusTier::Standard,
        }
    }

    pub fn percent(self) -> i64 {
        match self {
            BonusTier::Standard => 100,
            BonusTier::Silver => 120,
            BonusTier::Gold => 150,
            BonusTier::Platinum => 200,
        }
    }

    pub fn multiplier(self) -> f64 {
        self.percent() as f64 / 100.0
    }

    pub fn apply_to_cents(self, cents: i64) -> i64 {
        cents * self.percent() / 100
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Referral {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub referee_id: Option<Uuid>,
    pub code: String,
    pub method: String,
    pub source: String,
    pub status: ReferralStatus,
    pub bonus_tier: BonusTier,
    pub reward_cents: Option<i64>,
    pub invited_at: DateTime<Utc>,
    pub signed_up_at: Option<DateTime<Utc>>,
    pub first_purchase_at: Option<DateTime<Utc>>,
    pub metadata: Option<String>, // JSON from the client, stored verbatim
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for creating a referral invite.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateReferral {
    pub method: String,
    pub source: String,
    pub metadata: Option<serde_json::Value>,
}

impl Referral {
    /// Insert a new pending referral. A duplicate code surfaces as a unique
    /// violation; the caller owns the retry.
    pub async fn create(
        pool: &SqlitePool,
        referral_id: Uuid,
        referrer_id: Uuid,
        code: &str,
        bonus_tier: BonusTier,
        data: &CreateReferral,
    ) -> Result<Self, sqlx::Error> {
        let metadata = match &data.metadata {
            Some(value) => Some(
                serde_json::to_string(value).map_err(|e| sqlx::Error::Encode(Box::new(e)))?,
            ),
            None => None,
        };
        sqlx::query_as::<_, Referral>(
            r#"INSERT INTO referrals (id, referrer_id, code, method, source, bonus_tier, metadata)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING *"#,
        )
        .bind(referral_id)
        .bind(referrer_id)
        .bind(code)
        .bind(&data.method)
        .bind(&data.source)
        .bind(bonus_tier)
        .bind(metadata)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Referral>("SELECT * FROM referrals WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Look up a referral that is still open for redemption. Code matching is
    /// case-insensitive via the column collation.
    pub async fn find_claimable_by_code(
        pool: &SqlitePool,
        code: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Referral>(
            r#"SELECT * FROM referrals
               WHERE code = $1 AND status = 'pending' AND referee_id IS NULL"#,
        )
        .bind(code)
        .fetch_optional(pool)
        .await
    }

    /// Atomically claim a referral for a redeeming user. The status and
    /// referee guards make concurrent redemptions lose cleanly: the second
    /// UPDATE matches zero rows and returns `None`.
    pub async fn claim_for_referee(
        pool: &SqlitePool,
        referral_id: Uuid,
        referee_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Referral>(
            r#"UPDATE referrals
               SET referee_id = $2,
                   signed_up_at = datetime('now', 'subsec'),
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1 AND status = 'pending' AND referee_id IS NULL
               RETURNING *"#,
        )
        .bind(referral_id)
        .bind(referee_id)
        .fetch_optional(pool)
        .await
    }

    /// The referral a first purchase would qualify, if any.
    pub async fn find_pending_by_referee(
        pool: &SqlitePool,
        referee_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Referral>(
            "SELECT * FROM referrals WHERE referee_id = $1 AND status = 'pending'",
        )
        .bind(referee_id)
        .fetch_optional(pool)
        .await
    }

    /// Settle a pending referral after the referee's first purchase. The
    /// status guard means only one caller ever sees `Some`; everyone else
    /// arrived after the reward was already granted.
    pub async fn mark_earned<'e, E>(
        executor: E,
        referral_id: Uuid,
        reward_cents: i64,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Referral>(
            r#"UPDATE referrals
               SET status = 'earned',
                   reward_cents = $2,
                   first_purchase_at = datetime('now', 'subsec'),
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1 AND status = 'pending'
               RETURNING *"#,
        )
        .bind(referral_id)
        .bind(reward_cents)
        .fetch_optional(executor)
        .await
    }

    /// Referrals that have produced a reward (earned or already credited).
    pub async fn count_successful_by_referrer(
        pool: &SqlitePool,
        referrer_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*) FROM referrals
               WHERE referrer_id = $1 AND status IN ('earned', 'credited')"#,
        )
        .bind(referrer_id)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_referrer(
        pool: &SqlitePool,
        referrer_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Referral>(
            "SELECT * FROM referrals WHERE referrer_id = $1 ORDER BY invited_at DESC",
        )
        .bind(referrer_id)
        .fetch_all(pool)
        .await
    }

    /// Flip unredeemed pending referrals older than `max_age_days` to
    /// expired. Returns the number of rows swept.
    pub async fn expire_older_than(
        pool: &SqlitePool,
        max_age_days: i64,
    ) -> Result<u64, sqlx::Error> {
        let cutoff = format!("-{} days", max_age_days);
        let result = sqlx::query(
            r#"UPDATE referrals
               SET status = 'expired', updated_at = datetime('now', 'subsec')
               WHERE status = 'pending'
                 AND referee_id IS NULL
                 AND datetime(invited_at) < datetime('now', $1)"#,
        )
        .bind(cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
