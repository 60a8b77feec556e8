use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// What a participant logged for one day. `fruits` feeds variety evaluation;
/// anything else the client sends rides along untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct ProgressData {
    #[serde(default)]
    pub fruits: Vec<String>,
    #[serde(flatten)]
    #[ts(skip)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One day of progress for one participant. At most one row per participant
/// per calendar day (schema unique constraint).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ChallengeProgress {
    pub id: Uuid,
    pub participant_id: Uuid,
    pub entry_date: NaiveDate,
    pub progress_data: String, // JSON-serialized ProgressData
    pub daily_score: i64,
    pub cumulative_score: i64,
    pub notes: Option<String>,
    pub auto_generated: bool,
    pub created_at: DateTime<Utc>,
}

impl ChallengeProgress {
    /// Insert one day's entry. Executor-generic: ingestion pairs this with
    /// the participant score update in a single transaction. A same-day
    /// duplicate surfaces as a unique violation.
    #[allow(clippy::too_many_arguments)]
    pub async fn create<'e, E>(
        executor: E,
        progress_id: Uuid,
        participant_id: Uuid,
        entry_date: NaiveDate,
        data: &ProgressData,
        daily_score: i64,
        cumulative_score: i64,
        notes: Option<&str>,
        auto_generated: bool,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let payload = serde_json::to_string(data).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        sqlx::query_as::<_, ChallengeProgress>(
            r#"INSERT INTO challenge_progress
                   (id, participant_id, entry_date, progress_data, daily_score,
                    cumulative_score, notes, auto_generated)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING *"#,
        )
        .bind(progress_id)
        .bind(participant_id)
        .bind(entry_date)
        .bind(payload)
        .bind(daily_score)
        .bind(cumulative_score)
        .bind(notes)
        .bind(auto_generated)
        .fetch_one(executor)
        .await
    }

    /// Most recent entry, carrying the cumulative total the next entry
    /// builds on.
    pub async fn latest_for_participant(
        pool: &SqlitePool,
        participant_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ChallengeProgress>(
            r#"SELECT * FROM challenge_progress
               WHERE participant_id = $1
               ORDER BY entry_date DESC
               LIMIT 1"#,
        )
        .bind(participant_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn exists_for_date(
        pool: &SqlitePool,
        participant_id: Uuid,
        entry_date: NaiveDate,
    ) -> Result<bool, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM challenge_progress WHERE participant_id = $1 AND entry_date = $2",
        )
        .bind(participant_id)
        .bind(entry_date)
        .fetch_one(pool)
        .await?;
        Ok(count > 0)
    }

    /// Full history in calendar order, for success-criteria evaluation.
    pub async fn history_for_participant(
        pool: &SqlitePool,
        participant_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ChallengeProgress>(
            r#"SELECT * FROM challenge_progress
               WHERE participant_id = $1
               ORDER BY entry_date ASC"#,
        )
        .bind(participant_id)
        .fetch_all(pool)
        .await
    }

    pub fn parsed_data(&self) -> ProgressData {
        serde_json::from_str(&self.progress_data).unwrap_or_default()
    }
}
