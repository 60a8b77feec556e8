use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use super::challenge::RewardStructure;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "participant_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ParticipantStatus {
    #[default]
    Active,
    Completed,
    Failed,
    Withdrawn,
}

/// One user's enrollment in one challenge. The (challenge_id, user_id) pair
/// is unique at the schema level.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ChallengeParticipant {
    pub id: Uuid,
    pub challenge_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
    pub status: ParticipantStatus,
    pub completion_date: Option<DateTime<Utc>>,
    pub final_score: i64,
    pub rank_position: Option<i32>,
    pub rewards_earned: Option<String>, // JSON-serialized RewardStructure snapshot
    pub is_visible: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChallengeParticipant {
    /// Insert a fresh enrollment (score 0, active). A duplicate join surfaces
    /// as a unique violation.
    pub async fn create(
        pool: &SqlitePool,
        participant_id: Uuid,
        challenge_id: Uuid,
        user_id: Uuid,
        is_visible: bool,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, ChallengeParticipant>(
            r#"INSERT INTO challenge_participants (id, challenge_id, user_id, is_visible)
               VALUES ($1, $2, $3, $4)
               RETURNING *"#,
        )
        .bind(participant_id)
        .bind(challenge_id)
        .bind(user_id)
        .bind(is_visible)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_challenge_and_user(
        pool: &SqlitePool,
        challenge_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ChallengeParticipant>(
            "SELECT * FROM challenge_participants WHERE challenge_id = $1 AND user_id = $2",
        )
        .bind(challenge_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Every enrollment counts toward capacity, withdrawn included: a slot,
    /// once taken, stays taken.
    pub async fn count_by_challenge(
        pool: &SqlitePool,
        challenge_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM challenge_participants WHERE challenge_id = $1",
        )
        .bind(challenge_id)
        .fetch_one(pool)
        .await
    }

    /// Participants ordered by the store, best score first. Rank is the
    /// 1-based position in this list; ordering among equal scores is whatever
    /// the store returns.
    pub async fn find_by_challenge_ordered(
        pool: &SqlitePool,
        challenge_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ChallengeParticipant>(
            r#"SELECT * FROM challenge_participants
               WHERE challenge_id = $1
               ORDER BY final_score DESC"#,
        )
        .bind(challenge_id)
        .fetch_all(pool)
        .await
    }

    /// Replace the running score. Executor-generic so progress ingestion can
    /// enlist it in the same transaction as the progress insert.
    pub async fn update_score<'e, E>(
        executor: E,
        participant_id: Uuid,
        final_score: i64,
    ) -> Result<(), sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"UPDATE challenge_participants
               SET final_score = $2, updated_at = datetime('now', 'subsec')
               WHERE id = $1"#,
        )
        .bind(participant_id)
        .bind(final_score)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Mark an active participation completed, snapshotting the reward
    /// structure it was completed under. Returns `None` when the row was not
    /// active anymore (completion is single-shot).
    pub async fn complete<'e, E>(
        executor: E,
        participant_id: Uuid,
        rewards: &RewardStructure,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let snapshot =
            serde_json::to_string(rewards).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        sqlx::query_as::<_, ChallengeParticipant>(
            r#"UPDATE challenge_participants
               SET status = 'completed',
                   completion_date = datetime('now', 'subsec'),
                   rewards_earned = $2,
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1 AND status = 'active'
               RETURNING *"#,
        )
        .bind(participant_id)
        .bind(snapshot)
        .fetch_optional(executor)
        .await
    }

    /// Leave a challenge. Only an active participation can be withdrawn.
    pub async fn withdraw(
        pool: &SqlitePool,
        participant_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ChallengeParticipant>(
            r#"UPDATE challenge_participants
               SET status = 'withdrawn', updated_at = datetime('now', 'subsec')
               WHERE id = $1 AND status = 'active'
               RETURNING *"#,
        )
        .bind(participant_id)
        .fetch_optional(pool)
        .await
    }

    pub fn parsed_rewards(&self) -> Option<RewardStructure> {
        self.rewards_earned
            .as_ref()
            .and_then(|json| serde_json::from_str(json).ok())
    }
}
