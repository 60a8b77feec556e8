use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, TS, EnumString, Display,
)]
#[sqlx(type_name = "challenge_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChallengeType {
    Consistency,
    Variety,
    Seasonal,
    GoalBased,
}

/// Completion rule, tagged by challenge type. Stored as JSON in the
/// `success_criteria` column; the `challenge_type` column is always derived
/// from this tag, so the two cannot disagree.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SuccessCriteria {
    /// Longest run of consecutive entry days must reach `consecutive_days`.
    Consistency { consecutive_days: u32 },
    /// Distinct fruits logged across all entries must reach `unique_fruits`.
    Variety { unique_fruits: u32 },
    /// Summed daily scores must reach `target_score`.
    GoalBased { target_score: i64 },
    /// Rules still owned by product; never evaluates as met.
    Seasonal {
        #[serde(default)]
        rules: serde_json::Value,
    },
}

impl SuccessCriteria {
    pub fn challenge_type(&self) -> ChallengeType {
        match self {
            SuccessCriteria::Consistency { .. } => ChallengeType::Consistency,
            SuccessCriteria::Variety { .. } => ChallengeType::Variety,
            SuccessCriteria::GoalBased { .. } => ChallengeType::GoalBased,
            SuccessCriteria::Seasonal { .. } => ChallengeType::Seasonal,
        }
    }
}

/// Gate applied at join time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct EntryRequirements {
    #[serde(default)]
    pub min_account_age_days: Option<i64>,
}

/// What a completed participant receives.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct RewardStructure {
    #[serde(default)]
    pub credits_cents: Option<i64>,
    #[serde(default)]
    pub badges: Vec<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct CommunityChallenge {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub challenge_type: ChallengeType,
    pub difficulty_level: i32,
    pub duration_days: i32,
    pub max_participants: Option<i32>,
    pub entry_requirements: Option<String>, // JSON-serialized EntryRequirements
    pub success_criteria: String,           // JSON-serialized SuccessCriteria
    pub reward_structure: String,           // JSON-serialized RewardStructure
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_public: bool,
    pub is_active: bool,
    pub featured_priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for seeding a challenge. `end_date` is derived from
/// `start_date + duration_days`; `challenge_type` from the criteria tag.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateChallenge {
    pub name: String,
    pub description: String,
    pub difficulty_level: i32,
    pub duration_days: i32,
    pub max_participants: Option<i32>,
    pub entry_requirements: Option<EntryRequirements>,
    pub success_criteria: SuccessCriteria,
    pub reward_structure: RewardStructure,
    pub start_date: DateTime<Utc>,
    pub is_public: Option<bool>,
    pub featured_priority: Option<i32>,
}

impl CommunityChallenge {
    pub async fn create(
        pool: &SqlitePool,
        data: &CreateChallenge,
        challenge_id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        let challenge_type = data.success_criteria.challenge_type();
        let criteria = serde_json::to_string(&data.success_criteria)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let rewards = serde_json::to_string(&data.reward_structure)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let requirements = match &data.entry_requirements {
            Some(reqs) => {
                Some(serde_json::to_string(reqs).map_err(|e| sqlx::Error::Encode(Box::new(e)))?)
            }
            None => None,
        };
        let end_date = data.start_date + Duration::days(data.duration_days as i64);

        sqlx::query_as::<_, CommunityChallenge>(
            r#"INSERT INTO challenges
                   (id, name, description, challenge_type, difficulty_level, duration_days,
                    max_participants, entry_requirements, success_criteria, reward_structure,
                    start_date, end_date, is_public, featured_priority)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
               RETURNING *"#,
        )
        .bind(challenge_id)
        .bind(&data.name)
        .bind(&data.description)
        .bind(challenge_type)
        .bind(data.difficulty_level)
        .bind(data.duration_days)
        .bind(data.max_participants)
        .bind(requirements)
        .bind(criteria)
        .bind(rewards)
        .bind(data.start_date)
        .bind(end_date)
        .bind(data.is_public.unwrap_or(true))
        .bind(data.featured_priority.unwrap_or(0))
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, CommunityChallenge>("SELECT * FROM challenges WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Challenges the app lists for browsing: active, public, featured first.
    pub async fn find_active_public(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, CommunityChallenge>(
            r#"SELECT * FROM challenges
               WHERE is_active = 1 AND is_public = 1
               ORDER BY featured_priority DESC, start_date ASC"#,
        )
        .fetch_all(pool)
        .await
    }

    pub fn parsed_criteria(&self) -> Result<SuccessCriteria, serde_json::Error> {
        serde_json::from_str(&self.success_criteria)
    }

    pub fn parsed_requirements(&self) -> Option<EntryRequirements> {
        self.entry_requirements
            .as_ref()
            .and_then(|json| serde_json::from_str(json).ok())
    }

    pub fn parsed_rewards(&self) -> Result<RewardStructure, serde_json::Error> {
        serde_json::from_str(&self.reward_structure)
    }

    /// Calendar days until `end_date`, rounded up, clamped at zero.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        let secs = (self.end_date - now).num_seconds();
        if secs <= 0 { 0 } else { (secs + 86_399) / 86_400 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criteria_tag_matches_challenge_type() {
        let cases = [
            (
                r#"{"type":"consistency","consecutive_days":7}"#,
                ChallengeType::Consistency,
            ),
            (
                r#"{"type":"variety","unique_fruits":5}"#,
                ChallengeType::Variety,
            ),
            (
                r#"{"type":"goal_based","target_score":300}"#,
                ChallengeType::GoalBased,
            ),
            (r#"{"type":"seasonal"}"#, ChallengeType::Seasonal),
        ];
        for (json, expected) in cases {
            let criteria: SuccessCriteria = serde_json::from_str(json).unwrap();
            assert_eq!(criteria.challenge_type(), expected);
        }
    }

    #[test]
    fn reward_structure_tolerates_missing_fields() {
        let rewards: RewardStructure = serde_json::from_str("{}").unwrap();
        assert_eq!(rewards.credits_cents, None);
        assert!(rewards.badges.is_empty());

        let rewards: RewardStructure =
            serde_json::from_str(r#"{"credits_cents":500,"badges":["streak-master"]}"#).unwrap();
        assert_eq!(rewards.credits_cents, Some(500));
        assert_eq!(rewards.badges, vec!["streak-master".to_string()]);
    }

    fn challenge_ending_at(end_date: DateTime<Utc>) -> CommunityChallenge {
        CommunityChallenge {
            id: Uuid::new_v4(),
            name: "Rainbow Week".to_string(),
            description: "Eat across the spectrum".to_string(),
            challenge_type: ChallengeType::Variety,
            difficulty_level: 2,
            duration_days: 7,
            max_participants: None,
            entry_requirements: None,
            success_criteria: r#"{"type":"variety","unique_fruits":5}"#.to_string(),
            reward_structure: "{}".to_string(),
            start_date: end_date - Duration::days(7),
            end_date,
            is_public: true,
            is_active: true,
            featured_priority: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn days_remaining_rounds_up_and_clamps_at_zero() {
        let now = Utc::now();

        let ended = challenge_ending_at(now - Duration::days(2));
        assert_eq!(ended.days_remaining(now), 0);

        let half_day_left = challenge_ending_at(now + Duration::hours(12));
        assert_eq!(half_day_left.days_remaining(now), 1);

        let week_left = challenge_ending_at(now + Duration::days(7));
        assert_eq!(week_left.days_remaining(now), 7);
    }
}
