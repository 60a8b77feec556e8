use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use db::{
    is_unique_violation,
    models::{
        challenge::{
            CommunityChallenge, CreateChallenge, EntryRequirements, RewardStructure,
            SuccessCriteria,
        },
        participant::{ChallengeParticipant, ParticipantStatus},
        progress::{ChallengeProgress, ProgressData},
        side_effect::{SideEffect, SideEffectPayload},
        user::UserAccount,
    },
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use ts_rs::TS;
use uuid::Uuid;

use super::{ledger::CreditLedger, side_effects::SideEffectService};

#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("user not found")]
    Unauthenticated,
    #[error("challenge not found")]
    ChallengeNotFound,
    #[error("challenge is not open for joining")]
    ChallengeUnavailable,
    #[error("already participating in this challenge")]
    AlreadyParticipating,
    #[error("challenge has reached its participant limit")]
    ChallengeFull,
    #[error("entry requirements not met: {0}")]
    RequirementsNotMet(String),
    #[error("not participating in this challenge")]
    NotParticipating,
    #[error("participation is no longer active")]
    InactiveParticipation,
    #[error("progress already recorded for today")]
    DuplicateProgressToday,
    #[error("invalid challenge definition: {0}")]
    InvalidChallenge(String),
    #[error("malformed challenge payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}

/// Request body for logging one day of progress.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct AddProgress {
    pub progress_data: ProgressData,
    pub daily_score: i64,
    pub notes: Option<String>,
}

/// Result of a progress submission, including whether it tipped the
/// participant over the completion line.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ProgressOutcome {
    pub progress: ChallengeProgress,
    pub completed: bool,
    pub rewards: Option<RewardStructure>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ChallengeStats {
    pub total_participants: i64,
    pub active_participants: i64,
    pub completed_participants: i64,
    pub average_score: f64,
    pub completion_rate: f64,
    pub days_remaining: i64,
    pub user_rank: Option<i64>,
    pub user_score: Option<i64>,
}

pub struct ChallengeService;

impl ChallengeService {
    /// Seed a new challenge after validating its definition: difficulty runs
    /// 1 to 5 and the duration is at least one day.
    pub async fn create_challenge(
        pool: &SqlitePool,
        data: &CreateChallenge,
    ) -> Result<CommunityChallenge, ChallengeError> {
        if !(1..=5).contains(&data.difficulty_level) {
            return Err(ChallengeError::InvalidChallenge(format!(
                "difficulty level must be between 1 and 5, got {}",
                data.difficulty_level
            )));
        }
        if data.duration_days < 1 {
            return Err(ChallengeError::InvalidChallenge(format!(
                "duration must be at least one day, got {}",
                data.duration_days
            )));
        }

        let challenge = CommunityChallenge::create(pool, data, Uuid::new_v4()).await?;
        info!(
            challenge_id = %challenge.id,
            challenge_type = %challenge.challenge_type,
            "Challenge created"
        );
        Ok(challenge)
    }

    /// Enroll `user_id` in a challenge. Checks run in a fixed order so the
    /// caller always gets the most specific refusal: existence, availability,
    /// prior membership, capacity, then entry requirements.
    pub async fn join_challenge(
        pool: &SqlitePool,
        user_id: Uuid,
        challenge_id: Uuid,
        is_visible: bool,
    ) -> Result<ChallengeParticipant, ChallengeError> {
        let user = UserAccount::find_by_id(pool, user_id)
            .await?
            .ok_or(ChallengeError::Unauthenticated)?;

        let challenge = CommunityChallenge::find_by_id(pool, challenge_id)
            .await?
            .ok_or(ChallengeError::ChallengeNotFound)?;

        if !challenge.is_active || !challenge.is_public {
            return Err(ChallengeError::ChallengeUnavailable);
        }

        if ChallengeParticipant::find_by_challenge_and_user(pool, challenge.id, user.id)
            .await?
            .is_some()
        {
            return Err(ChallengeError::AlreadyParticipating);
        }

        if let Some(max) = challenge.max_participants {
            let enrolled = ChallengeParticipant::count_by_challenge(pool, challenge.id).await?;
            if enrolled >= max as i64 {
                return Err(ChallengeError::ChallengeFull);
            }
        }

        if let Some(requirements) = challenge.parsed_requirements() {
            Self::check_entry_requirements(&user, &requirements)?;
        }

        let participant =
            match ChallengeParticipant::create(pool, Uuid::new_v4(), challenge.id, user.id, is_visible)
                .await
            {
                Ok(participant) => participant,
                // A concurrent join slipped past the read above; the unique
                // (challenge_id, user_id) constraint is the authority.
                Err(e) if is_unique_violation(&e) => {
                    return Err(ChallengeError::AlreadyParticipating);
                }
                Err(e) => return Err(e.into()),
            };

        info!(
            challenge_id = %challenge.id,
            user_id = %user.id,
            participant_id = %participant.id,
            "User joined challenge"
        );
        Ok(participant)
    }

    fn check_entry_requirements(
        user: &UserAccount,
        requirements: &EntryRequirements,
    ) -> Result<(), ChallengeError> {
        if let Some(min_age) = requirements.min_account_age_days {
            let age = user.account_age_days(Utc::now());
            if age < min_age {
                return Err(ChallengeError::RequirementsNotMet(format!(
                    "account must be at least {min_age} days old (currently {age})"
                )));
            }
        }
        Ok(())
    }

    /// Record one day of progress for `user_id` and re-evaluate the success
    /// criteria over the full history. At most one entry lands per calendar
    /// day; the cumulative score is previous cumulative plus today's daily
    /// score.
    pub async fn add_progress(
        pool: &SqlitePool,
        ledger: &Arc<dyn CreditLedger>,
        user_id: Uuid,
        challenge_id: Uuid,
        entry: &AddProgress,
    ) -> Result<ProgressOutcome, ChallengeError> {
        let participant =
            ChallengeParticipant::find_by_challenge_and_user(pool, challenge_id, user_id)
                .await?
                .ok_or(ChallengeError::NotParticipating)?;

        if participant.status != ParticipantStatus::Active {
            return Err(ChallengeError::InactiveParticipation);
        }

        let today = Utc::now().date_naive();
        if ChallengeProgress::exists_for_date(pool, participant.id, today).await? {
            return Err(ChallengeError::DuplicateProgressToday);
        }

        let previous_cumulative = ChallengeProgress::latest_for_participant(pool, participant.id)
            .await?
            .map(|p| p.cumulative_score)
            .unwrap_or(0);
        let cumulative = previous_cumulative + entry.daily_score;

        let mut tx = pool.begin().await?;
        let progress = match ChallengeProgress::create(
            &mut *tx,
            Uuid::new_v4(),
            participant.id,
            today,
            &entry.progress_data,
            entry.daily_score,
            cumulative,
            entry.notes.as_deref(),
            false,
        )
        .await
        {
            Ok(progress) => progress,
            // Two same-day submissions raced; the unique (participant_id,
            // entry_date) constraint is the authority.
            Err(e) if is_unique_violation(&e) => {
                return Err(ChallengeError::DuplicateProgressToday);
            }
            Err(e) => return Err(e.into()),
        };
        ChallengeParticipant::update_score(&mut *tx, participant.id, cumulative).await?;
        tx.commit().await?;

        info!(
            participant_id = %participant.id,
            daily_score = entry.daily_score,
            cumulative_score = cumulative,
            "Progress recorded"
        );

        let challenge = CommunityChallenge::find_by_id(pool, challenge_id)
            .await?
            .ok_or(ChallengeError::ChallengeNotFound)?;
        let criteria = challenge.parsed_criteria()?;
        let history = ChallengeProgress::history_for_participant(pool, participant.id).await?;

        if Self::evaluate_success_criteria(&criteria, &history) {
            let rewards = Self::complete_participation(pool, ledger, &challenge, &participant).await?;
            return Ok(ProgressOutcome {
                progress,
                completed: true,
                rewards: Some(rewards),
            });
        }

        Ok(ProgressOutcome {
            progress,
            completed: false,
            rewards: None,
        })
    }

    /// Whether `history` satisfies `criteria`. Pure over the rows it is
    /// given; callers pass the participant's full history, oldest first.
    pub fn evaluate_success_criteria(
        criteria: &SuccessCriteria,
        history: &[ChallengeProgress],
    ) -> bool {
        match criteria {
            SuccessCriteria::Consistency { consecutive_days } => {
                let dates: Vec<NaiveDate> = history.iter().map(|p| p.entry_date).collect();
                Self::longest_daily_streak(&dates) >= *consecutive_days as i64
            }
            SuccessCriteria::Variety { unique_fruits } => {
                let distinct: HashSet<String> = history
                    .iter()
                    .flat_map(|p| p.parsed_data().fruits)
                    .collect();
                distinct.len() >= *unique_fruits as usize
            }
            SuccessCriteria::GoalBased { target_score } => {
                let total: i64 = history.iter().map(|p| p.daily_score).sum();
                total >= *target_score
            }
            // Seasonal rules are still product-owned; nothing completes yet.
            SuccessCriteria::Seasonal { .. } => false,
        }
    }

    /// Longest run of consecutive calendar days in `dates`. A gap of exactly
    /// one day extends the run; anything larger restarts it at one.
    pub fn longest_daily_streak(dates: &[NaiveDate]) -> i64 {
        if dates.is_empty() {
            return 0;
        }
        let mut sorted = dates.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut longest = 1;
        let mut current = 1;
        for pair in sorted.windows(2) {
            if (pair[1] - pair[0]).num_days() == 1 {
                current += 1;
                longest = longest.max(current);
            } else {
                current = 1;
            }
        }
        longest
    }

    /// Flip the participation to completed and queue its rewards. Completion
    /// is single-shot: losing the guarded update means someone else already
    /// completed this row, and they own the reward queueing.
    async fn complete_participation(
        pool: &SqlitePool,
        ledger: &Arc<dyn CreditLedger>,
        challenge: &CommunityChallenge,
        participant: &ChallengeParticipant,
    ) -> Result<RewardStructure, ChallengeError> {
        let rewards = challenge.parsed_rewards()?;

        let mut tx = pool.begin().await?;
        let Some(completed) =
            ChallengeParticipant::complete(&mut *tx, participant.id, &rewards).await?
        else {
            return Ok(rewards);
        };

        if let Some(credits) = rewards.credits_cents {
            if credits > 0 {
                SideEffect::enqueue(
                    &mut *tx,
                    Uuid::new_v4(),
                    &SideEffectPayload::WalletCredit {
                        user_id: participant.user_id,
                        amount_cents: credits,
                        reason: "challenge_reward".to_string(),
                        reference_id: Some(challenge.id),
                    },
                )
                .await?;
            }
        }
        for badge in &rewards.badges {
            SideEffect::enqueue(
                &mut *tx,
                Uuid::new_v4(),
                &SideEffectPayload::GrantBadge {
                    user_id: participant.user_id,
                    challenge_id: challenge.id,
                    badge: badge.clone(),
                },
            )
            .await?;
        }
        tx.commit().await?;

        info!(
            participant_id = %completed.id,
            challenge_id = %challenge.id,
            final_score = completed.final_score,
            "Challenge completed"
        );

        // Rewards are best-effort: the completion stands even if crediting
        // fails here, and the retry worker picks up the rest.
        SideEffectService::drain_now(pool, ledger).await;

        Ok(rewards)
    }

    pub async fn withdraw(
        pool: &SqlitePool,
        user_id: Uuid,
        challenge_id: Uuid,
    ) -> Result<ChallengeParticipant, ChallengeError> {
        let participant =
            ChallengeParticipant::find_by_challenge_and_user(pool, challenge_id, user_id)
                .await?
                .ok_or(ChallengeError::NotParticipating)?;

        let withdrawn = ChallengeParticipant::withdraw(pool, participant.id)
            .await?
            .ok_or(ChallengeError::InactiveParticipation)?;

        info!(participant_id = %withdrawn.id, challenge_id = %challenge_id, "Participant withdrew");
        Ok(withdrawn)
    }

    /// Aggregate view of one challenge. Averages run over every participant
    /// whatever their status; rank is the requester's 1-based position in the
    /// store-ordered leaderboard, when they are on it.
    pub async fn challenge_stats(
        pool: &SqlitePool,
        challenge_id: Uuid,
        requester: Option<Uuid>,
    ) -> Result<ChallengeStats, ChallengeError> {
        let challenge = CommunityChallenge::find_by_id(pool, challenge_id)
            .await?
            .ok_or(ChallengeError::ChallengeNotFound)?;

        let participants = ChallengeParticipant::find_by_challenge_ordered(pool, challenge.id).await?;

        let total = participants.len() as i64;
        let active = participants
            .iter()
            .filter(|p| p.status == ParticipantStatus::Active)
            .count() as i64;
        let completed = participants
            .iter()
            .filter(|p| p.status == ParticipantStatus::Completed)
            .count() as i64;

        let average_score = if total == 0 {
            0.0
        } else {
            participants.iter().map(|p| p.final_score).sum::<i64>() as f64 / total as f64
        };
        let completion_rate = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };

        let (user_rank, user_score) = requester
            .and_then(|user_id| {
                participants
                    .iter()
                    .position(|p| p.user_id == user_id)
                    .map(|idx| (Some(idx as i64 + 1), Some(participants[idx].final_score)))
            })
            .unwrap_or((None, None));

        Ok(ChallengeStats {
            total_participants: total,
            active_participants: active,
            completed_participants: completed,
            average_score,
            completion_rate,
            days_remaining: challenge.days_remaining(Utc::now()),
            user_rank,
            user_score,
        })
    }
}
