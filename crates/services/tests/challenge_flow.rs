mod common;

use chrono::{Duration, Utc};
use common::{seed_user, test_pool, wallet_ledger};
use db::models::{
    achievement::Achievement,
    challenge::{
        CommunityChallenge, CreateChallenge, EntryRequirements, RewardStructure, SuccessCriteria,
    },
    participant::{ChallengeParticipant, ParticipantStatus},
    progress::{ChallengeProgress, ProgressData},
    wallet::WalletAccount,
};
use services::services::challenges::{AddProgress, ChallengeError, ChallengeService};
use sqlx::SqlitePool;
use uuid::Uuid;

async fn seed_challenge(
    pool: &SqlitePool,
    criteria: SuccessCriteria,
    rewards: RewardStructure,
    max_participants: Option<i32>,
    entry_requirements: Option<EntryRequirements>,
) -> CommunityChallenge {
    let data = CreateChallenge {
        name: "Fruit Week".to_string(),
        description: "Seven days of fruit".to_string(),
        difficulty_level: 1,
        duration_days: 7,
        max_participants,
        entry_requirements,
        success_criteria: criteria,
        reward_structure: rewards,
        start_date: Utc::now(),
        is_public: None,
        featured_priority: None,
    };
    CommunityChallenge::create(pool, &data, Uuid::new_v4())
        .await
        .expect("seed challenge")
}

fn fruits(names: &[&str]) -> ProgressData {
    ProgressData {
        fruits: names.iter().map(|n| n.to_string()).collect(),
        extra: serde_json::Map::new(),
    }
}

fn entry(daily_score: i64, fruit_names: &[&str]) -> AddProgress {
    AddProgress {
        progress_data: fruits(fruit_names),
        daily_score,
        notes: None,
    }
}

fn challenge_request(difficulty_level: i32, duration_days: i32) -> CreateChallenge {
    CreateChallenge {
        name: "Fruit Week".to_string(),
        description: "Seven days of fruit".to_string(),
        difficulty_level,
        duration_days,
        max_participants: None,
        entry_requirements: None,
        success_criteria: SuccessCriteria::GoalBased { target_score: 100 },
        reward_structure: RewardStructure::default(),
        start_date: Utc::now(),
        is_public: None,
        featured_priority: None,
    }
}

/// Insert a progress row for a past day, bypassing the one-entry-per-today
/// rule the service enforces.
async fn seed_past_progress(
    pool: &SqlitePool,
    participant_id: Uuid,
    days_ago: i64,
    daily_score: i64,
    cumulative_score: i64,
    fruit_names: &[&str],
) {
    let date = Utc::now().date_naive() - Duration::days(days_ago);
    ChallengeProgress::create(
        pool,
        Uuid::new_v4(),
        participant_id,
        date,
        &fruits(fruit_names),
        daily_score,
        cumulative_score,
        None,
        false,
    )
    .await
    .expect("seed past progress");
}

#[tokio::test]
async fn seeding_rejects_out_of_range_definitions() {
    let pool = test_pool().await;

    for (difficulty, duration) in [(0, 7), (6, 7), (3, 0), (3, -1)] {
        let err =
            ChallengeService::create_challenge(&pool, &challenge_request(difficulty, duration))
                .await
                .unwrap_err();
        assert!(matches!(err, ChallengeError::InvalidChallenge(_)));
    }

    // The boundaries themselves are fine.
    let challenge = ChallengeService::create_challenge(&pool, &challenge_request(5, 1))
        .await
        .unwrap();
    assert_eq!(challenge.difficulty_level, 5);
    assert_eq!(challenge.duration_days, 1);
}

#[tokio::test]
async fn joining_a_missing_challenge_is_not_found() {
    let pool = test_pool().await;
    let user = seed_user(&pool, "ana").await;

    let err = ChallengeService::join_challenge(&pool, user.id, Uuid::new_v4(), true)
        .await
        .unwrap_err();
    assert!(matches!(err, ChallengeError::ChallengeNotFound));
}

#[tokio::test]
async fn inactive_and_private_challenges_cannot_be_joined() {
    let pool = test_pool().await;
    let user = seed_user(&pool, "bo").await;

    let paused = seed_challenge(
        &pool,
        SuccessCriteria::GoalBased { target_score: 100 },
        RewardStructure::default(),
        None,
        None,
    )
    .await;
    sqlx::query("UPDATE challenges SET is_active = 0 WHERE id = $1")
        .bind(paused.id)
        .execute(&pool)
        .await
        .unwrap();

    let hidden = seed_challenge(
        &pool,
        SuccessCriteria::GoalBased { target_score: 100 },
        RewardStructure::default(),
        None,
        None,
    )
    .await;
    sqlx::query("UPDATE challenges SET is_public = 0 WHERE id = $1")
        .bind(hidden.id)
        .execute(&pool)
        .await
        .unwrap();

    for challenge_id in [paused.id, hidden.id] {
        let err = ChallengeService::join_challenge(&pool, user.id, challenge_id, true)
            .await
            .unwrap_err();
        assert!(matches!(err, ChallengeError::ChallengeUnavailable));
    }

    // Neither shows up in the browse list.
    let listed = CommunityChallenge::find_active_public(&pool).await.unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn joining_twice_is_rejected() {
    let pool = test_pool().await;
    let user = seed_user(&pool, "cara").await;
    let challenge = seed_challenge(
        &pool,
        SuccessCriteria::GoalBased { target_score: 100 },
        RewardStructure::default(),
        None,
        None,
    )
    .await;

    ChallengeService::join_challenge(&pool, user.id, challenge.id, true)
        .await
        .unwrap();
    let err = ChallengeService::join_challenge(&pool, user.id, challenge.id, true)
        .await
        .unwrap_err();
    assert!(matches!(err, ChallengeError::AlreadyParticipating));
}

#[tokio::test]
async fn capacity_counts_every_enrollment_withdrawn_included() {
    let pool = test_pool().await;
    let first = seed_user(&pool, "dee").await;
    let second = seed_user(&pool, "eli").await;
    let challenge = seed_challenge(
        &pool,
        SuccessCriteria::GoalBased { target_score: 100 },
        RewardStructure::default(),
        Some(1),
        None,
    )
    .await;

    ChallengeService::join_challenge(&pool, first.id, challenge.id, true)
        .await
        .unwrap();
    let err = ChallengeService::join_challenge(&pool, second.id, challenge.id, true)
        .await
        .unwrap_err();
    assert!(matches!(err, ChallengeError::ChallengeFull));

    // Withdrawing does not free the slot.
    ChallengeService::withdraw(&pool, first.id, challenge.id)
        .await
        .unwrap();
    let err = ChallengeService::join_challenge(&pool, second.id, challenge.id, true)
        .await
        .unwrap_err();
    assert!(matches!(err, ChallengeError::ChallengeFull));
}

#[tokio::test]
async fn entry_requirements_gate_young_accounts() {
    let pool = test_pool().await;
    let user = seed_user(&pool, "fay").await;
    let challenge = seed_challenge(
        &pool,
        SuccessCriteria::GoalBased { target_score: 100 },
        RewardStructure::default(),
        None,
        Some(EntryRequirements {
            min_account_age_days: Some(30),
        }),
    )
    .await;

    let err = ChallengeService::join_challenge(&pool, user.id, challenge.id, true)
        .await
        .unwrap_err();
    assert!(matches!(err, ChallengeError::RequirementsNotMet(_)));

    sqlx::query("UPDATE users SET created_at = datetime('now', '-40 days') WHERE id = $1")
        .bind(user.id)
        .execute(&pool)
        .await
        .unwrap();

    ChallengeService::join_challenge(&pool, user.id, challenge.id, true)
        .await
        .unwrap();
}

#[tokio::test]
async fn second_entry_on_the_same_day_is_rejected() {
    let pool = test_pool().await;
    let ledger = wallet_ledger(&pool);
    let user = seed_user(&pool, "gus").await;
    let challenge = seed_challenge(
        &pool,
        SuccessCriteria::GoalBased { target_score: 1000 },
        RewardStructure::default(),
        None,
        None,
    )
    .await;
    let participant = ChallengeService::join_challenge(&pool, user.id, challenge.id, true)
        .await
        .unwrap();

    ChallengeService::add_progress(&pool, &ledger, user.id, challenge.id, &entry(10, &["apple"]))
        .await
        .unwrap();
    let err =
        ChallengeService::add_progress(&pool, &ledger, user.id, challenge.id, &entry(7, &["kiwi"]))
            .await
            .unwrap_err();
    assert!(matches!(err, ChallengeError::DuplicateProgressToday));

    // The rejected entry left no trace on the score.
    let participant = ChallengeParticipant::find_by_challenge_and_user(
        &pool,
        challenge.id,
        participant.user_id,
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(participant.final_score, 10);
    let history = ChallengeProgress::history_for_participant(&pool, participant.id)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn cumulative_score_carries_across_days() {
    let pool = test_pool().await;
    let ledger = wallet_ledger(&pool);
    let user = seed_user(&pool, "hana").await;
    let challenge = seed_challenge(
        &pool,
        SuccessCriteria::GoalBased { target_score: 1000 },
        RewardStructure::default(),
        None,
        None,
    )
    .await;
    let participant = ChallengeService::join_challenge(&pool, user.id, challenge.id, true)
        .await
        .unwrap();

    seed_past_progress(&pool, participant.id, 1, 10, 10, &["apple"]).await;

    let outcome =
        ChallengeService::add_progress(&pool, &ledger, user.id, challenge.id, &entry(5, &["pear"]))
            .await
            .unwrap();
    assert_eq!(outcome.progress.daily_score, 5);
    assert_eq!(outcome.progress.cumulative_score, 15);
    assert!(!outcome.completed);

    let participant =
        ChallengeParticipant::find_by_challenge_and_user(&pool, challenge.id, user.id)
            .await
            .unwrap()
            .unwrap();
    assert_eq!(participant.final_score, 15);
}

#[tokio::test]
async fn goal_challenge_completion_pays_credits_and_badges() {
    let pool = test_pool().await;
    let ledger = wallet_ledger(&pool);
    let user = seed_user(&pool, "ida").await;
    let challenge = seed_challenge(
        &pool,
        SuccessCriteria::GoalBased { target_score: 100 },
        RewardStructure {
            credits_cents: Some(250),
            badges: vec!["goal-getter".to_string()],
        },
        None,
        None,
    )
    .await;
    let participant = ChallengeService::join_challenge(&pool, user.id, challenge.id, true)
        .await
        .unwrap();

    seed_past_progress(&pool, participant.id, 1, 60, 60, &[]).await;

    let outcome =
        ChallengeService::add_progress(&pool, &ledger, user.id, challenge.id, &entry(50, &[]))
            .await
            .unwrap();
    assert!(outcome.completed);
    let rewards = outcome.rewards.expect("completion carries the reward snapshot");
    assert_eq!(rewards.credits_cents, Some(250));

    let completed =
        ChallengeParticipant::find_by_challenge_and_user(&pool, challenge.id, user.id)
            .await
            .unwrap()
            .unwrap();
    assert_eq!(completed.status, ParticipantStatus::Completed);
    assert!(completed.completion_date.is_some());
    assert_eq!(
        completed.parsed_rewards().unwrap().badges,
        vec!["goal-getter".to_string()]
    );

    assert_eq!(WalletAccount::balance(&pool, user.id).await.unwrap(), 250);
    let badges = Achievement::find_by_user(&pool, user.id).await.unwrap();
    assert_eq!(badges.len(), 1);
    assert_eq!(badges[0].badge, "goal-getter");

    // A completed participation takes no further entries.
    let err =
        ChallengeService::add_progress(&pool, &ledger, user.id, challenge.id, &entry(10, &[]))
            .await
            .unwrap_err();
    assert!(matches!(err, ChallengeError::InactiveParticipation));
}

#[tokio::test]
async fn consistency_challenge_completes_on_an_unbroken_run() {
    let pool = test_pool().await;
    let ledger = wallet_ledger(&pool);
    let user = seed_user(&pool, "jon").await;
    let challenge = seed_challenge(
        &pool,
        SuccessCriteria::Consistency {
            consecutive_days: 3,
        },
        RewardStructure::default(),
        None,
        None,
    )
    .await;
    let participant = ChallengeService::join_challenge(&pool, user.id, challenge.id, true)
        .await
        .unwrap();

    seed_past_progress(&pool, participant.id, 2, 10, 10, &["apple"]).await;
    seed_past_progress(&pool, participant.id, 1, 10, 20, &["apple"]).await;

    let outcome =
        ChallengeService::add_progress(&pool, &ledger, user.id, challenge.id, &entry(10, &["apple"]))
            .await
            .unwrap();
    assert!(outcome.completed);
}

#[tokio::test]
async fn consistency_challenge_ignores_a_broken_run() {
    let pool = test_pool().await;
    let ledger = wallet_ledger(&pool);
    let user = seed_user(&pool, "kai").await;
    let challenge = seed_challenge(
        &pool,
        SuccessCriteria::Consistency {
            consecutive_days: 3,
        },
        RewardStructure::default(),
        None,
        None,
    )
    .await;
    let participant = ChallengeService::join_challenge(&pool, user.id, challenge.id, true)
        .await
        .unwrap();

    // Two-day run, then a gap before today.
    seed_past_progress(&pool, participant.id, 4, 10, 10, &["apple"]).await;
    seed_past_progress(&pool, participant.id, 3, 10, 20, &["apple"]).await;

    let outcome =
        ChallengeService::add_progress(&pool, &ledger, user.id, challenge.id, &entry(10, &["apple"]))
            .await
            .unwrap();
    assert!(!outcome.completed);

    let participant =
        ChallengeParticipant::find_by_challenge_and_user(&pool, challenge.id, user.id)
            .await
            .unwrap()
            .unwrap();
    assert_eq!(participant.status, ParticipantStatus::Active);
}

#[tokio::test]
async fn variety_challenge_counts_distinct_fruits_across_days() {
    let pool = test_pool().await;
    let ledger = wallet_ledger(&pool);
    let user = seed_user(&pool, "lena").await;
    let challenge = seed_challenge(
        &pool,
        SuccessCriteria::Variety { unique_fruits: 3 },
        RewardStructure::default(),
        None,
        None,
    )
    .await;
    let participant = ChallengeService::join_challenge(&pool, user.id, challenge.id, true)
        .await
        .unwrap();

    seed_past_progress(&pool, participant.id, 1, 10, 10, &["apple", "banana"]).await;

    // Only "cherry" is new; the repeat of "banana" counts once.
    let outcome = ChallengeService::add_progress(
        &pool,
        &ledger,
        user.id,
        challenge.id,
        &entry(10, &["banana", "cherry"]),
    )
    .await
    .unwrap();
    assert!(outcome.completed);
}

#[tokio::test]
async fn seasonal_challenges_never_complete() {
    let pool = test_pool().await;
    let ledger = wallet_ledger(&pool);
    let user = seed_user(&pool, "mia").await;
    let challenge = seed_challenge(
        &pool,
        SuccessCriteria::Seasonal {
            rules: serde_json::json!({"season": "summer"}),
        },
        RewardStructure {
            credits_cents: Some(9999),
            badges: vec![],
        },
        None,
        None,
    )
    .await;
    ChallengeService::join_challenge(&pool, user.id, challenge.id, true)
        .await
        .unwrap();

    let outcome = ChallengeService::add_progress(
        &pool,
        &ledger,
        user.id,
        challenge.id,
        &entry(1_000_000, &["mango"]),
    )
    .await
    .unwrap();
    assert!(!outcome.completed);
    assert_eq!(WalletAccount::balance(&pool, user.id).await.unwrap(), 0);
}

#[tokio::test]
async fn progress_requires_an_active_membership() {
    let pool = test_pool().await;
    let ledger = wallet_ledger(&pool);
    let user = seed_user(&pool, "nils").await;
    let challenge = seed_challenge(
        &pool,
        SuccessCriteria::GoalBased { target_score: 100 },
        RewardStructure::default(),
        None,
        None,
    )
    .await;

    let err =
        ChallengeService::add_progress(&pool, &ledger, user.id, challenge.id, &entry(10, &[]))
            .await
            .unwrap_err();
    assert!(matches!(err, ChallengeError::NotParticipating));

    ChallengeService::join_challenge(&pool, user.id, challenge.id, true)
        .await
        .unwrap();
    ChallengeService::withdraw(&pool, user.id, challenge.id)
        .await
        .unwrap();

    let err =
        ChallengeService::add_progress(&pool, &ledger, user.id, challenge.id, &entry(10, &[]))
            .await
            .unwrap_err();
    assert!(matches!(err, ChallengeError::InactiveParticipation));
}

#[tokio::test]
async fn stats_for_an_empty_challenge_are_all_zeros() {
    let pool = test_pool().await;
    let challenge = seed_challenge(
        &pool,
        SuccessCriteria::GoalBased { target_score: 100 },
        RewardStructure::default(),
        None,
        None,
    )
    .await;

    let stats = ChallengeService::challenge_stats(&pool, challenge.id, None)
        .await
        .unwrap();
    assert_eq!(stats.total_participants, 0);
    assert_eq!(stats.active_participants, 0);
    assert_eq!(stats.completed_participants, 0);
    assert_eq!(stats.average_score, 0.0);
    assert_eq!(stats.completion_rate, 0.0);
    assert_eq!(stats.days_remaining, 7);
    assert_eq!(stats.user_rank, None);
    assert_eq!(stats.user_score, None);
}

#[tokio::test]
async fn stats_rank_follows_the_score_ordering() {
    let pool = test_pool().await;
    let ledger = wallet_ledger(&pool);
    let top = seed_user(&pool, "olga").await;
    let middle = seed_user(&pool, "pete").await;
    let idle = seed_user(&pool, "quin").await;
    let challenge = seed_challenge(
        &pool,
        SuccessCriteria::GoalBased { target_score: 100 },
        RewardStructure::default(),
        None,
        None,
    )
    .await;

    for user in [&top, &middle, &idle] {
        ChallengeService::join_challenge(&pool, user.id, challenge.id, true)
            .await
            .unwrap();
    }
    let outcome =
        ChallengeService::add_progress(&pool, &ledger, top.id, challenge.id, &entry(120, &[]))
            .await
            .unwrap();
    assert!(outcome.completed);
    ChallengeService::add_progress(&pool, &ledger, middle.id, challenge.id, &entry(30, &[]))
        .await
        .unwrap();

    let stats = ChallengeService::challenge_stats(&pool, challenge.id, Some(middle.id))
        .await
        .unwrap();
    assert_eq!(stats.total_participants, 3);
    assert_eq!(stats.active_participants, 2);
    assert_eq!(stats.completed_participants, 1);
    assert!((stats.average_score - 50.0).abs() < 1e-9);
    assert!((stats.completion_rate - 100.0 / 3.0).abs() < 1e-9);
    assert_eq!(stats.user_rank, Some(2));
    assert_eq!(stats.user_score, Some(30));

    let anonymous = ChallengeService::challenge_stats(&pool, challenge.id, None)
        .await
        .unwrap();
    assert_eq!(anonymous.user_rank, None);
    assert_eq!(anonymous.user_score, None);
}
