//! crates/eduquest_core/src/ledger.rs
//!
//! Applies quiz completions to the durable reward ledger.
//!
//! The quiz result row is the durability point. The reward credit runs after
//! it and is never allowed to undo it: a failed credit is reported as its own
//! partial-success error so the caller can tell the two failure modes apart.

use crate::domain::{NewQuizResult, Profile, QuizResult};
use crate::ports::{PortError, ProfileStore};
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Nothing was persisted.
    #[error("Failed to record quiz completion: {0}")]
    CompletionRecord(#[source] PortError),

    /// The quiz result is stored but the profile counters were not credited.
    #[error("Quiz result {} was recorded but the coin credit failed: {source}", .result.id)]
    CoinCredit {
        result: QuizResult,
        #[source]
        source: PortError,
    },
}

impl LedgerError {
    pub fn is_partial(&self) -> bool {
        matches!(self, LedgerError::CoinCredit { .. })
    }
}

/// The outcome of a fully applied completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerReceipt {
    pub result: QuizResult,
    /// The profile row as stored after the credit.
    pub profile: Profile,
    pub coins_credited: i64,
    pub badges_credited: i64,
}

/// Records `completion` and credits its rewards to the student's profile.
pub async fn apply_quiz_completion(
    store: &dyn ProfileStore,
    completion: NewQuizResult,
) -> Result<LedgerReceipt, LedgerError> {
    let coins = i64::from(completion.coins_earned);
    let badges = completion.badges_earned();
    let profile_id = completion.student_profile_id;

    let result = store.insert_quiz_result(completion).await.map_err(|e| {
        error!(%profile_id, error = %e, "Quiz result could not be recorded");
        LedgerError::CompletionRecord(e)
    })?;

    let profile = match store.credit_rewards(profile_id, coins, badges).await {
        Ok(profile) => profile,
        Err(source) => {
            error!(
                %profile_id,
                result_id = %result.id,
                coins,
                error = %source,
                "Quiz result recorded but reward credit failed"
            );
            return Err(LedgerError::CoinCredit { result, source });
        }
    };

    info!(
        %profile_id,
        quiz = %result.quiz_ref,
        coins,
        balance = profile.coins,
        "Quiz completion applied"
    );
    Ok(LedgerReceipt {
        result,
        profile,
        coins_credited: coins,
        badges_credited: badges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;
    use crate::memory::MemoryBackend;
    use crate::ports::ProfileStore;
    use std::sync::Arc;

    async fn student_with(store: &MemoryBackend, coins: i64) -> Profile {
        let profile = store.seed_profile(Role::Student).await;
        store
            .credit_rewards(profile.id, coins, 0)
            .await
            .expect("seed credit")
    }

    fn completion(profile: &Profile) -> NewQuizResult {
        NewQuizResult {
            student_profile_id: profile.id,
            quiz_ref: "math-6".to_string(),
            score: 80,
            total_points: 100,
            coins_earned: 15,
            badge: "gold".to_string(),
        }
    }

    #[tokio::test]
    async fn concurrent_completions_do_not_lose_updates() {
        let store = Arc::new(MemoryBackend::new());
        let profile = student_with(&store, 50).await;

        let (first, second) = tokio::join!(
            apply_quiz_completion(store.as_ref(), completion(&profile)),
            apply_quiz_completion(store.as_ref(), completion(&profile)),
        );
        first.expect("first completion");
        second.expect("second completion");

        let stored = store
            .find_profile(profile.user_id, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.coins, 80);
        assert_eq!(stored.badges, 2);
        assert_eq!(store.list_quiz_results(profile.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_credit_keeps_the_result_and_reports_partial_success() {
        let store = MemoryBackend::new();
        let profile = student_with(&store, 50).await;
        store.fail_next_credit();

        let err = apply_quiz_completion(&store, completion(&profile))
            .await
            .unwrap_err();
        assert!(err.is_partial());

        let results = store.list_quiz_results(profile.id).await.unwrap();
        assert_eq!(results.len(), 1);
        match err {
            LedgerError::CoinCredit { result, .. } => assert_eq!(result.id, results[0].id),
            other => panic!("unexpected error: {other}"),
        }
        let stored = store.find_profile(profile.user_id, None).await.unwrap().unwrap();
        assert_eq!(stored.coins, 50);
    }

    #[tokio::test]
    async fn failed_record_persists_nothing() {
        let store = MemoryBackend::new();
        let profile = student_with(&store, 50).await;
        store.fail_next_result_insert();

        let err = apply_quiz_completion(&store, completion(&profile))
            .await
            .unwrap_err();
        assert!(!err.is_partial());
        assert!(store.list_quiz_results(profile.id).await.unwrap().is_empty());
        let stored = store.find_profile(profile.user_id, None).await.unwrap().unwrap();
        assert_eq!(stored.coins, 50);
    }

    #[tokio::test]
    async fn blank_badge_credits_coins_only() {
        let store = MemoryBackend::new();
        let profile = student_with(&store, 0).await;
        let mut plain = completion(&profile);
        plain.badge = String::new();

        let receipt = apply_quiz_completion(&store, plain).await.unwrap();
        assert_eq!(receipt.coins_credited, 15);
        assert_eq!(receipt.badges_credited, 0);
        assert_eq!(receipt.profile.coins, 15);
        assert_eq!(receipt.profile.badges, 0);
    }
}
