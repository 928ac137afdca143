//! One-time reward disbursement for accepted submissions
//!
//! Two independent idempotent steps: insert into the user's solved set,
//! then claim the per-(user, problem) marker and pay out points. The
//! marker claim is the atomic check-then-set that keeps concurrent
//! accepted submissions from double-paying.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::store::Store;

pub struct RewardLedger {
    store: Arc<dyn Store>,
    points_per_solve: i64,
    marker_ttl_secs: Option<u64>,
}

impl RewardLedger {
    pub fn new(store: Arc<dyn Store>, points_per_solve: i64, marker_ttl_secs: Option<u64>) -> Self {
        Self {
            store,
            points_per_solve,
            marker_ttl_secs,
        }
    }

    /// Grant the one-time reward for (user, problem) if still claimable.
    ///
    /// Returns true only for the call that actually granted, so the
    /// caller can surface the celebratory signal exactly once.
    pub async fn try_grant(&self, user_id: &str, problem_id: &str) -> Result<bool> {
        // Solved-set insertion drives the profile display and is
        // independent of the point award
        if self.store.add_solved(user_id, problem_id).await? {
            info!("User {} solved problem {} for the first time", user_id, problem_id);
        }

        let claimed = self
            .store
            .claim_reward_marker(user_id, problem_id, self.marker_ttl_secs)
            .await?;
        if !claimed {
            return Ok(false);
        }

        let balance = self.store.add_points(user_id, self.points_per_solve).await?;
        info!(
            "Awarded {} points to user {} for problem {} (balance {})",
            self.points_per_solve, user_id, problem_id, balance
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn grants_once_per_problem() {
        let store = Arc::new(MemoryStore::new());
        let ledger = RewardLedger::new(store.clone(), 1, None);

        assert!(ledger.try_grant("u1", "p1").await.unwrap());
        assert!(!ledger.try_grant("u1", "p1").await.unwrap());
        assert_eq!(store.points("u1").await.unwrap(), 1);
        assert_eq!(store.solved_count("u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn distinct_problems_grant_separately() {
        let store = Arc::new(MemoryStore::new());
        let ledger = RewardLedger::new(store.clone(), 5, None);

        assert!(ledger.try_grant("u1", "p1").await.unwrap());
        assert!(ledger.try_grant("u1", "p2").await.unwrap());
        assert_eq!(store.points("u1").await.unwrap(), 10);
        assert_eq!(store.solved_count("u1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn concurrent_grants_pay_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(RewardLedger::new(store.clone(), 1, None));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.try_grant("u1", "p1").await.unwrap()
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 1);
        assert_eq!(store.points("u1").await.unwrap(), 1);
        assert_eq!(store.solved_count("u1").await.unwrap(), 1);
    }
}
