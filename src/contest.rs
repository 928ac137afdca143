//! Contest time-window guard and leaderboard bookkeeping

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::models::{Contest, ContestParticipant};
use crate::store::{ContestSolve, Store};

/// Whether a contest accepts scoring submissions at `now`.
///
/// The window is the configured start..end on the contest date; the end
/// time is exclusive.
pub fn is_open(contest: &Contest, now: DateTime<Utc>) -> bool {
    let date = now.date_naive();
    let time = now.time();
    date == contest.contest_date && contest.start <= time && time < contest.end
}

pub struct ContestGuard {
    store: Arc<dyn Store>,
}

impl ContestGuard {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Record an accepted contest solve on the participant's row.
    ///
    /// Bookkeeping failures never surface to the submitter: the judging
    /// verdict already computed is authoritative, so a missing contest,
    /// an unregistered user, or a store error is logged and swallowed.
    pub async fn apply_scoring_side_effect(
        &self,
        contest_id: &str,
        user_id: &str,
        problem_id: &str,
    ) {
        match self
            .store
            .record_contest_solve(contest_id, user_id, problem_id, Utc::now())
            .await
        {
            Ok(ContestSolve::Recorded) => {
                info!(
                    "Recorded contest solve: contest={}, user={}, problem={}",
                    contest_id, user_id, problem_id
                );
            }
            Ok(ContestSolve::AlreadySolved) => {
                debug!(
                    "Contest solve already recorded: contest={}, user={}, problem={}",
                    contest_id, user_id, problem_id
                );
            }
            Ok(ContestSolve::NotRegistered) => {
                warn!(
                    "Skipping contest update: contest={} missing or user={} not registered",
                    contest_id, user_id
                );
            }
            Err(e) => {
                warn!(
                    "Failed to update contest {} leaderboard for user {}: {:#}",
                    contest_id, user_id, e
                );
            }
        }
    }

    pub async fn register(
        &self,
        contest_id: &str,
        user_id: &str,
        username: &str,
    ) -> Result<bool> {
        self.store
            .register_participant(contest_id, user_id, username)
            .await
    }

    pub async fn is_registered(&self, contest_id: &str, user_id: &str) -> Result<bool> {
        self.store.is_registered(contest_id, user_id).await
    }

    pub async fn leaderboard(&self, contest_id: &str) -> Result<Vec<ContestParticipant>> {
        self.store.leaderboard(contest_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{NaiveDate, NaiveTime, TimeZone};

    fn contest() -> Contest {
        Contest {
            id: "c1".into(),
            contest_date: NaiveDate::from_ymd_opt(2026, 8, 30).unwrap(),
            start: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            problems: vec!["p1".into(), "p2".into()],
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 30, h, m, 0).unwrap()
    }

    #[test]
    fn open_inside_window() {
        assert!(is_open(&contest(), at(15, 0)));
        assert!(is_open(&contest(), at(14, 0)));
    }

    #[test]
    fn closed_outside_window() {
        assert!(!is_open(&contest(), at(13, 59)));
        assert!(!is_open(&contest(), at(16, 0)));
        assert!(!is_open(
            &contest(),
            Utc.with_ymd_and_hms(2026, 8, 31, 15, 0, 0).unwrap()
        ));
    }

    #[tokio::test]
    async fn duplicate_solve_counts_once() {
        let store = Arc::new(MemoryStore::new());
        store.put_contest(&contest()).await.unwrap();
        store.register_participant("c1", "u1", "alice").await.unwrap();

        let guard = ContestGuard::new(store.clone());
        guard.apply_scoring_side_effect("c1", "u1", "p1").await;
        guard.apply_scoring_side_effect("c1", "u1", "p1").await;

        let rows = guard.leaderboard("c1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_solved, 1);
        assert_eq!(rows[0].solved_questions.len(), 1);
        assert_eq!(rows[0].solved_questions[0].question_number, "p1");
    }

    #[tokio::test]
    async fn unregistered_user_is_skipped_without_error() {
        let store = Arc::new(MemoryStore::new());
        store.put_contest(&contest()).await.unwrap();

        let guard = ContestGuard::new(store.clone());
        guard.apply_scoring_side_effect("c1", "ghost", "p1").await;

        let rows = guard.leaderboard("c1").await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn leaderboard_sorted_by_total_solved() {
        let store = Arc::new(MemoryStore::new());
        store.put_contest(&contest()).await.unwrap();
        store.register_participant("c1", "u1", "alice").await.unwrap();
        store.register_participant("c1", "u2", "bob").await.unwrap();

        let guard = ContestGuard::new(store.clone());
        guard.apply_scoring_side_effect("c1", "u2", "p1").await;
        guard.apply_scoring_side_effect("c1", "u2", "p2").await;
        guard.apply_scoring_side_effect("c1", "u1", "p1").await;

        let rows = guard.leaderboard("c1").await.unwrap();
        assert_eq!(rows[0].username, "bob");
        assert_eq!(rows[0].total_solved, 2);
        assert_eq!(rows[1].username, "alice");
        assert_eq!(rows[1].total_solved, 1);
    }
}
