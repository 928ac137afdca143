//! Document store abstraction
//!
//! Everything the gateway persists lives behind this trait: problems,
//! submission attempts, the per-user solved set and point balance, the
//! one-time reward markers, rate limit registers, and contest rows. The
//! production implementation is Redis (see `redis_store`); tests use the
//! in-memory implementation below.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Contest, ContestParticipant, Problem, SolvedQuestion, SubmissionAttempt};
use crate::verdict::{AggregateOutcome, SubmissionStatus};

/// Outcome of recording a contest solve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContestSolve {
    /// First accepted solve of this problem by this participant
    Recorded,
    /// The participant already has an entry for this problem
    AlreadySolved,
    /// Contest missing or the user never registered
    NotRegistered,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn fetch_problem(&self, problem_id: &str) -> Result<Option<Problem>>;
    async fn put_problem(&self, problem: &Problem) -> Result<()>;

    /// Create a pending submission attempt and return its id.
    ///
    /// Called strictly before judge dispatch so a crash mid-flight leaves
    /// an auditable pending record.
    async fn create_submission(
        &self,
        user_id: &str,
        problem_id: &str,
        language: &str,
        source_code: &str,
        test_cases_total: usize,
    ) -> Result<i64>;

    /// Write the terminal status and metrics in a single update.
    /// Concurrent calls for the same id are last-writer-wins.
    async fn finalize_submission(&self, submission_id: i64, outcome: &AggregateOutcome)
        -> Result<()>;

    async fn fetch_submissions(
        &self,
        user_id: &str,
        problem_id: &str,
    ) -> Result<Vec<SubmissionAttempt>>;

    /// Insert into the user's solved set; true if newly inserted
    async fn add_solved(&self, user_id: &str, problem_id: &str) -> Result<bool>;

    /// Atomically claim the one-time reward marker for (user, problem);
    /// true only for the claim that created it
    async fn claim_reward_marker(
        &self,
        user_id: &str,
        problem_id: &str,
        ttl_secs: Option<u64>,
    ) -> Result<bool>;

    async fn add_points(&self, user_id: &str, amount: i64) -> Result<i64>;

    async fn rate_limit_last(&self, key: &str) -> Result<Option<u64>>;
    async fn rate_limit_touch(&self, key: &str, now: u64, ttl_secs: u64) -> Result<()>;

    async fn fetch_contest(&self, contest_id: &str) -> Result<Option<Contest>>;
    async fn put_contest(&self, contest: &Contest) -> Result<()>;

    /// Add a participant row; false if the user was already registered
    async fn register_participant(
        &self,
        contest_id: &str,
        user_id: &str,
        username: &str,
    ) -> Result<bool>;

    async fn is_registered(&self, contest_id: &str, user_id: &str) -> Result<bool>;

    /// Idempotently record an accepted contest solve. The insert must be
    /// atomic per (contest, user, problem) under concurrent submissions.
    async fn record_contest_solve(
        &self,
        contest_id: &str,
        user_id: &str,
        problem_id: &str,
        solved_at: DateTime<Utc>,
    ) -> Result<ContestSolve>;

    /// Participant rows sorted by total solved, descending
    async fn leaderboard(&self, contest_id: &str) -> Result<Vec<ContestParticipant>>;

    async fn points(&self, user_id: &str) -> Result<i64>;
    async fn solved_count(&self, user_id: &str) -> Result<usize>;
}

/// Order leaderboard rows: most solved first, ties broken by whoever
/// reached their total earlier, then by username so equal rows still
/// rank the same on every call.
pub fn sort_leaderboard(rows: &mut [ContestParticipant]) {
    rows.sort_by(|a, b| {
        let a_last = a.solved_questions.last().map(|q| q.solved_at);
        let b_last = b.solved_questions.last().map(|q| q.solved_at);
        b.total_solved
            .cmp(&a.total_solved)
            .then_with(|| a_last.cmp(&b_last))
            .then_with(|| a.username.cmp(&b.username))
    });
}

#[derive(Default)]
struct MemoryInner {
    problems: HashMap<String, Problem>,
    submissions: HashMap<i64, SubmissionAttempt>,
    next_submission_id: i64,
    solved: HashMap<String, HashSet<String>>,
    reward_markers: HashSet<(String, String)>,
    points: HashMap<String, i64>,
    rate_limits: HashMap<String, u64>,
    contests: HashMap<String, Contest>,
    /// (contest, user) -> username
    participants: HashMap<(String, String), String>,
    /// (contest, user) -> problem -> solved_at
    contest_solves: HashMap<(String, String), HashMap<String, DateTime<Utc>>>,
}

/// In-memory store used by tests
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn fetch_problem(&self, problem_id: &str) -> Result<Option<Problem>> {
        Ok(self.inner.lock().unwrap().problems.get(problem_id).cloned())
    }

    async fn put_problem(&self, problem: &Problem) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .problems
            .insert(problem.id.clone(), problem.clone());
        Ok(())
    }

    async fn create_submission(
        &self,
        user_id: &str,
        problem_id: &str,
        language: &str,
        source_code: &str,
        test_cases_total: usize,
    ) -> Result<i64> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_submission_id += 1;
        let id = inner.next_submission_id;
        inner.submissions.insert(
            id,
            SubmissionAttempt {
                id,
                user_id: user_id.to_string(),
                problem_id: problem_id.to_string(),
                language: language.to_string(),
                source_code: source_code.to_string(),
                status: SubmissionStatus::Pending,
                test_cases_total,
                test_cases_passed: 0,
                runtime_seconds: 0.0,
                peak_memory_kb: 0,
                error_message: None,
            },
        );
        Ok(id)
    }

    async fn finalize_submission(
        &self,
        submission_id: i64,
        outcome: &AggregateOutcome,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let attempt = inner
            .submissions
            .get_mut(&submission_id)
            .ok_or_else(|| anyhow::anyhow!("Unknown submission {}", submission_id))?;
        attempt.status = outcome.status;
        attempt.test_cases_passed = outcome.passed;
        attempt.runtime_seconds = outcome.total_runtime;
        attempt.peak_memory_kb = outcome.peak_memory_kb;
        attempt.error_message = outcome.first_error.clone();
        Ok(())
    }

    async fn fetch_submissions(
        &self,
        user_id: &str,
        problem_id: &str,
    ) -> Result<Vec<SubmissionAttempt>> {
        let inner = self.inner.lock().unwrap();
        let mut attempts: Vec<_> = inner
            .submissions
            .values()
            .filter(|s| s.user_id == user_id && s.problem_id == problem_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|s| s.id);
        Ok(attempts)
    }

    async fn add_solved(&self, user_id: &str, problem_id: &str) -> Result<bool> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .solved
            .entry(user_id.to_string())
            .or_default()
            .insert(problem_id.to_string()))
    }

    async fn claim_reward_marker(
        &self,
        user_id: &str,
        problem_id: &str,
        _ttl_secs: Option<u64>,
    ) -> Result<bool> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .reward_markers
            .insert((user_id.to_string(), problem_id.to_string())))
    }

    async fn add_points(&self, user_id: &str, amount: i64) -> Result<i64> {
        let mut inner = self.inner.lock().unwrap();
        let balance = inner.points.entry(user_id.to_string()).or_insert(0);
        *balance += amount;
        Ok(*balance)
    }

    async fn rate_limit_last(&self, key: &str) -> Result<Option<u64>> {
        Ok(self.inner.lock().unwrap().rate_limits.get(key).copied())
    }

    async fn rate_limit_touch(&self, key: &str, now: u64, _ttl_secs: u64) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .rate_limits
            .insert(key.to_string(), now);
        Ok(())
    }

    async fn fetch_contest(&self, contest_id: &str) -> Result<Option<Contest>> {
        Ok(self.inner.lock().unwrap().contests.get(contest_id).cloned())
    }

    async fn put_contest(&self, contest: &Contest) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .contests
            .insert(contest.id.clone(), contest.clone());
        Ok(())
    }

    async fn register_participant(
        &self,
        contest_id: &str,
        user_id: &str,
        username: &str,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let key = (contest_id.to_string(), user_id.to_string());
        if inner.participants.contains_key(&key) {
            return Ok(false);
        }
        inner.participants.insert(key, username.to_string());
        Ok(true)
    }

    async fn is_registered(&self, contest_id: &str, user_id: &str) -> Result<bool> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .participants
            .contains_key(&(contest_id.to_string(), user_id.to_string())))
    }

    async fn record_contest_solve(
        &self,
        contest_id: &str,
        user_id: &str,
        problem_id: &str,
        solved_at: DateTime<Utc>,
    ) -> Result<ContestSolve> {
        let mut inner = self.inner.lock().unwrap();
        let key = (contest_id.to_string(), user_id.to_string());
        if !inner.contests.contains_key(contest_id) || !inner.participants.contains_key(&key) {
            return Ok(ContestSolve::NotRegistered);
        }
        let solves = inner.contest_solves.entry(key).or_default();
        if solves.contains_key(problem_id) {
            return Ok(ContestSolve::AlreadySolved);
        }
        solves.insert(problem_id.to_string(), solved_at);
        Ok(ContestSolve::Recorded)
    }

    async fn leaderboard(&self, contest_id: &str) -> Result<Vec<ContestParticipant>> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<ContestParticipant> = inner
            .participants
            .iter()
            .filter(|((cid, _), _)| cid == contest_id)
            .map(|((cid, uid), username)| {
                let mut solved_questions: Vec<SolvedQuestion> = inner
                    .contest_solves
                    .get(&(cid.clone(), uid.clone()))
                    .map(|solves| {
                        solves
                            .iter()
                            .map(|(problem, at)| SolvedQuestion {
                                question_number: problem.clone(),
                                solved_at: *at,
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                solved_questions.sort_by_key(|q| q.solved_at);
                ContestParticipant {
                    user_id: uid.clone(),
                    username: username.clone(),
                    total_solved: solved_questions.len(),
                    solved_questions,
                }
            })
            .collect();
        sort_leaderboard(&mut rows);
        Ok(rows)
    }

    async fn points(&self, user_id: &str) -> Result<i64> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .points
            .get(user_id)
            .copied()
            .unwrap_or(0))
    }

    async fn solved_count(&self, user_id: &str) -> Result<usize> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .solved
            .get(user_id)
            .map(|s| s.len())
            .unwrap_or(0))
    }
}
