//! Redis-backed document store
//!
//! All gateway state lives in Redis: problems and submission attempts as
//! JSON values, the per-user solved set as a SET, point balances as
//! counters, reward markers as `SET NX` keys, rate limit registers as
//! expiring keys, and contest rows as hashes. The atomic check-then-act
//! pieces (reward marker, contest solve) map to Redis primitives that are
//! atomic per key: `SET NX` and `HSETNX`.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{info, warn};

use crate::models::{Contest, ContestParticipant, Problem, SolvedQuestion, SubmissionAttempt};
use crate::store::{ContestSolve, Store};
use crate::verdict::{AggregateOutcome, SubmissionStatus};

/// Redis key constants
pub mod keys {
    /// Problem documents (JSON), keyed by problem id
    pub const PROBLEM_PREFIX: &str = "problem:";

    /// Submission attempt documents (JSON), keyed by numeric id
    pub const SUBMISSION_PREFIX: &str = "submission:";

    /// Counter backing submission id allocation
    pub const SUBMISSION_COUNTER: &str = "submission:next_id";

    /// Per-(user, problem) list of submission ids
    pub const SUBMISSION_INDEX_PREFIX: &str = "submissions:";

    /// Per-user solved problem set
    pub const SOLVED_PREFIX: &str = "solved:";

    /// Per-user point balance
    pub const POINTS_PREFIX: &str = "points:";

    /// One-time reward markers, keyed by (user, problem)
    pub const REWARD_PREFIX: &str = "reward:";

    /// Rate limit registers, keyed by client address
    pub const RATE_LIMIT_PREFIX: &str = "rate_limit:";

    /// Contest documents (JSON), keyed by contest id
    pub const CONTEST_PREFIX: &str = "contest:";
}

fn problem_key(problem_id: &str) -> String {
    format!("{}{}", keys::PROBLEM_PREFIX, problem_id)
}

fn submission_key(submission_id: i64) -> String {
    format!("{}{}", keys::SUBMISSION_PREFIX, submission_id)
}

fn submission_index_key(user_id: &str, problem_id: &str) -> String {
    format!("{}{}:{}", keys::SUBMISSION_INDEX_PREFIX, user_id, problem_id)
}

fn solved_key(user_id: &str) -> String {
    format!("{}{}", keys::SOLVED_PREFIX, user_id)
}

fn points_key(user_id: &str) -> String {
    format!("{}{}", keys::POINTS_PREFIX, user_id)
}

fn reward_key(user_id: &str, problem_id: &str) -> String {
    format!("{}{}:{}", keys::REWARD_PREFIX, user_id, problem_id)
}

fn rate_limit_key(client_key: &str) -> String {
    format!("{}{}", keys::RATE_LIMIT_PREFIX, client_key)
}

fn contest_key(contest_id: &str) -> String {
    format!("{}{}", keys::CONTEST_PREFIX, contest_id)
}

/// Hash of user id -> username for one contest
fn participants_key(contest_id: &str) -> String {
    format!("{}{}:participants", keys::CONTEST_PREFIX, contest_id)
}

/// Hash of problem id -> solved-at timestamp for one participant
fn contest_solved_key(contest_id: &str, user_id: &str) -> String {
    format!("{}{}:solved:{}", keys::CONTEST_PREFIX, contest_id, user_id)
}

/// Redis store used in production
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis, retrying until the server is reachable
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = loop {
            match client.get_connection_manager().await {
                Ok(conn) => break conn,
                Err(e) => {
                    warn!("Failed to connect to Redis: {}. Retrying in 3 seconds...", e);
                    tokio::time::sleep(Duration::from_secs(3)).await;
                }
            }
        };

        info!("Connected to Redis at {}", redis_url);
        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn fetch_problem(&self, problem_id: &str) -> Result<Option<Problem>> {
        let mut conn = self.conn();
        let raw: Option<String> = conn.get(problem_key(problem_id)).await?;
        raw.map(|json| serde_json::from_str(&json).context("Malformed problem document"))
            .transpose()
    }

    async fn put_problem(&self, problem: &Problem) -> Result<()> {
        let mut conn = self.conn();
        let json = serde_json::to_string(problem)?;
        conn.set::<_, _, ()>(problem_key(&problem.id), json).await?;
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
        let mut conn = self.conn();
        let id: i64 = conn.incr(keys::SUBMISSION_COUNTER, 1i64).await?;

        let attempt = SubmissionAttempt {
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
        };

        let json = serde_json::to_string(&attempt)?;
        conn.set::<_, _, ()>(submission_key(id), json).await?;
        conn.rpush::<_, _, ()>(submission_index_key(user_id, problem_id), id)
            .await?;
        Ok(id)
    }

    async fn finalize_submission(
        &self,
        submission_id: i64,
        outcome: &AggregateOutcome,
    ) -> Result<()> {
        let mut conn = self.conn();
        let key = submission_key(submission_id);
        let raw: Option<String> = conn.get(&key).await?;
        let mut attempt: SubmissionAttempt = raw
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .context("Malformed submission document")?
            .ok_or_else(|| anyhow::anyhow!("Unknown submission {}", submission_id))?;

        attempt.status = outcome.status;
        attempt.test_cases_passed = outcome.passed;
        attempt.runtime_seconds = outcome.total_runtime;
        attempt.peak_memory_kb = outcome.peak_memory_kb;
        attempt.error_message = outcome.first_error.clone();

        // Single write; concurrent finalize is last-writer-wins
        let json = serde_json::to_string(&attempt)?;
        conn.set::<_, _, ()>(&key, json).await?;
        Ok(())
    }

    async fn fetch_submissions(
        &self,
        user_id: &str,
        problem_id: &str,
    ) -> Result<Vec<SubmissionAttempt>> {
        let mut conn = self.conn();
        let ids: Vec<i64> = conn
            .lrange(submission_index_key(user_id, problem_id), 0, -1)
            .await?;

        let mut attempts = Vec::with_capacity(ids.len());
        for id in ids {
            let raw: Option<String> = conn.get(submission_key(id)).await?;
            if let Some(json) = raw {
                attempts.push(serde_json::from_str(&json).context("Malformed submission document")?);
            }
        }
        Ok(attempts)
    }

    async fn add_solved(&self, user_id: &str, problem_id: &str) -> Result<bool> {
        let mut conn = self.conn();
        let added: i64 = conn.sadd(solved_key(user_id), problem_id).await?;
        Ok(added == 1)
    }

    async fn claim_reward_marker(
        &self,
        user_id: &str,
        problem_id: &str,
        ttl_secs: Option<u64>,
    ) -> Result<bool> {
        let mut conn = self.conn();
        let key = reward_key(user_id, problem_id);

        // SET NX is the atomic check-then-set: only the first concurrent
        // claim for a (user, problem) pair observes a reply.
        let mut cmd = redis::cmd("SET");
        cmd.arg(&key).arg("1").arg("NX");
        if let Some(ttl) = ttl_secs {
            cmd.arg("EX").arg(ttl as usize);
        }
        let claimed: Option<String> = cmd.query_async(&mut conn).await?;
        Ok(claimed.is_some())
    }

    async fn add_points(&self, user_id: &str, amount: i64) -> Result<i64> {
        let mut conn = self.conn();
        let balance: i64 = conn.incr(points_key(user_id), amount).await?;
        Ok(balance)
    }

    async fn rate_limit_last(&self, key: &str) -> Result<Option<u64>> {
        let mut conn = self.conn();
        let last: Option<u64> = conn.get(rate_limit_key(key)).await?;
        Ok(last)
    }

    async fn rate_limit_touch(&self, key: &str, now: u64, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn();
        // TTL = window, so stale registers clean themselves up
        conn.set_ex::<_, _, ()>(rate_limit_key(key), now, ttl_secs)
            .await?;
        Ok(())
    }

    async fn fetch_contest(&self, contest_id: &str) -> Result<Option<Contest>> {
        let mut conn = self.conn();
        let raw: Option<String> = conn.get(contest_key(contest_id)).await?;
        raw.map(|json| serde_json::from_str(&json).context("Malformed contest document"))
            .transpose()
    }

    async fn put_contest(&self, contest: &Contest) -> Result<()> {
        let mut conn = self.conn();
        let json = serde_json::to_string(contest)?;
        conn.set::<_, _, ()>(contest_key(&contest.id), json).await?;
        Ok(())
    }

    async fn register_participant(
        &self,
        contest_id: &str,
        user_id: &str,
        username: &str,
    ) -> Result<bool> {
        let mut conn = self.conn();
        let added: bool = conn
            .hset_nx(participants_key(contest_id), user_id, username)
            .await?;
        Ok(added)
    }

    async fn is_registered(&self, contest_id: &str, user_id: &str) -> Result<bool> {
        let mut conn = self.conn();
        let exists: bool = conn.hexists(participants_key(contest_id), user_id).await?;
        Ok(exists)
    }

    async fn record_contest_solve(
        &self,
        contest_id: &str,
        user_id: &str,
        problem_id: &str,
        solved_at: DateTime<Utc>,
    ) -> Result<ContestSolve> {
        let mut conn = self.conn();

        let contest_exists: bool = conn.exists(contest_key(contest_id)).await?;
        if !contest_exists {
            return Ok(ContestSolve::NotRegistered);
        }
        let registered: bool = conn.hexists(participants_key(contest_id), user_id).await?;
        if !registered {
            return Ok(ContestSolve::NotRegistered);
        }

        // HSETNX is atomic per field: concurrent accepted submissions for
        // the same problem record exactly one entry. The solved total is
        // derived from the hash length, so it can never drift from the
        // entries.
        let recorded: bool = conn
            .hset_nx(
                contest_solved_key(contest_id, user_id),
                problem_id,
                solved_at.to_rfc3339(),
            )
            .await?;

        Ok(if recorded {
            ContestSolve::Recorded
        } else {
            ContestSolve::AlreadySolved
        })
    }

    async fn leaderboard(&self, contest_id: &str) -> Result<Vec<ContestParticipant>> {
        let mut conn = self.conn();
        let participants: std::collections::HashMap<String, String> =
            conn.hgetall(participants_key(contest_id)).await?;

        let mut rows = Vec::with_capacity(participants.len());
        for (user_id, username) in participants {
            let solves: std::collections::HashMap<String, String> = conn
                .hgetall(contest_solved_key(contest_id, &user_id))
                .await?;

            let mut solved_questions = Vec::with_capacity(solves.len());
            for (problem_id, at) in solves {
                let solved_at = DateTime::parse_from_rfc3339(&at)
                    .with_context(|| format!("Malformed solved-at timestamp: {}", at))?
                    .with_timezone(&Utc);
                solved_questions.push(SolvedQuestion {
                    question_number: problem_id,
                    solved_at,
                });
            }
            solved_questions.sort_by_key(|q| q.solved_at);

            rows.push(ContestParticipant {
                user_id,
                username,
                total_solved: solved_questions.len(),
                solved_questions,
            });
        }

        crate::store::sort_leaderboard(&mut rows);
        Ok(rows)
    }

    async fn points(&self, user_id: &str) -> Result<i64> {
        let mut conn = self.conn();
        let balance: Option<i64> = conn.get(points_key(user_id)).await?;
        Ok(balance.unwrap_or(0))
    }

    async fn solved_count(&self, user_id: &str) -> Result<usize> {
        let mut conn = self.conn();
        let count: usize = conn.scard(solved_key(user_id)).await?;
        Ok(count)
    }
}
