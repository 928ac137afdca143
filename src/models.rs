//! Stored entities shared across the gateway

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::verdict::SubmissionStatus;

/// A single test case of a problem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
    /// Shown to users alongside visible test cases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// A problem as stored in the document store.
///
/// Nothing in the submission flow ever mutates a problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    pub difficulty: String,
    pub tag: String,
    pub visible_test_cases: Vec<TestCase>,
    pub hidden_test_cases: Vec<TestCase>,
}

/// One judging attempt, created `pending` before dispatch and finalized
/// exactly once after all test case results are in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionAttempt {
    pub id: i64,
    pub user_id: String,
    pub problem_id: String,
    pub language: String,
    pub source_code: String,
    pub status: SubmissionStatus,
    /// Fixed at creation to the hidden test case count
    pub test_cases_total: usize,
    pub test_cases_passed: usize,
    /// Sum of runtimes across passed cases, in seconds
    pub runtime_seconds: f64,
    /// Max memory across cases, in KB
    pub peak_memory_kb: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Contest schedule and problem set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contest {
    pub id: String,
    pub contest_date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub problems: Vec<String>,
}

/// One solved-problem entry on a contest leaderboard row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolvedQuestion {
    pub question_number: String,
    pub solved_at: DateTime<Utc>,
}

/// A participant's leaderboard row.
///
/// `total_solved` is always `solved_questions.len()`; the store keeps the
/// two consistent by deriving the count from the entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContestParticipant {
    pub user_id: String,
    pub username: String,
    pub solved_questions: Vec<SolvedQuestion>,
    pub total_solved: usize,
}
