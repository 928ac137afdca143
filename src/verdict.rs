//! Verdict aggregation for judged submissions
//!
//! Reduces the raw per-test-case results returned by the external judge
//! into a single verdict plus aggregate metrics. This is pure code with
//! no I/O so the whole reduction is unit tested here.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::judge::{status_ids, JudgeCaseResult};

/// Error messages stored on a submission are capped at this many chars
pub const ERROR_MESSAGE_LIMIT: usize = 500;

/// Status of a submission attempt.
///
/// Transitions only `pending -> {accepted, wrong_answer, runtime_error}`,
/// never backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Accepted,
    WrongAnswer,
    RuntimeError,
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Accepted => "accepted",
            SubmissionStatus::WrongAnswer => "wrong_answer",
            SubmissionStatus::RuntimeError => "runtime_error",
        };
        write!(f, "{}", s)
    }
}

/// Aggregate of one batch of judge results
#[derive(Debug, Clone, Serialize)]
pub struct AggregateOutcome {
    pub status: SubmissionStatus,
    pub passed: usize,
    /// Sum of runtimes across passed cases, in seconds
    pub total_runtime: f64,
    /// Max memory across cases, in KB
    pub peak_memory_kb: u64,
    /// stderr of the first failing case, truncated
    pub first_error: Option<String>,
}

/// Reduce a batch of judge results to a single verdict.
///
/// A case with the accepted status id counts toward `passed` and the
/// runtime/memory aggregates. The first failing case decides the verdict
/// and its stderr is kept; later failures still lower the pass count but
/// never overwrite the recorded error.
pub fn aggregate(results: &[JudgeCaseResult]) -> AggregateOutcome {
    let mut passed = 0usize;
    let mut total_runtime = 0f64;
    let mut peak_memory_kb = 0u64;
    let mut status = SubmissionStatus::Accepted;
    let mut first_error: Option<String> = None;

    for result in results {
        if result.status_id == status_ids::ACCEPTED {
            passed += 1;
            total_runtime += parse_runtime(result.time.as_deref());
            peak_memory_kb = peak_memory_kb.max(result.memory.unwrap_or(0));
        } else if first_error.is_none() {
            status = if result.status_id == status_ids::RUNTIME_ERROR {
                SubmissionStatus::RuntimeError
            } else {
                SubmissionStatus::WrongAnswer
            };
            first_error = Some(truncate_error(result.stderr.as_deref()));
        }
    }

    AggregateOutcome {
        status,
        passed,
        total_runtime,
        peak_memory_kb,
        first_error,
    }
}

/// Parse a decimal runtime string from the judge.
///
/// A single malformed value must not abort the rest of the batch, so it
/// contributes 0 instead of an error.
fn parse_runtime(time: Option<&str>) -> f64 {
    time.and_then(|t| t.parse::<f64>().ok()).unwrap_or(0.0)
}

fn truncate_error(stderr: Option<&str>) -> String {
    match stderr {
        Some(s) if !s.is_empty() => s.chars().take(ERROR_MESSAGE_LIMIT).collect(),
        _ => "Unknown error".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_case(time: &str, memory: u64) -> JudgeCaseResult {
        JudgeCaseResult {
            token: "t".into(),
            status_id: status_ids::ACCEPTED,
            stdout: None,
            stderr: None,
            time: Some(time.into()),
            memory: Some(memory),
        }
    }

    fn fail_case(status_id: i32, stderr: &str) -> JudgeCaseResult {
        JudgeCaseResult {
            token: "t".into(),
            status_id,
            stdout: None,
            stderr: Some(stderr.into()),
            time: None,
            memory: None,
        }
    }

    #[test]
    fn all_passed_is_accepted() {
        let results = vec![ok_case("0.01", 900), ok_case("0.02", 1100), ok_case("0.03", 800)];
        let outcome = aggregate(&results);
        assert_eq!(outcome.status, SubmissionStatus::Accepted);
        assert_eq!(outcome.passed, 3);
        assert!((outcome.total_runtime - 0.06).abs() < 1e-9);
        assert_eq!(outcome.peak_memory_kb, 1100);
        assert!(outcome.first_error.is_none());
    }

    #[test]
    fn runtime_fault_sets_runtime_error() {
        let results = vec![
            ok_case("0.01", 900),
            fail_case(status_ids::RUNTIME_ERROR, "segfault"),
            ok_case("0.01", 900),
        ];
        let outcome = aggregate(&results);
        assert_eq!(outcome.status, SubmissionStatus::RuntimeError);
        assert_eq!(outcome.passed, 2);
        assert_eq!(outcome.first_error.as_deref(), Some("segfault"));
    }

    #[test]
    fn mismatch_sets_wrong_answer() {
        let results = vec![ok_case("0.01", 900), fail_case(5, "")];
        let outcome = aggregate(&results);
        assert_eq!(outcome.status, SubmissionStatus::WrongAnswer);
        assert_eq!(outcome.passed, 1);
    }

    #[test]
    fn first_error_wins() {
        let results = vec![
            ok_case("0.01", 900),
            fail_case(status_ids::RUNTIME_ERROR, "A"),
            fail_case(6, "B"),
        ];
        let outcome = aggregate(&results);
        assert_eq!(outcome.first_error.as_deref(), Some("A"));
        // the later failure still counts against the pass total
        assert_eq!(outcome.passed, 1);
        assert_eq!(outcome.status, SubmissionStatus::RuntimeError);
    }

    #[test]
    fn malformed_runtime_contributes_zero() {
        let mut bad = ok_case("not-a-number", 500);
        bad.memory = None;
        let results = vec![bad, ok_case("0.25", 700)];
        let outcome = aggregate(&results);
        assert_eq!(outcome.status, SubmissionStatus::Accepted);
        assert_eq!(outcome.passed, 2);
        assert!((outcome.total_runtime - 0.25).abs() < 1e-9);
        assert_eq!(outcome.peak_memory_kb, 700);
    }

    #[test]
    fn long_stderr_is_truncated() {
        let long = "x".repeat(2000);
        let results = vec![fail_case(5, &long)];
        let outcome = aggregate(&results);
        assert_eq!(
            outcome.first_error.as_ref().map(|e| e.chars().count()),
            Some(ERROR_MESSAGE_LIMIT)
        );
    }

    #[test]
    fn empty_batch_is_accepted_with_zero_passed() {
        let outcome = aggregate(&[]);
        assert_eq!(outcome.status, SubmissionStatus::Accepted);
        assert_eq!(outcome.passed, 0);
    }
}
