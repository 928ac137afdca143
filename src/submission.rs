//! Submission processing
//!
//! Wires the pipeline together: language lookup, problem fetch, pending
//! record creation, judge dispatch/collect, verdict aggregation, record
//! finalization, then the acceptance side effects (reward ledger and
//! contest bookkeeping).

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::contest::{self, ContestGuard};
use crate::error::ApiError;
use crate::judge::{BatchItem, Judge, JudgeCaseResult};
use crate::languages;
use crate::models::TestCase;
use crate::rewards::RewardLedger;
use crate::store::Store;
use crate::verdict::{aggregate, SubmissionStatus};

/// Response of the non-scoring trial path
#[derive(Debug, Serialize)]
pub struct TrialResponse {
    pub success: bool,
    pub test_cases: Vec<JudgeCaseResult>,
    pub runtime: f64,
    pub memory: u64,
}

/// Response of the scoring path
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub accepted: bool,
    pub total_test_cases: usize,
    pub passed_test_cases: usize,
    pub runtime: f64,
    pub memory: u64,
    pub reward_granted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub struct SubmissionService {
    store: Arc<dyn Store>,
    judge: Arc<dyn Judge>,
    rewards: RewardLedger,
    contests: ContestGuard,
}

impl SubmissionService {
    pub fn new(
        store: Arc<dyn Store>,
        judge: Arc<dyn Judge>,
        rewards: RewardLedger,
        contests: ContestGuard,
    ) -> Self {
        Self {
            store,
            judge,
            rewards,
            contests,
        }
    }

    /// Run code against a problem's visible test cases.
    ///
    /// No persistence and no reward side effects; the caller gets the
    /// per-case judge results back for display.
    pub async fn run_trial(
        &self,
        problem_id: &str,
        code: &str,
        language: &str,
    ) -> Result<TrialResponse, ApiError> {
        validate_input(code, language)?;

        let problem = self
            .store
            .fetch_problem(problem_id)
            .await
            .map_err(ApiError::Internal)?
            .ok_or_else(|| ApiError::ProblemNotFound(problem_id.to_string()))?;

        let batch = build_batch(&problem.visible_test_cases, code, language)?;
        let results = self.judge.run_batch(&batch).await?;
        let outcome = aggregate(&results);

        Ok(TrialResponse {
            success: outcome.status == SubmissionStatus::Accepted,
            test_cases: results,
            runtime: outcome.total_runtime,
            memory: outcome.peak_memory_kb,
        })
    }

    /// Judge code against a problem's hidden test cases and apply the
    /// acceptance side effects.
    ///
    /// The pending record is created before dispatch; if the judge fails
    /// mid-flight the record stays `pending` as an audit trail and the
    /// error propagates.
    pub async fn submit_for_scoring(
        &self,
        user_id: &str,
        problem_id: &str,
        code: &str,
        language: &str,
        contest_id: Option<&str>,
    ) -> Result<SubmitResponse, ApiError> {
        validate_input(code, language)?;

        let problem = self
            .store
            .fetch_problem(problem_id)
            .await
            .map_err(ApiError::Internal)?
            .ok_or_else(|| ApiError::ProblemNotFound(problem_id.to_string()))?;

        // Resolve the language before creating any state: input errors
        // must leave no record behind
        let batch = build_batch(&problem.hidden_test_cases, code, language)?;

        // Gate on the contest window before dispatch. A deleted contest
        // only disables the leaderboard bookkeeping; it never blocks the
        // submission itself.
        let contest_id = match contest_id {
            Some(cid) => match self
                .store
                .fetch_contest(cid)
                .await
                .map_err(ApiError::Internal)?
            {
                Some(c) if contest::is_open(&c, Utc::now()) => Some(cid),
                Some(_) => return Err(ApiError::ContestClosed),
                None => {
                    warn!("Contest {} not found; judging without leaderboard update", cid);
                    None
                }
            },
            None => None,
        };

        let submission_id = self
            .store
            .create_submission(user_id, problem_id, language, code, batch.len())
            .await
            .map_err(ApiError::Internal)?;

        let results = self.judge.run_batch(&batch).await?;
        let outcome = aggregate(&results);

        self.store
            .finalize_submission(submission_id, &outcome)
            .await
            .map_err(ApiError::Internal)?;

        info!(
            "Submission {} finalized: user={}, problem={}, status={}, passed={}/{}",
            submission_id,
            user_id,
            problem_id,
            outcome.status,
            outcome.passed,
            batch.len()
        );

        let mut reward_granted = false;
        if outcome.status == SubmissionStatus::Accepted {
            reward_granted = self
                .rewards
                .try_grant(user_id, problem_id)
                .await
                .map_err(ApiError::Internal)?;

            if let Some(cid) = contest_id {
                self.contests
                    .apply_scoring_side_effect(cid, user_id, problem_id)
                    .await;
            }
        }

        Ok(SubmitResponse {
            accepted: outcome.status == SubmissionStatus::Accepted,
            total_test_cases: batch.len(),
            passed_test_cases: outcome.passed,
            runtime: outcome.total_runtime,
            memory: outcome.peak_memory_kb,
            reward_granted,
            message: outcome.first_error,
        })
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn contests(&self) -> &ContestGuard {
        &self.contests
    }
}

fn validate_input(code: &str, language: &str) -> Result<(), ApiError> {
    if code.trim().is_empty() {
        return Err(ApiError::MissingField("code"));
    }
    if language.trim().is_empty() {
        return Err(ApiError::MissingField("language"));
    }
    Ok(())
}

/// Turn a problem's test cases into one judge batch item per case
fn build_batch(
    cases: &[TestCase],
    code: &str,
    language: &str,
) -> Result<Vec<BatchItem>, ApiError> {
    let lang = languages::get_language(language)
        .ok_or_else(|| ApiError::UnsupportedLanguage(language.to_string()))?;

    Ok(cases
        .iter()
        .map(|tc| BatchItem {
            source_code: code.to_string(),
            language_id: lang.judge_id,
            stdin: tc.input.clone(),
            expected_output: tc.expected_output.clone(),
        })
        .collect())
}
