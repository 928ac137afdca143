//! Client for the external batch code-execution judge
//!
//! Submissions go out as one batch item per test case. The judge answers
//! with one opaque token per item; results are then polled by token until
//! every case reaches a terminal status.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::config::JudgeConfig;

/// Seam over the external judge.
///
/// The submission pipeline depends on this trait rather than the HTTP
/// client directly, so tests can drive it with a scripted judge.
#[async_trait]
pub trait Judge: Send + Sync {
    /// Dispatch a batch and block until all results are in
    async fn run_batch(&self, items: &[BatchItem]) -> Result<Vec<JudgeCaseResult>, JudgeError>;
}

/// Judge status ids.
///
/// Ids 1 and 2 mean the case is still queued or running; 3 means the
/// output matched the expected output; 4 means a runtime fault. Any other
/// id is treated as a mismatch/other failure.
pub mod status_ids {
    pub const IN_QUEUE: i32 = 1;
    pub const PROCESSING: i32 = 2;
    pub const ACCEPTED: i32 = 3;
    pub const RUNTIME_ERROR: i32 = 4;

    pub fn is_terminal(status_id: i32) -> bool {
        status_id > PROCESSING
    }
}

/// One test case sent to the judge
#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub source_code: String,
    pub language_id: u32,
    pub stdin: String,
    pub expected_output: String,
}

/// Per-case result returned by the judge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeCaseResult {
    pub token: String,
    pub status_id: i32,
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    /// Runtime as a decimal string of seconds, e.g. "0.002"
    #[serde(default)]
    pub time: Option<String>,
    /// Memory in KB
    #[serde(default)]
    pub memory: Option<u64>,
}

/// Errors from talking to the judge
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("judge unavailable: {0}")]
    Unavailable(String),
    #[error("judge returned {got} tokens for {expected} submitted cases")]
    BatchMismatch { expected: usize, got: usize },
    #[error("judge did not finish within {0}s")]
    Timeout(u64),
    #[error("cannot dispatch an empty test case batch")]
    EmptyBatch,
}

impl From<reqwest::Error> for JudgeError {
    fn from(err: reqwest::Error) -> Self {
        JudgeError::Unavailable(err.to_string())
    }
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    submissions: &'a [BatchItem],
}

#[derive(Debug, Deserialize)]
struct TokenEnvelope {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchResults {
    submissions: Vec<PolledCase>,
}

/// Raw polled case; `status_id` is absent while the case is still queued
#[derive(Debug, Deserialize)]
struct PolledCase {
    token: String,
    #[serde(default)]
    status_id: Option<i32>,
    #[serde(default)]
    stdout: Option<String>,
    #[serde(default)]
    stderr: Option<String>,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    memory: Option<u64>,
}

/// HTTP client for the external judge
pub struct JudgeClient {
    http: reqwest::Client,
    config: JudgeConfig,
}

impl JudgeClient {
    pub fn new(config: JudgeConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build judge HTTP client")?;
        Ok(Self { http, config })
    }

    /// Submit a batch of test cases, returning one token per case.
    ///
    /// A token count that differs from the submitted case count is a
    /// fatal inconsistency, never silently ignored.
    pub async fn dispatch(&self, items: &[BatchItem]) -> Result<Vec<String>, JudgeError> {
        if items.is_empty() {
            return Err(JudgeError::EmptyBatch);
        }

        let url = format!("{}/submissions/batch?base64_encoded=false", self.config.base_url);
        let mut request = self.http.post(&url).json(&BatchRequest { submissions: items });
        if let Some(key) = &self.config.api_key {
            request = request.header("X-Auth-Token", key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(JudgeError::Unavailable(format!(
                "batch submit returned {}",
                response.status()
            )));
        }

        let envelopes: Vec<TokenEnvelope> = response
            .json()
            .await
            .map_err(|e| JudgeError::Unavailable(format!("malformed batch response: {}", e)))?;

        let tokens: Vec<String> = envelopes.into_iter().filter_map(|e| e.token).collect();
        if tokens.len() != items.len() {
            return Err(JudgeError::BatchMismatch {
                expected: items.len(),
                got: tokens.len(),
            });
        }

        debug!("Dispatched {} cases to judge", tokens.len());
        Ok(tokens)
    }

    /// Poll until every token's result is terminal.
    ///
    /// Results come back in submitted-case order regardless of the order
    /// the judge reports them in: each polled case is matched back to its
    /// token, never to its array position. Polling backs off exponentially
    /// up to a cap and gives up with `JudgeError::Timeout` once the
    /// configured deadline passes.
    pub async fn collect(&self, tokens: &[String]) -> Result<Vec<JudgeCaseResult>, JudgeError> {
        let url = format!(
            "{}/submissions/batch?tokens={}&base64_encoded=false&fields=token,status_id,stdout,stderr,time,memory",
            self.config.base_url,
            tokens.join(",")
        );

        let deadline = Instant::now() + Duration::from_secs(self.config.poll_deadline_secs);
        let mut delay = Duration::from_millis(self.config.poll_initial_ms);
        let max_delay = Duration::from_millis(self.config.poll_max_ms);

        loop {
            let mut request = self.http.get(&url);
            if let Some(key) = &self.config.api_key {
                request = request.header("X-Auth-Token", key);
            }

            let response = request.send().await?;
            if !response.status().is_success() {
                return Err(JudgeError::Unavailable(format!(
                    "batch poll returned {}",
                    response.status()
                )));
            }

            let batch: BatchResults = response
                .json()
                .await
                .map_err(|e| JudgeError::Unavailable(format!("malformed poll response: {}", e)))?;

            if let Some(results) = correlate(tokens, batch.submissions)? {
                return Ok(results);
            }

            if Instant::now() + delay >= deadline {
                warn!("Judge poll deadline of {}s exceeded", self.config.poll_deadline_secs);
                return Err(JudgeError::Timeout(self.config.poll_deadline_secs));
            }

            sleep(delay).await;
            delay = (delay * 2).min(max_delay);
        }
    }
}

#[async_trait]
impl Judge for JudgeClient {
    async fn run_batch(&self, items: &[BatchItem]) -> Result<Vec<JudgeCaseResult>, JudgeError> {
        let tokens = self.dispatch(items).await?;
        self.collect(&tokens).await
    }
}

/// Match polled cases back to the requested tokens.
///
/// Returns `Ok(None)` while any case is still pending. A response that
/// drops one of our tokens entirely is a batch inconsistency.
fn correlate(
    tokens: &[String],
    polled: Vec<PolledCase>,
) -> Result<Option<Vec<JudgeCaseResult>>, JudgeError> {
    let mut by_token: std::collections::HashMap<String, PolledCase> =
        polled.into_iter().map(|c| (c.token.clone(), c)).collect();

    let mut results = Vec::with_capacity(tokens.len());
    for token in tokens {
        let Some(case) = by_token.remove(token) else {
            return Err(JudgeError::BatchMismatch {
                expected: tokens.len(),
                got: results.len(),
            });
        };
        match case.status_id {
            Some(id) if status_ids::is_terminal(id) => results.push(JudgeCaseResult {
                token: case.token,
                status_id: id,
                stdout: case.stdout,
                stderr: case.stderr,
                time: case.time,
                memory: case.memory,
            }),
            _ => return Ok(None),
        }
    }

    Ok(Some(results))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn polled(token: &str, status_id: Option<i32>) -> PolledCase {
        PolledCase {
            token: token.into(),
            status_id,
            stdout: None,
            stderr: None,
            time: None,
            memory: None,
        }
    }

    #[test]
    fn correlate_orders_by_token_not_position() {
        let tokens = vec!["a".to_string(), "b".to_string()];
        let out = correlate(&tokens, vec![polled("b", Some(4)), polled("a", Some(3))])
            .unwrap()
            .unwrap();
        assert_eq!(out[0].token, "a");
        assert_eq!(out[0].status_id, 3);
        assert_eq!(out[1].token, "b");
        assert_eq!(out[1].status_id, 4);
    }

    #[test]
    fn correlate_waits_for_pending_cases() {
        let tokens = vec!["a".to_string(), "b".to_string()];
        let out = correlate(&tokens, vec![polled("a", Some(3)), polled("b", Some(2))]).unwrap();
        assert!(out.is_none());

        let out = correlate(&tokens, vec![polled("a", Some(3)), polled("b", None)]).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn correlate_rejects_missing_token() {
        let tokens = vec!["a".to_string(), "b".to_string()];
        let err = correlate(&tokens, vec![polled("a", Some(3))]).unwrap_err();
        assert!(matches!(err, JudgeError::BatchMismatch { expected: 2, .. }));
    }
}
