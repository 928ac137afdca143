//! Sliding-window rate limiter for the trial-run path
//!
//! One register per client key holding the last admitted request time.
//! The register expires after the window, so no state outlives a quiet
//! client.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

use crate::store::Store;

/// Result of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Limited { retry_after: u64 },
}

pub struct RateLimiter {
    store: Arc<dyn Store>,
    window_secs: u64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn Store>, window_secs: u64) -> Self {
        Self { store, window_secs }
    }

    /// Admit or reject a request from `client_key` at the current time
    pub async fn admit(&self, client_key: &str) -> Result<Admission> {
        self.admit_at(client_key, epoch_secs()).await
    }

    /// Admit or reject at an explicit time; admission updates the register
    pub async fn admit_at(&self, client_key: &str, now: u64) -> Result<Admission> {
        if let Some(last) = self.store.rate_limit_last(client_key).await? {
            let elapsed = now.saturating_sub(last);
            if elapsed < self.window_secs {
                return Ok(Admission::Limited {
                    retry_after: self.window_secs - elapsed,
                });
            }
        }

        self.store
            .rate_limit_touch(client_key, now, self.window_secs)
            .await?;
        Ok(Admission::Allowed)
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn limiter(window: u64) -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryStore::new()), window)
    }

    #[tokio::test]
    async fn first_request_is_admitted() {
        let limiter = limiter(10);
        assert_eq!(limiter.admit_at("1.2.3.4", 100).await.unwrap(), Admission::Allowed);
    }

    #[tokio::test]
    async fn request_inside_window_is_limited_with_remaining_wait() {
        let limiter = limiter(10);
        limiter.admit_at("1.2.3.4", 100).await.unwrap();
        assert_eq!(
            limiter.admit_at("1.2.3.4", 103).await.unwrap(),
            Admission::Limited { retry_after: 7 }
        );
    }

    #[tokio::test]
    async fn request_after_window_is_admitted() {
        let limiter = limiter(10);
        limiter.admit_at("1.2.3.4", 100).await.unwrap();
        assert_eq!(limiter.admit_at("1.2.3.4", 110).await.unwrap(), Admission::Allowed);
    }

    #[tokio::test]
    async fn rejection_does_not_extend_the_window() {
        let limiter = limiter(10);
        limiter.admit_at("1.2.3.4", 100).await.unwrap();
        // rejected attempt at t=105 must not move the window start
        limiter.admit_at("1.2.3.4", 105).await.unwrap();
        assert_eq!(limiter.admit_at("1.2.3.4", 110).await.unwrap(), Admission::Allowed);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = limiter(10);
        limiter.admit_at("1.2.3.4", 100).await.unwrap();
        assert_eq!(limiter.admit_at("5.6.7.8", 101).await.unwrap(), Admission::Allowed);
    }
}
