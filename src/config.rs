//! Gateway configuration loaded from the environment at startup
//!
//! Everything is collected into an owned struct once and passed down to
//! the components that need it; no module-level globals.

use anyhow::{Context, Result};

/// External judge connection and polling settings
#[derive(Debug, Clone)]
pub struct JudgeConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Timeout of a single HTTP request to the judge, in seconds
    pub request_timeout_secs: u64,
    /// Initial poll delay in milliseconds
    pub poll_initial_ms: u64,
    /// Poll delay cap in milliseconds
    pub poll_max_ms: u64,
    /// Overall deadline for collecting a batch, in seconds
    pub poll_deadline_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub redis_url: String,
    pub languages_path: String,
    pub judge: JudgeConfig,
    /// Sliding window applied to the trial-run path, in seconds
    pub rate_limit_window_secs: u64,
    /// Points awarded for the first acceptance of a problem
    pub reward_points: i64,
    /// Expiry of the one-time reward marker. `None` means no expiry,
    /// which is the safe default: a short TTL would let the same problem
    /// pay out repeatedly.
    pub reward_marker_ttl_secs: Option<u64>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into());
        let languages_path =
            std::env::var("LANGUAGES_CONFIG").unwrap_or_else(|_| "./files/languages.toml".into());

        let judge = JudgeConfig {
            base_url: std::env::var("JUDGE_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:2358".into())
                .trim_end_matches('/')
                .to_string(),
            api_key: std::env::var("JUDGE_API_KEY").ok(),
            request_timeout_secs: env_u64("JUDGE_REQUEST_TIMEOUT_SECS", 30)?,
            poll_initial_ms: env_u64("JUDGE_POLL_INITIAL_MS", 500)?,
            poll_max_ms: env_u64("JUDGE_POLL_MAX_MS", 4000)?,
            poll_deadline_secs: env_u64("JUDGE_POLL_DEADLINE_SECS", 60)?,
        };

        let reward_marker_ttl_secs = match std::env::var("REWARD_MARKER_TTL_SECS") {
            Ok(raw) => Some(
                raw.parse::<u64>()
                    .with_context(|| format!("Invalid REWARD_MARKER_TTL_SECS: {}", raw))?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            bind_addr,
            redis_url,
            languages_path,
            judge,
            rate_limit_window_secs: env_u64("RATE_LIMIT_WINDOW_SECS", 10)?,
            reward_points: env_u64("REWARD_POINTS", 1)? as i64,
            reward_marker_ttl_secs,
        })
    }
}

fn env_u64(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("Invalid {}: {}", name, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn judge_timeouts_have_sane_defaults() {
        let config = Config::from_env().unwrap();
        assert_eq!(config.judge.request_timeout_secs, 30);
        assert_eq!(config.judge.poll_deadline_secs, 60);
        assert_eq!(config.rate_limit_window_secs, 10);
        assert!(config.reward_marker_ttl_secs.is_none());
    }
}
