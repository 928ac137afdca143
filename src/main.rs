mod config;
mod contest;
mod error;
mod judge;
mod languages;
mod models;
mod rate_limit;
mod redis_store;
mod rewards;
mod server;
mod store;
mod submission;
mod verdict;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::contest::ContestGuard;
use crate::judge::{Judge, JudgeClient};
use crate::rate_limit::RateLimiter;
use crate::redis_store::RedisStore;
use crate::rewards::RewardLedger;
use crate::server::AppState;
use crate::store::Store;
use crate::submission::SubmissionService;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("judge_gateway=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    languages::init_languages(&config.languages_path)?;
    info!(
        "Loaded language configurations from {} ({} names)",
        config.languages_path,
        languages::get_supported_languages().len()
    );

    info!("Starting Judge Gateway...");

    let store: Arc<dyn Store> = Arc::new(RedisStore::connect(&config.redis_url).await?);

    let judge: Arc<dyn Judge> = Arc::new(JudgeClient::new(config.judge.clone())?);
    info!("Judge client targeting {}", config.judge.base_url);

    let rewards = RewardLedger::new(
        store.clone(),
        config.reward_points,
        config.reward_marker_ttl_secs,
    );
    let contests = ContestGuard::new(store.clone());
    let service = Arc::new(SubmissionService::new(
        store.clone(),
        judge,
        rewards,
        contests,
    ));
    let limiter = Arc::new(RateLimiter::new(
        store.clone(),
        config.rate_limit_window_secs,
    ));

    let state = AppState { service, limiter };
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on {}", config.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
