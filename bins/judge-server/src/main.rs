mod config;
mod engine;
mod evaluator;
mod executor;
mod git;
mod gitea;
mod handlers;
mod pool;
mod runtime_env;
mod scoreboard;
mod testcases;

use std::sync::Arc;

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use tokio::net::TcpListener;
use tracing::{error, info};

use judge_common::traits::{Judge, ResultStore, ScoreStore, StatusReporter};

use config::Config;
use executor::SubmissionExecutor;
use gitea::GiteaClient;
use handlers::AppState;
use pool::DispatchPool;
use runtime_env::RuntimeEnv;
use scoreboard::{RedisResultStore, RedisScoreboard};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Judge server booting...");

    let cfg = Config::from_env()?;

    // Connect to Redis
    let client =
        redis::Client::open(cfg.redis_url.as_str()).context("Failed to create Redis client")?;
    let redis_conn = ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")?;
    info!("Connected to Redis: {}", cfg.redis_url);

    let env = RuntimeEnv::detect().await?;

    let judge: Arc<dyn Judge> = Arc::new(SubmissionExecutor::new(&cfg, env)?);
    let results: Arc<dyn ResultStore> =
        Arc::new(RedisResultStore::new(redis_conn.clone(), cfg.result_ttl));
    let scores: Arc<dyn ScoreStore> = Arc::new(RedisScoreboard::new(redis_conn, cfg.result_ttl));
    let reporter: Arc<dyn StatusReporter> =
        Arc::new(GiteaClient::new(&cfg.gitea_url, &cfg.gitea_token)?);

    let pool = Arc::new(DispatchPool::start(
        cfg.max_parallel_judges,
        judge,
        Arc::clone(&results),
        Arc::clone(&scores),
        cfg.base_url.clone(),
    ));

    let state = Arc::new(AppState {
        pool: Arc::clone(&pool),
        results,
        scores,
        reporter,
    });

    let app = handlers::routes().with_state(state);

    let listener = TcpListener::bind(&cfg.server_address)
        .await
        .with_context(|| format!("Failed to bind to {}", cfg.server_address))?;

    info!("HTTP server listening on {}", cfg.server_address);
    info!("Ready to accept submissions");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Drain accepted submissions before exiting.
    pool.stop().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received, closing intake");
}
