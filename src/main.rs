//! jira-rss-sync — Binary entrypoint.
//! Connects the seen store and Jira, spawns the sweep loop, and serves the
//! health/metrics listener until the process is terminated.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jira_rss_sync::api::{self, AppState};
use jira_rss_sync::config::{EnvConfig, SyncConfig};
use jira_rss_sync::feed::HttpFeedFetcher;
use jira_rss_sync::metrics::Metrics;
use jira_rss_sync::reconcile::Engine;
use jira_rss_sync::scheduler;
use jira_rss_sync::store::{RedisSeenStore, SeenStore};
use jira_rss_sync::tracker::JiraClient;

const JIRA_TIMEOUT_SECS: u64 = 30;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let env = EnvConfig::from_env()?;
    let config = SyncConfig::load_from_dir(&env.config_dir)?;

    let metrics = Metrics::init();

    // A seen store that does not answer at startup is fatal.
    let store: Arc<dyn SeenStore> = Arc::new(
        RedisSeenStore::connect(&env.store)
            .await
            .with_context(|| format!("connecting to Redis @ {}:{}", env.store.host, env.store.port))?,
    );
    info!(host = %env.store.host, port = env.store.port, "connected to Redis");

    let tracker = JiraClient::new(
        &env.jira_url,
        &env.jira_username,
        &env.jira_token,
        JIRA_TIMEOUT_SECS,
    )
    .context("constructing Jira client")?;

    let engine = Engine::new(
        Arc::new(HttpFeedFetcher::new()?),
        store.clone(),
        Arc::new(tracker),
        config.search_failure_policy,
    );

    let router = api::create_router(AppState {
        store,
        metrics: metrics.handle.clone(),
    });
    let listener = tokio::net::TcpListener::bind(&env.listen_addr)
        .await
        .with_context(|| format!("binding {}", env.listen_addr))?;
    info!(addr = %env.listen_addr, "serving /healthz and /metrics");

    let server = tokio::spawn(async move { axum::serve(listener, router).await });
    let sweeps = tokio::spawn(scheduler::run(engine, config));

    // Both tasks run until the process dies; the sweep loop returning an
    // error (halt policy) or the listener failing ends the process.
    tokio::select! {
        result = sweeps => result.context("sweep loop panicked")??,
        result = server => result.context("HTTP listener panicked")?.context("HTTP listener failed")?,
    }
    Ok(())
}
