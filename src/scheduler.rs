// src/scheduler.rs
//! The sweep loop: reconcile every configured feed in order, record the
//! last-run gauge, sleep, repeat.

use std::time::Duration;

use anyhow::Context;
use metrics::gauge;
use tracing::{error, info, warn};

use crate::config::{FeedConfig, SearchFailurePolicy, SyncConfig};
use crate::metrics::LAST_RUN_TIME;
use crate::reconcile::{Engine, ReconcileError};

/// Run sweeps forever. Returns only on a fatal error (a tracker-search
/// failure under the `halt` policy), which the caller turns into process
/// exit.
pub async fn run(engine: Engine, config: SyncConfig) -> anyhow::Result<()> {
    let interval = Duration::from_secs(config.interval);
    loop {
        info!(feeds = config.feeds.len(), "running checks");
        run_sweep(&engine, &config.feeds).await?;
        gauge!(LAST_RUN_TIME).set(chrono::Utc::now().timestamp() as f64);
        tokio::time::sleep(interval).await;
    }
}

/// One pass over all feeds, strictly sequential. A failure on one feed is
/// logged and does not stop the rest of the sweep; the one exception is a
/// tracker-search failure under [`SearchFailurePolicy::Halt`], which aborts
/// the sweep and the process.
pub async fn run_sweep(engine: &Engine, feeds: &[FeedConfig]) -> anyhow::Result<()> {
    let policy = engine.search_failure_policy();
    for feed in feeds {
        match engine.reconcile(feed).await {
            Ok(report) => info!(
                feed = %feed.id,
                created = report.created,
                existing = report.existing_matched,
                cutoff = report.cutoff_skipped,
                failed = report.failed,
                anomalies = report.anomalies,
                seen = report.already_seen,
                "feed reconciled"
            ),
            Err(e @ ReconcileError::Search(_)) if policy == SearchFailurePolicy::Halt => {
                error!(feed = %feed.id, error = %e, "existing-issue search failed, refusing to continue");
                return Err(e).with_context(|| {
                    format!("existing-issue search failed for feed '{}'", feed.id)
                });
            }
            Err(e) => {
                warn!(feed = %feed.id, error = %e, "skipping feed for this sweep");
            }
        }
    }
    Ok(())
}
