// src/reconcile.rs
//! The reconciliation engine.
//!
//! For one feed, decides and executes the minimal set of remote effects
//! needed to reach the idempotent end state: every past-cutoff item that is
//! not already present has exactly one Jira issue and is marked seen.
//!
//! Marking a guid seen is best-effort on every path: a failed store write is
//! logged and never retried inline, because the next sweep converges on its
//! own (the cutoff and existing-issue rules are idempotent, and a created
//! issue is found by the existing-issue search).

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{FeedConfig, SearchFailurePolicy};
use crate::feed::{FeedFetcher, FeedItem};
use crate::metrics::{ISSUES_CREATED, ISSUE_CREATION_ERRORS};
use crate::store::{SeenStore, StoreError};
use crate::tracker::{IssueTracker, TicketDraft, TrackerError};

/// Failures that abort a feed's pass. Everything else (creation failures,
/// store writes, item anomalies) is absorbed into the report.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("fetching feed: {0}")]
    Fetch(anyhow::Error),

    #[error("partitioning against seen store: {0}")]
    Store(#[from] StoreError),

    /// The existing-issue search failed. Under the `halt` policy the
    /// scheduler turns this into process exit; under `skip_feed` it only
    /// ends this feed's pass.
    #[error("searching tracker for existing issues: {0}")]
    Search(TrackerError),
}

/// Per-feed outcome counts for one pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Items whose guid was already in the seen set.
    pub already_seen: usize,
    /// Candidates older than the feed's cutoff, marked seen without action.
    pub cutoff_skipped: usize,
    /// Candidates with a matching issue already in the tracker.
    pub existing_matched: usize,
    /// Issues created this pass.
    pub created: usize,
    /// Creation attempts that failed; retried next sweep.
    pub failed: usize,
    /// Items missing both timestamps, or skipped under `skip_item`.
    pub anomalies: usize,
}

enum ItemOutcome {
    CutoffSkipped,
    ExistingMatched,
    Created,
    CreateFailed,
    Anomaly,
}

pub struct Engine {
    fetcher: Arc<dyn FeedFetcher>,
    store: Arc<dyn SeenStore>,
    tracker: Arc<dyn IssueTracker>,
    search_failure_policy: SearchFailurePolicy,
}

impl Engine {
    pub fn new(
        fetcher: Arc<dyn FeedFetcher>,
        store: Arc<dyn SeenStore>,
        tracker: Arc<dyn IssueTracker>,
        search_failure_policy: SearchFailurePolicy,
    ) -> Self {
        Self {
            fetcher,
            store,
            tracker,
            search_failure_policy,
        }
    }

    pub fn search_failure_policy(&self) -> SearchFailurePolicy {
        self.search_failure_policy
    }

    /// Run one reconciliation pass over `feed`.
    pub async fn reconcile(&self, feed: &FeedConfig) -> Result<ReconcileReport, ReconcileError> {
        let items = self
            .fetcher
            .fetch(&feed.feed_url)
            .await
            .map_err(ReconcileError::Fetch)?;

        // Partition into seen and candidates, preserving feed order.
        let mut report = ReconcileReport::default();
        let mut candidates = Vec::new();
        for item in items {
            if self.store.contains(&feed.id, &item.guid).await? {
                report.already_seen += 1;
            } else {
                candidates.push(item);
            }
        }
        info!(
            feed = %feed.name,
            new = candidates.len(),
            seen = report.already_seen,
            "checked feed"
        );

        for item in &candidates {
            let outcome = match self.reconcile_item(feed, item).await {
                Ok(outcome) => outcome,
                Err(ReconcileError::Search(e))
                    if self.search_failure_policy == SearchFailurePolicy::SkipItem =>
                {
                    warn!(
                        feed = %feed.id,
                        title = %item.title,
                        error = %e,
                        "existing-issue search failed, skipping item"
                    );
                    ItemOutcome::Anomaly
                }
                Err(e) => return Err(e),
            };
            match outcome {
                ItemOutcome::CutoffSkipped => report.cutoff_skipped += 1,
                ItemOutcome::ExistingMatched => report.existing_matched += 1,
                ItemOutcome::Created => report.created += 1,
                ItemOutcome::CreateFailed => report.failed += 1,
                ItemOutcome::Anomaly => report.anomalies += 1,
            }
        }

        Ok(report)
    }

    /// Apply the first matching rule: cutoff, existing issue, create.
    async fn reconcile_item(
        &self,
        feed: &FeedConfig,
        item: &FeedItem,
    ) -> Result<ItemOutcome, ReconcileError> {
        let Some(item_time) = item.item_time() else {
            // A fetch-layer defect: the item carries no usable timestamp.
            warn!(feed = %feed.id, title = %item.title, "item has neither updated nor published timestamp, skipping");
            return Ok(ItemOutcome::Anomaly);
        };

        if item_time < feed.added_since {
            info!(
                feed = %feed.id,
                title = %item.title,
                item_time = %item_time,
                added_since = %feed.added_since,
                "ignoring item published before the feed cutoff"
            );
            self.mark_seen(feed, item).await;
            return Ok(ItemOutcome::CutoffSkipped);
        }

        info!(feed = %feed.id, project = %feed.jira_project_id, title = %item.title, "searching for existing issue");
        let matches = self
            .tracker
            .find_by_exact_title(&feed.jira_project_id, &item.title)
            .await
            .map_err(ReconcileError::Search)?;
        if !matches.is_empty() {
            if matches.len() > 1 {
                warn!(feed = %feed.id, title = %item.title, keys = ?matches, "multiple existing issues match title");
            }
            info!(feed = %feed.id, title = %item.title, "marking seen, issue already exists in tracker");
            self.mark_seen(feed, item).await;
            return Ok(ItemOutcome::ExistingMatched);
        }

        let draft = TicketDraft::from_item(feed, item);
        match self.tracker.create(&draft).await {
            Ok(created) => {
                info!(
                    feed = %feed.id,
                    key = %created.key,
                    project = %feed.jira_project_id,
                    "created issue"
                );
                counter!(ISSUES_CREATED).increment(1);
                // The issue exists now; a lost seen-mark converges next
                // sweep via the existing-issue rule.
                self.mark_seen(feed, item).await;
                Ok(ItemOutcome::Created)
            }
            Err(e) => {
                warn!(feed = %feed.id, title = %item.title, error = %e, "unable to create issue");
                counter!(ISSUE_CREATION_ERRORS).increment(1);
                Ok(ItemOutcome::CreateFailed)
            }
        }
    }

    async fn mark_seen(&self, feed: &FeedConfig, item: &FeedItem) {
        if let Err(e) = self.store.insert(&feed.id, &item.guid).await {
            warn!(feed = %feed.id, guid = %item.guid, error = %e, "unable to persist guid in seen store");
        }
    }
}
