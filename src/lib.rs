// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod config;
pub mod feed;
pub mod html;
pub mod metrics;
pub mod reconcile;
pub mod scheduler;
pub mod store;
pub mod tracker;

// ---- Re-exports for stable public API ----
pub use crate::config::{EnvConfig, FeedConfig, SearchFailurePolicy, SyncConfig};
pub use crate::feed::{FeedFetcher, FeedItem, HttpFeedFetcher};
pub use crate::reconcile::{Engine, ReconcileError, ReconcileReport};
pub use crate::store::{MemorySeenStore, RedisSeenStore, SeenStore, StoreError};
pub use crate::tracker::{IssueTracker, JiraClient, TicketDraft, TrackerError};
