// tests/common/mod.rs
// Stub collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use jira_rss_sync::config::FeedConfig;
use jira_rss_sync::feed::{FeedFetcher, FeedItem};
use jira_rss_sync::tracker::{CreatedTicket, IssueTracker, TicketDraft, TrackerError};

pub fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

pub fn feed_config(id: &str, url: &str, added_since: DateTime<Utc>) -> FeedConfig {
    FeedConfig {
        id: id.to_string(),
        feed_url: url.to_string(),
        name: format!("Feed {id}"),
        jira_project_id: "SEC".to_string(),
        labels: vec!["rss".to_string()],
        added_since,
    }
}

pub fn item(guid: &str, title: &str, published: DateTime<Utc>) -> FeedItem {
    FeedItem {
        guid: guid.to_string(),
        title: title.to_string(),
        body: format!("<p>Body of {title}.</p>"),
        link: format!("https://example.com/{guid}"),
        updated_at: None,
        published_at: Some(published),
    }
}

/// Serves canned item lists per URL; unknown URLs fail like a dead feed.
#[derive(Default)]
pub struct StubFetcher {
    feeds: HashMap<String, Vec<FeedItem>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(mut self, url: &str, items: Vec<FeedItem>) -> Self {
        self.feeds.insert(url.to_string(), items);
        self
    }
}

#[async_trait]
impl FeedFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> anyhow::Result<Vec<FeedItem>> {
        self.feeds
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unable to fetch feed {url}"))
    }
}

/// Records created drafts and answers title searches from its own record,
/// the way a real tracker would find issues created in an earlier pass.
#[derive(Default)]
pub struct StubTracker {
    pub existing_titles: Mutex<HashSet<String>>,
    pub created: Mutex<Vec<TicketDraft>>,
    pub search_calls: AtomicUsize,
    fail_searches: AtomicBool,
    fail_creates: AtomicBool,
}

impl StubTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_existing(self, title: &str) -> Self {
        self.existing_titles.lock().unwrap().insert(title.to_string());
        self
    }

    pub fn fail_searches(&self, fail: bool) {
        self.fail_searches.store(fail, Ordering::SeqCst);
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn created_titles(&self) -> Vec<String> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.title.clone())
            .collect()
    }
}

#[async_trait]
impl IssueTracker for StubTracker {
    async fn find_by_exact_title(
        &self,
        _project_key: &str,
        title: &str,
    ) -> Result<Vec<String>, TrackerError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_searches.load(Ordering::SeqCst) {
            return Err(TrackerError::Api("search unavailable".to_string()));
        }
        let preexisting = self.existing_titles.lock().unwrap().contains(title);
        let created_earlier = self
            .created
            .lock()
            .unwrap()
            .iter()
            .any(|d| d.title == title);
        if preexisting || created_earlier {
            Ok(vec!["SEC-1".to_string()])
        } else {
            Ok(Vec::new())
        }
    }

    async fn create(&self, draft: &TicketDraft) -> Result<CreatedTicket, TrackerError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(TrackerError::Api("create unavailable".to_string()));
        }
        let mut created = self.created.lock().unwrap();
        created.push(draft.clone());
        Ok(CreatedTicket {
            id: format!("{}", 10000 + created.len()),
            key: format!("SEC-{}", created.len()),
            url: Some("https://jira.example.com/rest/api/2/issue/1".to_string()),
        })
    }
}
