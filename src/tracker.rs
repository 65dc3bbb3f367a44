// src/tracker.rs
//! Jira REST client: exact-title search and issue creation.
//!
//! Wraps `reqwest` with Jira-specific error handling, basic auth, and typed
//! request/response bodies. Only the two calls the reconciliation engine
//! needs are implemented: a JQL search scoped to a project with an
//! exact-phrase summary match, and issue creation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::FeedConfig;
use crate::feed::FeedItem;
use crate::html;

/// Issue type assigned to every created issue.
const ISSUE_TYPE: &str = "Task";

#[derive(Debug, Error)]
pub enum TrackerError {
    /// Network or TLS failure, or a non-2xx HTTP status.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The tracker rejected the request at the API level.
    #[error("Jira API error: {0}")]
    Api(String),

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// An issue ready to send: built from one feed item, sent once, discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketDraft {
    pub project_key: String,
    pub title: String,
    pub description: String,
    pub labels: Vec<String>,
}

impl TicketDraft {
    /// Description is the converted plain-text body followed by the item's
    /// link and guid on their own lines.
    pub fn from_item(feed: &FeedConfig, item: &FeedItem) -> Self {
        let text = html::to_text(&item.body);
        Self {
            project_key: feed.jira_project_id.clone(),
            title: item.title.clone(),
            description: format!("{}\n{}\n{}", text, item.link, item.guid),
            labels: feed.labels.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedTicket {
    pub id: String,
    pub key: String,
    #[serde(rename = "self")]
    pub url: Option<String>,
}

/// The issue-tracking service, seen from the reconciliation engine.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Keys of existing issues in `project_key` whose summary equals `title`
    /// as an exact phrase.
    async fn find_by_exact_title(
        &self,
        project_key: &str,
        title: &str,
    ) -> Result<Vec<String>, TrackerError>;

    async fn create(&self, draft: &TicketDraft) -> Result<CreatedTicket, TrackerError>;
}

/// Escape characters that JQL string literals treat as syntax, so an
/// arbitrary title embeds as literal text.
fn escape_jql_phrase(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Build the search query: project-scoped, with the title wrapped in
/// `\" ... \"` so Jira's text matcher does an exact phrase match rather
/// than a term match.
pub(crate) fn exact_title_jql(project_key: &str, title: &str) -> String {
    format!(
        "project = \"{}\" AND summary ~ \"\\\"{}\\\"\"",
        escape_jql_phrase(project_key),
        escape_jql_phrase(title)
    )
}

pub struct JiraClient {
    client: Client,
    base_url: Url,
    username: String,
    token: String,
}

impl JiraClient {
    pub fn new(
        base_url: &str,
        username: &str,
        token: &str,
        timeout_secs: u64,
    ) -> Result<Self, TrackerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("jira-rss-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        // Normalise: exactly one trailing slash so join() appends to the
        // path instead of replacing the last segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised)
            .map_err(|e| TrackerError::Api(format!("invalid base URL '{base_url}': {e}")))?;

        Ok(Self {
            client,
            base_url,
            username: username.to_owned(),
            token: token.to_owned(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, TrackerError> {
        self.base_url
            .join(path)
            .map_err(|e| TrackerError::Api(format!("invalid endpoint path '{path}': {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<SearchIssue>,
}

#[derive(Debug, Deserialize)]
struct SearchIssue {
    key: String,
}

#[derive(Serialize)]
struct CreateRequest<'a> {
    fields: CreateFields<'a>,
}

#[derive(Serialize)]
struct CreateFields<'a> {
    project: ProjectRef<'a>,
    summary: &'a str,
    description: &'a str,
    issuetype: IssueTypeRef<'a>,
    labels: &'a [String],
}

#[derive(Serialize)]
struct ProjectRef<'a> {
    key: &'a str,
}

#[derive(Serialize)]
struct IssueTypeRef<'a> {
    name: &'a str,
}

#[async_trait]
impl IssueTracker for JiraClient {
    async fn find_by_exact_title(
        &self,
        project_key: &str,
        title: &str,
    ) -> Result<Vec<String>, TrackerError> {
        let jql = exact_title_jql(project_key, title);
        let mut url = self.endpoint("rest/api/2/search")?;
        url.query_pairs_mut()
            .append_pair("jql", &jql)
            .append_pair("fields", "summary")
            .append_pair("maxResults", "50");

        let response = self
            .client
            .get(url.clone())
            .basic_auth(&self.username, Some(&self.token))
            .send()
            .await?
            .error_for_status()?;
        let body = response.text().await?;
        let parsed: SearchResponse =
            serde_json::from_str(&body).map_err(|e| TrackerError::Deserialize {
                context: format!("search(jql={jql})"),
                source: e,
            })?;

        Ok(parsed.issues.into_iter().map(|i| i.key).collect())
    }

    async fn create(&self, draft: &TicketDraft) -> Result<CreatedTicket, TrackerError> {
        let url = self.endpoint("rest/api/2/issue")?;
        let request = CreateRequest {
            fields: CreateFields {
                project: ProjectRef {
                    key: &draft.project_key,
                },
                summary: &draft.title,
                description: &draft.description,
                issuetype: IssueTypeRef { name: ISSUE_TYPE },
                labels: &draft.labels,
            },
        };

        let response = self
            .client
            .post(url)
            .basic_auth(&self.username, Some(&self.token))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            // Jira create failures carry field-level detail in the body
            return Err(TrackerError::Api(format!("create returned {status}: {body}")));
        }

        serde_json::from_str(&body).map_err(|e| TrackerError::Deserialize {
            context: format!("create(project={})", draft.project_key),
            source: e,
        })
    }
}
