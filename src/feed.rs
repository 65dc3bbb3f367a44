// src/feed.rs
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::time::Duration;

/// One syndicated entry, alive for a single reconciliation pass only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    /// Opaque unique identifier from the feed (`<guid>`/`<id>`, falling back
    /// to the item link when the feed provides neither).
    pub guid: String,
    pub title: String,
    /// Raw body as published; may be HTML, may be empty.
    pub body: String,
    pub link: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
}

impl FeedItem {
    /// Timestamp used against the cutoff: prefer updated over published.
    pub fn item_time(&self) -> Option<DateTime<Utc>> {
        self.updated_at.or(self.published_at)
    }
}

/// Fetches and parses one feed URL into items in the feed's native order.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<FeedItem>>;
}

pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("jira-rss-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building feed HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<FeedItem>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("fetching feed {url}"))?
            .error_for_status()
            .with_context(|| format!("fetching feed {url}"))?;
        let body = response
            .text()
            .await
            .with_context(|| format!("reading feed body from {url}"))?;
        parse_feed(&body)
    }
}

// ---- RSS 2.0 shape ----

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    guid: Option<Guid>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "content:encoded")]
    content: Option<String>,
}

/// `<guid isPermaLink="...">` carries its value as text content.
#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "$text")]
    value: Option<String>,
}

// ---- Atom shape ----

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    id: Option<String>,
    title: Option<Text>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    updated: Option<String>,
    published: Option<String>,
    summary: Option<Text>,
    content: Option<Text>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
}

/// Atom text constructs carry a `type` attribute alongside their content.
#[derive(Debug, Deserialize)]
struct Text {
    #[serde(rename = "$text")]
    value: Option<String>,
}

impl Text {
    fn into_value(self) -> Option<String> {
        self.value
    }
}

/// Feeds publish RFC 2822 (`pubDate`) or RFC 3339 (`updated`/`published`).
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    DateTime::parse_from_rfc2822(s)
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Name of the document's root element, if it is well-formed XML at all.
fn root_element_name(xml: &str) -> Option<String> {
    let mut reader = quick_xml::Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(quick_xml::events::Event::Start(e)) | Ok(quick_xml::events::Event::Empty(e)) => {
                return Some(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Ok(quick_xml::events::Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

/// Parse a feed document, accepting RSS 2.0 and Atom.
///
/// The root element decides the dialect. Anything else — say, an XHTML
/// error page served where the feed used to be — is a parse error, not an
/// empty feed.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>> {
    match root_element_name(xml).as_deref() {
        Some("rss") => {
            let rss: Rss = from_str(xml).context("parsing RSS 2.0 feed xml")?;
            Ok(rss.channel.items.into_iter().filter_map(rss_item).collect())
        }
        Some("feed") => {
            let atom: AtomFeed = from_str(xml).context("parsing Atom feed xml")?;
            Ok(atom.entries.into_iter().filter_map(atom_entry).collect())
        }
        Some(other) => bail!("unsupported feed document with root element <{other}>"),
        None => bail!("feed document is not well-formed XML"),
    }
}

fn rss_item(item: RssItem) -> Option<FeedItem> {
    let link = item.link.unwrap_or_default();
    let guid = match item.guid.and_then(|g| g.value).filter(|v| !v.is_empty()) {
        Some(v) => v,
        None if !link.is_empty() => link.clone(),
        None => {
            tracing::debug!("dropping feed item with neither guid nor link");
            return None;
        }
    };
    // Prefer description over content, as published.
    let body = item
        .description
        .filter(|d| !d.is_empty())
        .or(item.content)
        .unwrap_or_default();
    Some(FeedItem {
        guid,
        title: item.title.unwrap_or_default(),
        body,
        link,
        updated_at: None,
        published_at: item.pub_date.as_deref().and_then(parse_timestamp),
    })
}

fn atom_entry(entry: AtomEntry) -> Option<FeedItem> {
    let link = entry
        .links
        .into_iter()
        .find_map(|l| l.href)
        .unwrap_or_default();
    let guid = match entry.id.filter(|v| !v.is_empty()) {
        Some(v) => v,
        None if !link.is_empty() => link.clone(),
        None => {
            tracing::debug!("dropping feed entry with neither id nor link");
            return None;
        }
    };
    let body = entry
        .summary
        .and_then(Text::into_value)
        .filter(|s| !s.is_empty())
        .or_else(|| entry.content.and_then(Text::into_value))
        .unwrap_or_default();
    Some(FeedItem {
        guid,
        title: entry.title.and_then(Text::into_value).unwrap_or_default(),
        body,
        link,
        updated_at: entry.updated.as_deref().and_then(parse_timestamp),
        published_at: entry.published.as_deref().and_then(parse_timestamp),
    })
}
