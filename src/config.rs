// src/config.rs
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// One configured feed, mapped to one Jira project. Immutable for the
/// lifetime of a run; `id` is the seen-set partition key in Redis.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub id: String,
    pub feed_url: String,
    pub name: String,
    pub jira_project_id: String,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Items strictly older than this are marked seen without creating an
    /// issue, so a feed can be onboarded without backfilling history.
    pub added_since: DateTime<Utc>,
}

/// What to do when the existing-issue search itself fails. Creating without
/// that check risks duplicates, so the default refuses to continue at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchFailurePolicy {
    /// Terminate the whole process (the original behavior).
    #[default]
    Halt,
    /// Abandon the current feed for this sweep, continue with the others.
    SkipFeed,
    /// Skip only the current item, continue the feed.
    SkipItem,
}

/// The config document: sweep interval plus the feed list.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Seconds to sleep between sweeps.
    pub interval: u64,
    #[serde(default)]
    pub search_failure_policy: SearchFailurePolicy,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

impl SyncConfig {
    /// Load and validate `config.toml` from the configuration directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load(&dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let config: SyncConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config TOML at {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            bail!("interval must be at least 1 second");
        }
        let mut ids = HashSet::new();
        for feed in &self.feeds {
            if feed.id.trim().is_empty() {
                bail!("feed '{}' has an empty id", feed.name);
            }
            if feed.feed_url.trim().is_empty() {
                bail!("feed '{}' has an empty feed_url", feed.id);
            }
            if feed.jira_project_id.trim().is_empty() {
                bail!("feed '{}' has an empty jira_project_id", feed.id);
            }
            if !ids.insert(feed.id.as_str()) {
                bail!("duplicate feed id '{}'", feed.id);
            }
        }
        Ok(())
    }
}

/// Connection parameters for the Redis seen-set store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// Treat the address as a sentinel and resolve the `mymaster` master.
    pub sentinel: bool,
    pub tls: bool,
}

/// Process configuration pulled from the environment at startup.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub jira_url: String,
    pub jira_username: String,
    pub jira_token: String,
    pub config_dir: PathBuf,
    pub listen_addr: String,
    pub store: StoreConfig,
}

fn required_var(name: &str) -> Result<String> {
    let value = std::env::var(name)
        .with_context(|| format!("could not find {name} specified as an environment variable"))?;
    if value.is_empty() {
        bail!("{name} is set but empty");
    }
    Ok(value)
}

/// Split `host:port`, defaulting the port when absent.
fn split_addr(addr: &str, default_port: u16) -> (String, u16) {
    match addr.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(p) => (host.to_string(), p),
            Err(_) => (addr.to_string(), default_port),
        },
        None => (addr.to_string(), default_port),
    }
}

impl EnvConfig {
    pub fn from_env() -> Result<Self> {
        let jira_url = required_var("JIRA_URL")?;
        let jira_username = required_var("JIRA_USERNAME")?;
        let jira_token = required_var("JIRA_API_TOKEN")?;
        let config_dir = PathBuf::from(required_var("CONFIG_DIR")?);

        let password = match std::env::var("REDIS_PASSWORD") {
            Ok(p) if !p.is_empty() => Some(p),
            _ => match std::env::var("REDIS_AUTH_TOKEN") {
                Ok(t) if !t.is_empty() => {
                    tracing::info!("using Redis auth token in place of password");
                    Some(t)
                }
                _ => bail!(
                    "could not find REDIS_PASSWORD or REDIS_AUTH_TOKEN specified as an environment variable"
                ),
            },
        };

        let addr = match std::env::var("REDIS_URL") {
            Ok(url) if !url.is_empty() => url,
            _ => match std::env::var("REDIS_PRIMARY_ENDPOINT") {
                Ok(endpoint) if !endpoint.is_empty() => {
                    tracing::info!("using Redis primary endpoint as URL");
                    format!("{endpoint}:6379")
                }
                _ => bail!(
                    "could not find REDIS_URL or REDIS_PRIMARY_ENDPOINT specified as an environment variable"
                ),
            },
        };
        let (host, port) = split_addr(&addr, 6379);

        let sentinel = std::env::var_os("USE_SENTINEL").is_some();
        if sentinel {
            tracing::info!("running in sentinel aware mode");
        }
        let tls = std::env::var("REDIS_SSL").is_ok_and(|v| v == "1");

        let listen_addr =
            std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        Ok(Self {
            jira_url,
            jira_username,
            jira_token,
            config_dir,
            listen_addr,
            store: StoreConfig {
                host,
                port,
                password,
                sentinel,
                tls,
            },
        })
    }
}
