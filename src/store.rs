// src/store.rs
//! Durable per-feed seen sets.
//!
//! The store owns the only persistent state in the system: one Redis set per
//! feed id whose elements are item guids. Membership only grows; nothing in
//! this crate ever removes a guid.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::sentinel::{SentinelClient, SentinelNodeConnectionInfo, SentinelServerType};
use redis::{Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, TlsMode};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::StoreConfig;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Used by test doubles and liveness failures without a backend error.
    #[error("seen store unavailable: {0}")]
    Unavailable(String),
}

/// Set-membership store keyed by feed id.
#[async_trait]
pub trait SeenStore: Send + Sync {
    async fn contains(&self, feed_id: &str, guid: &str) -> Result<bool, StoreError>;
    async fn insert(&self, feed_id: &str, guid: &str) -> Result<(), StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;
}

const SENTINEL_MASTER_NAME: &str = "mymaster";

enum Backend {
    Direct(ConnectionManager),
    /// Sentinel resolution needs `&mut self`, so the client sits behind a lock.
    Sentinel(Mutex<SentinelClient>),
}

/// Redis-backed [`SeenStore`], connecting either directly or through a
/// sentinel that resolves the `mymaster` master.
pub struct RedisSeenStore {
    backend: Backend,
}

impl RedisSeenStore {
    /// Connect and verify liveness. A store that does not answer PING at
    /// startup is fatal for the process.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let backend = if config.sentinel {
            let sentinel_addr = ConnectionInfo {
                addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
                redis: RedisConnectionInfo::default(),
            };
            let node_info = SentinelNodeConnectionInfo {
                tls_mode: config.tls.then_some(TlsMode::Secure),
                redis_connection_info: Some(RedisConnectionInfo {
                    password: config.password.clone(),
                    ..Default::default()
                }),
            };
            let client = SentinelClient::build(
                vec![sentinel_addr],
                SENTINEL_MASTER_NAME.to_string(),
                Some(node_info),
                SentinelServerType::Master,
            )?;
            Backend::Sentinel(Mutex::new(client))
        } else {
            let addr = if config.tls {
                ConnectionAddr::TcpTls {
                    host: config.host.clone(),
                    port: config.port,
                    insecure: false,
                    tls_params: None,
                }
            } else {
                ConnectionAddr::Tcp(config.host.clone(), config.port)
            };
            let info = ConnectionInfo {
                addr,
                redis: RedisConnectionInfo {
                    password: config.password.clone(),
                    ..Default::default()
                },
            };
            let client = Client::open(info)?;
            Backend::Direct(ConnectionManager::new(client).await?)
        };

        let store = Self { backend };
        store.ping().await?;
        Ok(store)
    }

    async fn run<T: redis::FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T, StoreError> {
        match &self.backend {
            Backend::Direct(manager) => {
                let mut conn = manager.clone();
                Ok(cmd.query_async(&mut conn).await?)
            }
            Backend::Sentinel(client) => {
                let mut conn = client.lock().await.get_async_connection().await?;
                Ok(cmd.query_async(&mut conn).await?)
            }
        }
    }
}

#[async_trait]
impl SeenStore for RedisSeenStore {
    async fn contains(&self, feed_id: &str, guid: &str) -> Result<bool, StoreError> {
        let mut cmd = redis::cmd("SISMEMBER");
        cmd.arg(feed_id).arg(guid);
        self.run(&cmd).await
    }

    async fn insert(&self, feed_id: &str, guid: &str) -> Result<(), StoreError> {
        let mut cmd = redis::cmd("SADD");
        cmd.arg(feed_id).arg(guid);
        self.run::<i64>(&cmd).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.run::<String>(&redis::cmd("PING")).await?;
        Ok(())
    }
}

/// In-memory [`SeenStore`] for tests: a set per feed id, plus switches to
/// simulate read/write outages.
#[derive(Default)]
pub struct MemorySeenStore {
    sets: std::sync::Mutex<std::collections::HashMap<String, std::collections::HashSet<String>>>,
    fail_reads: std::sync::atomic::AtomicBool,
    fail_inserts: std::sync::atomic::AtomicBool,
}

impl MemorySeenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn len(&self, feed_id: &str) -> usize {
        self.sets
            .lock()
            .unwrap()
            .get(feed_id)
            .map_or(0, std::collections::HashSet::len)
    }

    pub fn is_empty(&self, feed_id: &str) -> bool {
        self.len(feed_id) == 0
    }
}

#[async_trait]
impl SeenStore for MemorySeenStore {
    async fn contains(&self, feed_id: &str, guid: &str) -> Result<bool, StoreError> {
        if self.fail_reads.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated read failure".into()));
        }
        Ok(self
            .sets
            .lock()
            .unwrap()
            .get(feed_id)
            .is_some_and(|set| set.contains(guid)))
    }

    async fn insert(&self, feed_id: &str, guid: &str) -> Result<(), StoreError> {
        if self.fail_inserts.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated write failure".into()));
        }
        self.sets
            .lock()
            .unwrap()
            .entry(feed_id.to_string())
            .or_default()
            .insert(guid.to_string());
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated outage".into()));
        }
        Ok(())
    }
}
