//! Remote cache variant backed by Redis.
//!
//! Wraps a `ConnectionManager`, which reconnects automatically on failure —
//! the same resilience pattern used for every other long-lived backend
//! connection in this codebase. Values are stored as raw bytes (the
//! entity-level JSON encoding happens one layer up, in [`crate::codec`]);
//! this keeps the Cache trait's `Vec<u8>` contract identical across both
//! implementations.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::info;

use super::Cache;
use crate::config::RedisSettings;
use crate::errors::ProxyResult;

/// Async Redis client implementing the [`Cache`] contract.
///
/// `Clone + Send + Sync`; cloning is cheap (an `Arc` clone internally).
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connects to Redis using the given settings.
    ///
    /// # Errors
    ///
    /// Returns [`crate::errors::ProxyError::CacheBackend`] if the URL is
    /// invalid or the server is unreachable.
    pub async fn connect(settings: &RedisSettings) -> ProxyResult<Self> {
        let url = build_url(settings);
        info!(address = %settings.address, "connecting to remote cache");

        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        info!("remote cache connection established");
        Ok(Self { conn })
    }

    /// Health check used by the heartbeat loop.
    pub async fn ping(&self) -> ProxyResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

fn build_url(settings: &RedisSettings) -> String {
    match &settings.password {
        Some(password) => format!("redis://:{password}@{}/{}", settings.address, settings.db),
        None => format!("redis://{}/{}", settings.address, settings.db),
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn set(&self, key: &str, value: Vec<u8>) -> ProxyResult<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> ProxyResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> ProxyResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn scan(&self, prefix: &str) -> ProxyResult<Vec<(String, Vec<u8>)>> {
        let mut conn = self.conn.clone();
        let pattern = format!("{prefix}*");

        // KEYS is O(N); acceptable here because the proxy's keyspace is
        // bounded by environment count, not request volume. A production
        // deployment with very large keyspaces should switch to SCAN.
        let keys: Vec<String> = redis::cmd("KEYS").arg(&pattern).query_async(&mut conn).await?;

        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(&key).await? {
                results.push((key, value));
            }
        }
        Ok(results)
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Exercising RedisCache against a live server is covered by the
    // proxy binary's integration tests, which spin up a real instance.
    // Unit tests here are limited to pure helpers.

    #[test]
    fn build_url_includes_password_when_present() {
        let settings = RedisSettings {
            address: "localhost:6379".into(),
            password: Some("hunter2".into()),
            db: 2,
        };
        assert_eq!(build_url(&settings), "redis://:hunter2@localhost:6379/2");
    }

    #[test]
    fn build_url_omits_password_when_absent() {
        let settings =
            RedisSettings { address: "localhost:6379".into(), password: None, db: 0 };
        assert_eq!(build_url(&settings), "redis://localhost:6379/0");
    }
}
