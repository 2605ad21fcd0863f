//! # Cache
//!
//! A mapping from string key to opaque byte value, with `Set`/`Get`/`Delete`/
//! `Scan` operations (§4.1). Two implementations satisfy the contract: an
//! in-process mutex-guarded map ([`memory::InMemoryCache`]) and a remote
//! key-value service ([`redis::RedisCache`]).
//!
//! Network errors on the remote variant surface as [`crate::errors::ErrorKind::Transient`];
//! decode failures surface as [`crate::errors::ErrorKind::Corruption`] and
//! must never be retried by the caller.

pub mod memory;
pub mod redis;

use async_trait::async_trait;

use crate::errors::ProxyResult;

/// The Cache contract. Implementors must give read-your-writes on the same
/// key within the process and a best-effort (duplicate-free) `scan`.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn set(&self, key: &str, value: Vec<u8>) -> ProxyResult<()>;

    async fn get(&self, key: &str) -> ProxyResult<Option<Vec<u8>>>;

    async fn delete(&self, key: &str) -> ProxyResult<()>;

    /// Best-effort snapshot of all `(key, value)` pairs whose key starts
    /// with `prefix`. Keys added or removed during the scan may or may not
    /// appear, but no entry is returned twice.
    async fn scan(&self, prefix: &str) -> ProxyResult<Vec<(String, Vec<u8>)>>;
}

pub use memory::InMemoryCache;
pub use redis::RedisCache;
