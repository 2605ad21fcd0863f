//! In-process cache variant: a mutex-guarded map.
//!
//! Reads after a completed `set` on the same key observe the new value
//! (read-your-writes) because the whole operation happens under one lock.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::Cache;
use crate::errors::ProxyResult;

/// Mutex-guarded in-memory map implementing the [`Cache`] contract.
///
/// Cheap to clone: the map lives behind an `Arc`.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    store: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn set(&self, key: &str, value: Vec<u8>) -> ProxyResult<()> {
        let mut store = self.store.lock().await;
        store.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> ProxyResult<Option<Vec<u8>>> {
        let store = self.store.lock().await;
        Ok(store.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> ProxyResult<()> {
        let mut store = self.store.lock().await;
        store.remove(key);
        Ok(())
    }

    async fn scan(&self, prefix: &str) -> ProxyResult<Vec<(String, Vec<u8>)>> {
        let store = self.store.lock().await;
        Ok(store
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

impl std::fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCache").finish_non_exhaustive()
    }
}
