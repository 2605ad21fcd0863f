//! # Token registry
//!
//! A small mutex-guarded map from environment to the bearer token the
//! Refresher most recently obtained for it, consumed by the Metric service
//! when it flushes that environment's aggregate (§4.5, §9). A missing entry
//! is an ordinary state — the environment just hasn't completed its first
//! handshake yet — not a bug, so readers skip rather than error.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::domain::EnvironmentId;

#[derive(Clone, Default)]
pub struct TokenRegistry {
    tokens: Arc<RwLock<HashMap<EnvironmentId, String>>>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records or replaces the token held for `environment`.
    pub async fn set(&self, environment: &str, token: String) {
        self.tokens.write().await.insert(environment.to_string(), token);
    }

    /// Returns the token held for `environment`, if the Refresher has
    /// completed a handshake for it yet.
    pub async fn get(&self, environment: &str) -> Option<String> {
        self.tokens.read().await.get(environment).cloned()
    }

    pub async fn remove(&self, environment: &str) {
        self.tokens.write().await.remove(environment);
    }
}

impl std::fmt::Debug for TokenRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_environment_returns_none() {
        let registry = TokenRegistry::new();
        assert_eq!(registry.get("env-A").await, None);
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let registry = TokenRegistry::new();
        registry.set("env-A", "token-123".into()).await;
        assert_eq!(registry.get("env-A").await, Some("token-123".to_string()));
    }

    #[tokio::test]
    async fn set_replaces_the_previous_token() {
        let registry = TokenRegistry::new();
        registry.set("env-A", "old".into()).await;
        registry.set("env-A", "new".into()).await;
        assert_eq!(registry.get("env-A").await, Some("new".to_string()));
    }

    #[tokio::test]
    async fn remove_clears_the_entry() {
        let registry = TokenRegistry::new();
        registry.set("env-A", "token-123".into()).await;
        registry.remove("env-A").await;
        assert_eq!(registry.get("env-A").await, None);
    }
}
