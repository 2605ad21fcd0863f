//! Auth repository: API key → environment bindings, filtered by an optional
//! startup allow-list (§4.2).

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::cache::Cache;
use crate::codec::Encodable;
use crate::domain::{auth_binding_key, ApiKey, AuthBinding, EnvironmentId};
use crate::errors::{ProxyError, ProxyResult};

/// Typed view over the cache for auth bindings, with environment-allow-list
/// filtering applied at load time rather than at query time (§3 invariants).
#[derive(Clone)]
pub struct AuthRepository {
    cache: Arc<dyn Cache>,
    approved_environments: HashSet<EnvironmentId>,
}

impl AuthRepository {
    pub fn new(cache: Arc<dyn Cache>, approved_environments: HashSet<EnvironmentId>) -> Self {
        Self { cache, approved_environments }
    }

    /// Seeds the repository with a bulk fetch result. Bindings whose
    /// environment is not in a non-empty allow-list are dropped silently
    /// (logged at debug) and never become visible to any caller.
    pub async fn bulk_load(
        cache: Arc<dyn Cache>,
        approved_environments: HashSet<EnvironmentId>,
        bindings: Vec<AuthBinding>,
    ) -> ProxyResult<Self> {
        let repo = Self::new(cache, approved_environments);
        for binding in bindings {
            repo.add(binding).await?;
        }
        Ok(repo)
    }

    fn is_approved(&self, environment: &str) -> bool {
        self.approved_environments.is_empty() || self.approved_environments.contains(environment)
    }

    /// Looks up the environment for an API key. Returns `NotFound` both when
    /// the key is unknown and when its environment has since fallen outside
    /// the approved set.
    pub async fn get(&self, api_key: &ApiKey) -> ProxyResult<EnvironmentId> {
        let key = auth_binding_key(api_key);
        let bytes = self
            .cache
            .get(&key)
            .await?
            .ok_or_else(|| ProxyError::NotFound(format!("auth binding {api_key}")))?;
        let binding = AuthBinding::decode(&bytes)?;

        if !self.is_approved(&binding.environment) {
            return Err(ProxyError::NotFound(format!("auth binding {api_key}")));
        }
        Ok(binding.environment)
    }

    /// Adds (or replaces) a binding. A binding for an environment outside a
    /// non-empty allow-list has no effect unless the allow-list is later
    /// reconfigured.
    pub async fn add(&self, binding: AuthBinding) -> ProxyResult<()> {
        if !self.is_approved(&binding.environment) {
            debug!(
                api_key = %binding.api_key,
                environment = %binding.environment,
                "dropping auth binding outside approved environments"
            );
            return Ok(());
        }
        let key = auth_binding_key(&binding.api_key);
        self.cache.set(&key, binding.encode()?).await
    }

    pub async fn remove(&self, api_key: &ApiKey) -> ProxyResult<()> {
        self.cache.delete(&auth_binding_key(api_key)).await
    }

    /// All bindings currently visible under the allow-list. Requires the
    /// underlying cache to support prefix scanning.
    pub async fn get_all(&self) -> ProxyResult<Vec<AuthBinding>> {
        let entries = self.cache.scan("auth-key-").await?;
        let mut bindings = Vec::with_capacity(entries.len());
        for (_, bytes) in entries {
            let binding = AuthBinding::decode(&bytes)?;
            if self.is_approved(&binding.environment) {
                bindings.push(binding);
            }
        }
        Ok(bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;

    fn binding(api_key: &str, env: &str) -> AuthBinding {
        AuthBinding { api_key: api_key.to_string(), environment: env.to_string() }
    }

    #[tokio::test]
    async fn auth_happy_path_with_empty_allow_list() {
        let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
        let repo =
            AuthRepository::bulk_load(cache, HashSet::new(), vec![binding("apikey-foo", "env-A")])
                .await
                .unwrap();

        assert_eq!(repo.get(&"apikey-foo".to_string()).await.unwrap(), "env-A");
    }

    #[tokio::test]
    async fn allow_list_filter_hides_bindings_outside_it() {
        let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
        let approved: HashSet<EnvironmentId> = ["env-A".to_string()].into_iter().collect();
        let repo = AuthRepository::bulk_load(
            cache,
            approved,
            vec![binding("apikey-foo", "env-A"), binding("apikey-bar", "env-B")],
        )
        .await
        .unwrap();

        assert!(repo.get(&"apikey-bar".to_string()).await.is_err());
        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].api_key, "apikey-foo");
    }

    #[tokio::test]
    async fn add_after_drop_has_no_effect_unless_reconfigured() {
        let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
        let approved: HashSet<EnvironmentId> = ["env-A".to_string()].into_iter().collect();
        let repo = AuthRepository::new(cache, approved);

        repo.add(binding("apikey-bar", "env-B")).await.unwrap();
        assert!(repo.get(&"apikey-bar".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn remove_deletes_the_binding() {
        let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
        let repo =
            AuthRepository::bulk_load(cache, HashSet::new(), vec![binding("apikey-foo", "env-A")])
                .await
                .unwrap();

        repo.remove(&"apikey-foo".to_string()).await.unwrap();
        assert!(repo.get(&"apikey-foo".to_string()).await.is_err());
    }
}
