//! # Repositories
//!
//! One repository per entity, each a typed view over the [`Cache`] (§4.2).
//! Bulk load performs a single write-through with the full seed; subsequent
//! `add` is incremental. `setup` replaces an environment's entire set
//! atomically from the reader's perspective.
//!
//! [`EntityRepository`] implements the shape shared by flags, segments and
//! targets; the auth repository has its own allow-list filtering behavior
//! and lives in [`auth_repository`].

pub mod auth_repository;

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::Cache;
use crate::codec::Encodable;
use crate::domain::{EntityKeyed, EnvironmentId, FeatureFlag, Segment, Target, Versioned};
use crate::errors::{ProxyError, ProxyResult};

pub use auth_repository::AuthRepository;

/// A typed view over the cache for one entity kind, scoped per environment.
pub struct EntityRepository<T> {
    cache: Arc<dyn Cache>,
    _marker: std::marker::PhantomData<T>,
}

impl<T> Clone for EntityRepository<T> {
    fn clone(&self) -> Self {
        Self { cache: self.cache.clone(), _marker: std::marker::PhantomData }
    }
}

impl<T> EntityRepository<T>
where
    T: Encodable + Clone + Versioned + EntityKeyed,
{
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache, _marker: std::marker::PhantomData }
    }

    /// Seeds the repository at construction time with a bulk fetch result,
    /// one write-through per environment.
    pub async fn bulk_load(
        cache: Arc<dyn Cache>,
        seed: HashMap<EnvironmentId, Vec<T>>,
    ) -> ProxyResult<Self> {
        let repo = Self::new(cache);
        for (env, entities) in seed {
            repo.setup(&env, entities).await?;
        }
        Ok(repo)
    }

    /// Replaces an environment's entire entity set atomically: a reader
    /// observes either all prior entries or all new ones, never a mix.
    pub async fn setup(&self, env: &str, entities: Vec<T>) -> ProxyResult<()> {
        let bytes = entities.encode()?;
        self.cache.set(&T::cache_key(env), bytes).await
    }

    pub async fn get(&self, env: &str, id: &str) -> ProxyResult<T> {
        let all = self.get_all(env).await?;
        all.into_iter()
            .find(|entity| entity.id() == id)
            .ok_or_else(|| ProxyError::NotFound(format!("{id} in {env}")))
    }

    pub async fn get_all(&self, env: &str) -> ProxyResult<Vec<T>> {
        match self.cache.get(&T::cache_key(env)).await? {
            Some(bytes) => Vec::<T>::decode(&bytes),
            None => Ok(Vec::new()),
        }
    }

    /// Incremental upsert: replaces the entity with a matching id, or
    /// appends it if no such entity exists yet.
    ///
    /// Applies the anti-reorder rule from §4.3: an incoming entity whose
    /// version is lower than the currently cached version is discarded.
    pub async fn add(&self, env: &str, entity: T) -> ProxyResult<()> {
        let mut all = self.get_all(env).await?;
        match all.iter().position(|existing| existing.id() == entity.id()) {
            Some(idx) => {
                if entity.version() < all[idx].version() {
                    return Ok(());
                }
                all[idx] = entity;
            }
            None => all.push(entity),
        }
        self.setup(env, all).await
    }

    /// Removes an entity by id. Deletions always win regardless of version
    /// (§4.3): there is no anti-reorder check here.
    pub async fn remove(&self, env: &str, id: &str) -> ProxyResult<()> {
        let mut all = self.get_all(env).await?;
        all.retain(|entity| entity.id() != id);
        self.setup(env, all).await
    }
}

pub type FlagRepository = EntityRepository<FeatureFlag>;
pub type SegmentRepository = EntityRepository<Segment>;
pub type TargetRepository = EntityRepository<Target>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;

    fn flag(id: &str, version: u64) -> FeatureFlag {
        FeatureFlag {
            identifier: id.to_string(),
            enabled: true,
            default_variations: vec!["on".into()],
            rule_segment_ids: vec![],
            version,
        }
    }

    #[tokio::test]
    async fn setup_then_get_all_round_trips() {
        let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
        let repo: FlagRepository = EntityRepository::new(cache);
        repo.setup("env-A", vec![flag("f1", 1), flag("f2", 1)]).await.unwrap();

        let all = repo.get_all("env-A").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(repo.get("env-A", "f1").await.unwrap().identifier, "f1");
    }

    #[tokio::test]
    async fn get_of_missing_id_is_not_found() {
        let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
        let repo: FlagRepository = EntityRepository::new(cache);
        repo.setup("env-A", vec![flag("f1", 1)]).await.unwrap();

        let err = repo.get("env-A", "missing").await.unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn add_appends_new_entity() {
        let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
        let repo: FlagRepository = EntityRepository::new(cache);
        repo.setup("env-A", vec![flag("f1", 1)]).await.unwrap();
        repo.add("env-A", flag("f2", 1)).await.unwrap();

        assert_eq!(repo.get_all("env-A").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn add_discards_lower_version_anti_reorder() {
        let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
        let repo: FlagRepository = EntityRepository::new(cache);
        repo.setup("env-A", vec![flag("f1", 5)]).await.unwrap();

        repo.add("env-A", flag("f1", 3)).await.unwrap();
        assert_eq!(repo.get("env-A", "f1").await.unwrap().version, 5);

        repo.add("env-A", flag("f1", 7)).await.unwrap();
        assert_eq!(repo.get("env-A", "f1").await.unwrap().version, 7);
    }

    #[tokio::test]
    async fn remove_always_wins_regardless_of_version() {
        let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
        let repo: FlagRepository = EntityRepository::new(cache);
        repo.setup("env-A", vec![flag("f1", 99)]).await.unwrap();

        repo.remove("env-A", "f1").await.unwrap();
        assert!(repo.get_all("env-A").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn setup_replaces_the_whole_set_atomically() {
        let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
        let repo: FlagRepository = EntityRepository::new(cache);
        repo.setup("env-A", vec![flag("f1", 1), flag("f2", 1)]).await.unwrap();
        repo.setup("env-A", vec![flag("f3", 1)]).await.unwrap();

        let all = repo.get_all("env-A").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].identifier, "f3");
    }
}
