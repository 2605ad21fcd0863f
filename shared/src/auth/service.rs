//! # Auth service
//!
//! API-key → environment handshake, JWT issuance/verification, and a
//! `bypass-auth` development mode (§4.4).

use std::sync::Arc;

use tracing::warn;

use super::jwt::JwtService;
use crate::domain::ApiKey;
use crate::errors::{ProxyError, ProxyResult};
use crate::repository::AuthRepository;

/// Authenticates SDK handshakes and verifies issued tokens.
#[derive(Clone)]
pub struct AuthService {
    repository: AuthRepository,
    jwt: Arc<JwtService>,
    bypass_auth: bool,
}

impl AuthService {
    pub fn new(repository: AuthRepository, jwt: Arc<JwtService>, bypass_auth: bool) -> Self {
        Self { repository, jwt, bypass_auth }
    }

    /// Looks up the binding for `api_key` and mints a JWT for its
    /// environment. In `bypass_auth` mode, returns a synthetic environment
    /// derived from the first binding instead of failing closed.
    pub async fn authenticate(&self, api_key: &ApiKey) -> ProxyResult<String> {
        if self.bypass_auth {
            warn!("bypass-auth enabled: skipping api key verification");
            let environment = self.first_environment().await?;
            return self.jwt.mint(&environment);
        }

        let environment = self.repository.get(api_key).await.map_err(|err| match err.kind() {
            crate::errors::ErrorKind::NotFound => ProxyError::UnknownApiKey,
            _ => err,
        })?;
        self.jwt.mint(&environment)
    }

    /// Verifies a previously-issued token and returns its environment claim.
    ///
    /// Bypass mode does not change verification: tokens minted in that mode
    /// are still real, signed JWTs.
    pub fn verify(&self, token: &str) -> ProxyResult<String> {
        self.jwt.verify(token)
    }

    async fn first_environment(&self) -> ProxyResult<String> {
        self.repository
            .get_all()
            .await?
            .into_iter()
            .next()
            .map(|binding| binding.environment)
            .ok_or_else(|| ProxyError::Fatal("bypass-auth enabled with no auth bindings seeded".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, InMemoryCache};
    use crate::domain::AuthBinding;
    use std::collections::HashSet;

    async fn repo_with(bindings: Vec<AuthBinding>) -> AuthRepository {
        let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
        AuthRepository::bulk_load(cache, HashSet::new(), bindings).await.unwrap()
    }

    fn jwt() -> Arc<JwtService> {
        Arc::new(JwtService::new("test_secret_key_minimum_32_chars_required", "flag-proxy", 900))
    }

    #[tokio::test]
    async fn authenticate_happy_path_mints_a_token_for_the_bound_environment() {
        let repo = repo_with(vec![AuthBinding {
            api_key: "apikey-foo".into(),
            environment: "env-A".into(),
        }])
        .await;
        let service = AuthService::new(repo, jwt(), false);

        let token = service.authenticate(&"apikey-foo".to_string()).await.unwrap();
        assert_eq!(service.verify(&token).unwrap(), "env-A");
    }

    #[tokio::test]
    async fn authenticate_with_unknown_key_is_unauthorized() {
        let repo = repo_with(vec![]).await;
        let service = AuthService::new(repo, jwt(), false);

        let err = service.authenticate(&"missing".to_string()).await.unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn bypass_auth_mints_a_token_for_the_first_seeded_environment() {
        let repo = repo_with(vec![AuthBinding {
            api_key: "apikey-foo".into(),
            environment: "env-A".into(),
        }])
        .await;
        let service = AuthService::new(repo, jwt(), true);

        let token = service.authenticate(&"anything-at-all".to_string()).await.unwrap();
        assert_eq!(service.verify(&token).unwrap(), "env-A");
    }

    #[tokio::test]
    async fn bypass_auth_with_no_bindings_is_fatal() {
        let repo = repo_with(vec![]).await;
        let service = AuthService::new(repo, jwt(), true);

        let err = service.authenticate(&"anything".to_string()).await.unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Fatal);
    }
}
