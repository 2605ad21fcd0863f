//! # Startup bootstrap
//!
//! The one-time admin-surface calls the composition root makes before it
//! will declare the proxy ready: discover environments and auth bindings,
//! then seed the flag/segment/target repositories for every environment this
//! instance is approved to serve (§3's readiness invariant — an environment
//! with no confirmed flag/segment/target snapshot is not exposed at all).

use std::collections::HashSet;

use shared::domain::{AuthBinding, EnvironmentId};
use shared::errors::ProxyResult;
use shared::repository::{FlagRepository, SegmentRepository, TargetRepository};
use shared::retry::with_backoff;
use shared::upstream::UpstreamClient;
use tracing::{info, warn};

/// Bulk-fetches the environment list and auth bindings, retrying transient
/// failures with the shared backoff policy. A failure that survives retries
/// here is the §6 "upstream unreachable at startup" exit condition — the
/// caller maps it to exit code 2.
pub async fn fetch_environments_and_bindings(
    upstream: &UpstreamClient,
) -> ProxyResult<(Vec<EnvironmentId>, Vec<AuthBinding>)> {
    let environments = with_backoff("bulk_fetch_environments", || upstream.bulk_fetch_environments()).await?;
    let bindings = with_backoff("bulk_fetch_bindings", || upstream.bulk_fetch_bindings()).await?;
    Ok((environments, bindings))
}

/// The environments this instance is allowed to serve.
///
/// Resolved from the configured SDK `api_keys`, not a separate config knob
/// (§9 open question: the source config surface has no independent
/// allow-list field, so this proxy derives it from the keys it was actually
/// given — the environments behind its own keys are the ones it has any
/// business fronting). An empty `api_keys` list disables filtering entirely,
/// matching the auth repository's existing "empty set ⇒ unrestricted" rule.
pub fn approved_environments(bindings: &[AuthBinding], api_keys: &[String]) -> HashSet<EnvironmentId> {
    if api_keys.is_empty() {
        return HashSet::new();
    }
    let configured: HashSet<&str> = api_keys.iter().map(String::as_str).collect();
    bindings
        .iter()
        .filter(|binding| configured.contains(binding.api_key.as_str()))
        .map(|binding| binding.environment.clone())
        .collect()
}

/// The first configured API key bound to `environment`, used by the
/// Refresher to (re)authenticate against upstream for that environment.
pub fn api_key_for_environment(bindings: &[AuthBinding], environment: &str) -> Option<String> {
    bindings.iter().find(|binding| binding.environment == environment).map(|binding| binding.api_key.clone())
}

/// Seeds the flag/segment/target repositories for `env`, retrying each
/// bulk fetch with the shared backoff policy.
///
/// Returns `Err` if any of the three fetches never succeeds — the caller
/// drops the environment from the serving set rather than declare it ready
/// with a partial snapshot.
pub async fn seed_environment(
    upstream: &UpstreamClient,
    flags: &FlagRepository,
    segments: &SegmentRepository,
    targets: &TargetRepository,
    env: &str,
) -> ProxyResult<()> {
    let fetched_flags = with_backoff("seed_flags", || upstream.bulk_fetch_flags(env, std::time::Duration::from_secs(30))).await?;
    let fetched_segments =
        with_backoff("seed_segments", || upstream.bulk_fetch_segments(env, std::time::Duration::from_secs(30))).await?;
    let fetched_targets =
        with_backoff("seed_targets", || upstream.bulk_fetch_targets(env, std::time::Duration::from_secs(30))).await?;

    flags.setup(env, fetched_flags).await?;
    segments.setup(env, fetched_segments).await?;
    targets.setup(env, fetched_targets).await?;

    info!(environment = env, "seeded flag/segment/target repositories");
    Ok(())
}

/// Seeds every environment, dropping (with a warning) any that fail after
/// retries so the readiness invariant holds for whatever remains.
pub async fn seed_all(
    upstream: &UpstreamClient,
    flags: &FlagRepository,
    segments: &SegmentRepository,
    targets: &TargetRepository,
    environments: &[EnvironmentId],
) -> Vec<EnvironmentId> {
    let mut ready = Vec::with_capacity(environments.len());
    for env in environments {
        match seed_environment(upstream, flags, segments, targets, env).await {
            Ok(()) => ready.push(env.clone()),
            Err(err) => warn!(environment = env, error = %err, "dropping environment: failed to seed after retries"),
        }
    }
    ready
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(api_key: &str, env: &str) -> AuthBinding {
        AuthBinding { api_key: api_key.to_string(), environment: env.to_string() }
    }

    #[test]
    fn approved_environments_is_unrestricted_when_no_api_keys_configured() {
        let bindings = vec![binding("apikey-foo", "env-A"), binding("apikey-bar", "env-B")];
        assert!(approved_environments(&bindings, &[]).is_empty());
    }

    #[test]
    fn approved_environments_keeps_only_environments_behind_configured_keys() {
        let bindings = vec![binding("apikey-foo", "env-A"), binding("apikey-bar", "env-B")];
        let approved = approved_environments(&bindings, &["apikey-foo".to_string()]);
        assert_eq!(approved, ["env-A".to_string()].into_iter().collect());
    }

    #[test]
    fn api_key_for_environment_finds_the_bound_key() {
        let bindings = vec![binding("apikey-foo", "env-A")];
        assert_eq!(api_key_for_environment(&bindings, "env-A"), Some("apikey-foo".to_string()));
    }

    #[test]
    fn api_key_for_environment_is_none_for_an_unbound_environment() {
        let bindings = vec![binding("apikey-foo", "env-A")];
        assert_eq!(api_key_for_environment(&bindings, "env-Z"), None);
    }

    #[tokio::test]
    async fn seed_all_drops_environments_that_fail_to_seed() {
        use shared::cache::InMemoryCache;
        use std::sync::Arc;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/env/env-A/feature-configs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<shared::domain::FeatureFlag>::new()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/admin/env/env-A/target-segments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<shared::domain::Segment>::new()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/admin/env/env-A/targets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<shared::domain::Target>::new()))
            .mount(&server)
            .await;
        // env-B's feature-configs endpoint is left unmocked: wiremock returns 404,
        // which seed_environment's retry policy treats as non-retryable and fails fast.
        Mock::given(method("GET"))
            .and(path("/admin/env/env-B/feature-configs"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let upstream = UpstreamClient::new(server.uri(), "admin-token");
        let cache: Arc<dyn shared::cache::Cache> = Arc::new(InMemoryCache::new());
        let flags = FlagRepository::new(cache.clone());
        let segments = SegmentRepository::new(cache.clone());
        let targets = TargetRepository::new(cache.clone());

        let served = seed_all(
            &upstream,
            &flags,
            &segments,
            &targets,
            &["env-A".to_string(), "env-B".to_string()],
        )
        .await;

        assert_eq!(served, vec!["env-A".to_string()]);
    }
}
