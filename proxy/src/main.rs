//! # Flag Proxy - Composition Root
//!
//! The on-premise feature-flag relay proxy's process entry point. Wires the
//! core data-plane components from `shared` into a running instance: cache,
//! repositories, auth service, token registry, metric service and one
//! Refresher per served environment.
//!
//! ## What this binary is NOT
//!
//! HTTP route wiring for the SDK-facing surface (`/client/auth`,
//! `/client/env/{env}/feature-configs`, `/stream`, …), CLI flag parsing, TLS
//! termination, and offline-config dump/load are all external collaborators
//! per the core's scope — this binary starts the data plane and keeps it
//! fresh, nothing more. A production deployment layers a router on top of
//! the repositories and services constructed here.
//!
//! ## Initialization Sequence
//!
//! 1. Load configuration from the environment.
//! 2. Initialize structured logging.
//! 3. Construct the Cache (in-memory, or remote when `redis` settings are present).
//! 4. Construct the upstream client and discover environments + auth bindings.
//! 5. Seed the flag/segment/target repositories for every environment this
//!    instance is approved to serve, dropping any that fail after retries.
//! 6. Construct the auth repository, auth service, token registry and metric service.
//! 7. Spawn one Refresher per served environment, the metric-flush loop, and the heartbeat.
//! 8. Wait for a shutdown signal, cancel every loop, and exit.
//!
//! ## Exit Codes (§6)
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Normal shutdown |
//! | 1 | Configuration error |
//! | 2 | Upstream unreachable at startup after bounded retries |

mod bootstrap;
mod exit_code;

use std::collections::HashSet;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use exit_code::ProxyExit;
use shared::auth::{AuthService, JwtService};
use shared::cache::{Cache, InMemoryCache, RedisCache};
use shared::config::ProxyConfig;
use shared::metrics::MetricService;
use shared::refresher::Refresher;
use shared::repository::{AuthRepository, FlagRepository, SegmentRepository, TargetRepository};
use shared::token_registry::TokenRegistry;
use shared::tracing_config::init_tracing;
use shared::upstream::UpstreamClient;

const JWT_ISSUER: &str = "flag-proxy";
const JWT_TTL_SECONDS: u64 = 900;

#[tokio::main]
async fn main() -> ExitCode {
    // ─────────────────────────────────────────────────────────────────
    // Step 1: Load configuration
    // ─────────────────────────────────────────────────────────────────
    let config = match ProxyConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            // Tracing isn't initialized yet; a config error is always
            // fatal-before-logging, so this is the one place we print
            // directly rather than through the subscriber.
            eprintln!("configuration error: {err}");
            return ProxyExit::ConfigError.into();
        }
    };

    // ─────────────────────────────────────────────────────────────────
    // Step 2: Initialize structured logging
    // ─────────────────────────────────────────────────────────────────
    let is_production = !config.bypass_auth;
    init_tracing("flag-proxy", is_production);

    info!(
        account = %config.account_identifier,
        org = %config.org_identifier,
        remote_cache = config.uses_remote_cache(),
        "starting flag proxy"
    );

    run(config).await.unwrap_or_else(|exit| exit).into()
}

async fn run(config: ProxyConfig) -> Result<ProxyExit, ProxyExit> {
    // ─────────────────────────────────────────────────────────────────
    // Step 3: Construct the cache
    // ─────────────────────────────────────────────────────────────────
    let cache: Arc<dyn Cache> = match &config.redis {
        Some(settings) => match RedisCache::connect(settings).await {
            Ok(cache) => Arc::new(cache),
            Err(err) => {
                error!(error = %err, "failed to connect to remote cache");
                return Err(ProxyExit::UpstreamUnreachable);
            }
        },
        None => Arc::new(InMemoryCache::new()),
    };

    // ─────────────────────────────────────────────────────────────────
    // Step 4: Discover environments and auth bindings
    // ─────────────────────────────────────────────────────────────────
    let upstream = UpstreamClient::new(config.upstream_url.clone(), config.admin_service_token.clone());

    let (environments, bindings) = match bootstrap::fetch_environments_and_bindings(&upstream).await {
        Ok(result) => result,
        Err(err) => {
            error!(error = %err, "upstream unreachable at startup after bounded retries");
            return Err(ProxyExit::UpstreamUnreachable);
        }
    };
    let approved = bootstrap::approved_environments(&bindings, &config.api_keys);
    let served_candidates: Vec<String> = if approved.is_empty() {
        environments
    } else {
        environments.into_iter().filter(|env| approved.contains(env)).collect()
    };

    // ─────────────────────────────────────────────────────────────────
    // Step 5: Seed repositories for every servable environment
    // ─────────────────────────────────────────────────────────────────
    let flags = FlagRepository::new(cache.clone());
    let segments = SegmentRepository::new(cache.clone());
    let targets = TargetRepository::new(cache.clone());

    let served = bootstrap::seed_all(&upstream, &flags, &segments, &targets, &served_candidates).await;
    if served.is_empty() && !served_candidates.is_empty() {
        warn!("no environment could be seeded; serving with an empty environment set");
    }
    let served_set: HashSet<String> = served.iter().cloned().collect();
    let served_bindings: Vec<_> = bindings.into_iter().filter(|b| served_set.contains(&b.environment)).collect();

    // ─────────────────────────────────────────────────────────────────
    // Step 6: Auth service, token registry, metric service
    // ─────────────────────────────────────────────────────────────────
    let auth_repository =
        match AuthRepository::bulk_load(cache.clone(), served_set.clone(), served_bindings.clone()).await {
            Ok(repo) => repo,
            Err(err) => {
                error!(error = %err, "failed to seed auth repository");
                return Err(ProxyExit::UpstreamUnreachable);
            }
        };

    let jwt = Arc::new(JwtService::new(&config.auth_secret, JWT_ISSUER, JWT_TTL_SECONDS));
    // Constructed here because it is part of the data plane this binary owns;
    // a router layered on top reaches it through this handle rather than
    // re-deriving it. No route wiring exists in this binary to call it yet.
    let _auth_service = AuthService::new(auth_repository, jwt, config.bypass_auth);

    let tokens = TokenRegistry::new();
    let metrics_enabled = !config.metric_post_duration.is_zero();
    let metrics = MetricService::new(tokens.clone(), upstream.clone(), config.flush_concurrency, metrics_enabled);

    // ─────────────────────────────────────────────────────────────────
    // Step 7: Spawn the long-lived loops
    // ─────────────────────────────────────────────────────────────────
    let shutdown = CancellationToken::new();
    let mut tasks = Vec::new();

    for env in &served {
        let Some(api_key) = bootstrap::api_key_for_environment(&served_bindings, env) else {
            warn!(environment = env, "no api key bound to environment; skipping refresher");
            continue;
        };
        let refresher = Arc::new(Refresher::new(
            env.clone(),
            api_key,
            upstream.clone(),
            flags.clone(),
            segments.clone(),
            targets.clone(),
            tokens.clone(),
            config.flag_stream_enabled,
            config.flag_poll_interval,
            config.target_poll_duration,
            config.heartbeat_interval,
        ));
        let shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move { refresher.run(shutdown).await }));
    }

    if metrics_enabled {
        let metrics = metrics.clone();
        let shutdown = shutdown.clone();
        let interval = config.metric_post_duration;
        tasks.push(tokio::spawn(async move { run_metric_flush_loop(metrics, interval, shutdown).await }));
    }

    if !config.heartbeat_interval.is_zero() {
        let cache = cache.clone();
        let shutdown_hb = shutdown.clone();
        let interval = config.heartbeat_interval;
        tasks.push(tokio::spawn(async move {
            shared::heartbeat::run(interval, shutdown_hb, move || {
                let cache = cache.clone();
                async move { cache.get("__heartbeat__").await.map(|_| ()) }
            })
            .await
        }));
    }

    info!(environments = served.len(), "flag proxy ready");

    // ─────────────────────────────────────────────────────────────────
    // Step 8: Wait for shutdown, tear down every loop
    // ─────────────────────────────────────────────────────────────────
    wait_for_shutdown_signal().await;
    info!("shutdown signal received, stopping loops");
    shutdown.cancel();

    for task in tasks {
        let _ = task.await;
    }

    info!("flag proxy stopped");
    Ok(ProxyExit::Normal)
}

async fn run_metric_flush_loop(metrics: MetricService, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => metrics.flush().await,
        }
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        signal.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
