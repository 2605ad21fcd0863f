//! # Metric service
//!
//! Per-environment aggregation of target and evaluation metrics, flushed to
//! upstream on a schedule with bounded concurrency (§4.5). Delivery is
//! at-most-once: an aggregate that fails to upload is dropped, not retained
//! for a later attempt.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

use crate::auth::RequestContext;
use crate::domain::{EnvironmentId, MetricsBatch};
use crate::errors::ProxyResult;
use crate::token_registry::TokenRegistry;
use crate::upstream::UpstreamClient;

/// Aggregates and periodically flushes per-environment metrics.
#[derive(Clone)]
pub struct MetricService {
    aggregates: Arc<Mutex<HashMap<EnvironmentId, MetricsBatch>>>,
    tokens: TokenRegistry,
    upstream: UpstreamClient,
    flush_concurrency: usize,
    enabled: bool,
}

impl MetricService {
    pub fn new(tokens: TokenRegistry, upstream: UpstreamClient, flush_concurrency: usize, enabled: bool) -> Self {
        Self {
            aggregates: Arc::new(Mutex::new(HashMap::new())),
            tokens,
            upstream,
            flush_concurrency: flush_concurrency.max(1),
            enabled,
        }
    }

    /// Merges `batch` into `env`'s current aggregate. A no-op when metrics
    /// collection is disabled.
    pub async fn store_metrics(&self, env: &str, batch: MetricsBatch) {
        if !self.enabled {
            return;
        }

        let mut aggregates = self.aggregates.lock().await;
        let entry = aggregates.entry(env.to_string()).or_default();

        for target in batch.target_data {
            match entry.target_data.iter_mut().find(|existing| existing.identifier == target.identifier) {
                Some(existing) => *existing = target,
                None => entry.target_data.push(target),
            }
        }
        entry.metrics_data.extend(batch.metrics_data);
    }

    /// Takes the current aggregate map, replaces it with an empty one, and
    /// uploads each environment's aggregate with at most `flush_concurrency`
    /// uploads in flight at once.
    pub async fn flush(&self) {
        let pending = {
            let mut aggregates = self.aggregates.lock().await;
            std::mem::take(&mut *aggregates)
        };

        if pending.is_empty() {
            return;
        }

        let semaphore = Arc::new(Semaphore::new(self.flush_concurrency));
        let mut tasks = Vec::with_capacity(pending.len());

        for (env, batch) in pending {
            let semaphore = semaphore.clone();
            let tokens = self.tokens.clone();
            let upstream = self.upstream.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore is never closed");
                Self::upload_one(&upstream, &tokens, &env, batch).await;
            }));
        }

        for task in tasks {
            let _ = task.await;
        }
    }

    async fn upload_one(upstream: &UpstreamClient, tokens: &TokenRegistry, env: &str, batch: MetricsBatch) {
        let Some(token) = tokens.get(env).await else {
            debug!(environment = env, "skipping flush: no upstream token yet");
            return;
        };

        let context = RequestContext::new(env).with_bearer_token(token);
        let bearer = match context.bearer_token() {
            Ok(bearer) => bearer,
            Err(err) => {
                warn!(environment = env, error = %err, "dropping flush: missing auth context");
                return;
            }
        };

        if let Err(err) = upstream.post_metrics(env, bearer, &batch).await {
            warn!(environment = env, error = %err, "metrics upload failed, aggregate dropped");
        }
    }
}

impl std::fmt::Debug for MetricService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricService")
            .field("flush_concurrency", &self.flush_concurrency)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

#[allow(dead_code)]
fn assert_send_sync<T: Send + Sync>() {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TargetData;

    fn service() -> MetricService {
        MetricService::new(
            TokenRegistry::new(),
            UpstreamClient::new("https://example.com", "admin-token"),
            4,
            true,
        )
    }

    fn target(id: &str, attr: &str) -> TargetData {
        TargetData { identifier: id.into(), attributes: [("k".to_string(), attr.to_string())].into() }
    }

    #[tokio::test]
    async fn store_metrics_is_a_no_op_when_disabled() {
        let service = MetricService::new(
            TokenRegistry::new(),
            UpstreamClient::new("https://example.com", "admin-token"),
            4,
            false,
        );
        service
            .store_metrics("env-A", MetricsBatch { target_data: vec![target("t1", "v1")], metrics_data: vec![] })
            .await;

        let pending = service.aggregates.lock().await;
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn target_data_dedups_by_identifier_last_write_wins() {
        let service = service();
        service
            .store_metrics("env-A", MetricsBatch { target_data: vec![target("t1", "v1")], metrics_data: vec![] })
            .await;
        service
            .store_metrics("env-A", MetricsBatch { target_data: vec![target("t1", "v2")], metrics_data: vec![] })
            .await;

        let aggregates = service.aggregates.lock().await;
        let entry = &aggregates["env-A"];
        assert_eq!(entry.target_data.len(), 1);
        assert_eq!(entry.target_data[0].attributes["k"], "v2");
    }

    #[tokio::test]
    async fn metrics_data_concatenates_without_dedup() {
        use crate::domain::MetricsData;
        let service = service();
        let event = MetricsData { feature_identifier: "f1".into(), variation_identifier: "on".into(), timestamp: 1, count: 1 };
        service
            .store_metrics("env-A", MetricsBatch { target_data: vec![], metrics_data: vec![event.clone(), event] })
            .await;

        let aggregates = service.aggregates.lock().await;
        assert_eq!(aggregates["env-A"].metrics_data.len(), 2);
    }

    #[tokio::test]
    async fn flush_without_token_drops_the_aggregate_without_uploading() {
        let service = service();
        service
            .store_metrics("env-A", MetricsBatch { target_data: vec![target("t1", "v1")], metrics_data: vec![] })
            .await;

        service.flush().await;

        let aggregates = service.aggregates.lock().await;
        assert!(aggregates.is_empty());
    }

    #[tokio::test]
    async fn flush_clears_the_aggregate_map_even_when_empty() {
        let service = service();
        service.flush().await;
        assert!(service.aggregates.lock().await.is_empty());
    }
}
