//! # Upstream client
//!
//! The single outbound HTTP/SSE client the Refresher and Metric service use
//! to talk to the control plane (§4.3, §6). Every call here carries the
//! deadline specified by §5; retryable failures are classified the same way
//! Cache's remote variant classifies them, so the backoff policy in
//! [`crate::retry`] is shared rather than duplicated per caller.
//!
//! The admin/client API stubs this would normally be generated from are an
//! external collaborator (§9); this client hand-writes the thin wrapper
//! calls the core actually needs.

use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use reqwest::{Response, StatusCode};
use tracing::debug;

use crate::domain::{AuthBinding, EnvironmentId, FeatureFlag, Segment, StreamEvent, Target};
use crate::errors::{ProxyError, ProxyResult};

/// Metric-post timeout (§5): every metrics upload carries a 15s deadline.
const METRIC_POST_TIMEOUT: Duration = Duration::from_secs(15);

/// Thin wrapper over the control-plane admin and client HTTP/SSE surface.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    admin_service_token: String,
}

impl UpstreamClient {
    pub fn new(base_url: impl Into<String>, admin_service_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            admin_service_token: admin_service_token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    // =========================================================================
    // Admin: bulk fetch
    // =========================================================================

    pub async fn bulk_fetch_environments(&self) -> ProxyResult<Vec<EnvironmentId>> {
        self.get_json(&self.url("/admin/environments"), Duration::from_secs(30), &self.admin_service_token)
            .await
    }

    pub async fn bulk_fetch_bindings(&self) -> ProxyResult<Vec<AuthBinding>> {
        self.get_json(&self.url("/admin/api-keys"), Duration::from_secs(30), &self.admin_service_token).await
    }

    pub async fn bulk_fetch_flags(&self, env: &str, timeout: Duration) -> ProxyResult<Vec<FeatureFlag>> {
        let path = format!("/admin/env/{env}/feature-configs");
        self.get_json(&self.url(&path), timeout, &self.admin_service_token).await
    }

    pub async fn bulk_fetch_segments(&self, env: &str, timeout: Duration) -> ProxyResult<Vec<Segment>> {
        let path = format!("/admin/env/{env}/target-segments");
        self.get_json(&self.url(&path), timeout, &self.admin_service_token).await
    }

    pub async fn bulk_fetch_targets(&self, env: &str, timeout: Duration) -> ProxyResult<Vec<Target>> {
        let path = format!("/admin/env/{env}/targets");
        self.get_json(&self.url(&path), timeout, &self.admin_service_token).await
    }

    // =========================================================================
    // Authoritative fetch-by-id (§4.3 event application)
    // =========================================================================

    pub async fn fetch_flag(&self, env: &str, id: &str) -> ProxyResult<FeatureFlag> {
        let path = format!("/admin/env/{env}/feature-configs/{id}");
        self.get_json(&self.url(&path), Duration::from_secs(10), &self.admin_service_token).await
    }

    pub async fn fetch_segment(&self, env: &str, id: &str) -> ProxyResult<Segment> {
        let path = format!("/admin/env/{env}/target-segments/{id}");
        self.get_json(&self.url(&path), Duration::from_secs(10), &self.admin_service_token).await
    }

    pub async fn fetch_target(&self, env: &str, id: &str) -> ProxyResult<Target> {
        let path = format!("/admin/env/{env}/targets/{id}");
        self.get_json(&self.url(&path), Duration::from_secs(10), &self.admin_service_token).await
    }

    // =========================================================================
    // Client: authenticate against upstream (re-auth for the Token registry)
    // =========================================================================

    pub async fn authenticate(&self, api_key: &str) -> ProxyResult<String> {
        #[derive(serde::Serialize)]
        struct Req<'a> {
            api_key: &'a str,
        }
        #[derive(serde::Deserialize)]
        struct Resp {
            auth_token: String,
        }

        let response = tokio::time::timeout(
            Duration::from_secs(10),
            self.http.post(self.url("/client/auth")).json(&Req { api_key }).send(),
        )
        .await
        .map_err(|_| ProxyError::Timeout)?
        .map_err(ProxyError::Transport)?;

        let resp: Resp = Self::check_and_parse(response).await?;
        Ok(resp.auth_token)
    }

    // =========================================================================
    // Client: stream
    // =========================================================================

    /// Opens the change-event stream, with the heartbeat interval as the
    /// idle timeout between deliveries (stream reads, not the whole
    /// connection) — expressed here as the request's connect/first-byte
    /// deadline; idle-silence detection happens in the Refresher's own
    /// timer loop since it must span in-flight reconnects.
    pub async fn open_stream(
        &self,
        env: &str,
    ) -> ProxyResult<impl Stream<Item = ProxyResult<StreamEvent>>> {
        let path = format!("/client/env/{env}/stream");
        let response = self
            .http
            .get(self.url(&path))
            .bearer_auth(&self.admin_service_token)
            .send()
            .await
            .map_err(ProxyError::Transport)?;

        let response = Self::check_status(response)?;

        let stream = response.bytes_stream().eventsource().map(|event| match event {
            Ok(event) => serde_json::from_str::<StreamEvent>(&event.data).map_err(ProxyError::Decode),
            Err(err) => {
                debug!(error = %err, "stream frame error");
                Err(ProxyError::Timeout)
            }
        });

        Ok(stream)
    }

    // =========================================================================
    // Client: metrics post
    // =========================================================================

    /// `POST /metrics/<env>` with a `Bearer <token>` header, 15s deadline (§5).
    pub async fn post_metrics(
        &self,
        env: &str,
        token: &str,
        batch: &crate::domain::MetricsBatch,
    ) -> ProxyResult<()> {
        let path = format!("/metrics/{env}");
        let response = tokio::time::timeout(
            METRIC_POST_TIMEOUT,
            self.http.post(self.url(&path)).bearer_auth(token).json(batch).send(),
        )
        .await
        .map_err(|_| ProxyError::Timeout)?
        .map_err(ProxyError::Transport)?;

        Self::check_status(response)?;
        Ok(())
    }

    // =========================================================================
    // Shared request plumbing
    // =========================================================================

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        timeout: Duration,
        bearer: &str,
    ) -> ProxyResult<T> {
        let response = tokio::time::timeout(timeout, self.http.get(url).bearer_auth(bearer).send())
            .await
            .map_err(|_| ProxyError::Timeout)?
            .map_err(ProxyError::Transport)?;

        Self::check_and_parse(response).await
    }

    async fn check_and_parse<T: serde::de::DeserializeOwned>(response: Response) -> ProxyResult<T> {
        let response = Self::check_status(response)?;
        response.json::<T>().await.map_err(ProxyError::Transport)
    }

    /// Maps non-2xx upstream responses onto the six error kinds (§7):
    /// 401 and 404 surface verbatim as Unauthorized/NotFound, everything
    /// else (429, 5xx, connection-level failures already mapped upstream)
    /// is Transient and retryable by the caller.
    fn check_status(response: Response) -> ProxyResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        match status {
            StatusCode::UNAUTHORIZED => Err(ProxyError::UnknownApiKey),
            StatusCode::NOT_FOUND => Err(ProxyError::NotFound(response.url().path().to_string())),
            _ => Err(ProxyError::UpstreamServerError(status.as_u16())),
        }
    }
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClient").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}
