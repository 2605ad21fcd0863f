//! # Proxy Configuration
//!
//! Centralized configuration management using environment variables.
//!
//! ## How It Works
//!
//! Configuration is loaded from multiple sources in order of precedence:
//!
//! 1. **Default values** - sensible defaults for local development
//! 2. **`.env` file** - local overrides (git-ignored)
//! 3. **Environment variables** - container/orchestrator configuration
//!
//! ## Environment Variable Format
//!
//! Variables use the `PROXY_` prefix with `__` as nested separator:
//!
//! ```bash
//! PROXY_ACCOUNT_IDENTIFIER=acc-123
//! PROXY_AUTH_SECRET=change-me-in-production
//! PROXY_REDIS__ADDRESS=localhost:6379
//! ```
//!
//! CLI flag parsing that ultimately populates these values is not this
//! module's concern; `ProxyConfig` is a plain data holder regardless of
//! where its values originated.

use config::{Config, Environment};
use serde::Deserialize;
use std::time::Duration;

use crate::errors::ProxyError;

/// Root configuration for the proxy process.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Upstream account identifier.
    pub account_identifier: String,

    /// Upstream organization identifier.
    pub org_identifier: String,

    /// Admin service token used for bulk/admin upstream calls.
    pub admin_service_token: String,

    /// SDK API keys recognized at startup (seeds the auth repository).
    #[serde(default)]
    pub api_keys: Vec<String>,

    /// Remote cache settings. Absent ⇒ in-memory cache variant.
    pub redis: Option<RedisSettings>,

    /// HS256 signing secret for issued JWTs.
    #[serde(default = "default_auth_secret")]
    pub auth_secret: String,

    /// Short-circuits authentication for local development.
    #[serde(default)]
    pub bypass_auth: bool,

    /// Whether the stream transport is attempted before falling back to polling.
    #[serde(default = "default_true")]
    pub flag_stream_enabled: bool,

    /// Cadence of the flag/segment poll loop while in POLLING state.
    #[serde(default = "default_flag_poll_interval", with = "duration_secs")]
    pub flag_poll_interval: Duration,

    /// Cadence of the independent target-only poll loop. Zero disables it.
    #[serde(default = "default_target_poll_duration", with = "duration_secs")]
    pub target_poll_duration: Duration,

    /// Cadence of the metrics flush loop. Zero disables it.
    #[serde(default = "default_metric_post_duration", with = "duration_secs")]
    pub metric_post_duration: Duration,

    /// Cadence of the heartbeat loop. Zero disables it.
    #[serde(default = "default_heartbeat_interval", with = "duration_secs")]
    pub heartbeat_interval: Duration,

    /// Upper bound on concurrent per-environment metric flush uploads.
    #[serde(default = "default_flush_concurrency")]
    pub flush_concurrency: usize,

    /// Base URL of the upstream control plane.
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,

    /// Native TLS termination on the inbound surface. Out of scope to
    /// implement here; retained so a router built on top of this core has
    /// somewhere to read the setting from.
    #[serde(default)]
    pub tls_enabled: bool,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
}

/// Remote (Redis) cache connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    pub address: String,
    pub password: Option<String>,
    #[serde(default)]
    pub db: i64,
}

impl ProxyConfig {
    /// Loads configuration from environment variables, applying defaults first.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::ConfigSource`] if required variables are missing
    /// or values cannot be parsed into the expected types.
    pub fn from_env() -> Result<Self, ProxyError> {
        let _ = dotenvy::dotenv();

        let built = Config::builder()
            .set_default("auth_secret", default_auth_secret())?
            .set_default("bypass_auth", false)?
            .set_default("flag_stream_enabled", true)?
            .set_default("flag_poll_interval", default_flag_poll_interval().as_secs())?
            .set_default("target_poll_duration", default_target_poll_duration().as_secs())?
            .set_default("metric_post_duration", default_metric_post_duration().as_secs())?
            .set_default("heartbeat_interval", default_heartbeat_interval().as_secs())?
            .set_default("flush_concurrency", default_flush_concurrency() as i64)?
            .set_default("upstream_url", default_upstream_url())?
            .set_default("tls_enabled", false)?
            .add_source(Environment::with_prefix("PROXY").separator("__").try_parsing(true))
            .build()?;

        let config: ProxyConfig = built.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Fatal-at-startup sanity checks that cannot be expressed through serde defaults.
    fn validate(&self) -> Result<(), ProxyError> {
        if !self.bypass_auth && self.auth_secret.is_empty() {
            return Err(ProxyError::Config(
                "auth_secret must be non-empty when bypass_auth is disabled".into(),
            ));
        }
        if self.account_identifier.is_empty() {
            return Err(ProxyError::Config("account_identifier is required".into()));
        }
        Ok(())
    }

    #[inline]
    pub fn uses_remote_cache(&self) -> bool {
        self.redis.is_some()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

fn default_true() -> bool {
    true
}

fn default_auth_secret() -> String {
    "secret".to_string()
}

fn default_flag_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_target_poll_duration() -> Duration {
    Duration::from_secs(60)
}

fn default_metric_post_duration() -> Duration {
    Duration::from_secs(60)
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_flush_concurrency() -> usize {
    4
}

fn default_upstream_url() -> String {
    "https://control-plane.example.com".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(auth_secret: &str, bypass_auth: bool) -> ProxyConfig {
        ProxyConfig {
            account_identifier: "acc".into(),
            org_identifier: "org".into(),
            admin_service_token: "token".into(),
            api_keys: vec![],
            redis: None,
            auth_secret: auth_secret.into(),
            bypass_auth,
            flag_stream_enabled: true,
            flag_poll_interval: Duration::from_secs(1),
            target_poll_duration: Duration::from_secs(60),
            metric_post_duration: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(60),
            flush_concurrency: 4,
            upstream_url: default_upstream_url(),
            tls_enabled: false,
            tls_cert: None,
            tls_key: None,
        }
    }

    #[test]
    fn validate_rejects_empty_auth_secret_when_auth_enabled() {
        assert!(base_config("", false).validate().is_err());
    }

    #[test]
    fn validate_allows_empty_auth_secret_when_bypassed() {
        assert!(base_config("", true).validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_account_identifier() {
        let mut cfg = base_config("secret", false);
        cfg.account_identifier = String::new();
        assert!(cfg.validate().is_err());
    }
}
