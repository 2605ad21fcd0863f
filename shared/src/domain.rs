//! # Entity and Event Types
//!
//! The cached entities (§3 of the data model), the stream events the
//! Refresher consumes, and the key templates that fingerprint the cache
//! keyspace.

use serde::{Deserialize, Serialize};

/// A logical flag-evaluation scope. One customer may have many.
pub type EnvironmentId = String;

/// An opaque SDK-facing secret string mapped to exactly one environment.
pub type ApiKey = String;

// =============================================================================
// Key templates
// =============================================================================

pub fn feature_config_key(env: &str) -> String {
    format!("env-{env}-feature-config")
}

pub fn segment_key(env: &str) -> String {
    format!("env-{env}-segment")
}

pub fn target_config_key(env: &str) -> String {
    format!("env-{env}-target-config")
}

pub fn auth_binding_key(api_key: &str) -> String {
    format!("auth-key-{api_key}")
}

// =============================================================================
// Entities
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureFlag {
    pub identifier: String,
    pub enabled: bool,
    pub default_variations: Vec<String>,
    /// Segment identifiers referenced by this flag's rules.
    pub rule_segment_ids: Vec<String>,
    /// Monotonic per-flag version used for anti-reorder checks on stream events.
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Segment {
    pub identifier: String,
    pub included_targets: Vec<String>,
    pub excluded_targets: Vec<String>,
    pub rule_clauses: Vec<String>,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Target {
    pub identifier: String,
    pub attributes: std::collections::BTreeMap<String, String>,
    pub segment_memberships: Vec<String>,
    pub version: u64,
}

/// An entity with a per-environment-unique identifier and a monotonic
/// version used for the Refresher's anti-reorder check (§4.3).
pub trait Versioned {
    fn id(&self) -> &str;
    fn version(&self) -> u64;
}

impl Versioned for FeatureFlag {
    fn id(&self) -> &str {
        &self.identifier
    }
    fn version(&self) -> u64 {
        self.version
    }
}

impl Versioned for Segment {
    fn id(&self) -> &str {
        &self.identifier
    }
    fn version(&self) -> u64 {
        self.version
    }
}

impl Versioned for Target {
    fn id(&self) -> &str {
        &self.identifier
    }
    fn version(&self) -> u64 {
        self.version
    }
}

/// Maps an entity kind to the per-environment cache key holding its
/// ordered sequence.
pub trait EntityKeyed {
    fn cache_key(env: &str) -> String;
}

impl EntityKeyed for FeatureFlag {
    fn cache_key(env: &str) -> String {
        feature_config_key(env)
    }
}

impl EntityKeyed for Segment {
    fn cache_key(env: &str) -> String {
        segment_key(env)
    }
}

impl EntityKeyed for Target {
    fn cache_key(env: &str) -> String {
        target_config_key(env)
    }
}

/// Maps an API key to exactly one environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthBinding {
    pub api_key: ApiKey,
    pub environment: EnvironmentId,
}

/// Entity kinds a stream event or poll result may carry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Flag,
    Segment,
    Target,
}

/// A single stream-delivered change notification.
///
/// Carries enough to locate the entity, but never the entity body itself —
/// the Refresher always re-fetches the canonical value by `(environment,
/// kind, entity_id)` before applying it (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamEvent {
    pub environment: EnvironmentId,
    pub kind: EntityKind,
    pub entity_id: String,
    pub version: u64,
    pub deleted: bool,
}

// =============================================================================
// Metrics
// =============================================================================

/// A deduplicated-by-identifier target observation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetData {
    pub identifier: String,
    pub attributes: std::collections::BTreeMap<String, String>,
}

/// A single append-only evaluation metric event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetricsData {
    pub feature_identifier: String,
    pub variation_identifier: String,
    pub timestamp: i64,
    pub count: u64,
}

/// One environment's worth of metrics submitted in a single call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsBatch {
    pub target_data: Vec<TargetData>,
    pub metrics_data: Vec<MetricsData>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_templates_match_the_documented_fingerprints() {
        assert_eq!(feature_config_key("env-A"), "env-env-A-feature-config");
        assert_eq!(segment_key("env-A"), "env-env-A-segment");
        assert_eq!(target_config_key("env-A"), "env-env-A-target-config");
        assert_eq!(auth_binding_key("apikey-foo"), "auth-key-apikey-foo");
    }
}
