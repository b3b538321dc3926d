//! Persisted per-tenant configuration
//!
//! Build-time-typed configuration with runtime validation only at the API
//! boundary. Every persisted document carries a monotonic `_schemaVersion`;
//! loading applies total `v_n -> v_{n+1}` migration functions until the
//! document reaches the current version, then deserializes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::budget::COLD_START_NODE_THRESHOLD;
use crate::error::{EngramError, Result};
use crate::search::{
    DENSE_FUSION_WEIGHT, LEXICAL_FUSION_WEIGHT, SEED_THRESHOLD_DENSE, SEED_THRESHOLD_LEXICAL,
};
use crate::similarity::{
    DEDUP_CHECK_THRESHOLD, RECENT_NODE_WINDOW, SIMILARITY_EDGE_THRESHOLD, STALE_EDGE_THRESHOLD,
};

/// A persisted configuration document
pub trait VersionedConfig: Serialize + DeserializeOwned {
    /// Storage key of the document
    const KEY: &'static str;
    /// Current schema version
    const CURRENT_VERSION: u32;

    /// Apply one total migration step from `version` to `version + 1`
    ///
    /// Implementations transform the raw JSON; unknown versions are an
    /// error, never a guess.
    fn migrate_step(version: u32, value: serde_json::Value) -> Result<serde_json::Value>;
}

/// Load a config document, migrating it to the current version first
pub fn load_config<C: VersionedConfig>(raw: serde_json::Value) -> Result<C> {
    let mut value = raw;
    loop {
        let version = value
            .get("_schemaVersion")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| {
                EngramError::Validation(format!("{} config missing _schemaVersion", C::KEY))
            })? as u32;

        if version == C::CURRENT_VERSION {
            return Ok(serde_json::from_value(value)?);
        }
        if version > C::CURRENT_VERSION {
            return Err(EngramError::Validation(format!(
                "{} config version {version} is newer than supported {}",
                C::KEY,
                C::CURRENT_VERSION
            )));
        }
        value = C::migrate_step(version, value)?;
    }
}

// ============================================================================
// ABS CONFIG
// ============================================================================

/// Tunables of the Adaptive Budget System
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbsConfig {
    /// Document schema version
    #[serde(rename = "_schemaVersion")]
    pub schema_version: u32,
    /// Node count below which cold-start limits apply
    pub cold_start_threshold: u64,
    /// Whether thoroughness multipliers are honored
    pub allow_thoroughness: bool,
}

impl Default for AbsConfig {
    fn default() -> Self {
        Self {
            schema_version: Self::CURRENT_VERSION,
            cold_start_threshold: COLD_START_NODE_THRESHOLD,
            allow_thoroughness: true,
        }
    }
}

impl VersionedConfig for AbsConfig {
    const KEY: &'static str = "abs";
    const CURRENT_VERSION: u32 = 1;

    fn migrate_step(version: u32, _value: serde_json::Value) -> Result<serde_json::Value> {
        Err(EngramError::Validation(format!(
            "no migration path from abs config version {version}"
        )))
    }
}

// ============================================================================
// HYBRID SEARCH WEIGHTS
// ============================================================================

/// Seed-fusion weights and thresholds
///
/// v1 carried only the fusion weights; v2 added the per-mode seed
/// thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridWeightsConfig {
    /// Document schema version
    #[serde(rename = "_schemaVersion")]
    pub schema_version: u32,
    /// Dense share of the fused seed score
    pub dense_weight: f64,
    /// Lexical share of the fused seed score
    pub lexical_weight: f64,
    /// Seed threshold when embeddings participate
    pub seed_threshold_dense: f64,
    /// Seed threshold for BM25-only seeding
    pub seed_threshold_lexical: f64,
}

impl Default for HybridWeightsConfig {
    fn default() -> Self {
        Self {
            schema_version: Self::CURRENT_VERSION,
            dense_weight: DENSE_FUSION_WEIGHT,
            lexical_weight: LEXICAL_FUSION_WEIGHT,
            seed_threshold_dense: SEED_THRESHOLD_DENSE,
            seed_threshold_lexical: SEED_THRESHOLD_LEXICAL,
        }
    }
}

impl VersionedConfig for HybridWeightsConfig {
    const KEY: &'static str = "hybrid_weights";
    const CURRENT_VERSION: u32 = 2;

    fn migrate_step(version: u32, mut value: serde_json::Value) -> Result<serde_json::Value> {
        match version {
            1 => {
                // v1 -> v2: introduce the seed thresholds at their defaults
                let object = value.as_object_mut().ok_or_else(|| {
                    EngramError::Validation("hybrid_weights config is not an object".to_string())
                })?;
                object.insert(
                    "seedThresholdDense".to_string(),
                    serde_json::json!(SEED_THRESHOLD_DENSE),
                );
                object.insert(
                    "seedThresholdLexical".to_string(),
                    serde_json::json!(SEED_THRESHOLD_LEXICAL),
                );
                object.insert("_schemaVersion".to_string(), serde_json::json!(2));
                Ok(value)
            }
            _ => Err(EngramError::Validation(format!(
                "no migration path from hybrid_weights config version {version}"
            ))),
        }
    }
}

// ============================================================================
// SIMILARITY CONFIG
// ============================================================================

/// Similarity-edge maintenance thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityConfig {
    /// Document schema version
    #[serde(rename = "_schemaVersion")]
    pub schema_version: u32,
    /// Create/refresh a similar_to edge at or above this
    pub edge_threshold: f64,
    /// Surface a dedup candidate at or above this
    pub dedup_threshold: f64,
    /// Mark an existing edge stale below this
    pub stale_threshold: f64,
    /// Recent peers compared per new embedding
    pub recent_window: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            schema_version: Self::CURRENT_VERSION,
            edge_threshold: SIMILARITY_EDGE_THRESHOLD,
            dedup_threshold: DEDUP_CHECK_THRESHOLD,
            stale_threshold: STALE_EDGE_THRESHOLD,
            recent_window: RECENT_NODE_WINDOW,
        }
    }
}

impl VersionedConfig for SimilarityConfig {
    const KEY: &'static str = "similarity";
    const CURRENT_VERSION: u32 = 1;

    fn migrate_step(version: u32, _value: serde_json::Value) -> Result<serde_json::Value> {
        Err(EngramError::Validation(format!(
            "no migration path from similarity config version {version}"
        )))
    }
}

// ============================================================================
// FALLBACK CONFIG
// ============================================================================

/// Substring-fallback behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackConfig {
    /// Document schema version
    #[serde(rename = "_schemaVersion")]
    pub schema_version: u32,
    /// Whether the lexical fallback runs at all
    pub enabled: bool,
    /// Hard cap on fallback results
    pub max_results: usize,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            schema_version: Self::CURRENT_VERSION,
            enabled: true,
            max_results: 100,
        }
    }
}

impl VersionedConfig for FallbackConfig {
    const KEY: &'static str = "fallback";
    const CURRENT_VERSION: u32 = 1;

    fn migrate_step(version: u32, _value: serde_json::Value) -> Result<serde_json::Value> {
        Err(EngramError::Validation(format!(
            "no migration path from fallback config version {version}"
        )))
    }
}

// ============================================================================
// TESTS
// ============================================================================
