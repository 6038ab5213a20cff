//! # Source Trust
//!
//! Configurable mapping from source types to trust weights in `[0.0, 1.0]`.
//!
//! - Keys accept the same aliases as [`SourceId`] parsing ("crunchbase",
//!   "linkedin", "web search", ...), case- and punctuation-insensitive.
//! - Anything not configured falls back to the built-in seed.
//!
//! Trust weights feed corroboration and disagreement scoring. The static
//! priority ranking on [`SourceId`] is separate and only breaks ties.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::source::SourceId;

/// Per-source trust weights, as configured by the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceTrust {
    /// Source name (or alias) → weight. Unlisted sources use the seed.
    #[serde(flatten)]
    pub weights: BTreeMap<String, f64>,
}

impl SourceTrust {
    /// Built-in weight for a source.
    pub fn seed(source: SourceId) -> f64 {
        match source {
            SourceId::StructuredDb => 0.95,
            SourceId::ProfessionalNetwork => 0.85,
            SourceId::GeneralSearch => 0.70,
            SourceId::LightweightFallback => 0.50,
        }
    }

    pub fn with_weight(mut self, source: SourceId, weight: f64) -> Self {
        self.weights.insert(source.as_str().to_string(), weight);
        self
    }

    /// Weight for `source`.
    ///
    /// Steps:
    /// 1. Configured entry whose key resolves to `source` (aliases allowed).
    /// 2. Built-in seed.
    pub fn weight_for(&self, source: SourceId) -> f64 {
        self.weights
            .iter()
            .find(|(k, _)| k.parse::<SourceId>().ok() == Some(source))
            .map(|(_, &w)| clamp01(w))
            .unwrap_or_else(|| Self::seed(source))
    }

    /// Clamp weights and drop keys that name no known source. Returns the
    /// dropped keys.
    pub fn sanitize(&mut self) -> Vec<String> {
        let mut dropped = Vec::new();
        self.weights.retain(|k, w| {
            if k.parse::<SourceId>().is_err() {
                dropped.push(k.clone());
                return false;
            }
            *w = clamp01(*w);
            true
        });
        dropped
    }

    /// Resolved weights for every known source.
    pub fn resolved(&self) -> BTreeMap<SourceId, f64> {
        SourceId::ALL.iter().map(|&s| (s, self.weight_for(s))).collect()
    }
}

/// Clamp to [0.0, 1.0]; NaN counts as 0.
pub(crate) fn clamp01(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}
