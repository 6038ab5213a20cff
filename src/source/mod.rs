// src/source/mod.rs
//! Source adapters: the uniform capability every external collaborator is
//! wrapped in. Adapters never return `Err`; every failure mode is encoded in
//! [`FetchStatus`] so the scheduler can decide on retries and fallback.

pub mod fixture;
pub mod http;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::normalize::coerce::normalize_key;

/// Source types known to the core, ordered by static trust priority
/// (declaration order: most trusted first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    StructuredDb,
    ProfessionalNetwork,
    GeneralSearch,
    LightweightFallback,
}

impl SourceId {
    pub const ALL: [SourceId; 4] = [
        SourceId::StructuredDb,
        SourceId::ProfessionalNetwork,
        SourceId::GeneralSearch,
        SourceId::LightweightFallback,
    ];

    pub const PRIMARY: [SourceId; 3] = [
        SourceId::StructuredDb,
        SourceId::ProfessionalNetwork,
        SourceId::GeneralSearch,
    ];

    /// Static trust priority used only as a tie-break. Higher wins.
    pub fn priority(self) -> u8 {
        match self {
            SourceId::StructuredDb => 4,
            SourceId::ProfessionalNetwork => 3,
            SourceId::GeneralSearch => 2,
            SourceId::LightweightFallback => 1,
        }
    }

    pub fn is_primary(self) -> bool {
        !matches!(self, SourceId::LightweightFallback)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceId::StructuredDb => "structured_db",
            SourceId::ProfessionalNetwork => "professional_network",
            SourceId::GeneralSearch => "general_search",
            SourceId::LightweightFallback => "lightweight_fallback",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts canonical names plus the collaborator names they stand in for
/// ("crunchbase", "linkedin", "web search", "simple web", ...).
impl FromStr for SourceId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize_key(s).replace(' ', "_");
        let id = match key.as_str() {
            "structured_db" | "structured" | "crunchbase" | "database" => SourceId::StructuredDb,
            "professional_network" | "network" | "linkedin" => SourceId::ProfessionalNetwork,
            "general_search" | "search" | "web_search" | "google" => SourceId::GeneralSearch,
            "lightweight_fallback" | "fallback" | "simple_web" | "duckduckgo" => {
                SourceId::LightweightFallback
            }
            _ => anyhow::bail!("unknown source: {s}"),
        };
        Ok(id)
    }
}

/// Terminal state of one adapter invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Success,
    PartialSuccess,
    /// Source reachable, but it genuinely has nothing on the company.
    Empty,
    Failed,
    TimedOut,
    Blocked,
}

impl FetchStatus {
    /// Produces data worth normalizing.
    pub fn is_usable(self) -> bool {
        matches!(self, FetchStatus::Success | FetchStatus::PartialSuccess)
    }

    /// Source could not be consulted at all.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            FetchStatus::Failed | FetchStatus::TimedOut | FetchStatus::Blocked
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FetchStatus::Success => "success",
            FetchStatus::PartialSuccess => "partial_success",
            FetchStatus::Empty => "empty",
            FetchStatus::Failed => "failed",
            FetchStatus::TimedOut => "timed_out",
            FetchStatus::Blocked => "blocked",
        }
    }
}

/// Source-shaped output of one adapter invocation. Field values stay opaque
/// JSON until the normalizer maps them onto the canonical schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSourceResult {
    pub source: SourceId,
    pub status: FetchStatus,
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
    pub fetched_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Attempts spent by the scheduler (1 = no retry).
    #[serde(default = "one")]
    pub attempts: u32,
}

fn one() -> u32 {
    1
}

impl RawSourceResult {
    pub fn new(source: SourceId, status: FetchStatus) -> Self {
        Self {
            source,
            status,
            fields: BTreeMap::new(),
            fetched_at: Utc::now(),
            error: None,
            attempts: 1,
        }
    }

    pub fn success(source: SourceId, fields: BTreeMap<String, serde_json::Value>) -> Self {
        Self::new(source, FetchStatus::Success).with_fields(fields)
    }

    pub fn partial(source: SourceId, fields: BTreeMap<String, serde_json::Value>) -> Self {
        Self::new(source, FetchStatus::PartialSuccess).with_fields(fields)
    }

    pub fn empty(source: SourceId) -> Self {
        Self::new(source, FetchStatus::Empty)
    }

    pub fn failed(source: SourceId, error: impl Into<String>) -> Self {
        Self::new(source, FetchStatus::Failed).with_error(error)
    }

    pub fn timed_out(source: SourceId) -> Self {
        Self::new(source, FetchStatus::TimedOut).with_error("deadline exceeded")
    }

    pub fn blocked(source: SourceId, error: impl Into<String>) -> Self {
        Self::new(source, FetchStatus::Blocked).with_error(error)
    }

    pub fn with_fields(mut self, fields: BTreeMap<String, serde_json::Value>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn fetched_at(mut self, at: DateTime<Utc>) -> Self {
        self.fetched_at = at;
        self
    }
}

/// Per-invocation options handed to an adapter by the scheduler.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// Adapter must give up (and report `TimedOut`) once this passes.
    pub deadline: Instant,
    /// 1-based attempt number.
    pub attempt: u32,
}

impl FetchOptions {
    pub fn remaining(&self) -> std::time::Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Capability wrapper around one external collaborator.
///
/// Implementations own their session resources (HTTP client, browser, ...)
/// and must be cancellation-safe: the scheduler may drop the future at any
/// await point once the run budget is spent.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> SourceId;

    /// `company` is non-empty; never panics or errors past this boundary.
    async fn fetch(&self, company: &str, options: &FetchOptions) -> RawSourceResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_follows_declaration_order() {
        let mut ids = SourceId::ALL.to_vec();
        ids.sort_by_key(|id| std::cmp::Reverse(id.priority()));
        assert_eq!(ids, SourceId::ALL.to_vec());
    }

    #[test]
    fn parses_collaborator_aliases() {
        assert_eq!("Crunchbase".parse::<SourceId>().unwrap(), SourceId::StructuredDb);
        assert_eq!("linkedin".parse::<SourceId>().unwrap(), SourceId::ProfessionalNetwork);
        assert_eq!("Web-Search".parse::<SourceId>().unwrap(), SourceId::GeneralSearch);
        assert_eq!("simple web".parse::<SourceId>().unwrap(), SourceId::LightweightFallback);
        assert!("bloomberg".parse::<SourceId>().is_err());
    }

    #[test]
    fn empty_is_neither_usable_nor_failure() {
        assert!(!FetchStatus::Empty.is_usable());
        assert!(!FetchStatus::Empty.is_failure());
        assert!(FetchStatus::PartialSuccess.is_usable());
        assert!(FetchStatus::Blocked.is_failure());
    }

    #[test]
    fn serde_uses_snake_case_ids() {
        let v = serde_json::to_value(SourceId::ProfessionalNetwork).unwrap();
        assert_eq!(v, serde_json::json!("professional_network"));
    }
}
