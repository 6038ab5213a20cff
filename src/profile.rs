//! Canonical company schema: per-source fragments (pre-merge) and the merged
//! `CompanyProfile` with per-field provenance and confidence.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::source::{FetchStatus, SourceId};

// ------------------------------------------------------------
// Shared value types
// ------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingRound {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    /// USD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_type: Option<String>,
    #[serde(default)]
    pub investors: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub is_founder: bool,
}

/// A normalized value plus the normalizer's confidence hint in [0,1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hinted<T> {
    pub value: T,
    pub hint: f64,
}

impl<T> Hinted<T> {
    pub fn new(value: T, hint: f64) -> Self {
        Self {
            value,
            hint: hint.clamp(0.0, 1.0),
        }
    }
}

/// A raw value that could not be coerced to its canonical type. The field is
/// treated as absent; the note travels into the run diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationAnomaly {
    pub source: SourceId,
    pub field: String,
    pub raw: String,
    pub reason: String,
}

// ------------------------------------------------------------
// Fragment (one per usable or empty source result)
// ------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfileFragment {
    pub source: SourceId,
    pub fetched_at: DateTime<Utc>,

    pub name: Option<Hinted<String>>,
    pub description: Option<Hinted<String>>,
    pub industry: Option<Hinted<String>>,
    pub founded_year: Option<Hinted<i32>>,
    pub location: Option<Hinted<String>>,
    pub website: Option<Hinted<String>>,
    pub employee_count: Option<Hinted<u32>>,

    pub total_funding: Option<Hinted<f64>>,
    pub valuation: Option<Hinted<f64>>,
    pub funding_rounds: Vec<Hinted<FundingRound>>,

    pub team: Vec<Hinted<TeamMember>>,

    /// Period label ("2023", "2024-Q1") → USD.
    pub revenue: BTreeMap<String, Hinted<f64>>,
    pub profit_loss: BTreeMap<String, Hinted<f64>>,

    pub competitors: Vec<Hinted<String>>,
    /// Fraction in [0,1].
    pub market_share: Option<Hinted<f64>>,
    pub positioning: Option<Hinted<String>>,

    pub anomalies: Vec<NormalizationAnomaly>,
}

impl CompanyProfileFragment {
    pub fn empty(source: SourceId, fetched_at: DateTime<Utc>) -> Self {
        Self {
            source,
            fetched_at,
            name: None,
            description: None,
            industry: None,
            founded_year: None,
            location: None,
            website: None,
            employee_count: None,
            total_funding: None,
            valuation: None,
            funding_rounds: Vec::new(),
            team: Vec::new(),
            revenue: BTreeMap::new(),
            profit_loss: BTreeMap::new(),
            competitors: Vec::new(),
            market_share: None,
            positioning: None,
            anomalies: Vec::new(),
        }
    }

    /// True when the fragment contributes no value at all.
    pub fn is_blank(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.industry.is_none()
            && self.founded_year.is_none()
            && self.location.is_none()
            && self.website.is_none()
            && self.employee_count.is_none()
            && self.total_funding.is_none()
            && self.valuation.is_none()
            && self.funding_rounds.is_empty()
            && self.team.is_empty()
            && self.revenue.is_empty()
            && self.profit_loss.is_empty()
            && self.competitors.is_empty()
            && self.market_share.is_none()
            && self.positioning.is_none()
    }
}

// ------------------------------------------------------------
// Provenance
// ------------------------------------------------------------

/// Conflict state of a merged field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldState {
    SingleSource,
    Corroborated,
    /// Sources disagreed; the highest-trust value won.
    Conflicting,
}

/// One source's claim for a field, kept even when it lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub source: SourceId,
    /// Display form of the claimed value.
    pub value: String,
    pub hint: f64,
    /// Whether this claim agrees with the selected value.
    pub agrees: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Sources backing the selected value.
    pub sources: Vec<SourceId>,
    pub state: FieldState,
    pub observations: Vec<Observation>,
}

impl Provenance {
    pub fn is_conflicting(&self) -> bool {
        self.state == FieldState::Conflicting
    }
}

/// A merged value with its confidence in [0,1] and provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Merged<T> {
    pub value: T,
    pub confidence: f64,
    pub provenance: Provenance,
}

// ------------------------------------------------------------
// Canonical profile
// ------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// The name the caller asked about.
    pub query: String,
    pub name: Option<Merged<String>>,
    pub description: Option<Merged<String>>,
    pub industry: Option<Merged<String>>,
    pub founded_year: Option<Merged<i32>>,
    pub location: Option<Merged<String>>,
    pub website: Option<Merged<String>>,
    pub employee_count: Option<Merged<u32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Funding {
    pub total_funding: Option<Merged<f64>>,
    pub valuation: Option<Merged<f64>>,
    /// Ordered by date (undated rounds last).
    pub rounds: Vec<Merged<FundingRound>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub members: Vec<Merged<TeamMember>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Financials {
    pub revenue: BTreeMap<String, Merged<f64>>,
    pub profit_loss: BTreeMap<String, Merged<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub competitors: Vec<Merged<String>>,
    pub market_share: Option<Merged<f64>>,
    pub positioning: Option<Merged<String>>,
}

/// Metrics computed from merged values after the merge.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Derived {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_age: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_size: Option<String>,
}

/// Field groups used to weight overall confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldGroup {
    Identity,
    Funding,
    Team,
    Financials,
    Market,
}

/// A source that could not be consulted (AdapterFailure, absorbed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: SourceId,
    pub status: FetchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
}

/// Pipeline stage a diagnostic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Schedule,
    Fetch,
    Normalize,
    Merge,
}

/// Structured, return-value based diagnostic trail entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceId>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            source: None,
            message: message.into(),
        }
    }

    pub fn source(mut self, source: SourceId) -> Self {
        self.source = Some(source);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileMetadata {
    /// Sources that answered (including with Empty).
    pub sources_consulted: Vec<SourceId>,
    pub sources_failed: Vec<SourceFailure>,
    /// Enabled, but no adapter registered.
    pub sources_skipped: Vec<SourceId>,
    pub fallback_invoked: bool,
    /// Dotted field path ("identity.industry", "team.members") → confidence.
    pub field_confidence: BTreeMap<String, f64>,
    pub group_confidence: BTreeMap<FieldGroup, f64>,
    pub overall_confidence: f64,
    pub generated_at: DateTime<Utc>,
    pub diagnostics: Vec<Diagnostic>,
}

/// The single output of a run; immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub identity: Identity,
    pub funding: Funding,
    pub team: Team,
    pub financials: Financials,
    pub market: Market,
    pub derived: Derived,
    pub metadata: ProfileMetadata,
}
