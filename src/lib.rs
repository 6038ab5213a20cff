// src/lib.rs
//! Multi-source company profile aggregation.
//!
//! Flow of one run: [`scheduler::FetchScheduler`] → (parallel)
//! [`source::SourceAdapter`]s → [`normalize::normalize`] →
//! [`merge::merge`] → [`confidence::score`] → [`report::assemble`].
//!
//! The host builds an [`Aggregator`] from an [`AggregatorConfig`] and the
//! adapters it wants to use, then calls [`Aggregator::aggregate`].

pub mod api;
pub mod confidence;
pub mod config;
pub mod derived;
pub mod error;
pub mod merge;
pub mod metrics;
pub mod normalize;
pub mod profile;
pub mod report;
pub mod scheduler;
pub mod source;
pub mod trust;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

pub use crate::api::router;
pub use crate::config::{load_config, AggregatorConfig, FallbackPolicy};
pub use crate::error::AggregationError;
pub use crate::profile::CompanyProfile;
pub use crate::source::{FetchStatus, RawSourceResult, SourceAdapter, SourceId};
pub use crate::trust::SourceTrust;

use crate::scheduler::{FetchScheduler, SchedulerConfig};

/// Result of one aggregation run.
pub type AggregationResult = Result<CompanyProfile, AggregationError>;

/// Entry point: schedules adapters, merges their answers, scores the result.
pub struct Aggregator {
    scheduler: FetchScheduler,
    trust: SourceTrust,
    default_sources: Vec<SourceId>,
    default_budget: Duration,
    max_budget: Duration,
}

impl Aggregator {
    pub fn new(config: &AggregatorConfig, adapters: Vec<Arc<dyn SourceAdapter>>) -> Self {
        let mut trust = config.trust.clone();
        for key in trust.sanitize() {
            tracing::warn!(key = %key, "ignoring trust weight for unknown source");
        }
        Self {
            scheduler: FetchScheduler::new(SchedulerConfig::from(config), adapters),
            trust,
            default_sources: config.enabled_sources.clone(),
            default_budget: config.global_budget(),
            max_budget: config.max_budget().max(config.global_budget()),
        }
    }

    pub fn trust(&self) -> &SourceTrust {
        &self.trust
    }

    pub fn default_budget(&self) -> Duration {
        self.default_budget
    }

    /// Largest budget a single run is granted.
    pub fn max_budget(&self) -> Duration {
        self.max_budget
    }

    /// Configured sources and budget.
    pub async fn aggregate_default(&self, company: &str) -> AggregationResult {
        self.aggregate(company, &[], self.default_budget).await
    }

    /// Collect, merge and score everything `enabled` sources know about
    /// `company` within `budget`. An empty `enabled` means the configured
    /// defaults.
    pub async fn aggregate(&self, company: &str, enabled: &[SourceId], budget: Duration) -> AggregationResult {
        let company = company.trim();
        if company.is_empty() {
            return Err(AggregationError::InvalidCompanyName);
        }
        metrics::ensure_metrics_described();
        metrics::record_run();

        if budget > self.max_budget {
            tracing::debug!(target: "aggregate", requested = ?budget, max = ?self.max_budget, "budget capped");
        }
        let budget = budget.min(self.max_budget);

        let enabled = if enabled.is_empty() {
            self.default_sources.as_slice()
        } else {
            enabled
        };
        let outcome = self.scheduler.run(company, enabled, budget).await;

        if !outcome.has_usable() {
            metrics::record_no_data();
            tracing::warn!(
                target: "aggregate",
                company,
                failed = outcome.failures().len(),
                "no usable data from any source"
            );
            return Err(AggregationError::NoDataAvailable {
                company: company.to_string(),
                failures: outcome.failures(),
                diagnostics: outcome.diagnostics,
            });
        }

        let fragments: Vec<_> = outcome.results.iter().filter_map(normalize::normalize).collect();
        for f in &fragments {
            metrics::record_anomalies(f.source, f.anomalies.len());
        }

        let profile = report::assemble(company, &outcome, &fragments, &self.trust, Utc::now());
        metrics::record_overall_confidence(profile.metadata.overall_confidence);
        info!(
            target: "aggregate",
            company,
            consulted = profile.metadata.sources_consulted.len(),
            failed = profile.metadata.sources_failed.len(),
            fallback = profile.metadata.fallback_invoked,
            overall = profile.metadata.overall_confidence,
            "profile assembled"
        );
        Ok(profile)
    }
}
