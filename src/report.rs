// src/report.rs
//! Aggregation report: merge, score and derive, then attach run metadata.

use chrono::{DateTime, Utc};

use crate::confidence;
use crate::derived;
use crate::merge::{self, MergedProfile};
use crate::profile::{CompanyProfile, CompanyProfileFragment, Diagnostic, ProfileMetadata, Stage};
use crate::scheduler::FetchOutcome;
use crate::trust::SourceTrust;

/// Build the immutable profile for one run.
///
/// Diagnostics are ordered by stage: scheduling and fetch notes first, then
/// normalization anomalies, then merge conflicts.
pub fn assemble(
    query: &str,
    outcome: &FetchOutcome,
    fragments: &[CompanyProfileFragment],
    trust: &SourceTrust,
    generated_at: DateTime<Utc>,
) -> CompanyProfile {
    let mut merged = merge::merge(query, fragments, trust);
    let merge_notes = std::mem::take(&mut merged.diagnostics);
    let scores = confidence::score(&merged);
    let (derived, derived_conf) = derived::derive(&merged, generated_at);

    let mut field_confidence = scores.fields;
    field_confidence.extend(derived_conf);

    let mut diagnostics = outcome.diagnostics.clone();
    for f in fragments {
        diagnostics.extend(f.anomalies.iter().map(|a| {
            Diagnostic::new(
                Stage::Normalize,
                format!("{}: {} ({:?})", a.field, a.reason, a.raw),
            )
            .source(a.source)
        }));
    }
    diagnostics.extend(merge_notes);

    let MergedProfile {
        identity,
        funding,
        team,
        financials,
        market,
        ..
    } = merged;

    CompanyProfile {
        identity,
        funding,
        team,
        financials,
        market,
        derived,
        metadata: ProfileMetadata {
            sources_consulted: outcome.consulted(),
            sources_failed: outcome.failures(),
            sources_skipped: outcome.skipped.clone(),
            fallback_invoked: outcome.fallback_invoked,
            field_confidence,
            group_confidence: scores.groups,
            overall_confidence: scores.overall,
            generated_at,
            diagnostics,
        },
    }
}
