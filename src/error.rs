// src/error.rs
use thiserror::Error;

use crate::profile::{Diagnostic, SourceFailure};

/// Run-level failures. Everything else (a source failing, a value that will
/// not coerce, sources disagreeing) is recorded in the profile instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AggregationError {
    #[error("company name must not be empty")]
    InvalidCompanyName,

    #[error("no source returned usable data for '{company}' ({} failed)", failures.len())]
    NoDataAvailable {
        company: String,
        failures: Vec<SourceFailure>,
        diagnostics: Vec<Diagnostic>,
    },
}

impl AggregationError {
    pub fn failures(&self) -> &[SourceFailure] {
        match self {
            AggregationError::NoDataAvailable { failures, .. } => failures,
            AggregationError::InvalidCompanyName => &[],
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            AggregationError::NoDataAvailable { diagnostics, .. } => diagnostics,
            AggregationError::InvalidCompanyName => &[],
        }
    }
}
