// src/derived.rs
//! Metrics computed from merged values. They carry no provenance of their
//! own; each reports the confidence of the field it was computed from.

use chrono::{DateTime, Datelike, Utc};

use crate::merge::MergedProfile;
use crate::profile::Derived;

/// Upper bounds (USD, exclusive) for each funding stage label.
const STAGES: [(f64, &str); 5] = [
    (1e6, "Pre-Seed"),
    (5e6, "Seed"),
    (20e6, "Series A"),
    (50e6, "Series B"),
    (100e6, "Series C+"),
];

const SIZES: [(u32, &str); 4] = [
    (10, "Startup (1-9)"),
    (50, "Small (10-49)"),
    (200, "Medium (50-199)"),
    (1000, "Large (200-999)"),
];

pub fn funding_stage(total: f64) -> &'static str {
    STAGES
        .iter()
        .find(|(limit, _)| total < *limit)
        .map(|(_, label)| *label)
        .unwrap_or("Late Stage")
}

pub fn employee_size(count: u32) -> &'static str {
    SIZES
        .iter()
        .find(|(limit, _)| count < *limit)
        .map(|(_, label)| *label)
        .unwrap_or("Enterprise (1000+)")
}

/// Derived values plus `(dotted path, confidence)` for each one produced.
pub fn derive(p: &MergedProfile, generated_at: DateTime<Utc>) -> (Derived, Vec<(String, f64)>) {
    let mut out = Derived::default();
    let mut conf = Vec::new();

    if let Some(founded) = &p.identity.founded_year {
        let age = generated_at.year() - founded.value;
        if age >= 0 {
            out.company_age = Some(age);
            conf.push(("derived.company_age".to_string(), founded.confidence));
        }
    }

    // Total funding, else the sum of known round amounts.
    let total = match &p.funding.total_funding {
        Some(t) => Some((t.value, t.confidence)),
        None => {
            let known: Vec<_> = p
                .funding
                .rounds
                .iter()
                .filter_map(|r| r.value.amount.map(|a| (a, r.confidence)))
                .collect();
            (!known.is_empty()).then(|| {
                let sum = known.iter().map(|(a, _)| a).sum::<f64>();
                let c = known.iter().map(|(_, c)| c).sum::<f64>() / known.len() as f64;
                (sum, c)
            })
        }
    };
    if let Some((amount, c)) = total {
        out.funding_stage = Some(funding_stage(amount).to_string());
        conf.push(("derived.funding_stage".to_string(), c));
    }

    if let Some(n) = &p.identity.employee_count {
        out.employee_size = Some(employee_size(n.value).to_string());
        conf.push(("derived.employee_size".to_string(), n.confidence));
    }

    (out, conf)
}
