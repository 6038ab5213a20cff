// src/confidence.rs
//! Confidence scorer: per-field confidence map, per-group means, weighted
//! overall score.

use std::collections::BTreeMap;

use crate::merge::MergedProfile;
use crate::profile::{FieldGroup, Merged};
use crate::trust::clamp01;

/// How central each group is to investment scoring. Sums to 1.
pub const GROUP_WEIGHTS: [(FieldGroup, f64); 5] = [
    (FieldGroup::Identity, 0.30),
    (FieldGroup::Funding, 0.30),
    (FieldGroup::Team, 0.15),
    (FieldGroup::Market, 0.15),
    (FieldGroup::Financials, 0.10),
];

impl FieldGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldGroup::Identity => "identity",
            FieldGroup::Funding => "funding",
            FieldGroup::Team => "team",
            FieldGroup::Financials => "financials",
            FieldGroup::Market => "market",
        }
    }

    /// Fields a complete profile has in this group.
    pub fn expected_fields(self) -> &'static [&'static str] {
        match self {
            FieldGroup::Identity => &[
                "name",
                "description",
                "industry",
                "founded_year",
                "location",
                "website",
                "employee_count",
            ],
            FieldGroup::Funding => &["total_funding", "valuation", "rounds"],
            FieldGroup::Team => &["members"],
            FieldGroup::Financials => &["revenue", "profit_loss"],
            FieldGroup::Market => &["competitors", "market_share", "positioning"],
        }
    }

    pub fn weight(self) -> f64 {
        GROUP_WEIGHTS
            .iter()
            .find(|(g, _)| *g == self)
            .map(|(_, w)| *w)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceReport {
    /// Dotted path → confidence, present fields only.
    pub fields: BTreeMap<String, f64>,
    pub groups: BTreeMap<FieldGroup, f64>,
    pub overall: f64,
}

fn mean(xs: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = xs.into_iter().fold((0.0, 0usize), |(s, n), x| (s + x, n + 1));
    (n > 0).then(|| sum / n as f64)
}

fn put<T>(fields: &mut BTreeMap<String, f64>, path: &str, v: &Option<Merged<T>>) {
    if let Some(m) = v {
        fields.insert(path.to_string(), m.confidence);
    }
}

fn put_list<'a, T: 'a>(fields: &mut BTreeMap<String, f64>, path: &str, entries: impl IntoIterator<Item = &'a Merged<T>>) {
    if let Some(c) = mean(entries.into_iter().map(|m| m.confidence)) {
        fields.insert(path.to_string(), c);
    }
}

/// Score a merged profile.
pub fn score(p: &MergedProfile) -> ConfidenceReport {
    let mut fields = BTreeMap::new();

    put(&mut fields, "identity.name", &p.identity.name);
    put(&mut fields, "identity.description", &p.identity.description);
    put(&mut fields, "identity.industry", &p.identity.industry);
    put(&mut fields, "identity.founded_year", &p.identity.founded_year);
    put(&mut fields, "identity.location", &p.identity.location);
    put(&mut fields, "identity.website", &p.identity.website);
    put(&mut fields, "identity.employee_count", &p.identity.employee_count);

    put(&mut fields, "funding.total_funding", &p.funding.total_funding);
    put(&mut fields, "funding.valuation", &p.funding.valuation);
    put_list(&mut fields, "funding.rounds", &p.funding.rounds);

    put_list(&mut fields, "team.members", &p.team.members);

    put_list(&mut fields, "financials.revenue", p.financials.revenue.values());
    put_list(&mut fields, "financials.profit_loss", p.financials.profit_loss.values());

    put_list(&mut fields, "market.competitors", &p.market.competitors);
    put(&mut fields, "market.market_share", &p.market.market_share);
    put(&mut fields, "market.positioning", &p.market.positioning);

    let groups: BTreeMap<FieldGroup, f64> = GROUP_WEIGHTS
        .iter()
        .map(|&(g, _)| {
            let expected = g.expected_fields();
            let sum: f64 = expected
                .iter()
                .map(|f| {
                    fields
                        .get(&format!("{}.{}", g.as_str(), f))
                        .copied()
                        .unwrap_or(0.0)
                })
                .sum();
            (g, clamp01(sum / expected.len() as f64))
        })
        .collect();

    let overall = clamp01(groups.iter().map(|(g, c)| g.weight() * c).sum());

    ConfidenceReport {
        fields,
        groups,
        overall,
    }
}
