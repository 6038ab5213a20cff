// src/merge.rs
//! Merger / conflict resolver: folds fragments into the canonical profile
//! sections.
//!
//! Every input is first put into a canonical order (static source priority,
//! then most recent `fetched_at`, then source id, then value), so the result
//! never depends on the order in which adapters finished.
//!
//! Scalar rule, per field:
//! - claims are clustered by agreement (field-specific test);
//! - the winning cluster is the one holding the highest-priority claim;
//! - confidence is a noisy-OR over the winning cluster: the strongest claim
//!   contributes `hint × completeness × SINGLE_SOURCE_PENALTY`, every other
//!   source the same quantity scaled by its trust weight;
//! - when other clusters exist the field is `Conflicting` and confidence is
//!   scaled by `1 − DISAGREEMENT_PENALTY × loser_share`, where `loser_share`
//!   is the trust-weighted support of the losing claims.
//!
//! List fields (team, funding rounds, competitors) are unioned, clustered by a
//! similarity key and each cluster collapses into one entry whose attributes
//! follow the scalar rule.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};

use crate::normalize::coerce::{
    canonical_role, canonical_round_type, company_key, mentions_founder, normalize_key,
};
use crate::profile::{
    CompanyProfileFragment, Diagnostic, FieldState, Financials, Funding, FundingRound, Hinted,
    Identity, Market, Merged, Observation, Provenance, Stage, Team, TeamMember,
};
use crate::source::SourceId;
use crate::trust::{clamp01, SourceTrust};

pub const SINGLE_SOURCE_PENALTY: f64 = 0.8;
pub const DISAGREEMENT_PENALTY: f64 = 0.4;
/// Relative tolerance for money amounts.
pub const AMOUNT_TOLERANCE: f64 = 0.02;
/// Relative tolerance for head counts.
pub const COUNT_TOLERANCE: f64 = 0.10;
/// Absolute tolerance for market share fractions.
pub const SHARE_TOLERANCE: f64 = 0.01;
/// Given-name similarity needed to treat two people as one.
pub const GIVEN_NAME_SIMILARITY: f64 = 0.9;
/// Company-name similarity needed to treat two competitors as one.
pub const COMPETITOR_SIMILARITY: f64 = 0.93;
/// Rounds further apart than this are different rounds.
pub const ROUND_DATE_WINDOW_DAYS: i64 = 45;
/// Round dates closer than this agree.
pub const ROUND_DATE_AGREEMENT_DAYS: i64 = 7;
/// Relative tolerance for matching undated rounds by amount.
pub const ROUND_AMOUNT_TOLERANCE: f64 = 0.05;

/// Output of [`merge`]: the canonical sections plus merge-stage notes.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedProfile {
    pub identity: Identity,
    pub funding: Funding,
    pub team: Team,
    pub financials: Financials,
    pub market: Market,
    pub diagnostics: Vec<Diagnostic>,
}

/// Fold `fragments` (any order) into one profile for `query`.
pub fn merge(query: &str, fragments: &[CompanyProfileFragment], trust: &SourceTrust) -> MergedProfile {
    let mut frags: Vec<&CompanyProfileFragment> = fragments.iter().collect();
    frags.sort_by(|a, b| {
        b.source
            .priority()
            .cmp(&a.source.priority())
            .then(b.fetched_at.cmp(&a.fetched_at))
            .then(a.source.cmp(&b.source))
    });

    let mut m = Merger {
        frags,
        trust,
        diagnostics: Vec::new(),
    };

    let identity = Identity {
        query: query.trim().to_string(),
        name: m.scalar("identity.name", |f| f.name.as_ref(), &NAME),
        description: m.scalar("identity.description", |f| f.description.as_ref(), &TEXT),
        industry: m.scalar("identity.industry", |f| f.industry.as_ref(), &TEXT),
        founded_year: m.scalar("identity.founded_year", |f| f.founded_year.as_ref(), &YEAR),
        location: m.scalar("identity.location", |f| f.location.as_ref(), &LOCATION),
        website: m.scalar("identity.website", |f| f.website.as_ref(), &WEBSITE),
        employee_count: m.scalar("identity.employee_count", |f| f.employee_count.as_ref(), &COUNT),
    };
    let funding = Funding {
        total_funding: m.scalar("funding.total_funding", |f| f.total_funding.as_ref(), &AMOUNT),
        valuation: m.scalar("funding.valuation", |f| f.valuation.as_ref(), &AMOUNT),
        rounds: m.rounds(),
    };
    let team = Team { members: m.team() };
    let financials = Financials {
        revenue: m.series("financials.revenue", |f| &f.revenue),
        profit_loss: m.series("financials.profit_loss", |f| &f.profit_loss),
    };
    let market = Market {
        competitors: m.competitors(),
        market_share: m.scalar("market.market_share", |f| f.market_share.as_ref(), &SHARE),
        positioning: m.scalar("market.positioning", |f| f.positioning.as_ref(), &TEXT),
    };

    MergedProfile {
        identity,
        funding,
        team,
        financials,
        market,
        diagnostics: m.diagnostics,
    }
}

// ------------------------------------------------------------
// Field rules
// ------------------------------------------------------------

/// How values of one field are compared, shown and judged for completeness.
pub struct Rule<T> {
    pub agrees: fn(&T, &T) -> bool,
    pub display: fn(&T) -> String,
    pub completeness: fn(&T) -> f64,
}

fn complete<T>(_: &T) -> f64 {
    1.0
}

fn show<T: ToString>(v: &T) -> String {
    v.to_string()
}

fn text_agrees(a: &String, b: &String) -> bool {
    normalize_key(a) == normalize_key(b)
}

fn name_agrees(a: &String, b: &String) -> bool {
    company_key(a) == company_key(b)
}

/// "San Francisco, CA" agrees with "San Francisco, California".
fn location_agrees(a: &String, b: &String) -> bool {
    let city = |s: &String| normalize_key(s.split(',').next().unwrap_or_default());
    city(a) == city(b)
}

fn website_agrees(a: &String, b: &String) -> bool {
    fn host(s: &str) -> String {
        let lower = s.to_ascii_lowercase();
        let rest = lower
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_start_matches("www.");
        rest.split('/').next().unwrap_or_default().to_string()
    }
    host(a) == host(b)
}

fn within(a: f64, b: f64, rel: f64) -> bool {
    let scale = a.abs().max(b.abs());
    scale == 0.0 || (a - b).abs() <= rel * scale
}

fn amount_agrees(a: &f64, b: &f64) -> bool {
    within(*a, *b, AMOUNT_TOLERANCE)
}

fn count_agrees(a: &u32, b: &u32) -> bool {
    within(f64::from(*a), f64::from(*b), COUNT_TOLERANCE)
}

fn share_agrees(a: &f64, b: &f64) -> bool {
    (a - b).abs() <= SHARE_TOLERANCE
}

fn show_amount(v: &f64) -> String {
    format!("{v:.0}")
}

fn role_agrees(a: &String, b: &String) -> bool {
    canonical_role(a) == canonical_role(b)
}

fn date_agrees(a: &NaiveDate, b: &NaiveDate) -> bool {
    (*a - *b).num_days().abs() <= ROUND_DATE_AGREEMENT_DAYS
}

fn round_type_agrees(a: &String, b: &String) -> bool {
    canonical_round_type(a) == canonical_round_type(b)
}

const TEXT: Rule<String> = Rule {
    agrees: text_agrees,
    display: show,
    completeness: complete,
};
const NAME: Rule<String> = Rule {
    agrees: name_agrees,
    display: show,
    completeness: complete,
};
const LOCATION: Rule<String> = Rule {
    agrees: location_agrees,
    display: show,
    completeness: complete,
};
const WEBSITE: Rule<String> = Rule {
    agrees: website_agrees,
    display: show,
    completeness: complete,
};
const YEAR: Rule<i32> = Rule {
    agrees: |a, b| a == b,
    display: show,
    completeness: complete,
};
const COUNT: Rule<u32> = Rule {
    agrees: count_agrees,
    display: show,
    completeness: complete,
};
const AMOUNT: Rule<f64> = Rule {
    agrees: amount_agrees,
    display: show_amount,
    completeness: complete,
};
const SHARE: Rule<f64> = Rule {
    agrees: share_agrees,
    display: show,
    completeness: complete,
};
const ROLE: Rule<String> = Rule {
    agrees: role_agrees,
    display: show,
    completeness: complete,
};
const DATE: Rule<NaiveDate> = Rule {
    agrees: date_agrees,
    display: show,
    completeness: complete,
};
const ROUND_TYPE: Rule<String> = Rule {
    agrees: round_type_agrees,
    display: show,
    completeness: complete,
};

fn member_completeness(m: &TeamMember) -> f64 {
    if m.role.is_some() {
        1.0
    } else {
        0.7
    }
}

fn round_completeness(r: &FundingRound) -> f64 {
    let known = [
        r.date.is_some(),
        r.amount.is_some(),
        r.round_type.is_some(),
        !r.investors.is_empty(),
    ]
    .iter()
    .filter(|k| **k)
    .count();
    0.4 + 0.6 * known as f64 / 4.0
}

fn show_member(m: &TeamMember) -> String {
    match &m.role {
        Some(r) => format!("{}, {}", m.name, r),
        None => m.name.clone(),
    }
}

fn show_round(r: &FundingRound) -> String {
    let date = r.date.map(|d| d.to_string()).unwrap_or_else(|| "undated".into());
    let kind = r.round_type.clone().unwrap_or_else(|| "round".into());
    let amount = r.amount.map(|a| format!(" {a:.0}")).unwrap_or_default();
    format!("{kind} {date}{amount}")
}

// ------------------------------------------------------------
// Claims and resolution
// ------------------------------------------------------------

/// One source's claim for one field.
#[derive(Debug, Clone)]
struct Claim<T> {
    source: SourceId,
    fetched_at: DateTime<Utc>,
    value: T,
    hint: f64,
}

/// Canonical claim order; `display` breaks ties between equal sources.
fn sort_claims<T>(claims: &mut [Claim<T>], display: fn(&T) -> String) {
    claims.sort_by(|a, b| {
        b.source
            .priority()
            .cmp(&a.source.priority())
            .then(b.fetched_at.cmp(&a.fetched_at))
            .then(a.source.cmp(&b.source))
            .then_with(|| display(&a.value).cmp(&display(&b.value)))
            .then(b.hint.total_cmp(&a.hint))
    });
}

/// Noisy-OR over per-source contributions: the strongest source counts in
/// full, every other source scaled by its trust weight. Input in canonical
/// order; a source listed twice keeps its best contribution.
fn corroborate(contribs: &[(SourceId, f64)], trust: &SourceTrust) -> f64 {
    let mut best: Vec<(SourceId, f64)> = Vec::new();
    for &(s, c) in contribs {
        match best.iter_mut().find(|(bs, _)| *bs == s) {
            Some((_, bc)) => *bc = bc.max(c),
            None => best.push((s, c)),
        }
    }
    let Some(strongest) = best
        .iter()
        .enumerate()
        .fold(None::<(usize, f64)>, |acc, (i, &(_, c))| match acc {
            Some((_, bc)) if bc >= c => acc,
            _ => Some((i, c)),
        })
        .map(|(i, _)| i)
    else {
        return 0.0;
    };
    let miss: f64 = best
        .iter()
        .enumerate()
        .map(|(i, &(s, c))| {
            let c = if i == strongest { c } else { c * trust.weight_for(s) };
            1.0 - clamp01(c)
        })
        .product();
    clamp01(1.0 - miss)
}

fn distinct_sources(sources: impl Iterator<Item = SourceId>) -> Vec<SourceId> {
    let mut out: Vec<SourceId> = Vec::new();
    for s in sources {
        if !out.contains(&s) {
            out.push(s);
        }
    }
    out
}

fn state_for(sources: usize, conflicting: bool) -> FieldState {
    if conflicting {
        FieldState::Conflicting
    } else if sources > 1 {
        FieldState::Corroborated
    } else {
        FieldState::SingleSource
    }
}

/// Scalar resolution before it is packed into a [`Merged`].
struct Resolution<T> {
    value: T,
    /// Noisy-OR over the winning cluster.
    combined: f64,
    /// Disagreement factor in (0, 1]; 1 when nobody disagreed.
    factor: f64,
    provenance: Provenance,
}

impl<T> Resolution<T> {
    fn into_merged(self) -> Merged<T> {
        Merged {
            value: self.value,
            confidence: clamp01(self.combined * self.factor),
            provenance: self.provenance,
        }
    }
}

fn resolve<T: Clone>(mut claims: Vec<Claim<T>>, rule: &Rule<T>, trust: &SourceTrust) -> Option<Resolution<T>> {
    if claims.is_empty() {
        return None;
    }
    sort_claims(&mut claims, rule.display);

    let mut clusters: Vec<Vec<usize>> = Vec::new();
    for (i, c) in claims.iter().enumerate() {
        match clusters
            .iter_mut()
            .find(|cl| (rule.agrees)(&claims[cl[0]].value, &c.value))
        {
            Some(cl) => cl.push(i),
            None => clusters.push(vec![i]),
        }
    }
    let winner = &clusters[0];

    let contribs: Vec<(SourceId, f64)> = winner
        .iter()
        .map(|&i| {
            let c = &claims[i];
            (c.source, c.hint * (rule.completeness)(&c.value) * SINGLE_SOURCE_PENALTY)
        })
        .collect();
    let combined = corroborate(&contribs, trust);

    let support = |c: &Claim<T>| trust.weight_for(c.source) * c.hint;
    let total: f64 = claims.iter().map(support).sum();
    let losing: f64 = claims
        .iter()
        .enumerate()
        .filter(|(i, _)| !winner.contains(i))
        .map(|(_, c)| support(c))
        .sum();
    let conflicting = clusters.len() > 1;
    let factor = if conflicting && total > 0.0 {
        1.0 - DISAGREEMENT_PENALTY * (losing / total)
    } else {
        1.0
    };

    let sources = distinct_sources(winner.iter().map(|&i| claims[i].source));
    let observations = claims
        .iter()
        .enumerate()
        .map(|(i, c)| Observation {
            source: c.source,
            value: (rule.display)(&c.value),
            hint: c.hint,
            agrees: winner.contains(&i),
        })
        .collect();

    Some(Resolution {
        value: claims[winner[0]].value.clone(),
        combined,
        factor,
        provenance: Provenance {
            state: state_for(sources.len(), conflicting),
            sources,
            observations,
        },
    })
}

// ------------------------------------------------------------
// Merger
// ------------------------------------------------------------

struct Merger<'a> {
    /// Canonically ordered.
    frags: Vec<&'a CompanyProfileFragment>,
    trust: &'a SourceTrust,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Merger<'a> {
    fn claims<T: Clone + 'a>(
        &self,
        pick: impl Fn(&'a CompanyProfileFragment) -> Option<&'a Hinted<T>>,
    ) -> Vec<Claim<T>> {
        self.frags
            .iter()
            .copied()
            .filter_map(|f| {
                pick(f).map(|h| Claim {
                    source: f.source,
                    fetched_at: f.fetched_at,
                    value: h.value.clone(),
                    hint: h.hint,
                })
            })
            .collect()
    }

    fn note_conflict(&mut self, field: &str, provenance: &Provenance) {
        if !provenance.is_conflicting() {
            return;
        }
        let losers = provenance.observations.iter().filter(|o| !o.agrees).count();
        let mut d = Diagnostic::new(
            Stage::Merge,
            format!("{field}: {losers} disagreeing claim(s); kept the highest-priority value"),
        );
        if let Some(s) = provenance.sources.first() {
            d = d.source(*s);
        }
        self.diagnostics.push(d);
    }

    fn scalar<T: Clone + 'a>(
        &mut self,
        field: &str,
        pick: impl Fn(&'a CompanyProfileFragment) -> Option<&'a Hinted<T>>,
        rule: &Rule<T>,
    ) -> Option<Merged<T>> {
        let claims = self.claims(pick);
        let merged = resolve(claims, rule, self.trust)?.into_merged();
        self.note_conflict(field, &merged.provenance);
        Some(merged)
    }

    fn series(
        &mut self,
        field: &str,
        pick: impl Fn(&'a CompanyProfileFragment) -> &'a BTreeMap<String, Hinted<f64>>,
    ) -> BTreeMap<String, Merged<f64>> {
        let periods: BTreeSet<&'a String> =
            self.frags.iter().copied().flat_map(|f| pick(f).keys()).collect();
        let mut out = BTreeMap::new();
        for period in periods {
            let claims = self.claims(|f| pick(f).get(period));
            if let Some(r) = resolve(claims, &AMOUNT, self.trust) {
                let merged = r.into_merged();
                self.note_conflict(&format!("{field}.{period}"), &merged.provenance);
                out.insert(period.clone(), merged);
            }
        }
        out
    }

    fn list_claims<T: Clone + 'a>(
        &self,
        pick: impl Fn(&'a CompanyProfileFragment) -> &'a [Hinted<T>],
        display: fn(&T) -> String,
    ) -> Vec<Claim<T>> {
        let mut claims: Vec<Claim<T>> = self
            .frags
            .iter()
            .copied()
            .flat_map(|f| {
                pick(f).iter().map(move |h| Claim {
                    source: f.source,
                    fetched_at: f.fetched_at,
                    value: h.value.clone(),
                    hint: h.hint,
                })
            })
            .collect();
        sort_claims(&mut claims, display);
        claims
    }

    fn team(&mut self) -> Vec<Merged<TeamMember>> {
        let claims = self.list_claims(|f| f.team.as_slice(), show_member);
        let clusters = cluster(&claims, |a, b| {
            same_person(&a.value, &b.value)
                && (a.source != b.source || same_spelling(&a.value.name, &b.value.name))
        });

        let mut out = Vec::new();
        for members in clusters {
            let members: Vec<&Claim<TeamMember>> = members.into_iter().map(|i| &claims[i]).collect();

            // Fullest spelling of the name; earlier (more trusted) wins ties.
            let mut name = members[0].value.name.clone();
            for m in &members[1..] {
                if name_detail(&m.value.name) > name_detail(&name) {
                    name = m.value.name.clone();
                }
            }

            // Founder-only titles do not compete with an actual role.
            let has_real_role = members
                .iter()
                .any(|m| m.value.role.as_deref().and_then(canonical_role).is_some_and(|r| r != "founder"));
            let role_claims: Vec<Claim<String>> = members
                .iter()
                .filter_map(|m| {
                    let role = m.value.role.clone()?;
                    let founder_only = canonical_role(&role).as_deref() == Some("founder");
                    (!(has_real_role && founder_only)).then(|| Claim {
                        source: m.source,
                        fetched_at: m.fetched_at,
                        value: role,
                        hint: m.hint,
                    })
                })
                .collect();
            let role = resolve(role_claims, &ROLE, self.trust);
            let is_founder = members.iter().any(|m| {
                m.value.is_founder
                    || m.value.role.as_deref().is_some_and(mentions_founder)
            });

            let value = TeamMember {
                name,
                role: role.as_ref().map(|r| r.value.clone()),
                is_founder,
            };
            let contribs: Vec<(SourceId, f64)> = members
                .iter()
                .map(|m| (m.source, m.hint * member_completeness(&m.value) * SINGLE_SOURCE_PENALTY))
                .collect();
            let factor = role.as_ref().map_or(1.0, |r| r.factor);
            let conflicting = role.as_ref().is_some_and(|r| r.provenance.is_conflicting());
            let chosen_role = value.role.clone();
            let sources = distinct_sources(members.iter().map(|m| m.source));
            let observations = members
                .iter()
                .map(|m| Observation {
                    source: m.source,
                    value: show_member(&m.value),
                    hint: m.hint,
                    agrees: match (&m.value.role, &chosen_role) {
                        (Some(a), Some(b)) => {
                            role_agrees(a, b) || canonical_role(a).as_deref() == Some("founder")
                        }
                        _ => true,
                    },
                })
                .collect();
            let provenance = Provenance {
                state: state_for(sources.len(), conflicting),
                sources,
                observations,
            };
            self.note_conflict(&format!("team.members[{}]", value.name), &provenance);
            out.push(Merged {
                confidence: clamp01(corroborate(&contribs, self.trust) * factor),
                value,
                provenance,
            });
        }

        out.sort_by(|a, b| {
            b.value
                .is_founder
                .cmp(&a.value.is_founder)
                .then_with(|| normalize_key(&a.value.name).cmp(&normalize_key(&b.value.name)))
        });
        out
    }

    fn rounds(&mut self) -> Vec<Merged<FundingRound>> {
        let claims = self.list_claims(|f| f.funding_rounds.as_slice(), show_round);
        // One source listing two rounds means two rounds.
        let clusters = cluster(&claims, |a, b| a.source != b.source && rounds_match(&a.value, &b.value));

        let mut out = Vec::new();
        for members in clusters {
            let members: Vec<&Claim<FundingRound>> = members.into_iter().map(|i| &claims[i]).collect();
            let date = resolve(attribute(&members, |r| r.date), &DATE, self.trust);
            let amount = resolve(attribute(&members, |r| r.amount), &AMOUNT, self.trust);
            let round_type = resolve(
                attribute(&members, |r| r.round_type.clone()),
                &ROUND_TYPE,
                self.trust,
            );
            let investors: BTreeSet<String> = members
                .iter()
                .flat_map(|m| m.value.investors.iter().cloned())
                .collect();

            let factor = [
                date.as_ref().map(|r| r.factor),
                amount.as_ref().map(|r| r.factor),
                round_type.as_ref().map(|r| r.factor),
            ]
            .into_iter()
            .flatten()
            .fold(1.0, f64::min);
            let conflicting = date.as_ref().is_some_and(|r| r.provenance.is_conflicting())
                || amount.as_ref().is_some_and(|r| r.provenance.is_conflicting())
                || round_type.as_ref().is_some_and(|r| r.provenance.is_conflicting());

            let value = FundingRound {
                date: date.as_ref().map(|r| r.value),
                amount: amount.as_ref().map(|r| r.value),
                round_type: round_type.as_ref().map(|r| r.value.clone()),
                investors,
            };
            let contribs: Vec<(SourceId, f64)> = members
                .iter()
                .map(|m| (m.source, m.hint * round_completeness(&m.value) * SINGLE_SOURCE_PENALTY))
                .collect();
            let sources = distinct_sources(members.iter().map(|m| m.source));
            let observations = members
                .iter()
                .map(|m| Observation {
                    source: m.source,
                    value: show_round(&m.value),
                    hint: m.hint,
                    agrees: m.value.date.zip(value.date).map_or(true, |(a, b)| date_agrees(&a, &b))
                        && m.value.amount.zip(value.amount).map_or(true, |(a, b)| amount_agrees(&a, &b))
                        && m.value
                            .round_type
                            .as_ref()
                            .zip(value.round_type.as_ref())
                            .map_or(true, |(a, b)| round_type_agrees(a, b)),
                })
                .collect();
            let provenance = Provenance {
                state: state_for(sources.len(), conflicting),
                sources,
                observations,
            };
            self.note_conflict(&format!("funding.rounds[{}]", show_round(&value)), &provenance);
            out.push(Merged {
                confidence: clamp01(corroborate(&contribs, self.trust) * factor),
                value,
                provenance,
            });
        }

        // By date; undated rounds last.
        out.sort_by(|a, b| {
            let by_date = match (a.value.date, b.value.date) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            };
            by_date
                .then_with(|| {
                    let amount = |m: &Merged<FundingRound>| m.value.amount.unwrap_or(0.0);
                    amount(a).total_cmp(&amount(b))
                })
                .then_with(|| show_round(&a.value).cmp(&show_round(&b.value)))
        });
        out
    }

    fn competitors(&mut self) -> Vec<Merged<String>> {
        let claims = self.list_claims(|f| f.competitors.as_slice(), show);
        let clusters = cluster(&claims, |a, b| same_company(&a.value, &b.value));

        let mut out: Vec<Merged<String>> = clusters
            .into_iter()
            .map(|members| {
                let members: Vec<&Claim<String>> = members.into_iter().map(|i| &claims[i]).collect();
                let contribs: Vec<(SourceId, f64)> = members
                    .iter()
                    .map(|m| (m.source, m.hint * SINGLE_SOURCE_PENALTY))
                    .collect();
                let sources = distinct_sources(members.iter().map(|m| m.source));
                Merged {
                    value: members[0].value.clone(),
                    confidence: corroborate(&contribs, self.trust),
                    provenance: Provenance {
                        state: state_for(sources.len(), false),
                        sources,
                        observations: members
                            .iter()
                            .map(|m| Observation {
                                source: m.source,
                                value: m.value.clone(),
                                hint: m.hint,
                                agrees: true,
                            })
                            .collect(),
                    },
                }
            })
            .collect();

        out.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| company_key(&a.value).cmp(&company_key(&b.value)))
        });
        out
    }
}

/// Project one attribute out of a cluster's claims, keeping source and hint.
fn attribute<T, U>(members: &[&Claim<T>], get: impl Fn(&T) -> Option<U>) -> Vec<Claim<U>> {
    members
        .iter()
        .filter_map(|m| {
            get(&m.value).map(|value| Claim {
                source: m.source,
                fetched_at: m.fetched_at,
                value,
                hint: m.hint,
            })
        })
        .collect()
}

/// Greedy clustering over canonically ordered claims: a claim joins the first
/// cluster whose every member it matches, so a loose claim cannot chain two
/// distinct entries together.
fn cluster<T>(claims: &[Claim<T>], matches: impl Fn(&Claim<T>, &Claim<T>) -> bool) -> Vec<Vec<usize>> {
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    for (i, c) in claims.iter().enumerate() {
        match clusters
            .iter_mut()
            .find(|cl| cl.iter().all(|&j| matches(&claims[j], c)))
        {
            Some(cl) => cl.push(i),
            None => clusters.push(vec![i]),
        }
    }
    clusters
}

// ------------------------------------------------------------
// List similarity
// ------------------------------------------------------------

fn name_tokens(name: &str) -> Vec<String> {
    normalize_key(name).split(' ').filter(|t| !t.is_empty()).map(str::to_string).collect()
}

/// (token count, letters) — more is a fuller spelling.
fn name_detail(name: &str) -> (usize, usize) {
    let tokens = name_tokens(name);
    (tokens.len(), tokens.iter().map(|t| t.len()).sum())
}

/// Same surname, compatible given name, compatible role.
pub fn same_person(a: &TeamMember, b: &TeamMember) -> bool {
    let (ta, tb) = (name_tokens(&a.name), name_tokens(&b.name));
    let (Some(sa), Some(sb)) = (ta.last(), tb.last()) else {
        return false;
    };
    if sa != sb {
        return false;
    }
    let given_ok = if ta.len() < 2 || tb.len() < 2 {
        true
    } else {
        let (ga, gb) = (&ta[0], &tb[0]);
        ga == gb
            || (ga.len() == 1 && gb.starts_with(ga.as_str()))
            || (gb.len() == 1 && ga.starts_with(gb.as_str()))
            || strsim::jaro_winkler(ga, gb) >= GIVEN_NAME_SIMILARITY
    };
    given_ok && roles_compatible(a.role.as_deref(), b.role.as_deref())
}

/// Within one source only an initial may stand in for a given name; a
/// differently spelled given name is another person.
fn same_spelling(a: &str, b: &str) -> bool {
    let (ta, tb) = (name_tokens(a), name_tokens(b));
    if ta.last() != tb.last() {
        return false;
    }
    if ta.len() < 2 || tb.len() < 2 {
        return true;
    }
    let (ga, gb) = (&ta[0], &tb[0]);
    ga == gb
        || (ga.len() == 1 && gb.starts_with(ga.as_str()))
        || (gb.len() == 1 && ga.starts_with(gb.as_str()))
}

fn roles_compatible(a: Option<&str>, b: Option<&str>) -> bool {
    match (a.and_then(canonical_role), b.and_then(canonical_role)) {
        (Some(x), Some(y)) => x == y || x == "founder" || y == "founder",
        _ => true,
    }
}

pub fn same_company(a: &str, b: &str) -> bool {
    let (ka, kb) = (company_key(a), company_key(b));
    !ka.is_empty() && (ka == kb || strsim::jaro_winkler(&ka, &kb) >= COMPETITOR_SIMILARITY)
}

pub fn rounds_match(a: &FundingRound, b: &FundingRound) -> bool {
    let ta = a.round_type.as_deref().and_then(canonical_round_type);
    let tb = b.round_type.as_deref().and_then(canonical_round_type);
    let types_known = ta.is_some() && tb.is_some();
    if types_known && ta != tb {
        return false;
    }
    if let (Some(da), Some(db)) = (a.date, b.date) {
        return (da - db).num_days().abs() <= ROUND_DATE_WINDOW_DAYS;
    }
    match (a.amount, b.amount) {
        (Some(x), Some(y)) => within(x, y, ROUND_AMOUNT_TOLERANCE),
        _ => types_known,
    }
}
