// src/normalize/mod.rs
//! Normalizer: maps each source's raw, source-shaped fields onto the
//! canonical fragment schema. Dispatch is a fixed step per `SourceId`;
//! source-specific shapes never leave this module.

pub mod coerce;
pub mod network;
pub mod structured;
pub mod text;

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::profile::{
    CompanyProfileFragment, FundingRound, Hinted, NormalizationAnomaly, TeamMember,
};
use crate::source::{FetchStatus, RawSourceResult, SourceId};
use coerce::{
    amount_from_json, canonical_round_type, clean_text, display_round_type, mentions_founder,
    normalize_period, parse_date, parse_employee_count, parse_share, parse_website, tidy_name,
    year_from_json,
};

/// Value read from a structured field as-is.
pub const HINT_STRUCTURED: f64 = 0.9;
/// Value read from a structured field but reshaped (ranges, free-form dates, ...).
pub const HINT_COERCED: f64 = 0.75;
/// Value pattern-matched out of unstructured text.
pub const HINT_INFERRED: f64 = 0.5;
/// Upper bound for anything coming from the lightweight fallback source.
pub const FALLBACK_HINT_CAP: f64 = 0.4;

/// Normalize one raw result. Failed/Blocked/TimedOut produce no fragment;
/// Empty produces a blank fragment (consulted, contributes nothing).
pub fn normalize(result: &RawSourceResult) -> Option<CompanyProfileFragment> {
    match result.status {
        FetchStatus::Failed | FetchStatus::TimedOut | FetchStatus::Blocked => return None,
        FetchStatus::Empty => {
            return Some(CompanyProfileFragment::empty(result.source, result.fetched_at))
        }
        FetchStatus::Success | FetchStatus::PartialSuccess => {}
    }

    let mut frag = match result.source {
        SourceId::StructuredDb => structured::normalize(result),
        SourceId::ProfessionalNetwork => network::normalize(result),
        SourceId::GeneralSearch | SourceId::LightweightFallback => text::normalize(result),
    };

    if result.source == SourceId::LightweightFallback {
        cap_hints(&mut frag, FALLBACK_HINT_CAP);
    }

    for a in &frag.anomalies {
        tracing::debug!(
            source = %a.source,
            field = %a.field,
            raw = %a.raw,
            reason = %a.reason,
            "normalization anomaly"
        );
    }
    Some(frag)
}

fn cap_hints(frag: &mut CompanyProfileFragment, cap: f64) {
    fn cap_opt<T>(v: &mut Option<Hinted<T>>, cap: f64) {
        if let Some(h) = v {
            h.hint = h.hint.min(cap);
        }
    }
    fn cap_all<'a, T: 'a>(vs: impl Iterator<Item = &'a mut Hinted<T>>, cap: f64) {
        for h in vs {
            h.hint = h.hint.min(cap);
        }
    }

    cap_opt(&mut frag.name, cap);
    cap_opt(&mut frag.description, cap);
    cap_opt(&mut frag.industry, cap);
    cap_opt(&mut frag.founded_year, cap);
    cap_opt(&mut frag.location, cap);
    cap_opt(&mut frag.website, cap);
    cap_opt(&mut frag.employee_count, cap);
    cap_opt(&mut frag.total_funding, cap);
    cap_opt(&mut frag.valuation, cap);
    cap_opt(&mut frag.market_share, cap);
    cap_opt(&mut frag.positioning, cap);
    cap_all(frag.funding_rounds.iter_mut(), cap);
    cap_all(frag.team.iter_mut(), cap);
    cap_all(frag.competitors.iter_mut(), cap);
    cap_all(frag.revenue.values_mut(), cap);
    cap_all(frag.profit_loss.values_mut(), cap);
}

// ------------------------------------------------------------
// Schema-driven reading shared by the structured sources
// ------------------------------------------------------------

/// Per-source key aliases for each canonical field (first present key wins).
pub struct Schema {
    pub name: &'static [&'static str],
    pub description: &'static [&'static str],
    pub industry: &'static [&'static str],
    pub founded_year: &'static [&'static str],
    pub location: &'static [&'static str],
    pub website: &'static [&'static str],
    pub employee_count: &'static [&'static str],
    pub total_funding: &'static [&'static str],
    pub valuation: &'static [&'static str],
    pub funding_rounds: &'static [&'static str],
    pub team: &'static [&'static str],
    /// Team lists whose members are founders by definition.
    pub founders: &'static [&'static str],
    /// Single-name executive keys ("ceo": "Jane Smith") → (key, role).
    pub executives: &'static [(&'static str, &'static str)],
    pub revenue: &'static [&'static str],
    pub profit_loss: &'static [&'static str],
    pub competitors: &'static [&'static str],
    pub market_share: &'static [&'static str],
    pub positioning: &'static [&'static str],
}

/// Read every canonical field listed in `schema` with base hint `hint`.
pub fn read_schema(result: &RawSourceResult, schema: &Schema, hint: f64) -> CompanyProfileFragment {
    let mut r = FieldReader::new(result.source, &result.fields);
    let mut frag = CompanyProfileFragment::empty(result.source, result.fetched_at);

    frag.name = r.text("name", schema.name, hint);
    frag.description = r.text("description", schema.description, hint);
    frag.industry = r.first_text("industry", schema.industry, hint);
    frag.founded_year = r.year("founded_year", schema.founded_year, hint);
    frag.location = r.first_text("location", schema.location, hint);
    frag.website = r.website("website", schema.website, hint);
    frag.employee_count = r.employees("employee_count", schema.employee_count, hint);
    frag.total_funding = r.amount("total_funding", schema.total_funding, hint);
    frag.valuation = r.amount("valuation", schema.valuation, hint);
    frag.funding_rounds = r.rounds("funding_rounds", schema.funding_rounds, hint);
    frag.team = r.team("team", schema.team, false, hint);
    frag.team.extend(r.team("team", schema.founders, true, hint));
    for (key, role) in schema.executives {
        if let Some(Value::String(name)) = r.get(&[*key]).map(|(_, v)| v) {
            let name = tidy_name(&clean_text(name));
            if !name.is_empty() {
                frag.team.push(Hinted::new(
                    TeamMember {
                        name,
                        role: Some((*role).to_string()),
                        is_founder: false,
                    },
                    hint,
                ));
            }
        }
    }
    frag.revenue = r.series("revenue", schema.revenue, hint);
    frag.profit_loss = r.series("profit_loss", schema.profit_loss, hint);
    frag.competitors = r.names("competitors", schema.competitors, hint);
    frag.market_share = r.share("market_share", schema.market_share, hint);
    frag.positioning = r.text("positioning", schema.positioning, hint);

    frag.anomalies = r.into_anomalies();
    frag
}

static NULL: Value = Value::Null;

/// Cursor over one raw field map that records coercion failures.
pub struct FieldReader<'a> {
    source: SourceId,
    fields: &'a BTreeMap<String, Value>,
    anomalies: Vec<NormalizationAnomaly>,
}

impl<'a> FieldReader<'a> {
    pub fn new(source: SourceId, fields: &'a BTreeMap<String, Value>) -> Self {
        Self {
            source,
            fields,
            anomalies: Vec::new(),
        }
    }

    pub fn into_anomalies(self) -> Vec<NormalizationAnomaly> {
        self.anomalies
    }

    /// First key present with a non-null, non-blank value.
    pub fn get(&self, keys: &[&str]) -> Option<(&'a str, &'a Value)> {
        let fields: &'a BTreeMap<String, Value> = self.fields;
        keys.iter().find_map(|k| {
            let (key, v) = fields.get_key_value(*k)?;
            match v {
                Value::Null => None,
                Value::String(s) if s.trim().is_empty() => None,
                Value::Array(a) if a.is_empty() => None,
                _ => Some((key.as_str(), v)),
            }
        })
    }

    pub fn anomaly(&mut self, field: &str, raw: &Value, reason: &str) {
        let raw = match raw {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.anomalies.push(NormalizationAnomaly {
            source: self.source,
            field: field.to_string(),
            raw,
            reason: reason.to_string(),
        });
    }

    pub fn text(&mut self, field: &str, keys: &[&str], hint: f64) -> Option<Hinted<String>> {
        let (_, v) = self.get(keys)?;
        match text_of(v) {
            Some(t) => Some(Hinted::new(t, hint)),
            None => {
                self.anomaly(field, v, "not text");
                None
            }
        }
    }

    /// Like `text`, but for lists takes the first element (primary category).
    pub fn first_text(&mut self, field: &str, keys: &[&str], hint: f64) -> Option<Hinted<String>> {
        let (_, v) = self.get(keys)?;
        let first = match v {
            Value::Array(items) => items.iter().find_map(text_of),
            other => text_of(other),
        };
        match first {
            Some(t) => Some(Hinted::new(t, hint)),
            None => {
                self.anomaly(field, v, "not text");
                None
            }
        }
    }

    pub fn year(&mut self, field: &str, keys: &[&str], hint: f64) -> Option<Hinted<i32>> {
        let (_, v) = self.get(keys)?;
        let exact = matches!(v, Value::Number(_))
            || matches!(v, Value::String(s) if s.trim().len() == 4);
        match year_from_json(v) {
            Some(y) => Some(Hinted::new(y, if exact { hint } else { hint.min(HINT_COERCED) })),
            None => {
                self.anomaly(field, v, "no plausible year");
                None
            }
        }
    }

    pub fn amount(&mut self, field: &str, keys: &[&str], hint: f64) -> Option<Hinted<f64>> {
        let (_, v) = self.get(keys)?;
        match amount_from_json(v) {
            Some(a) if a >= 0.0 => Some(Hinted::new(a, hint)),
            _ => {
                self.anomaly(field, v, "not an amount");
                None
            }
        }
    }

    pub fn employees(&mut self, field: &str, keys: &[&str], hint: f64) -> Option<Hinted<u32>> {
        let (_, v) = self.get(keys)?;
        let parsed = match v {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).map(|n| (n, true)),
            Value::String(s) => parse_employee_count(s),
            _ => None,
        };
        match parsed {
            Some((n, exact)) => Some(Hinted::new(n, if exact { hint } else { hint.min(HINT_COERCED) })),
            None => {
                self.anomaly(field, v, "not an employee count");
                None
            }
        }
    }

    pub fn website(&mut self, field: &str, keys: &[&str], hint: f64) -> Option<Hinted<String>> {
        let (_, v) = self.get(keys)?;
        let parsed = match v {
            Value::String(s) => parse_website(s).or_else(|| {
                // Bare domains ("acme.io") are promoted to https.
                let t = s.trim();
                (t.contains('.') && !t.contains(' ') && !t.contains('@'))
                    .then(|| format!("https://{}", t.trim_end_matches('/')))
            }),
            _ => None,
        };
        match parsed {
            Some(w) => Some(Hinted::new(w, hint)),
            None => {
                self.anomaly(field, v, "not a website url");
                None
            }
        }
    }

    pub fn share(&mut self, field: &str, keys: &[&str], hint: f64) -> Option<Hinted<f64>> {
        let (_, v) = self.get(keys)?;
        match parse_share(v) {
            Some(s) => Some(Hinted::new(s, hint)),
            None => {
                self.anomaly(field, v, "not a share in [0,1]");
                None
            }
        }
    }

    /// Period → amount series from an object, a list of {period, amount},
    /// or a bare scalar (stored under "latest").
    pub fn series(
        &mut self,
        field: &str,
        keys: &[&str],
        hint: f64,
    ) -> BTreeMap<String, Hinted<f64>> {
        let mut out = BTreeMap::new();
        let Some((_, v)) = self.get(keys) else {
            return out;
        };
        let mut push = |this: &mut Self, period: &str, amount: &Value| {
            match (normalize_period(period), amount_from_json(amount)) {
                (Some(p), Some(a)) => {
                    out.insert(p, Hinted::new(a, hint));
                }
                _ => this.anomaly(field, amount, &format!("bad period entry '{period}'")),
            }
        };
        match v {
            Value::Object(map) => {
                for (period, amount) in map {
                    push(self, period, amount);
                }
            }
            Value::Array(items) => {
                for it in items {
                    let period = it
                        .get("period")
                        .or_else(|| it.get("year"))
                        .and_then(text_of)
                        .unwrap_or_default();
                    let amount = it.get("amount").or_else(|| it.get("value")).unwrap_or(&NULL);
                    push(self, &period, amount);
                }
            }
            scalar => match amount_from_json(scalar) {
                Some(a) => {
                    out.insert("latest".to_string(), Hinted::new(a, hint.min(HINT_COERCED)));
                }
                None => self.anomaly(field, scalar, "not an amount"),
            },
        }
        out
    }

    /// List of names (strings or objects with `name`).
    pub fn names(&mut self, field: &str, keys: &[&str], hint: f64) -> Vec<Hinted<String>> {
        let Some((_, v)) = self.get(keys) else {
            return Vec::new();
        };
        let items: Vec<&Value> = match v {
            Value::Array(items) => items.iter().collect(),
            Value::String(s) if s.contains(',') => {
                return s
                    .split(',')
                    .map(clean_text)
                    .filter(|n| !n.is_empty())
                    .map(|n| Hinted::new(n, hint.min(HINT_COERCED)))
                    .collect();
            }
            other => vec![other],
        };
        let mut out = Vec::new();
        for it in items {
            match name_of(it) {
                Some(n) => out.push(Hinted::new(n, hint)),
                None => self.anomaly(field, it, "entry without a name"),
            }
        }
        out
    }

    pub fn team(
        &mut self,
        field: &str,
        keys: &[&str],
        founders: bool,
        hint: f64,
    ) -> Vec<Hinted<TeamMember>> {
        let Some((_, Value::Array(items))) = self.get(keys) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for it in items {
            match member_of(it, founders) {
                Some(m) => out.push(Hinted::new(m, hint)),
                None => self.anomaly(field, it, "team entry without a name"),
            }
        }
        out
    }

    pub fn rounds(&mut self, field: &str, keys: &[&str], hint: f64) -> Vec<Hinted<FundingRound>> {
        let Some((_, Value::Array(items))) = self.get(keys) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for it in items {
            let Value::Object(obj) = it else {
                self.anomaly(field, it, "round is not an object");
                continue;
            };
            let pick = |ks: &[&str]| ks.iter().find_map(|k| obj.get(*k).filter(|v| !v.is_null()));

            let date = pick(&["announced_on", "date", "announced", "closed_on"])
                .and_then(text_of)
                .and_then(|s| parse_date(&s));
            let amount = pick(&["money_raised", "amount", "raised_amount", "raised"])
                .and_then(amount_from_json);
            let round_type = pick(&["investment_type", "round_type", "round", "type", "series"])
                .and_then(text_of)
                .and_then(|s| canonical_round_type(&s))
                .map(|c| display_round_type(&c));
            let investors: BTreeSet<String> = pick(&["investors", "lead_investors", "investor_names"])
                .map(|v| match v {
                    Value::Array(xs) => xs.iter().filter_map(name_of).collect(),
                    Value::String(s) => s.split(',').map(clean_text).filter(|n| !n.is_empty()).collect(),
                    _ => Default::default(),
                })
                .unwrap_or_default();

            if date.is_none() && amount.is_none() && round_type.is_none() {
                self.anomaly(field, it, "round without date, amount or type");
                continue;
            }
            out.push(Hinted::new(
                FundingRound {
                    date,
                    amount,
                    round_type,
                    investors,
                },
                hint,
            ));
        }
        out
    }
}

/// Scalar → display text; strings are cleaned, numbers stringified.
pub fn text_of(v: &Value) -> Option<String> {
    let t = match v {
        Value::String(s) => clean_text(s),
        Value::Number(n) => n.to_string(),
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    (!t.is_empty()).then_some(t)
}

/// Name from a string or an object carrying `name`/`title`.
pub fn name_of(v: &Value) -> Option<String> {
    match v {
        Value::Object(o) => o
            .get("name")
            .or_else(|| o.get("title"))
            .and_then(text_of),
        other => text_of(other),
    }
}

/// "Jane Smith, CEO" / "Jane Smith - CEO" / "Jane Smith (CEO)" / {name, title}.
pub fn member_of(v: &Value, founder: bool) -> Option<TeamMember> {
    let (name, role) = match v {
        Value::Object(o) => {
            let name = o.get("name").and_then(text_of)?;
            let role = ["title", "role", "position", "job_title", "headline"]
                .iter()
                .find_map(|k| o.get(*k).and_then(text_of))
                .map(|r| strip_employer(&r));
            (name, role)
        }
        Value::String(s) => split_name_role(&clean_text(s)),
        _ => return None,
    };
    let name = tidy_name(&name);
    if name.is_empty() {
        return None;
    }
    let is_founder = founder
        || role.as_deref().is_some_and(mentions_founder)
        || matches!(v, Value::Object(o) if o.get("is_founder").and_then(Value::as_bool) == Some(true));
    Some(TeamMember {
        name,
        role: role.filter(|r| !r.is_empty()),
        is_founder,
    })
}

pub fn split_name_role(s: &str) -> (String, Option<String>) {
    if let Some((name, rest)) = s.split_once('(') {
        let role = rest.trim_end_matches(')').trim();
        return (name.trim().to_string(), Some(role.to_string()).filter(|r| !r.is_empty()));
    }
    for sep in [", ", " - ", " – ", " | "] {
        if let Some((name, role)) = s.split_once(sep) {
            return (name.trim().to_string(), Some(strip_employer(role.trim())));
        }
    }
    (s.trim().to_string(), None)
}

/// "Co-founder & CEO at Acme" → "Co-founder & CEO".
pub fn strip_employer(role: &str) -> String {
    for sep in [" at ", " @ "] {
        if let Some((r, _)) = role.split_once(sep) {
            return r.trim().to_string();
        }
    }
    role.trim().to_string()
}
