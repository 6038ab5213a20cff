// src/normalize/text.rs
//! Search-result and scraped-page text. A few structured keys are read
//! directly; everything else is pattern-matched out of the text and carries
//! the inferred hint.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::{read_schema, Schema, HINT_COERCED, HINT_INFERRED};
use crate::profile::{CompanyProfileFragment, FundingRound, Hinted, TeamMember};
use crate::source::RawSourceResult;

use super::coerce::{
    canonical_round_type, clean_text, display_round_type, parse_amount, tidy_name, valid_year,
};

pub const SCHEMA: Schema = Schema {
    name: &["name", "company_name"],
    description: &["description"],
    industry: &["industry"],
    founded_year: &["founded_year", "founded"],
    location: &["location", "headquarters"],
    website: &["website"],
    employee_count: &["employee_count", "employees"],
    total_funding: &["total_funding", "funding_raised"],
    valuation: &["valuation"],
    funding_rounds: &[],
    team: &[],
    founders: &[],
    executives: &[("ceo", "CEO")],
    revenue: &[],
    profit_loss: &[],
    competitors: &["competitors"],
    market_share: &["market_share"],
    positioning: &[],
};

/// Keys whose values are free text to mine.
const TEXT_KEYS: [&str; 6] = ["text", "snippet", "snippets", "results", "body", "content"];

const MONEY: &str = r"\$\s?\d[\d,]*(?:\.\d+)?\s*(?:billion|million|thousand|bn|[bmk])\b";
const PERSON: &str = r"(?:[A-Z]\.|[A-Z][a-zA-Z'\-]+)(?:\s+(?:[A-Z]\.|[A-Z][a-zA-Z'\-]+)){1,2}";
const ORG: &str = r"[A-Z][\w&\-]*(?:\s+[A-Z][\w&\-]*)*";

fn re(pattern: String) -> Regex {
    Regex::new(&pattern).unwrap_or_else(|e| panic!("bad extraction pattern {pattern}: {e}"))
}

static RE_FUNDING: Lazy<Regex> = Lazy::new(|| {
    re(format!(
        r"(?i)(?:raised|raises|raising|funding of|secured|closed)\s+(?:a\s+|an\s+|about\s+|over\s+|nearly\s+)?({MONEY})"
    ))
});
static RE_VALUATION: Lazy<Regex> = Lazy::new(|| {
    re(format!(
        r"(?i)(?:valued at|valuation of|market cap(?:italization)? of)\s+(?:about\s+|over\s+)?({MONEY})"
    ))
});
static RE_REVENUE: Lazy<Regex> = Lazy::new(|| {
    re(format!(
        r"(?i)(?:annual\s+)?revenues?\s+(?:of\s+)?({MONEY})(?:\s+in\s+((?:19|20)\d{{2}}))?"
    ))
});
static RE_EMPLOYEES: Lazy<Regex> = Lazy::new(|| {
    re(r"(?i)(\d[\d,]*)\+?\s+(?:employees|staff|people)\b|team of (\d[\d,]*)".to_string())
});
static RE_CEO_BEFORE: Lazy<Regex> = Lazy::new(|| {
    re(format!(
        r"(?:\bCEO|(?i:chief executive officer)),?\s+({PERSON})"
    ))
});
static RE_CEO_AFTER: Lazy<Regex> = Lazy::new(|| {
    re(format!(r"({PERSON}),?\s+(?:is\s+)?(?:the\s+)?(?:CEO|(?i:chief executive))\b"))
});
static RE_FOUNDERS: Lazy<Regex> = Lazy::new(|| {
    re(format!(
        r"(?i:founded by|co-?founders?)\s+({PERSON}(?:\s*,\s*{PERSON})*(?:,?\s+and\s+{PERSON})?)"
    ))
});
static RE_FOUNDED: Lazy<Regex> = Lazy::new(|| {
    re(r"(?i)\b(?:founded|established|started)\b[^.]{0,40}?\b((?:18|19|20)\d{2})\b".to_string())
});
static RE_LOCATION: Lazy<Regex> = Lazy::new(|| {
    re(r"(?i:headquartered in|based in|headquarters in)\s+([A-Z][a-zA-Z\-]+(?:\s+[A-Z][a-zA-Z\-]+)*(?:,\s*[A-Z][a-zA-Z\-]+(?:\s+[A-Z][a-zA-Z\-]+)*)?)".to_string())
});
static RE_INDUSTRY: Lazy<Regex> = Lazy::new(|| {
    re(r"(?i)\bis an? ([a-z][a-z\- ]{1,40}?) (?:company|startup|platform|firm|provider)\b".to_string())
});
static RE_COMPETITORS: Lazy<Regex> = Lazy::new(|| {
    re(format!(
        r"(?i:competitors include|competes with|rivals include|competing with|alternatives include)\s+({ORG}(?:(?:\s*,\s*|,?\s+and\s+|,?\s+or\s+){ORG})*)"
    ))
});
static RE_ROUND_TYPE_FIRST: Lazy<Regex> = Lazy::new(|| {
    re(format!(
        r"(?i)\b(series [a-k]|pre-seed|seed|angel)\s+(?:funding\s+)?round\s+of\s+({MONEY})(?:[^.]{{0,60}}?\bled by\s+({ORG}))?"
    ))
});
static RE_AMOUNT_FIRST: Lazy<Regex> = Lazy::new(|| {
    re(format!(
        r"(?i)({MONEY})\s+(series [a-k]|pre-seed|seed|angel)\s+(?:funding\s+)?round(?:[^.]{{0,60}}?\bled by\s+({ORG}))?"
    ))
});

/// Adjectives that precede the industry noun in "is a leading fintech company".
const INDUSTRY_FILLER: [&str; 8] = [
    "leading", "global", "fast growing", "fast-growing", "innovative", "privately held",
    "venture backed", "venture-backed",
];

pub fn normalize(result: &RawSourceResult) -> CompanyProfileFragment {
    let mut frag = read_schema(result, &SCHEMA, HINT_COERCED);

    let mut parts = Vec::new();
    for key in TEXT_KEYS {
        if let Some(v) = result.fields.get(key) {
            collect_text(v, &mut parts);
        }
    }
    if !parts.is_empty() {
        extract_into(&parts.join("\n"), &mut frag);
    }
    frag
}

fn collect_text(v: &Value, out: &mut Vec<String>) {
    match v {
        Value::String(s) => {
            let t = clean_text(s);
            if !t.is_empty() {
                out.push(t);
            }
        }
        Value::Array(items) => items.iter().for_each(|it| collect_text(it, out)),
        Value::Object(o) => {
            for k in ["title", "snippet", "text", "description"] {
                if let Some(v) = o.get(k) {
                    collect_text(v, out);
                }
            }
        }
        _ => {}
    }
}

/// Mine `text` and fill whatever the fragment does not already have.
pub fn extract_into(text: &str, frag: &mut CompanyProfileFragment) {
    let h = HINT_INFERRED;

    if frag.total_funding.is_none() {
        // The largest figure mentioned is usually the cumulative total.
        frag.total_funding = RE_FUNDING
            .captures_iter(text)
            .filter_map(|c| parse_amount(c.get(1)?.as_str()))
            .fold(None, |best: Option<f64>, a| Some(best.map_or(a, |b| b.max(a))))
            .map(|a| Hinted::new(a, h));
    }

    if frag.valuation.is_none() {
        frag.valuation = RE_VALUATION
            .captures(text)
            .and_then(|c| parse_amount(c.get(1)?.as_str()))
            .map(|a| Hinted::new(a, h));
    }

    if frag.revenue.is_empty() {
        for c in RE_REVENUE.captures_iter(text) {
            let Some(amount) = c.get(1).and_then(|m| parse_amount(m.as_str())) else {
                continue;
            };
            let period = c.get(2).map_or("latest", |m| m.as_str()).to_string();
            frag.revenue.entry(period).or_insert_with(|| Hinted::new(amount, h));
        }
    }

    if frag.employee_count.is_none() {
        frag.employee_count = RE_EMPLOYEES
            .captures(text)
            .and_then(|c| c.get(1).or_else(|| c.get(2)))
            .and_then(|m| m.as_str().replace(',', "").parse::<u32>().ok())
            .filter(|n| *n > 0)
            .map(|n| Hinted::new(n, h));
    }

    if frag.founded_year.is_none() {
        frag.founded_year = RE_FOUNDED
            .captures(text)
            .and_then(|c| c.get(1)?.as_str().parse::<i64>().ok())
            .and_then(valid_year)
            .map(|y| Hinted::new(y, h));
    }

    if frag.location.is_none() {
        frag.location = RE_LOCATION
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| Hinted::new(m.as_str().trim().to_string(), h));
    }

    if frag.industry.is_none() {
        frag.industry = RE_INDUSTRY
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| strip_filler(m.as_str()))
            .filter(|s| !s.is_empty())
            .map(|s| Hinted::new(s, h));
    }

    let ceo = RE_CEO_BEFORE
        .captures(text)
        .or_else(|| RE_CEO_AFTER.captures(text))
        .and_then(|c| c.get(1))
        .map(|m| tidy_name(m.as_str()));
    if let Some(name) = ceo {
        frag.team.push(Hinted::new(
            TeamMember {
                name,
                role: Some("CEO".to_string()),
                is_founder: false,
            },
            h,
        ));
    }

    if let Some(list) = RE_FOUNDERS.captures(text).and_then(|c| c.get(1)) {
        for name in split_list(list.as_str()) {
            frag.team.push(Hinted::new(
                TeamMember {
                    name: tidy_name(&name),
                    role: None,
                    is_founder: true,
                },
                h,
            ));
        }
    }

    if let Some(list) = RE_COMPETITORS.captures(text).and_then(|c| c.get(1)) {
        frag.competitors
            .extend(split_list(list.as_str()).into_iter().map(|n| Hinted::new(n, h)));
    }

    for c in RE_ROUND_TYPE_FIRST.captures_iter(text) {
        push_round(frag, c.get(1), c.get(2), c.get(3), h);
    }
    for c in RE_AMOUNT_FIRST.captures_iter(text) {
        push_round(frag, c.get(2), c.get(1), c.get(3), h);
    }
}

fn push_round(
    frag: &mut CompanyProfileFragment,
    kind: Option<regex::Match<'_>>,
    amount: Option<regex::Match<'_>>,
    lead: Option<regex::Match<'_>>,
    hint: f64,
) {
    let round_type = kind
        .and_then(|m| canonical_round_type(m.as_str()))
        .map(|c| display_round_type(&c));
    let amount = amount.and_then(|m| parse_amount(m.as_str()));
    if round_type.is_none() && amount.is_none() {
        return;
    }
    let dup = frag
        .funding_rounds
        .iter()
        .any(|r| r.value.round_type == round_type && r.value.amount == amount);
    if dup {
        return;
    }
    frag.funding_rounds.push(Hinted::new(
        FundingRound {
            date: None,
            amount,
            round_type,
            investors: lead.map(|m| m.as_str().trim().to_string()).into_iter().collect(),
        },
        hint,
    ));
}

fn strip_filler(s: &str) -> String {
    let mut t = s.trim().to_lowercase();
    for f in INDUSTRY_FILLER {
        if let Some(rest) = t.strip_prefix(f) {
            t = rest.trim_start().to_string();
        }
    }
    t
}

/// "A, B and C" → ["A", "B", "C"].
fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .flat_map(|p| p.split(" and "))
        .flat_map(|p| p.split(" or "))
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceId;
    use chrono::Utc;

    fn mined(text: &str) -> CompanyProfileFragment {
        let mut f = CompanyProfileFragment::empty(SourceId::GeneralSearch, Utc::now());
        extract_into(text, &mut f);
        f
    }

    #[test]
    fn extracts_money_figures() {
        let f = mined(
            "Acme raised $5 million in 2019 and later raised $40M. \
             The company was valued at $1.2 billion. Acme reported revenue of $30M in 2023.",
        );
        assert_eq!(f.total_funding.unwrap().value, 40_000_000.0);
        assert_eq!(f.valuation.unwrap().value, 1_200_000_000.0);
        assert_eq!(f.revenue["2023"].value, 30_000_000.0);
    }

    #[test]
    fn extracts_people() {
        let f = mined("Acme was founded by Jane Smith and Raj Patel. CEO Jane Smith said growth is strong.");
        let names: Vec<&str> = f.team.iter().map(|m| m.value.name.as_str()).collect();
        assert!(names.contains(&"Raj Patel"));
        assert!(f
            .team
            .iter()
            .any(|m| m.value.name == "Jane Smith" && m.value.role.as_deref() == Some("CEO")));
        assert!(f.team.iter().all(|m| m.hint == HINT_INFERRED));
    }

    #[test]
    fn extracts_identity_and_market() {
        let f = mined(
            "Acme is a fintech company headquartered in San Francisco, California. \
             Founded in 2015, it has 250 employees. Acme competes with Stripe, Adyen and Square.",
        );
        assert_eq!(f.industry.unwrap().value, "fintech");
        assert_eq!(f.location.unwrap().value, "San Francisco, California");
        assert_eq!(f.founded_year.unwrap().value, 2015);
        assert_eq!(f.employee_count.unwrap().value, 250);
        let comps: Vec<&str> = f.competitors.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(comps, vec!["Stripe", "Adyen", "Square"]);
    }

    #[test]
    fn extracts_rounds_with_lead_investor() {
        let f = mined("Acme announced a Series B round of $25 million led by Sequoia Capital.");
        let r = &f.funding_rounds[0].value;
        assert_eq!(r.round_type.as_deref(), Some("Series B"));
        assert_eq!(r.amount, Some(25_000_000.0));
        assert!(r.investors.contains("Sequoia Capital"));
    }

    #[test]
    fn structured_keys_win_over_text() {
        let mut fields = std::collections::BTreeMap::new();
        fields.insert("industry".to_string(), Value::String("Payments".into()));
        fields.insert(
            "snippets".to_string(),
            serde_json::json!(["Acme is a fintech company."]),
        );
        let f = normalize(&RawSourceResult::success(SourceId::GeneralSearch, fields));
        let industry = f.industry.unwrap();
        assert_eq!(industry.value, "Payments");
        assert_eq!(industry.hint, HINT_COERCED);
    }
}
