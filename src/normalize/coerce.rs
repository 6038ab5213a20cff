// src/normalize/coerce.rs
//! Best-effort coercion of source-shaped values into canonical types.
//! Every parser returns `None` instead of guessing; the caller records the
//! anomaly.

use chrono::{Datelike, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// Max length kept for free text blobs.
const TEXT_CAP: usize = 20_000;

/// Normalize text: decode entities, strip tags, ASCII quotes, collapse
/// whitespace, trim trailing sentence punctuation.
pub fn clean_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags (and script/style bodies)
    static RE_SCRIPT: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").unwrap());
    static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = RE_SCRIPT.replace_all(&out, " ").to_string();
    out = RE_TAGS.replace_all(&out, " ").to_string();

    // 3) Typographic quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
    out = RE_WS.replace_all(&out, " ").trim().to_string();

    // 5) Trailing sentence punctuation
    while let Some(last) = out.chars().last() {
        if matches!(last, '!' | '?' | '.' | ',' | ';') {
            out.pop();
        } else {
            break;
        }
    }

    if out.chars().count() > TEXT_CAP {
        out = out.chars().take(TEXT_CAP).collect();
    }
    out
}

/// Comparison key: lowercase, separators/punctuation to spaces, collapsed.
pub fn normalize_key(s: &str) -> String {
    let mut out = s.trim().to_lowercase();

    for ch in ['—', '–', '-', '_', '/', '\\'] {
        out = out.replace(ch, " ");
    }
    out = out.replace(
        ['\n', '\r', '\t', '.', ',', '‚', '’', '\'', '"', '(', ')', '&', ':', ';', '!', '?'],
        " ",
    );

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Title-case person names that arrive all-lower or all-upper; mixed-case
/// input ("McDonald", "van der Berg") is kept as-is.
pub fn tidy_name(s: &str) -> String {
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(|c: char| c == ',' || c == ';' || c == '-').trim();
    let has_lower = trimmed.chars().any(|c| c.is_lowercase());
    let has_upper = trimmed.chars().any(|c| c.is_uppercase());
    if has_lower && has_upper {
        return trimmed.to_string();
    }
    trimmed
        .split(' ')
        .map(|w| {
            let mut cs = w.chars();
            match cs.next() {
                Some(first) => first.to_uppercase().chain(cs.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// "$12.5M", "USD 3 billion", "€4,000,000", "1.2bn" → amount in base units.
///
/// When several numbers appear, one carrying a currency or magnitude marker
/// wins; otherwise a bare year ("FY2023") yields to a later number.
pub fn parse_amount(s: &str) -> Option<f64> {
    static RE_AMOUNT: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?i)(-)?\s*([$€£]|\b(?:usd|eur|gbp)\b)?\s*(\d[\d,]*(?:\.\d+)?)\s*(billion|bn|b|million|mm|mn|m|thousand|k)?\b",
        )
        .unwrap()
    });
    let s = s.trim();
    let negative_total = s.starts_with('(');

    let mut first = None;
    let mut first_plain = None;
    for caps in RE_AMOUNT.captures_iter(s) {
        let Some(digits) = caps.get(3).map(|m| m.as_str().replace(',', "")) else {
            continue;
        };
        let Ok(mut amount) = digits.parse::<f64>() else {
            continue;
        };
        let suffix = caps.get(4).map(|m| m.as_str().to_ascii_lowercase());
        amount *= match suffix.as_deref() {
            Some("billion" | "bn" | "b") => 1_000_000_000.0,
            Some("million" | "mm" | "mn" | "m") => 1_000_000.0,
            Some("thousand" | "k") => 1_000.0,
            _ => 1.0,
        };
        if caps.get(1).is_some() || negative_total {
            amount = -amount;
        }
        if !amount.is_finite() {
            continue;
        }

        if caps.get(2).is_some() || suffix.is_some() {
            return Some(amount);
        }
        first.get_or_insert(amount);
        let year_like = digits.len() == 4 && valid_year(amount as i64).is_some();
        if !year_like {
            first_plain.get_or_insert(amount);
        }
    }
    first_plain.or(first)
}

/// Amount from either a JSON number or a string.
pub fn amount_from_json(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => parse_amount(s),
        _ => None,
    }
}

/// Plausible founding years only.
pub fn valid_year(y: i64) -> Option<i32> {
    let max = i64::from(Utc::now().year()) + 1;
    (1800..=max).contains(&y).then_some(y as i32)
}

/// First plausible 4-digit year in free text ("Founded in 2015", "2015-03-01").
pub fn parse_year(s: &str) -> Option<i32> {
    static RE_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(1[89]\d{2}|20\d{2})\b").unwrap());
    RE_YEAR
        .captures_iter(s)
        .filter_map(|c| c.get(1)?.as_str().parse::<i64>().ok())
        .find_map(valid_year)
}

pub fn year_from_json(v: &serde_json::Value) -> Option<i32> {
    match v {
        serde_json::Value::Number(n) => n.as_i64().and_then(valid_year),
        serde_json::Value::String(s) => parse_year(s),
        _ => None,
    }
}

/// ISO, "Mar 15, 2021", "15 March 2021", "March 2021", "2021".
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let t = s.trim();
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%b %d, %Y", "%B %d, %Y", "%d %B %Y", "%d %b %Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(t, fmt) {
            return Some(d);
        }
    }
    if let Some(prefix) = t.get(..10) {
        if let Ok(d) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(d);
        }
    }
    for fmt in ["%d %B %Y", "%d %b %Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(&format!("1 {t}"), fmt) {
            return Some(d);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{t}-01"), "%Y-%m-%d") {
        return Some(d);
    }
    let y = t.parse::<i64>().ok().and_then(valid_year)?;
    NaiveDate::from_ymd_opt(y, 1, 1)
}

/// Employee count. Returns `(count, exact)`; ranges ("51-200") yield the
/// midpoint with `exact == false`.
pub fn parse_employee_count(s: &str) -> Option<(u32, bool)> {
    static RE_RANGE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(\d[\d,]*)\s*(?:-|–|to)\s*(\d[\d,]*)").unwrap());
    static RE_NUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d[\d,]*)\s*(\+)?").unwrap());

    let num = |m: &str| m.replace(',', "").parse::<u32>().ok();
    if let Some(c) = RE_RANGE.captures(s) {
        let lo = num(c.get(1)?.as_str())?;
        let hi = num(c.get(2)?.as_str())?;
        if hi >= lo {
            return Some((lo + (hi - lo) / 2, false));
        }
    }
    let c = RE_NUM.captures(s)?;
    let n = num(c.get(1)?.as_str())?;
    Some((n, c.get(2).is_none()))
}

/// "12%", "0.12", 12 → fraction in [0,1].
pub fn parse_share(v: &serde_json::Value) -> Option<f64> {
    let (x, percent) = match v {
        serde_json::Value::Number(n) => (n.as_f64()?, false),
        serde_json::Value::String(s) => {
            let t = s.trim();
            let percent = t.ends_with('%');
            (t.trim_end_matches('%').trim().parse::<f64>().ok()?, percent)
        }
        _ => return None,
    };
    let frac = if percent || x > 1.0 { x / 100.0 } else { x };
    (0.0..=1.0).contains(&frac).then_some(frac)
}

/// "FY2023", "2023", "Q1 2024", "2024 Q1" → "2023" / "2024-Q1".
pub fn normalize_period(s: &str) -> Option<String> {
    static RE_Q: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)\bq([1-4])\s*[-/ ]?\s*(?:fy)?((?:19|20)\d{2})\b|\b(?:fy)?((?:19|20)\d{2})\s*[-/ ]?\s*q([1-4])\b")
            .unwrap()
    });
    if let Some(c) = RE_Q.captures(s) {
        let (q, y) = match (c.get(1), c.get(2), c.get(3), c.get(4)) {
            (Some(q), Some(y), _, _) => (q.as_str(), y.as_str()),
            (_, _, Some(y), Some(q)) => (q.as_str(), y.as_str()),
            _ => return None,
        };
        return Some(format!("{y}-Q{q}"));
    }
    let upper = s.to_ascii_uppercase();
    parse_year(upper.trim_start_matches("FY")).map(|y| y.to_string())
}

/// http(s) URLs only, trailing slash trimmed.
pub fn parse_website(s: &str) -> Option<String> {
    let t = s.trim();
    let lower = t.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) || t.contains(' ') {
        return None;
    }
    Some(t.trim_end_matches('/').to_string())
}

/// Canonical role key: "Chief Executive Officer" → "ceo", "Co-Founder & CTO" → "cto".
pub fn canonical_role(role: &str) -> Option<String> {
    let key = normalize_key(role);
    if key.is_empty() {
        return None;
    }
    const TABLE: [(&str, &str); 10] = [
        ("chief executive officer", "ceo"),
        ("chief technology officer", "cto"),
        ("chief financial officer", "cfo"),
        ("chief operating officer", "coo"),
        ("chief product officer", "cpo"),
        ("chief marketing officer", "cmo"),
        ("chief revenue officer", "cro"),
        ("chief information officer", "cio"),
        ("vice president", "vp"),
        ("managing director", "md"),
    ];
    let mut expanded = key.clone();
    for (long, short) in TABLE {
        expanded = expanded.replace(long, short);
    }
    let words: Vec<&str> = expanded
        .split(' ')
        .filter(|w| !matches!(*w, "co" | "founder" | "cofounder" | "and" | "the" | "at"))
        .collect();
    if let Some(exec) = words
        .iter()
        .find(|w| matches!(**w, "ceo" | "cto" | "cfo" | "coo" | "cpo" | "cmo" | "cro" | "cio"))
    {
        return Some((*exec).to_string());
    }
    if words.is_empty() {
        // Title was only "Founder"/"Co-Founder".
        return Some("founder".to_string());
    }
    Some(words.join(" "))
}

pub fn mentions_founder(role: &str) -> bool {
    let key = normalize_key(role);
    key.contains("founder")
}

/// Canonical funding round type: "Series A" → "series a", "Seed Round" → "seed".
pub fn canonical_round_type(s: &str) -> Option<String> {
    let key = normalize_key(s);
    static RE_SERIES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bseries ([a-k])\b").unwrap());
    if let Some(c) = RE_SERIES.captures(&key) {
        return Some(format!("series {}", c.get(1)?.as_str()));
    }
    for kind in ["pre seed", "seed", "angel", "ipo", "debt", "grant", "convertible", "private equity"] {
        if key.contains(kind) {
            return Some(kind.to_string());
        }
    }
    (!key.is_empty()).then_some(key)
}

/// Display form for a canonical round type.
pub fn display_round_type(canonical: &str) -> String {
    match canonical {
        "ipo" => "IPO".to_string(),
        other => tidy_name(other),
    }
}

/// Company name key with common legal suffixes removed.
pub fn company_key(s: &str) -> String {
    let key = normalize_key(s);
    let words: Vec<&str> = key
        .split(' ')
        .filter(|w| {
            !matches!(
                *w,
                "inc" | "incorporated" | "ltd" | "limited" | "llc" | "corp" | "corporation"
                    | "co" | "gmbh" | "plc" | "sa" | "ag" | "the"
            )
        })
        .collect();
    words.join(" ")
}
