// src/normalize/network.rs
//! Professional-network company pages.

use serde_json::Value;

use super::{member_of, name_of, read_schema, text_of, Schema, HINT_COERCED, HINT_STRUCTURED};
use crate::profile::{CompanyProfileFragment, Hinted};
use crate::source::RawSourceResult;

pub const SCHEMA: Schema = Schema {
    name: &["company_name", "name"],
    description: &["about", "overview", "description", "tagline"],
    industry: &["industry", "industries"],
    founded_year: &["founded", "founded_year"],
    location: &["headquarters", "location"],
    website: &["website", "company_url"],
    employee_count: &["company_size", "employee_count", "staff_count", "employees"],
    total_funding: &["funding_raised", "total_funding"],
    valuation: &[],
    funding_rounds: &[],
    team: &["people", "leadership_team", "key_people"],
    founders: &["founders"],
    executives: &[("ceo", "CEO")],
    revenue: &[],
    profit_loss: &[],
    competitors: &[],
    market_share: &[],
    positioning: &[],
};

pub fn normalize(result: &RawSourceResult) -> CompanyProfileFragment {
    let mut frag = read_schema(result, &SCHEMA, HINT_STRUCTURED);

    // Leadership arrives as {"ceo": "...", "leadership_team": [...]}.
    if let Some(Value::Object(lead)) = result.fields.get("leadership") {
        if let Some(ceo) = lead.get("ceo").and_then(text_of) {
            if let Some(mut m) = member_of(&Value::String(ceo), false) {
                m.role.get_or_insert_with(|| "CEO".to_string());
                frag.team.push(Hinted::new(m, HINT_STRUCTURED));
            }
        }
        if let Some(Value::Array(items)) = lead.get("leadership_team") {
            frag.team
                .extend(items.iter().filter_map(|v| member_of(v, false)).map(|m| Hinted::new(m, HINT_COERCED)));
        }
    }

    // "Similar pages" are the network's competitor signal; weaker than a
    // curated competitor list.
    if let Some(Value::Array(similar)) = result.fields.get("similar_pages") {
        frag.competitors.extend(
            similar
                .iter()
                .filter_map(name_of)
                .map(|n| Hinted::new(n, HINT_COERCED)),
        );
    }

    // Specialties are a keyword list; the joined form is positioning text.
    if let Some(Value::Array(spec)) = result.fields.get("specialties") {
        let joined: Vec<String> = spec.iter().filter_map(text_of).collect();
        if !joined.is_empty() {
            frag.positioning = Some(Hinted::new(joined.join(", "), HINT_COERCED));
        }
    }
    frag
}
