// src/normalize/structured.rs
//! Structured-database records (funding-database shaped).

use serde_json::Value;

use super::{read_schema, text_of, Schema, HINT_STRUCTURED};
use crate::profile::CompanyProfileFragment;
use crate::source::RawSourceResult;

pub const SCHEMA: Schema = Schema {
    name: &["name", "company_name", "organization"],
    description: &["short_description", "description", "summary", "tagline"],
    industry: &["industry", "categories", "category", "sector"],
    founded_year: &["founded_year", "founded_on", "founded", "year_founded"],
    location: &["location", "headquarters", "hq", "headquarters_location", "city"],
    website: &["website", "homepage_url", "url", "domain"],
    employee_count: &["employee_count", "employees", "num_employees", "num_employees_enum"],
    total_funding: &["total_funding", "funding_raised", "funding_total", "total_funding_usd"],
    valuation: &["valuation", "last_valuation", "post_money_valuation"],
    funding_rounds: &["funding_rounds", "rounds"],
    team: &["people", "team", "leadership", "executives"],
    founders: &["founders"],
    executives: &[("ceo", "CEO"), ("cto", "CTO"), ("cfo", "CFO")],
    revenue: &["revenue", "revenue_by_period", "revenues"],
    profit_loss: &["profit_loss", "net_income", "profit"],
    competitors: &["competitors", "similar_companies"],
    market_share: &["market_share"],
    positioning: &["positioning", "market_position", "value_proposition"],
};

pub fn normalize(result: &RawSourceResult) -> CompanyProfileFragment {
    let mut frag = read_schema(result, &SCHEMA, HINT_STRUCTURED);

    // Company-level investor lists carry no round; attach them to the single
    // round when that is unambiguous.
    if let (Some(Value::Array(investors)), [round]) =
        (result.fields.get("investors"), frag.funding_rounds.as_mut_slice())
    {
        if round.value.investors.is_empty() {
            round.value.investors = investors.iter().filter_map(text_of).collect();
        }
    }
    frag
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceId;
    use chrono::NaiveDate;
    use serde_json::json;

    fn result(v: Value) -> RawSourceResult {
        let Value::Object(m) = v else { unreachable!() };
        RawSourceResult::success(SourceId::StructuredDb, m.into_iter().collect())
    }

    #[test]
    fn reads_a_funding_database_record() {
        let f = normalize(&result(json!({
            "name": "Acme Payments",
            "short_description": "Payments infrastructure for marketplaces",
            "categories": ["Fintech", "Payments"],
            "founded_on": "2015-06-01",
            "headquarters": "San Francisco, California",
            "homepage_url": "acme.io",
            "num_employees_enum": "51-200",
            "funding_raised": "$12.5M",
            "funding_rounds": [
                {"announced_on": "2021-03-15", "money_raised": "$10M",
                 "investment_type": "series_a", "investors": ["Sequoia", {"name": "Accel"}]}
            ],
            "founders": ["Jane Smith"],
            "ceo": "Jane Smith",
            "revenue": {"2023": "$4M"}
        })));

        assert_eq!(f.name.unwrap().value, "Acme Payments");
        assert_eq!(f.industry.unwrap().value, "Fintech");
        let year = f.founded_year.unwrap();
        assert_eq!(year.value, 2015);
        assert!(year.hint < HINT_STRUCTURED);
        assert_eq!(f.website.unwrap().value, "https://acme.io");
        let ec = f.employee_count.unwrap();
        assert_eq!(ec.value, 125);
        assert!(ec.hint < HINT_STRUCTURED);
        assert_eq!(f.total_funding.unwrap().value, 12_500_000.0);

        let round = &f.funding_rounds[0].value;
        assert_eq!(round.date, NaiveDate::from_ymd_opt(2021, 3, 15));
        assert_eq!(round.amount, Some(10_000_000.0));
        assert_eq!(round.round_type.as_deref(), Some("Series A"));
        assert!(round.investors.contains("Accel"));

        assert_eq!(f.team.len(), 2);
        assert!(f.team.iter().any(|m| m.value.is_founder));
        assert_eq!(f.revenue["2023"].value, 4_000_000.0);
        assert!(f.anomalies.is_empty());
    }

    #[test]
    fn company_investors_attach_to_a_lone_round() {
        let f = normalize(&result(json!({
            "funding_rounds": [{"type": "Seed", "amount": 2000000}],
            "investors": ["Y Combinator"]
        })));
        assert!(f.funding_rounds[0].value.investors.contains("Y Combinator"));
    }
}
