// tests/e2e_aggregate.rs
//
// End-to-end: realistic raw payloads from every source shape through
// scheduling, normalization, merge, scoring and derived metrics.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Utc};
use serde_json::json;

use company_profile_aggregator::profile::{FieldGroup, FieldState, Stage};
use company_profile_aggregator::source::fixture::StaticAdapter;
use company_profile_aggregator::{
    Aggregator, AggregatorConfig, FetchStatus, SourceAdapter, SourceId,
};

fn structured() -> StaticAdapter {
    StaticAdapter::from_json(
        SourceId::StructuredDb,
        json!({
            "name": "Acme Payments, Inc.",
            "short_description": "Payment infrastructure for small merchants.",
            "categories": ["Fintech", "Payments"],
            "founded_on": "2015-04-01",
            "location": "Berlin, Germany",
            "homepage_url": "https://acme.example",
            "num_employees_enum": "51-200",
            "funding_raised": "$42M",
            "funding_rounds": [
                {
                    "announced_on": "2021-03-01",
                    "money_raised": "$30M",
                    "investment_type": "series_b",
                    "investors": ["Alpha VC"]
                },
                {
                    "announced_on": "2018-06-01",
                    "money_raised": 12000000,
                    "investment_type": "Series A"
                }
            ],
            "founders": ["Jane Smith", "Raj Patel"],
            "ceo": "J. Smith",
            "competitors": ["Stripe", "Adyen"],
            "valuation": "not disclosed"
        }),
    )
}

fn network() -> StaticAdapter {
    StaticAdapter::from_json(
        SourceId::ProfessionalNetwork,
        json!({
            "company_name": "Acme Payments",
            "about": "Acme builds payment infrastructure for small merchants.",
            "industry": "Financial Services",
            "company_size": "51-200 employees",
            "headquarters": "Berlin",
            "people": [
                { "name": "Jane Smith", "title": "Co-Founder & CEO at Acme Payments" },
                { "name": "Raj Patel", "title": "CTO" }
            ],
            "similar_pages": ["Stripe", "Klarna"]
        }),
    )
}

fn search() -> StaticAdapter {
    StaticAdapter::from_json(
        SourceId::GeneralSearch,
        json!({
            "snippets": [
                "Acme Payments raised $42 million in total funding.",
                "Acme Payments is a fintech startup headquartered in Berlin."
            ]
        }),
    )
}

fn aggregator(list: Vec<StaticAdapter>) -> Aggregator {
    let adapters: Vec<Arc<dyn SourceAdapter>> = list
        .into_iter()
        .map(|a| Arc::new(a) as Arc<dyn SourceAdapter>)
        .collect();
    Aggregator::new(&AggregatorConfig::default(), adapters)
}

#[tokio::test]
async fn three_sources_merge_into_one_profile() {
    let agg = aggregator(vec![structured(), network(), search()]);

    let p = agg
        .aggregate("Acme Payments", &[], Duration::from_secs(10))
        .await
        .expect("profile");

    // identity
    let name = p.identity.name.as_ref().expect("name");
    assert_eq!(name.value, "Acme Payments, Inc.");
    assert_eq!(name.provenance.state, FieldState::Corroborated);
    assert_eq!(p.identity.founded_year.as_ref().map(|y| y.value), Some(2015));
    assert_eq!(
        p.identity.location.as_ref().map(|l| l.provenance.state),
        Some(FieldState::Corroborated)
    );
    assert_eq!(p.identity.employee_count.as_ref().map(|e| e.value), Some(125));
    let industry = p.identity.industry.as_ref().expect("industry");
    assert_eq!(industry.value, "Fintech");
    assert_eq!(industry.provenance.observations.len(), 3);

    // funding
    let total = p.funding.total_funding.as_ref().expect("total funding");
    assert_eq!(total.value, 42e6);
    assert_eq!(
        total.provenance.sources,
        vec![SourceId::StructuredDb, SourceId::GeneralSearch]
    );
    assert!(p.funding.valuation.is_none());
    let dates: Vec<_> = p.funding.rounds.iter().map(|r| r.value.date.map(|d| d.year())).collect();
    assert_eq!(dates, vec![Some(2018), Some(2021)]);

    // team: founders list, CEO key and network people collapse per person
    let names: Vec<&str> = p.team.members.iter().map(|m| m.value.name.as_str()).collect();
    assert_eq!(names, vec!["Jane Smith", "Raj Patel"]);
    let jane = &p.team.members[0];
    assert_eq!(jane.value.role.as_deref(), Some("CEO"));
    assert!(jane.value.is_founder);
    assert_eq!(jane.provenance.state, FieldState::Corroborated);

    // market
    let competitors: Vec<&str> = p.market.competitors.iter().map(|c| c.value.as_str()).collect();
    assert_eq!(competitors.len(), 3, "{competitors:?}");
    assert_eq!(competitors[0], "Stripe", "corroborated competitor ranks first");

    // derived
    assert_eq!(p.derived.company_age, Some(Utc::now().year() - 2015));
    assert_eq!(p.derived.funding_stage.as_deref(), Some("Series B"));
    assert_eq!(p.derived.employee_size.as_deref(), Some("Medium (50-199)"));

    // metadata
    let m = &p.metadata;
    assert_eq!(
        m.sources_consulted,
        vec![SourceId::StructuredDb, SourceId::ProfessionalNetwork, SourceId::GeneralSearch]
    );
    assert!(m.sources_failed.is_empty());
    assert!(!m.fallback_invoked);
    assert!(m.overall_confidence > 0.0 && m.overall_confidence <= 1.0);
    assert_eq!(m.group_confidence.len(), 5);
    assert_eq!(m.group_confidence[&FieldGroup::Financials], 0.0);
    assert!(m.field_confidence.contains_key("team.members"));
    assert!(m.field_confidence.contains_key("derived.funding_stage"));
    assert!(m
        .diagnostics
        .iter()
        .any(|d| d.stage == Stage::Normalize && d.source == Some(SourceId::StructuredDb)));
    assert!(m
        .diagnostics
        .iter()
        .any(|d| d.stage == Stage::Merge && d.message.starts_with("identity.industry")));
}

#[tokio::test]
async fn a_failing_source_degrades_coverage_not_the_run() {
    let agg = aggregator(vec![
        structured(),
        network(),
        StaticAdapter::new(SourceId::GeneralSearch).always(FetchStatus::Failed),
    ]);

    let p = agg.aggregate_default("Acme Payments").await.expect("profile");

    assert_eq!(p.metadata.sources_failed.len(), 1);
    assert_eq!(p.metadata.sources_failed[0].source, SourceId::GeneralSearch);
    assert_eq!(p.metadata.sources_failed[0].attempts, 2);
    let total = p.funding.total_funding.expect("total funding");
    assert_eq!(total.provenance.state, FieldState::SingleSource);
}

#[tokio::test]
async fn empty_answers_count_as_consulted() {
    let agg = aggregator(vec![
        structured(),
        StaticAdapter::new(SourceId::ProfessionalNetwork).always(FetchStatus::Empty),
    ]);

    let p = agg
        .aggregate(
            "Acme Payments",
            &[SourceId::StructuredDb, SourceId::ProfessionalNetwork],
            Duration::from_secs(5),
        )
        .await
        .expect("profile");

    assert_eq!(
        p.metadata.sources_consulted,
        vec![SourceId::StructuredDb, SourceId::ProfessionalNetwork]
    );
    assert!(p.metadata.sources_failed.is_empty());
}

#[tokio::test(start_paused = true)]
async fn budget_expiry_keeps_what_already_arrived() {
    let agg = aggregator(vec![
        structured(),
        network().delayed(Duration::from_secs(60)),
    ]);

    let p = agg
        .aggregate(
            "Acme Payments",
            &[SourceId::StructuredDb, SourceId::ProfessionalNetwork],
            Duration::from_secs(2),
        )
        .await
        .expect("profile from the fast source");

    let name = p.identity.name.as_ref().expect("name");
    assert_eq!(name.value, "Acme Payments, Inc.");
    assert_eq!(name.provenance.sources, vec![SourceId::StructuredDb]);
    assert_eq!(p.funding.total_funding.as_ref().map(|t| t.value), Some(42e6));
    assert_eq!(p.metadata.sources_consulted, vec![SourceId::StructuredDb]);
    assert_eq!(p.metadata.sources_failed.len(), 1);
    assert_eq!(p.metadata.sources_failed[0].source, SourceId::ProfessionalNetwork);
    assert_eq!(p.metadata.sources_failed[0].status, FetchStatus::TimedOut);
}

#[tokio::test(start_paused = true)]
async fn oversized_budget_is_capped_not_a_panic() {
    let agg = aggregator(vec![structured()]);
    assert_eq!(agg.max_budget(), Duration::from_millis(120_000));

    let p = agg
        .aggregate("Acme Payments", &[SourceId::StructuredDb], Duration::MAX)
        .await
        .expect("profile");

    assert_eq!(p.metadata.sources_consulted, vec![SourceId::StructuredDb]);
}
