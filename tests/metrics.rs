// tests/metrics.rs
//
// The Prometheus recorder is process-global, so this file holds a single
// test that installs it once and checks the exposition after real runs.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use company_profile_aggregator::metrics::Metrics;
use company_profile_aggregator::source::fixture::StaticAdapter;
use company_profile_aggregator::{
    api, Aggregator, AggregatorConfig, FetchStatus, SourceAdapter, SourceId,
};

#[tokio::test]
async fn metrics_endpoint_reports_runs_and_sources() {
    let metrics = Metrics::init().expect("install recorder");

    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(StaticAdapter::from_json(
            SourceId::StructuredDb,
            json!({ "name": "Acme", "valuation": "n/a" }),
        )),
        Arc::new(StaticAdapter::new(SourceId::GeneralSearch).always(FetchStatus::Failed)),
    ];
    let cfg = AggregatorConfig {
        retry_backoff_ms: 1,
        ..AggregatorConfig::default()
    };
    let agg = Arc::new(Aggregator::new(&cfg, adapters));

    agg.aggregate(
        "Acme",
        &[SourceId::StructuredDb, SourceId::GeneralSearch],
        Duration::from_secs(5),
    )
    .await
    .expect("profile");
    let _ = agg
        .aggregate("Nobody", &[SourceId::GeneralSearch], Duration::from_secs(5))
        .await
        .unwrap_err();

    let app = api::router(agg).merge(metrics.router());
    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "aggregate_runs_total",
        "aggregate_source_results_total",
        "aggregate_retries_total",
        "aggregate_no_data_total",
        "aggregate_normalization_anomalies_total",
        "aggregate_last_overall_confidence",
        "aggregate_fetch_ms",
        r#"source="general_search""#,
        r#"status="failed""#,
    ] {
        assert!(
            text.contains(needle),
            "metrics exposition missing '{needle}'\n{text}"
        );
    }
}
