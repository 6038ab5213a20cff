// tests/scheduler_fallback.rs
//
// Scheduling, retry, deadline and fallback-cascade behaviour, driven through
// scripted adapters. Timing-sensitive cases run on paused tokio time.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use company_profile_aggregator::scheduler::{FetchScheduler, SchedulerConfig};
use company_profile_aggregator::source::fixture::StaticAdapter;
use company_profile_aggregator::{
    AggregationError, Aggregator, AggregatorConfig, FallbackPolicy, FetchStatus, SourceAdapter,
    SourceId,
};

fn ok(source: SourceId) -> StaticAdapter {
    StaticAdapter::from_json(source, json!({ "name": "Acme", "industry": "Fintech" }))
}

fn fallback_ok() -> StaticAdapter {
    StaticAdapter::from_json(
        SourceId::LightweightFallback,
        json!({ "text": "Acme is a fintech startup headquartered in Berlin." }),
    )
}

fn failing(source: SourceId) -> StaticAdapter {
    StaticAdapter::new(source).always(FetchStatus::Failed)
}

fn adapters(list: Vec<StaticAdapter>) -> Vec<Arc<dyn SourceAdapter>> {
    list.into_iter()
        .map(|a| Arc::new(a) as Arc<dyn SourceAdapter>)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn fallback_is_not_touched_when_a_primary_succeeds() {
    let fb = fallback_ok();
    let fb_calls = fb.calls();
    let agg = Aggregator::new(
        &AggregatorConfig::default(),
        adapters(vec![
            ok(SourceId::StructuredDb),
            failing(SourceId::ProfessionalNetwork),
            failing(SourceId::GeneralSearch),
            fb,
        ]),
    );

    let profile = agg.aggregate_default("Acme").await.expect("profile");

    assert_eq!(fb_calls.load(Ordering::SeqCst), 0);
    assert!(!profile.metadata.fallback_invoked);
    assert_eq!(profile.metadata.sources_consulted, vec![SourceId::StructuredDb]);
    let failed: Vec<_> = profile.metadata.sources_failed.iter().map(|f| f.source).collect();
    assert_eq!(failed, vec![SourceId::ProfessionalNetwork, SourceId::GeneralSearch]);
}

#[tokio::test(start_paused = true)]
async fn total_primary_failure_cascades_to_fallback() {
    let fb = fallback_ok();
    let fb_calls = fb.calls();
    let agg = Aggregator::new(
        &AggregatorConfig::default(),
        adapters(vec![
            failing(SourceId::StructuredDb),
            StaticAdapter::new(SourceId::ProfessionalNetwork).always(FetchStatus::Blocked),
            StaticAdapter::new(SourceId::GeneralSearch).always(FetchStatus::TimedOut),
            fb,
        ]),
    );

    let profile = agg.aggregate_default("Acme").await.expect("fallback profile");

    assert_eq!(fb_calls.load(Ordering::SeqCst), 1);
    assert!(profile.metadata.fallback_invoked);
    assert_eq!(profile.metadata.sources_consulted, vec![SourceId::LightweightFallback]);
    assert_eq!(profile.metadata.sources_failed.len(), 3);
    let industry = profile.identity.industry.expect("industry from text");
    assert_eq!(industry.provenance.sources, vec![SourceId::LightweightFallback]);
    assert!(industry.confidence <= 0.4 * 0.8 + 1e-9);
}

#[tokio::test(start_paused = true)]
async fn all_sources_empty_is_no_data() {
    let agg = Aggregator::new(
        &AggregatorConfig::default(),
        adapters(
            SourceId::ALL
                .iter()
                .map(|&s| StaticAdapter::new(s).always(FetchStatus::Empty))
                .collect(),
        ),
    );

    let err = agg.aggregate_default("Ghost Co").await.unwrap_err();

    match &err {
        AggregationError::NoDataAvailable { company, failures, .. } => {
            assert_eq!(company, "Ghost Co");
            assert!(failures.is_empty(), "Empty is an answer, not a failure");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn total_failure_without_fallback_reports_every_source() {
    let agg = Aggregator::new(
        &AggregatorConfig::default(),
        adapters(SourceId::PRIMARY.iter().map(|&s| failing(s)).collect()),
    );

    let err = agg.aggregate_default("Acme").await.unwrap_err();

    let sources: Vec<_> = err.failures().iter().map(|f| f.source).collect();
    assert_eq!(sources, SourceId::PRIMARY.to_vec());
    assert!(err.failures().iter().all(|f| f.attempts == 2));
    assert!(!err.diagnostics().is_empty());
}

#[tokio::test(start_paused = true)]
async fn blank_company_name_fails_before_any_fetch() {
    let a = ok(SourceId::StructuredDb);
    let calls = a.calls();
    let agg = Aggregator::new(&AggregatorConfig::default(), adapters(vec![a]));

    let err = agg.aggregate("   ", &[], Duration::from_secs(5)).await.unwrap_err();

    assert_eq!(err, AggregationError::InvalidCompanyName);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn retries_stop_at_the_configured_limit() {
    let flaky = failing(SourceId::StructuredDb);
    let calls = flaky.calls();
    let cfg = AggregatorConfig {
        max_retries: 2,
        ..AggregatorConfig::default()
    };
    let s = FetchScheduler::new(SchedulerConfig::from(&cfg), adapters(vec![flaky]));

    let out = s.run("Acme", &[SourceId::StructuredDb], Duration::from_secs(30)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let r = out.result_for(SourceId::StructuredDb).expect("result");
    assert_eq!(r.status, FetchStatus::Failed);
    assert_eq!(r.attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn blocked_and_empty_are_not_retried() {
    let blocked = StaticAdapter::new(SourceId::ProfessionalNetwork).always(FetchStatus::Blocked);
    let empty = StaticAdapter::new(SourceId::GeneralSearch).always(FetchStatus::Empty);
    let (bc, ec) = (blocked.calls(), empty.calls());
    let s = FetchScheduler::new(SchedulerConfig::default(), adapters(vec![blocked, empty]));

    let out = s
        .run(
            "Acme",
            &[SourceId::ProfessionalNetwork, SourceId::GeneralSearch],
            Duration::from_secs(30),
        )
        .await;

    assert_eq!(bc.load(Ordering::SeqCst), 1);
    assert_eq!(ec.load(Ordering::SeqCst), 1);
    assert_eq!(out.consulted(), vec![SourceId::GeneralSearch]);
    assert_eq!(out.failures()[0].status, FetchStatus::Blocked);
}

#[tokio::test(start_paused = true)]
async fn global_deadline_marks_slow_sources_timed_out() {
    let slow = ok(SourceId::ProfessionalNetwork).delayed(Duration::from_secs(60));
    let fast = ok(SourceId::StructuredDb);
    let s = FetchScheduler::new(SchedulerConfig::default(), adapters(vec![slow, fast]));

    let started = Instant::now();
    let out = s
        .run(
            "Acme",
            &[SourceId::StructuredDb, SourceId::ProfessionalNetwork],
            Duration::from_secs(2),
        )
        .await;

    assert!(started.elapsed() <= Duration::from_secs(3));
    assert_eq!(
        out.result_for(SourceId::StructuredDb).map(|r| r.status),
        Some(FetchStatus::Success)
    );
    assert_eq!(
        out.result_for(SourceId::ProfessionalNetwork).map(|r| r.status),
        Some(FetchStatus::TimedOut)
    );
}

#[tokio::test(start_paused = true)]
async fn per_source_timeout_applies_to_each_attempt() {
    let slow = ok(SourceId::GeneralSearch).delayed(Duration::from_secs(5));
    let calls = slow.calls();
    let cfg = AggregatorConfig {
        per_source_timeout_ms: 1_000,
        max_retries: 1,
        retry_backoff_ms: 100,
        ..AggregatorConfig::default()
    };
    let s = FetchScheduler::new(SchedulerConfig::from(&cfg), adapters(vec![slow]));

    let out = s.run("Acme", &[SourceId::GeneralSearch], Duration::from_secs(30)).await;

    let r = out.result_for(SourceId::GeneralSearch).expect("result");
    assert_eq!(r.status, FetchStatus::TimedOut);
    assert_eq!(r.attempts, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrency_cap_serialises_fetches() {
    let build = || {
        adapters(
            SourceId::PRIMARY
                .iter()
                .map(|&s| ok(s).delayed(Duration::from_secs(1)))
                .collect(),
        )
    };

    let capped = AggregatorConfig {
        max_concurrency: 1,
        ..AggregatorConfig::default()
    };
    let s = FetchScheduler::new(SchedulerConfig::from(&capped), build());
    let started = Instant::now();
    let out = s.run("Acme", &SourceId::PRIMARY, Duration::from_secs(30)).await;
    assert_eq!(out.consulted().len(), 3);
    assert!(started.elapsed() >= Duration::from_secs(3));

    let wide = AggregatorConfig {
        max_concurrency: 3,
        ..AggregatorConfig::default()
    };
    let s = FetchScheduler::new(SchedulerConfig::from(&wide), build());
    let started = Instant::now();
    let out = s.run("Acme", &SourceId::PRIMARY, Duration::from_secs(30)).await;
    assert_eq!(out.consulted().len(), 3);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn always_policy_runs_fallback_alongside_primaries() {
    let fb = fallback_ok();
    let fb_calls = fb.calls();
    let cfg = AggregatorConfig {
        fallback: FallbackPolicy::Always,
        ..AggregatorConfig::default()
    };
    let agg = Aggregator::new(&cfg, adapters(vec![ok(SourceId::StructuredDb), fb]));

    let profile = agg
        .aggregate("Acme", &[SourceId::StructuredDb], Duration::from_secs(5))
        .await
        .expect("profile");

    assert_eq!(fb_calls.load(Ordering::SeqCst), 1);
    assert!(profile.metadata.fallback_invoked);
    assert_eq!(
        profile.metadata.sources_consulted,
        vec![SourceId::StructuredDb, SourceId::LightweightFallback]
    );
}

#[tokio::test(start_paused = true)]
async fn off_policy_never_cascades() {
    let fb = fallback_ok();
    let fb_calls = fb.calls();
    let cfg = AggregatorConfig {
        fallback: FallbackPolicy::Off,
        ..AggregatorConfig::default()
    };
    let agg = Aggregator::new(&cfg, adapters(vec![failing(SourceId::StructuredDb), fb]));

    let err = agg
        .aggregate("Acme", &[SourceId::StructuredDb], Duration::from_secs(5))
        .await
        .unwrap_err();

    assert!(matches!(err, AggregationError::NoDataAvailable { .. }));
    assert_eq!(fb_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn unregistered_sources_are_skipped_not_failed() {
    let agg = Aggregator::new(
        &AggregatorConfig::default(),
        adapters(vec![ok(SourceId::StructuredDb)]),
    );

    let profile = agg.aggregate_default("Acme").await.expect("profile");

    assert_eq!(
        profile.metadata.sources_skipped,
        vec![SourceId::ProfessionalNetwork, SourceId::GeneralSearch]
    );
    assert!(profile.metadata.sources_failed.is_empty());
}
