// src/scheduler.rs
//! Fetch scheduler: runs the enabled adapters under a concurrency cap and a
//! global deadline, retries transient failures and drives the fallback
//! cascade. It never fails; everything that happens is reported in
//! [`FetchOutcome`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::Instrument;

use crate::config::{AggregatorConfig, FallbackPolicy};
use crate::metrics;
use crate::profile::{Diagnostic, SourceFailure, Stage};
use crate::source::{FetchOptions, FetchStatus, RawSourceResult, SourceAdapter, SourceId};

/// Stand-in deadline for budgets too large to represent as an instant.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + d`, saturating at [`FAR_FUTURE`] instead of overflowing.
fn deadline_after(now: Instant, d: Duration) -> Instant {
    now.checked_add(d).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Retries for one source. Only Failed and TimedOut are retried; Blocked and
/// Empty are definitive answers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each further one.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// `attempt` is the 1-based attempt that just produced `status`.
    pub fn should_retry(&self, status: FetchStatus, attempt: u32) -> bool {
        matches!(status, FetchStatus::Failed | FetchStatus::TimedOut) && attempt <= self.max_retries
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(1u32 << exp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    pub per_source_timeout: Duration,
    pub max_concurrency: usize,
    pub retry: RetryPolicy,
    pub fallback: FallbackPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&AggregatorConfig::default())
    }
}

impl From<&AggregatorConfig> for SchedulerConfig {
    fn from(cfg: &AggregatorConfig) -> Self {
        Self {
            per_source_timeout: cfg.per_source_timeout(),
            max_concurrency: cfg.max_concurrency.max(1),
            retry: RetryPolicy {
                max_retries: cfg.max_retries,
                backoff: cfg.retry_backoff(),
            },
            fallback: cfg.fallback,
        }
    }
}

/// Everything the scheduler observed during one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    /// One terminal result per launched source, most trusted first.
    pub results: Vec<RawSourceResult>,
    /// Enabled sources without a registered adapter.
    pub skipped: Vec<SourceId>,
    pub fallback_invoked: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl FetchOutcome {
    pub fn has_usable(&self) -> bool {
        self.results.iter().any(|r| r.status.is_usable())
    }

    /// Sources that answered, including with Empty.
    pub fn consulted(&self) -> Vec<SourceId> {
        self.results
            .iter()
            .filter(|r| !r.status.is_failure())
            .map(|r| r.source)
            .collect()
    }

    pub fn failures(&self) -> Vec<SourceFailure> {
        self.results
            .iter()
            .filter(|r| r.status.is_failure())
            .map(|r| SourceFailure {
                source: r.source,
                status: r.status,
                error: r.error.clone(),
                attempts: r.attempts,
            })
            .collect()
    }

    pub fn result_for(&self, source: SourceId) -> Option<&RawSourceResult> {
        self.results.iter().find(|r| r.source == source)
    }
}

pub struct FetchScheduler {
    adapters: BTreeMap<SourceId, Arc<dyn SourceAdapter>>,
    cfg: SchedulerConfig,
}

impl FetchScheduler {
    /// A later adapter for the same source replaces an earlier one.
    pub fn new(cfg: SchedulerConfig, adapters: Vec<Arc<dyn SourceAdapter>>) -> Self {
        let mut map = BTreeMap::new();
        for a in adapters {
            if map.insert(a.source(), Arc::clone(&a)).is_some() {
                tracing::warn!(source = %a.source(), "duplicate adapter registration; keeping the last");
            }
        }
        Self { adapters: map, cfg }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.cfg
    }

    pub fn registered(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.adapters.keys().copied()
    }

    /// Run `enabled` (order irrelevant, duplicates ignored) for `company`
    /// within `budget`.
    pub async fn run(&self, company: &str, enabled: &[SourceId], budget: Duration) -> FetchOutcome {
        let deadline = deadline_after(Instant::now(), budget);
        let semaphore = Arc::new(Semaphore::new(self.cfg.max_concurrency.max(1)));
        let mut out = FetchOutcome::default();

        let mut primaries = Vec::new();
        let mut fallback_requested = false;
        let enabled: BTreeSet<SourceId> = enabled.iter().copied().collect();
        for id in enabled {
            if !self.adapters.contains_key(&id) {
                out.skipped.push(id);
                out.diagnostics.push(
                    Diagnostic::new(Stage::Schedule, "enabled but no adapter registered").source(id),
                );
                continue;
            }
            if id.is_primary() {
                primaries.push(id);
            } else {
                fallback_requested = true;
            }
        }

        let fallback = SourceId::LightweightFallback;
        let fallback_registered = self.adapters.contains_key(&fallback);
        let fallback_now = fallback_requested
            || (self.cfg.fallback == FallbackPolicy::Always && fallback_registered);

        let mut phase = primaries;
        if fallback_now {
            phase.push(fallback);
            out.fallback_invoked = true;
            out.diagnostics.push(
                Diagnostic::new(Stage::Schedule, "fallback enabled alongside primary sources")
                    .source(fallback),
            );
        }
        self.run_phase(company, &phase, deadline, &semaphore, &mut out).await;

        let cascade = !fallback_now
            && self.cfg.fallback == FallbackPolicy::Cascade
            && fallback_registered
            && !out.has_usable();
        if cascade {
            out.fallback_invoked = true;
            out.diagnostics.push(
                Diagnostic::new(Stage::Schedule, "no usable primary result; cascading to fallback")
                    .source(fallback),
            );
            tracing::info!(target: "aggregate", company, "cascading to fallback source");
            if Instant::now() >= deadline {
                out.results
                    .push(RawSourceResult::timed_out(fallback).with_error("budget spent before fallback"));
                out.diagnostics.push(
                    Diagnostic::new(Stage::Fetch, "budget spent before fallback could run").source(fallback),
                );
            } else {
                self.run_phase(company, &[fallback], deadline, &semaphore, &mut out).await;
            }
        }
        if out.fallback_invoked {
            metrics::record_fallback();
        }

        out.results.sort_by_key(|r| std::cmp::Reverse(r.source.priority()));
        for r in &out.results {
            metrics::record_source_result(r.source, r.status);
        }
        out
    }

    /// Launch `sources` concurrently and wait until all are terminal or the
    /// deadline passes.
    async fn run_phase(
        &self,
        company: &str,
        sources: &[SourceId],
        deadline: Instant,
        semaphore: &Arc<Semaphore>,
        out: &mut FetchOutcome,
    ) {
        let mut set = JoinSet::new();
        let mut pending = BTreeSet::new();

        for &id in sources {
            let Some(adapter) = self.adapters.get(&id) else {
                continue;
            };
            pending.insert(id);
            let task = SourceTask {
                adapter: Arc::clone(adapter),
                company: company.to_string(),
                deadline,
                per_source_timeout: self.cfg.per_source_timeout,
                retry: self.cfg.retry,
                semaphore: Arc::clone(semaphore),
            };
            set.spawn(async move { (id, task.run().await) });
        }

        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((id, res)))) => {
                    pending.remove(&id);
                    if res.status.is_failure() {
                        out.diagnostics.push(
                            Diagnostic::new(
                                Stage::Fetch,
                                format!(
                                    "{} after {} attempt(s): {}",
                                    res.status.as_str(),
                                    res.attempts,
                                    res.error.as_deref().unwrap_or("no detail")
                                ),
                            )
                            .source(id),
                        );
                    }
                    out.results.push(res);
                }
                Ok(Some(Err(e))) => {
                    // Source identified below: it stays pending.
                    tracing::error!(error = %e, "adapter task aborted");
                }
                Ok(None) => {
                    for id in std::mem::take(&mut pending) {
                        out.results
                            .push(RawSourceResult::failed(id, "adapter task panicked"));
                        out.diagnostics
                            .push(Diagnostic::new(Stage::Fetch, "adapter task panicked").source(id));
                    }
                    break;
                }
                Err(_) => {
                    set.shutdown().await;
                    for id in std::mem::take(&mut pending) {
                        tracing::warn!(target: "aggregate", source = %id, "cancelled at global deadline");
                        out.results.push(
                            RawSourceResult::timed_out(id).with_error("cancelled at global deadline"),
                        );
                        out.diagnostics.push(
                            Diagnostic::new(Stage::Fetch, "cancelled at global deadline").source(id),
                        );
                    }
                    break;
                }
            }
        }
    }
}

/// One source's attempts, run as an independent task.
struct SourceTask {
    adapter: Arc<dyn SourceAdapter>,
    company: String,
    deadline: Instant,
    per_source_timeout: Duration,
    retry: RetryPolicy,
    semaphore: Arc<Semaphore>,
}

impl SourceTask {
    async fn run(self) -> RawSourceResult {
        let source = self.adapter.source();
        let mut attempt = 1u32;
        loop {
            // One permit per attempt; released before any backoff sleep.
            let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                Ok(p) => p,
                Err(_) => return RawSourceResult::failed(source, "scheduler closed"),
            };
            let attempt_deadline = deadline_after(Instant::now(), self.per_source_timeout).min(self.deadline);
            let options = FetchOptions {
                deadline: attempt_deadline,
                attempt,
            };
            let started = Instant::now();
            let span = tracing::info_span!("fetch", source = %source, attempt);
            let fetched = tokio::time::timeout_at(
                attempt_deadline,
                self.adapter.fetch(&self.company, &options).instrument(span),
            )
            .await;
            drop(permit);
            metrics::record_fetch_ms(source, started.elapsed().as_secs_f64() * 1000.0);

            let mut res = fetched.unwrap_or_else(|_| RawSourceResult::timed_out(source));
            if res.source != source {
                tracing::warn!(source = %source, reported = %res.source, "adapter reported a foreign source id");
                res.source = source;
            }
            res.attempts = attempt;
            tracing::debug!(source = %source, attempt, status = ?res.status, "attempt finished");

            if self.retry.should_retry(res.status, attempt) {
                let delay = self.retry.delay(attempt);
                if deadline_after(Instant::now(), delay) >= self.deadline {
                    return res;
                }
                metrics::record_retry(source);
                tracing::debug!(source = %source, attempt, ?delay, "retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }
            return res;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fixture::StaticAdapter;
    use std::sync::atomic::Ordering;

    #[test]
    fn retry_policy_only_retries_transient_failures() {
        let p = RetryPolicy::default();
        assert!(p.should_retry(FetchStatus::Failed, 1));
        assert!(p.should_retry(FetchStatus::TimedOut, 1));
        assert!(!p.should_retry(FetchStatus::TimedOut, 2));
        assert!(!p.should_retry(FetchStatus::Blocked, 1));
        assert!(!p.should_retry(FetchStatus::Empty, 1));
        assert_eq!(p.delay(1), Duration::from_millis(250));
        assert_eq!(p.delay(3), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn enabled_source_without_adapter_is_skipped() {
        let a = StaticAdapter::new(SourceId::StructuredDb);
        let s = FetchScheduler::new(SchedulerConfig::default(), vec![Arc::new(a)]);
        let out = s
            .run(
                "Acme",
                &[SourceId::StructuredDb, SourceId::ProfessionalNetwork],
                Duration::from_secs(5),
            )
            .await;
        assert_eq!(out.skipped, vec![SourceId::ProfessionalNetwork]);
        assert_eq!(out.results.len(), 1);
        assert!(out.failures().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_budget_does_not_overflow() {
        let a = StaticAdapter::new(SourceId::StructuredDb);
        let s = FetchScheduler::new(SchedulerConfig::default(), vec![Arc::new(a)]);
        let out = s.run("Acme", &[SourceId::StructuredDb], Duration::MAX).await;
        assert_eq!(
            out.result_for(SourceId::StructuredDb).map(|r| r.status),
            Some(FetchStatus::Success)
        );
        let now = Instant::now();
        assert_eq!(deadline_after(now, Duration::MAX), now + FAR_FUTURE);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_then_success_counts_attempts() {
        let a = StaticAdapter::new(SourceId::GeneralSearch)
            .script(&[FetchStatus::TimedOut, FetchStatus::Success]);
        let calls = a.calls();
        let s = FetchScheduler::new(SchedulerConfig::default(), vec![Arc::new(a)]);
        let out = s
            .run("Acme", &[SourceId::GeneralSearch], Duration::from_secs(5))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let r = out.result_for(SourceId::GeneralSearch).unwrap();
        assert_eq!(r.status, FetchStatus::Success);
        assert_eq!(r.attempts, 2);
    }
}
