// src/source/fixture.rs
//! Scripted in-memory adapter for tests and local demos.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{FetchOptions, FetchStatus, RawSourceResult, SourceAdapter, SourceId};

/// One scripted attempt.
#[derive(Debug, Clone)]
struct Step {
    status: FetchStatus,
    delay: Duration,
}

/// Replays a fixed script of statuses, one per attempt; the last step repeats.
/// Usable statuses carry the configured fields.
pub struct StaticAdapter {
    source: SourceId,
    fields: BTreeMap<String, serde_json::Value>,
    steps: Vec<Step>,
    calls: Arc<AtomicUsize>,
}

impl StaticAdapter {
    pub fn new(source: SourceId) -> Self {
        Self {
            source,
            fields: BTreeMap::new(),
            steps: vec![Step {
                status: FetchStatus::Success,
                delay: Duration::ZERO,
            }],
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Successful adapter returning `fields` (a JSON object).
    pub fn from_json(source: SourceId, fields: serde_json::Value) -> Self {
        let map = match fields {
            serde_json::Value::Object(m) => m.into_iter().collect(),
            _ => BTreeMap::new(),
        };
        Self::new(source).with_fields(map)
    }

    pub fn with_fields(mut self, fields: BTreeMap<String, serde_json::Value>) -> Self {
        self.fields = fields;
        self
    }

    /// Replace the script with a single status.
    pub fn always(mut self, status: FetchStatus) -> Self {
        self.steps = vec![Step {
            status,
            delay: Duration::ZERO,
        }];
        self
    }

    /// Replace the script with one status per attempt.
    pub fn script(mut self, statuses: &[FetchStatus]) -> Self {
        self.steps = statuses
            .iter()
            .map(|&status| Step {
                status,
                delay: Duration::ZERO,
            })
            .collect();
        self
    }

    /// Delay applied before every scripted step answers.
    pub fn delayed(mut self, delay: Duration) -> Self {
        for s in &mut self.steps {
            s.delay = delay;
        }
        self
    }

    /// Shared handle to the invocation counter.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    fn step(&self, attempt: usize) -> Step {
        self.steps
            .get(attempt)
            .or_else(|| self.steps.last())
            .cloned()
            .unwrap_or(Step {
                status: FetchStatus::Empty,
                delay: Duration::ZERO,
            })
    }
}

#[async_trait]
impl SourceAdapter for StaticAdapter {
    fn source(&self) -> SourceId {
        self.source
    }

    async fn fetch(&self, _company: &str, _options: &FetchOptions) -> RawSourceResult {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.step(attempt);
        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }

        let mut out = RawSourceResult::new(self.source, step.status);
        if step.status.is_usable() {
            out.fields = self.fields.clone();
        } else if step.status.is_failure() {
            out.error = Some(format!("scripted {}", step.status.as_str()));
        }
        out
    }
}
