// src/config.rs
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::source::http::EndpointConfig;
use crate::source::SourceId;
use crate::trust::SourceTrust;

const ENV_PATH: &str = "AGGREGATOR_CONFIG_PATH";
const ENV_BUDGET_MS: &str = "AGGREGATOR_BUDGET_MS";
const ENV_SOURCE_TIMEOUT_MS: &str = "AGGREGATOR_SOURCE_TIMEOUT_MS";
const ENV_MAX_CONCURRENCY: &str = "AGGREGATOR_MAX_CONCURRENCY";
const ENV_FALLBACK: &str = "AGGREGATOR_FALLBACK";

/// When the lightweight fallback source runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Only after the primary phase produced no usable result.
    #[default]
    Cascade,
    /// Alongside the primaries, every run.
    Always,
    /// Never, unless the caller lists it among the enabled sources.
    Off,
}

impl std::str::FromStr for FallbackPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cascade" | "auto" => Ok(FallbackPolicy::Cascade),
            "always" | "on" | "true" => Ok(FallbackPolicy::Always),
            "off" | "never" | "false" => Ok(FallbackPolicy::Off),
            other => Err(anyhow!("unknown fallback policy: {other}")),
        }
    }
}

/// Everything the host application configures. Passed explicitly into
/// [`crate::Aggregator::new`]; the core reads no environment on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Sources tried when the caller does not name any.
    pub enabled_sources: Vec<SourceId>,
    pub global_budget_ms: u64,
    /// Ceiling for per-request budgets.
    pub max_budget_ms: u64,
    pub per_source_timeout_ms: u64,
    pub max_concurrency: usize,
    /// Extra attempts after a Failed/TimedOut result.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub fallback: FallbackPolicy,
    pub trust: SourceTrust,
    /// HTTP-backed adapters the binary builds at startup, keyed by source
    /// name (aliases allowed).
    pub endpoints: BTreeMap<String, EndpointConfig>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            enabled_sources: SourceId::PRIMARY.to_vec(),
            global_budget_ms: 30_000,
            max_budget_ms: 120_000,
            per_source_timeout_ms: 10_000,
            max_concurrency: 2,
            max_retries: 1,
            retry_backoff_ms: 250,
            fallback: FallbackPolicy::Cascade,
            trust: SourceTrust::default(),
            endpoints: BTreeMap::new(),
        }
    }
}

impl AggregatorConfig {
    pub fn global_budget(&self) -> Duration {
        Duration::from_millis(self.global_budget_ms)
    }

    pub fn max_budget(&self) -> Duration {
        Duration::from_millis(self.max_budget_ms)
    }

    pub fn per_source_timeout(&self) -> Duration {
        Duration::from_millis(self.per_source_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Endpoints resolved to their source types.
    pub fn resolved_endpoints(&self) -> Result<Vec<(SourceId, EndpointConfig)>> {
        self.endpoints
            .iter()
            .map(|(k, ep)| Ok((k.parse::<SourceId>()?, ep.clone())))
            .collect()
    }

    /// Repair values that cannot be run as given. Returns one note per repair.
    pub fn sanitize(&mut self) -> Vec<String> {
        let mut notes = Vec::new();

        if self.max_concurrency == 0 {
            self.max_concurrency = 1;
            notes.push("max_concurrency 0 raised to 1".to_string());
        }
        if self.global_budget_ms == 0 {
            self.global_budget_ms = Self::default().global_budget_ms;
            notes.push(format!("global_budget_ms 0 reset to {}", self.global_budget_ms));
        }
        if self.max_budget_ms < self.global_budget_ms {
            notes.push(format!(
                "max_budget_ms {} raised to global budget {}",
                self.max_budget_ms, self.global_budget_ms
            ));
            self.max_budget_ms = self.global_budget_ms;
        }
        if self.per_source_timeout_ms == 0 || self.per_source_timeout_ms > self.global_budget_ms {
            notes.push(format!(
                "per_source_timeout_ms {} capped to global budget {}",
                self.per_source_timeout_ms, self.global_budget_ms
            ));
            self.per_source_timeout_ms = self.global_budget_ms;
        }

        let mut seen = Vec::with_capacity(self.enabled_sources.len());
        for s in self.enabled_sources.drain(..) {
            if seen.contains(&s) {
                notes.push(format!("duplicate source {s} removed"));
            } else {
                seen.push(s);
            }
        }
        self.enabled_sources = seen;

        for key in self.trust.sanitize() {
            notes.push(format!("unknown trust key '{key}' ignored"));
        }
        notes
    }

    /// Apply `AGGREGATOR_*` environment overrides. Unparseable values are an error.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_parse::<u64>(ENV_BUDGET_MS)? {
            self.global_budget_ms = v;
        }
        if let Some(v) = env_parse::<u64>(ENV_SOURCE_TIMEOUT_MS)? {
            self.per_source_timeout_ms = v;
        }
        if let Some(v) = env_parse::<usize>(ENV_MAX_CONCURRENCY)? {
            self.max_concurrency = v;
        }
        if let Ok(v) = std::env::var(ENV_FALLBACK) {
            self.fallback = v.parse()?;
        }
        Ok(())
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("{key}={raw}: {e}")),
        Err(_) => Ok(None),
    }
}

/// Load configuration from an explicit path. Supports TOML or JSON formats.
pub fn load_config_from(path: &Path) -> Result<AggregatorConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading aggregator config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str())
        .with_context(|| format!("parsing aggregator config {}", path.display()))
}

/// Load configuration using env var + fallbacks, then env overrides, then
/// sanitize:
/// 1) explicit `path`
/// 2) $AGGREGATOR_CONFIG_PATH
/// 3) config/aggregator.toml
/// 4) config/aggregator.json
/// 5) defaults
pub fn load_config(path: Option<&Path>) -> Result<AggregatorConfig> {
    let mut cfg = match path {
        Some(p) => load_config_from(p)?,
        None => load_config_default()?,
    };
    cfg.apply_env()?;
    for note in cfg.sanitize() {
        tracing::warn!(target: "config", "{note}");
    }
    Ok(cfg)
}

fn load_config_default() -> Result<AggregatorConfig> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_config_from(&pb);
        } else {
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/aggregator.toml");
    if toml_p.exists() {
        return load_config_from(&toml_p);
    }
    let json_p = PathBuf::from("config/aggregator.json");
    if json_p.exists() {
        return load_config_from(&json_p);
    }
    Ok(AggregatorConfig::default())
}

fn parse_config(s: &str, hint_ext: &str) -> Result<AggregatorConfig> {
    match hint_ext {
        "toml" => Ok(toml::from_str(s)?),
        "json" => Ok(serde_json::from_str(s)?),
        _ => serde_json::from_str(s)
            .map_err(anyhow::Error::from)
            .or_else(|_| toml::from_str(s).map_err(anyhow::Error::from))
            .map_err(|_| anyhow!("unsupported config format")),
    }
}
