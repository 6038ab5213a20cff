//! Company profile aggregator: binary entrypoint.
//! Loads configuration, builds one HTTP adapter per configured endpoint and
//! serves the aggregation API plus `/metrics`.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use company_profile_aggregator::metrics::Metrics;
use company_profile_aggregator::source::http::HttpAdapter;
use company_profile_aggregator::{api, load_config, Aggregator, SourceAdapter};

const DEFAULT_ADDR: &str = "0.0.0.0:8080";

/// Compact logs by default; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("company_profile_aggregator=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Local .env; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = load_config(None).context("load aggregator config")?;

    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    for (source, endpoint) in cfg.resolved_endpoints()? {
        tracing::info!(source = %source, url = %endpoint.url, "registering http adapter");
        adapters.push(Arc::new(HttpAdapter::new(source, endpoint)?));
    }
    if adapters.is_empty() {
        tracing::warn!("no endpoints configured; every run will end without data");
    }

    let aggregator = Arc::new(Aggregator::new(&cfg, adapters));
    let metrics = Metrics::init()?;
    let app = api::router(aggregator).merge(metrics.router());

    let addr = std::env::var("AGGREGATOR_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await.context("http server")?;
    Ok(())
}
