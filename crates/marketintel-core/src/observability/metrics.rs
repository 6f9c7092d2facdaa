//! Prometheus metrics, scoped to the pipeline's own counters/histograms.
//!
//! Grounded on the teacher's `metrics::recorder::init_metrics` (Prometheus
//! exporter install) and `metrics::collectors` (per-subsystem counter
//! helpers), trimmed to what this crate actually emits: no HTTP/auth/cache
//! metrics, since this repository has none of those subsystems.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::error::{MarketIntelError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub prometheus_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prometheus_addr: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Installs the global Prometheus recorder and exposes it over
/// `prometheus_addr`. A no-op when `config.enabled` is false, so tests
/// and one-off CLI invocations don't bind a port.
pub fn init_metrics(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        tracing::info!("metrics collection disabled");
        return Ok(());
    }

    let addr: SocketAddr = config
        .prometheus_addr
        .parse()
        .map_err(|e| MarketIntelError::config(format!("invalid prometheus address: {e}")))?;

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MarketIntelError::config(format!("failed to install prometheus exporter: {e}")))?;

    tracing::info!(%addr, "prometheus metrics exporter installed");
    Ok(())
}

/// Per-run crawl/classify/score/rank counters, one call per orchestrator
/// pass. Named helpers rather than ad-hoc `metrics::counter!` call sites
/// at each step, matching the teacher's `collectors::IngestionMetrics`
/// pattern of a small struct of associated functions per subsystem.
pub struct PipelineMetrics;

impl PipelineMetrics {
    pub fn record_crawl(adapter: &str, metrics_ingested: u64, events_collected: u64, duplicates_skipped: u64) {
        metrics::counter!("marketintel_metrics_ingested_total", "adapter" => adapter.to_string()).increment(metrics_ingested);
        metrics::counter!("marketintel_events_collected_total", "adapter" => adapter.to_string()).increment(events_collected);
        metrics::counter!("marketintel_duplicates_skipped_total", "adapter" => adapter.to_string()).increment(duplicates_skipped);
    }

    pub fn record_classification(relevant: u64, irrelevant: u64, errors: u64) {
        metrics::counter!("marketintel_classified_relevant_total").increment(relevant);
        metrics::counter!("marketintel_classified_irrelevant_total").increment(irrelevant);
        metrics::counter!("marketintel_classification_errors_total").increment(errors);
    }

    pub fn record_scored(count: u64) {
        metrics::counter!("marketintel_scored_total").increment(count);
    }

    pub fn record_ranked(key_events: u64, other: u64) {
        metrics::counter!("marketintel_ranked_key_events_total").increment(key_events);
        metrics::counter!("marketintel_ranked_other_total").increment(other);
    }

    pub fn record_run_duration_ms(duration_ms: f64) {
        metrics::histogram!("marketintel_run_duration_ms").record(duration_ms);
    }
}

/// LLM call count/latency, one call per gateway round trip.
pub struct LlmMetrics;

impl LlmMetrics {
    pub fn record_call(task_type: &str, latency_ms: f64, success: bool) {
        let status = if success { "ok" } else { "error" };
        metrics::counter!("marketintel_llm_calls_total", "task_type" => task_type.to_string(), "status" => status)
            .increment(1);
        metrics::histogram!("marketintel_llm_call_duration_ms", "task_type" => task_type.to_string()).record(latency_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_config_is_a_noop() {
        let config = MetricsConfig { enabled: false, prometheus_addr: "not an addr".to_string() };
        assert!(init_metrics(&config).is_ok());
    }
}
