pub mod metrics;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

pub use metrics::{init_metrics, LlmMetrics, MetricsConfig, PipelineMetrics};

/// Newtype wrapper identifying one orchestrator pass across log lines,
/// propagated to the LLM gateway as part of `CallContext`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunId(String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RunId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Initializes the global tracing subscriber: an `EnvFilter` seeded from
/// `level` (overridable via `RUST_LOG`), plain text by default, or
/// newline-delimited JSON when `json` is set. Idempotent-by-convention:
/// callers invoke this exactly once, at process start.
pub fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_display_is_a_uuid_string() {
        let id = RunId::new();
        assert_eq!(id.to_string().len(), 36);
    }
}
