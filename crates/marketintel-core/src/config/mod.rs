use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MarketIntelError, Result};

fn default_database_url() -> String {
    "sqlite://data/marketintel.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_run_migrations() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
            run_migrations: default_run_migrations(),
        }
    }
}

fn default_min_request_interval_secs() -> f64 {
    2.0
}

/// Per-adapter network behavior. Mirrors `original_source/config.py`'s
/// `CRAWLERS_ENABLE_SSL` plus the rate-limit contract of spec.md §4.2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub name: String,
    pub base_url: String,
    #[serde(default = "default_min_request_interval_secs")]
    pub min_request_interval_secs: f64,
    #[serde(default)]
    pub enable_ssl_verification: bool,
}

fn default_llm_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    120
}

fn default_context_lookback_days() -> i64 {
    7
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_secs() -> f64 {
    2.0
}

fn default_scorer_call_max_retries() -> u32 {
    2
}

fn default_scorer_call_retry_delay_secs() -> f64 {
    2.0
}

/// Mirrors `original_source/config.py`'s LLM-related `Settings` fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub endpoint: String,
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_context_lookback_days")]
    pub context_lookback_days: i64,
    #[serde(default = "default_max_retries")]
    pub classifier_max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub classifier_retry_delay_secs: f64,
    /// Retries on a transient *call* failure (timeout, remote error) in the
    /// scorer, per spec.md §7 item 4 ("retried ... 2x for scorer"). Does not
    /// apply to malformed-JSON responses, which the scorer defaults
    /// immediately rather than retrying (§4.7).
    #[serde(default = "default_scorer_call_max_retries")]
    pub scorer_call_max_retries: u32,
    #[serde(default = "default_scorer_call_retry_delay_secs")]
    pub scorer_call_retry_delay_secs: f64,
    pub causal_templates_path: Option<PathBuf>,
}

fn default_threshold_key_events() -> f64 {
    70.0
}

fn default_threshold_other_news() -> f64 {
    40.0
}

fn default_max_key_events() -> usize {
    20
}

fn default_hot_topic_min_occurrences() -> u32 {
    3
}

fn default_hot_topic_window_days() -> i64 {
    7
}

fn default_active_event_max_age_days() -> i64 {
    30
}

/// Ranker thresholds as `Config` fields, per this repository's §9
/// resolution: spec.md's suggested values (70/40/20) are defaults, not
/// compile-time constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankerConfig {
    #[serde(default = "default_threshold_key_events")]
    pub threshold_key_events: f64,
    #[serde(default = "default_threshold_other_news")]
    pub threshold_other_news: f64,
    #[serde(default = "default_max_key_events")]
    pub max_key_events: usize,
    #[serde(default = "default_hot_topic_min_occurrences")]
    pub hot_topic_min_occurrences: u32,
    #[serde(default = "default_hot_topic_window_days")]
    pub hot_topic_window_days: i64,
    #[serde(default = "default_active_event_max_age_days")]
    pub active_event_max_age_days: i64,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            threshold_key_events: default_threshold_key_events(),
            threshold_other_news: default_threshold_other_news(),
            max_key_events: default_max_key_events(),
            hot_topic_min_occurrences: default_hot_topic_min_occurrences(),
            hot_topic_window_days: default_hot_topic_window_days(),
            active_event_max_age_days: default_active_event_max_age_days(),
        }
    }
}

fn default_interval_hours() -> i64 {
    1
}

fn default_first_tick_delay_secs() -> u64 {
    60
}

fn default_shutdown_grace_secs() -> u64 {
    300
}

/// Mirrors `original_source/config.py`'s `CRAWLER_INTERVAL_HOURS` and the
/// scheduler contract of spec.md §4.10.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_hours")]
    pub interval_hours: i64,
    #[serde(default = "default_first_tick_delay_secs")]
    pub first_tick_delay_secs: u64,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_hours: default_interval_hours(),
            first_tick_delay_secs: default_first_tick_delay_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Top-level configuration, loaded from a TOML file layered with
/// environment overrides, the way the teacher's `Config::from_file` plus
/// `figment` layering works.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub adapters: Vec<AdapterConfig>,
    pub llm: LlmConfig,
    #[serde(default)]
    pub ranker: RankerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: crate::observability::MetricsConfig,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Layers a TOML file with `MARKETINTEL_`-prefixed environment
    /// variables, following the teacher's `figment` usage
    /// (`toml` provider + `env` provider, env wins).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        use figment::providers::{Env, Format, Toml};
        use figment::Figment;

        let figment = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("MARKETINTEL_").split("__"));

        figment
            .extract()
            .map_err(|e| MarketIntelError::config(e.to_string()))
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for sub in ["raw", "processed", "context"] {
            std::fs::create_dir_all(self.data_dir.join(sub))?;
        }
        Ok(())
    }
}
