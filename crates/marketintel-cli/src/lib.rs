//! Wires a loaded `Config` into a runnable `Scheduler`: constructs the
//! database pool, repositories, adapters, LLM gateway/stages, and ranker,
//! then hands back a scheduler the binary can run once or forever.

pub mod cli;

use std::sync::Arc;

use marketintel_adapters::SourceAdapter;
use marketintel_core::config::AdapterConfig;
use marketintel_core::storage::{
    CalendarRepository, CausalAnalysisRepository, Database, EventRepository,
    IndicatorHistoryRepository, IndicatorRepository, LlmCallHistoryRepository, RunHistoryRepository,
    SignalRepository, SqliteCalendarRepository, SqliteCausalAnalysisRepository,
    SqliteEventRepository, SqliteIndicatorHistoryRepository, SqliteIndicatorRepository,
    SqliteLlmCallHistoryRepository, SqliteRunHistoryRepository, SqliteSignalRepository,
    SqliteThemeRepository, ThemeRepository,
};
use marketintel_core::Result;
use marketintel_core::{Config, MarketIntelError};
use marketintel_llm::{CallLogger, Classifier, HttpLlmGateway, LlmGateway, Scorer};
use marketintel_orchestrator::pipeline::{Orchestrator, OrchestratorDeps};
use marketintel_orchestrator::Scheduler;
use tracing::warn;

/// Everything a running process needs, bundled so `main` only has to call
/// `bootstrap` then pick `run_once` or `run_forever`.
pub struct App {
    pub scheduler: Scheduler,
    pub database: Database,
}

pub async fn bootstrap(config: &Config) -> Result<App> {
    config.ensure_directories()?;
    let database = Database::connect(&config.database).await?;
    let pool = database.pool().clone();

    let call_history_repo: Arc<dyn LlmCallHistoryRepository> =
        Arc::new(SqliteLlmCallHistoryRepository::new(pool.clone()));
    let logger = CallLogger::spawn(call_history_repo, 256);

    let gateway: Arc<dyn LlmGateway> = Arc::new(HttpLlmGateway::new(
        config.llm.endpoint.clone(),
        config.llm.api_key.clone(),
        config.llm.model.clone(),
        config.llm.timeout_secs,
        Some(logger),
    ));

    let templates = load_causal_templates(config.llm.causal_templates_path.as_deref())?;
    let classifier = Classifier::new(
        gateway.clone(),
        config.llm.classifier_max_retries,
        config.llm.classifier_retry_delay_secs,
    );
    let scorer = Scorer::with_retry_config(
        gateway,
        templates,
        config.llm.scorer_call_max_retries,
        config.llm.scorer_call_retry_delay_secs,
    );
    let ranker = marketintel_core::engine::ranker::Ranker::new(config.ranker.clone());

    let deps = OrchestratorDeps {
        adapters: build_adapters(&config.adapters),
        max_articles_per_source: None,
        classifier,
        scorer,
        ranker,
        context_lookback_days: config.llm.context_lookback_days,
        active_event_max_age_days: config.ranker.active_event_max_age_days,
        indicator_repo: Arc::new(SqliteIndicatorRepository::new(pool.clone())) as Arc<dyn IndicatorRepository>,
        indicator_history_repo: Arc::new(SqliteIndicatorHistoryRepository::new(pool.clone()))
            as Arc<dyn IndicatorHistoryRepository>,
        calendar_repo: Arc::new(SqliteCalendarRepository::new(pool.clone())) as Arc<dyn CalendarRepository>,
        event_repo: Arc::new(SqliteEventRepository::new(pool.clone())) as Arc<dyn EventRepository>,
        causal_repo: Arc::new(SqliteCausalAnalysisRepository::new(pool.clone())) as Arc<dyn CausalAnalysisRepository>,
        signal_repo: Arc::new(SqliteSignalRepository::new(pool.clone())) as Arc<dyn SignalRepository>,
        theme_repo: Arc::new(SqliteThemeRepository::new(pool.clone())) as Arc<dyn ThemeRepository>,
        run_history_repo: Arc::new(SqliteRunHistoryRepository::new(pool)) as Arc<dyn RunHistoryRepository>,
    };

    let orchestrator = Arc::new(Orchestrator::new(deps));
    let scheduler = Scheduler::new(orchestrator, config.scheduler.clone());

    Ok(App { scheduler, database })
}

fn load_causal_templates(path: Option<&std::path::Path>) -> Result<serde_json::Value> {
    match path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)?;
            serde_json::from_str(&contents).map_err(MarketIntelError::from)
        }
        None => Ok(serde_json::json!({ "templates": [] })),
    }
}

/// Builds the configured set of source adapters. Each `AdapterConfig`
/// entry names a known adapter kind; entries naming an unknown kind are
/// logged and skipped rather than failing startup, matching the
/// per-source failure isolation the orchestrator itself applies at crawl
/// time.
fn build_adapters(configs: &[AdapterConfig]) -> Vec<Arc<dyn SourceAdapter>> {
    configs
        .iter()
        .filter_map(|cfg| match cfg.name.as_str() {
            "sbv" => Some(Arc::new(marketintel_adapters::sbv::SbvAdapter::new(
                cfg.base_url.clone(),
                cfg.base_url.clone(),
            )) as Arc<dyn SourceAdapter>),
            "vnexpress" => Some(Arc::new(marketintel_adapters::news::NewsAdapter::new(
                "vnexpress",
                cfg.base_url.clone(),
                "article.item-news",
            )) as Arc<dyn SourceAdapter>),
            "cafef" => Some(Arc::new(marketintel_adapters::news::NewsAdapter::new(
                "cafef",
                cfg.base_url.clone(),
                "div.tlitem",
            )) as Arc<dyn SourceAdapter>),
            "vneconomy" => Some(Arc::new(marketintel_adapters::news::NewsAdapter::new(
                "vneconomy",
                cfg.base_url.clone(),
                "article.story",
            )) as Arc<dyn SourceAdapter>),
            other => {
                warn!(adapter = other, "unknown adapter name in config, skipping");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_adapter_names_are_skipped_not_fatal() {
        let configs = vec![AdapterConfig {
            name: "unknown-wire".to_string(),
            base_url: "http://example.test".to_string(),
            min_request_interval_secs: 2.0,
            enable_ssl_verification: true,
        }];
        assert!(build_adapters(&configs).is_empty());
    }

    #[test]
    fn known_adapter_names_are_constructed() {
        let configs = vec![
            AdapterConfig {
                name: "sbv".to_string(),
                base_url: "https://sbv.gov.vn".to_string(),
                min_request_interval_secs: 2.0,
                enable_ssl_verification: true,
            },
            AdapterConfig {
                name: "vnexpress".to_string(),
                base_url: "https://vnexpress.net".to_string(),
                min_request_interval_secs: 2.0,
                enable_ssl_verification: true,
            },
        ];
        assert_eq!(build_adapters(&configs).len(), 2);
    }

    #[test]
    fn load_causal_templates_defaults_to_empty_list_without_a_path() {
        let templates = load_causal_templates(None).unwrap();
        assert_eq!(templates, serde_json::json!({ "templates": [] }));
    }
}
