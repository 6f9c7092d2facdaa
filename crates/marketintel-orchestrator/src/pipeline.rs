//! The pipeline orchestrator: one public operation, `run()`, that
//! sequences crawl -> persist-metrics -> classify -> score -> persist-events
//! -> rank -> verify-signals -> write-run-history for one pass.
//!
//! Grounded on `examples/original_source/backend/processor/pipeline.py`'s
//! step sequence and on the teacher's `ComplianceScheduler::execute_task`
//! for the catch-log-record-as-failed error boundary around the whole pass.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use marketintel_adapters::SourceAdapter;
use marketintel_core::domain::{
    CausalAnalysis, Confidence, Event, Indicator, IndicatorHistory, RunHistory, RunStatus, Signal,
    SignalConfidence, SignalStatus, Theme, Trend,
};
use marketintel_core::engine::ranker::{RankableEvent, Ranker};
use marketintel_core::observability::PipelineMetrics;
use marketintel_core::storage::{
    CalendarRepository, CausalAnalysisRepository, EventRepository, IndicatorHistoryRepository,
    IndicatorRepository, RunHistoryRepository, SignalRepository, ThemeRepository,
};
use marketintel_core::Result;
use marketintel_llm::{CallContext, ClassificationResult, ClassifiedItem, Classifier, LlmGateway, NewsItem, Scorer};
use serde::Deserialize;
use tracing::{error, info, warn};

/// Everything the orchestrator needs to run one pass. Bundled into one
/// struct (rather than a long constructor argument list) since the CLI
/// assembles all of these from one `Config` plus the database pool.
pub struct OrchestratorDeps {
    pub adapters: Vec<Arc<dyn SourceAdapter>>,
    pub max_articles_per_source: Option<usize>,
    pub classifier: Classifier<Arc<dyn LlmGateway>>,
    pub scorer: Scorer<Arc<dyn LlmGateway>>,
    pub ranker: Ranker,
    pub context_lookback_days: i64,
    pub active_event_max_age_days: i64,
    pub indicator_repo: Arc<dyn IndicatorRepository>,
    pub indicator_history_repo: Arc<dyn IndicatorHistoryRepository>,
    pub calendar_repo: Arc<dyn CalendarRepository>,
    pub event_repo: Arc<dyn EventRepository>,
    pub causal_repo: Arc<dyn CausalAnalysisRepository>,
    pub signal_repo: Arc<dyn SignalRepository>,
    pub theme_repo: Arc<dyn ThemeRepository>,
    pub run_history_repo: Arc<dyn RunHistoryRepository>,
}

/// One item that survived Stage 1 (market-relevant) and is waiting for
/// Stage 2. Carries the hash computed during dedup so Stage 3's
/// persistence doesn't recompute it.
struct Retained {
    hash: String,
    title: String,
    content: String,
    source: String,
    source_url: String,
    published_at: chrono::DateTime<Utc>,
    classification: ClassificationResult,
}

pub struct Orchestrator {
    deps: OrchestratorDeps,
}

impl Orchestrator {
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self { deps }
    }

    /// Runs one full pass. Always returns a `RunHistory`, even on partial
    /// failure inside steps 2-9: those are caught, logged, and folded into
    /// the returned row's `errors`/`status` rather than propagated. Only a
    /// failure to persist the final `RunHistory` row itself (e.g. the
    /// database is unreachable) escapes to the caller, per the catastrophic
    /// case in the error taxonomy.
    pub async fn run(&self) -> Result<RunHistory> {
        let started_at = Utc::now();
        let mut run = RunHistory::start(started_at);
        let run_id = run.id.clone();

        match self.execute(&run_id, &mut run).await {
            Ok(()) => {
                let status = if run.errors.is_empty() { RunStatus::Success } else { RunStatus::Partial };
                let summary = format!(
                    "{} sources, {} events collected, {} duplicates, {} relevant, {} scored, {} key events",
                    run.sources_crawled, run.events_collected, run.duplicates_skipped,
                    run.classified_relevant, run.scored, run.key_events_count,
                );
                run.finish(Utc::now(), status, summary);
            }
            Err(err) => {
                error!(error = %err, run_id = %run_id, "orchestrator pass failed");
                run.record_error(err.to_string());
                run.finish(Utc::now(), RunStatus::Failed, "pass aborted by an unrecoverable error");
            }
        }

        let duration_ms = (Utc::now() - started_at).num_milliseconds() as f64;
        PipelineMetrics::record_run_duration_ms(duration_ms);

        self.deps.run_history_repo.insert(&run).await?;
        info!(run_id = %run_id, status = ?run.status, "run history written");
        Ok(run)
    }

    async fn execute(&self, run_id: &str, run: &mut RunHistory) -> Result<()> {
        let ctx = CallContext::new("pipeline", run_id);

        // Step 1: crawl.
        let existing_titles: HashSet<String> = self
            .deps
            .event_repo
            .get_recent_titles(None, self.deps.context_lookback_days)
            .await?
            .into_iter()
            .collect();

        let outputs = futures::future::join_all(
            self.deps
                .adapters
                .iter()
                .map(|adapter| adapter.run(self.deps.max_articles_per_source, &existing_titles)),
        )
        .await;

        for output in &outputs {
            if output.success {
                run.sources_crawled += 1;
            } else {
                run.record_error(format!(
                    "adapter '{}' failed: {}",
                    output.source,
                    output.error.as_deref().unwrap_or("unknown error")
                ));
            }
        }

        // Step 2: persist metrics/calendar.
        let mut metrics_ingested = 0u32;
        for output in &outputs {
            for metric in &output.metrics {
                let previous = self.deps.indicator_repo.get(&metric.metric_id).await?;
                let (change, change_pct) =
                    IndicatorHistory::compute_change(metric.value, previous.as_ref().map(|p| p.latest_value));

                let indicator = Indicator {
                    id: metric.metric_id.clone(),
                    name: metric.name.clone(),
                    name_vi: metric.name_vi.clone(),
                    category: metric.category.clone(),
                    unit: metric.unit.clone(),
                    latest_value: metric.value,
                    change,
                    change_pct,
                    trend: Indicator::trend_for(change),
                    source: metric.source.clone(),
                    source_url: metric.source_url.clone(),
                    updated_at: metric.date,
                };
                self.deps.indicator_repo.upsert(&indicator).await?;

                let volume = metric.attributes.get("volume").and_then(|v| v.as_f64());
                if self
                    .deps
                    .indicator_history_repo
                    .add_history(&metric.metric_id, metric.value, metric.date, &metric.source, volume)
                    .await?
                    .is_some()
                {
                    metrics_ingested += 1;
                }
            }

            for record in &output.calendar {
                self.deps.calendar_repo.insert_unique(record).await?;
            }
        }
        run.metrics_ingested = metrics_ingested;

        PipelineMetrics::record_crawl(
            "all",
            metrics_ingested as u64,
            outputs.iter().map(|o| o.events.len() as u64).sum(),
            0,
        );

        // Step 3: collect events.
        let records: Vec<_> = outputs.into_iter().flat_map(|o| o.events).collect();
        run.events_collected = records.len() as u32;

        // Step 4: classify & dedup.
        let mut retained = Vec::with_capacity(records.len());
        for record in records {
            let content = record.content.clone().unwrap_or_default();
            let hash = Event::compute_hash(&record.title, &record.source, &content);

            if self.deps.event_repo.find_by_hash(&hash).await?.is_some() {
                run.duplicates_skipped += 1;
                continue;
            }

            let news_item = NewsItem {
                title: record.title.clone(),
                content: content.clone(),
                source: record.source.clone(),
                date: record.published_at.to_rfc3339(),
            };

            match self.deps.classifier.classify(&news_item, &ctx).await {
                Ok(classification) if classification.is_market_relevant => {
                    run.classified_relevant += 1;
                    retained.push(Retained {
                        hash,
                        title: record.title,
                        content,
                        source: record.source,
                        source_url: record.source_url,
                        published_at: record.published_at,
                        classification,
                    });
                }
                Ok(_) => {
                    run.classified_irrelevant += 1;
                }
                Err(err) => {
                    run.classification_errors += 1;
                    warn!(title = %record.title, error = %err, "classification failed, event skipped");
                    run.record_error(format!("classification failed for '{}': {err}", record.title));
                }
            }
        }

        PipelineMetrics::record_classification(
            run.classified_relevant as u64,
            run.classified_irrelevant as u64,
            run.classification_errors as u64,
        );

        // Step 5: build context.
        let active_signals = self.deps.signal_repo.get_active().await?;
        let active_signals_json: Vec<serde_json::Value> = active_signals
            .iter()
            .filter_map(|s| serde_json::to_value(s).ok())
            .collect();

        let active_themes = self.deps.theme_repo.get_active_and_emerging(50).await?;
        let active_themes_json: Vec<serde_json::Value> = active_themes
            .iter()
            .filter_map(|t| serde_json::to_value(t).ok())
            .collect();

        let previous_summary = self
            .deps
            .run_history_repo
            .get_latest()
            .await?
            .and_then(|r| r.summary)
            .unwrap_or_default();
        let context_summary = self
            .deps
            .scorer
            .summarize_context(&previous_summary, self.deps.context_lookback_days, &ctx)
            .await;

        // Step 6: score.
        let mut scored_count = 0u32;
        for item in &retained {
            let classified_item = ClassifiedItem {
                title: item.title.clone(),
                content: item.content.clone(),
                source: item.source.clone(),
                date: item.published_at.to_rfc3339(),
                category: item.classification.category.clone(),
                linked_indicators: item.classification.linked_indicators.clone(),
            };

            let scoring = self
                .deps
                .scorer
                .score(
                    &classified_item,
                    &context_summary,
                    &active_signals_json,
                    &active_themes_json,
                    self.deps.context_lookback_days,
                    &ctx,
                )
                .await;
            scored_count += 1;

            // Step 7: persist the event and anything the score attached to it.
            self.persist_scored_event(item, &scoring, &active_themes).await?;
        }
        run.scored = scored_count;
        PipelineMetrics::record_scored(scored_count as u64);

        // Step 8: rank.
        let active_events = self.deps.event_repo.get_active_events(self.deps.active_event_max_age_days).await?;
        let mut rankable = Vec::with_capacity(active_events.len());
        for event in &active_events {
            let matched_template_id = self
                .deps
                .causal_repo
                .get(&event.id)
                .await?
                .and_then(|a| a.matched_template_id);
            rankable.push(RankableEvent {
                id: event.id.clone(),
                published_at: event.published_at,
                base_score: event.base_score.unwrap_or(0.0),
                linked_indicators: event.linked_indicators.clone(),
                category: event.category.clone(),
                matched_template_id,
                is_market_relevant: event.is_market_relevant,
                is_follow_up: event.is_follow_up,
            });
        }

        let today = Utc::now();
        let hot_topics = self.deps.ranker.detect_hot_topics(&rankable, today);
        let (results, counts) = self.deps.ranker.rank_all(&rankable, today, &hot_topics);
        for result in &results {
            self.deps
                .event_repo
                .update_scores(
                    &result.event_id,
                    result.final_score,
                    result.decay_factor,
                    result.boost_factor,
                    result.display_section,
                    result.hot_topic,
                    today,
                )
                .await?;
        }
        run.ranked = results.len() as u32;
        run.key_events_count = counts.key_events as u32;
        PipelineMetrics::record_ranked(counts.key_events as u64, counts.other_news as u64);

        // Step 9: verify expired signals (this model's analogue of "review
        // open investigations" — deterministic against indicator history
        // rather than an LLM evidence-review pass, since this repository
        // carries the Signal/Theme/Watchlist model rather than
        // Investigation/Evidence/Prediction; see DESIGN.md).
        self.verify_expired_signals().await?;

        Ok(())
    }

    async fn persist_scored_event(
        &self,
        item: &Retained,
        scoring: &marketintel_llm::ScoringResult,
        active_themes: &[Theme],
    ) -> Result<()> {
        let mut event = Event::new(&item.title, &item.source, &item.source_url, item.published_at, &item.content);
        event.hash = item.hash.clone();
        event.content = Some(item.content.clone());
        event.is_market_relevant = true;
        event.category = item.classification.category.clone();
        event.linked_indicators = item.classification.linked_indicators.clone();
        event.base_score = Some(scoring.base_score as f64);
        event.score_factors = scoring.score_factors.clone();

        self.deps.event_repo.insert(&event).await?;

        if let Ok(causal) = serde_json::from_value::<CausalAnalysisJson>(scoring.causal_analysis.clone()) {
            if causal.matched_template_id.is_some() || !causal.chain.is_empty() {
                let analysis = CausalAnalysis {
                    event_id: event.id.clone(),
                    matched_template_id: causal.matched_template_id,
                    chain: causal.chain,
                    confidence: parse_confidence(&causal.confidence),
                    investigation_prompts: Vec::new(),
                    affected_indicators: event.linked_indicators.clone(),
                    reasoning: causal.reasoning,
                };
                self.deps.causal_repo.upsert(&analysis).await?;
            }
        }

        if scoring.signal_output.create_signal {
            let now = Utc::now();
            let timeframe_days = scoring.signal_output.timeframe_days.unwrap_or(30);
            let signal = Signal {
                id: uuid::Uuid::new_v4().to_string(),
                prediction: scoring.signal_output.prediction.clone().unwrap_or_default(),
                direction: scoring.signal_output.direction.as_deref().and_then(parse_trend),
                target_indicator: scoring.signal_output.target_indicator.clone(),
                target_range_low: scoring.signal_output.target_range_low,
                target_range_high: scoring.signal_output.target_range_high,
                confidence: parse_signal_confidence(&scoring.signal_output.confidence),
                timeframe_days: Some(timeframe_days),
                expires_at: Some(Signal::expiry_for(now, timeframe_days)),
                source_event_ids: vec![event.id.clone()],
                source_event_id: Some(event.id.clone()),
                reasoning: scoring.signal_output.reasoning.clone(),
                status: SignalStatus::Active,
                actual_value: None,
                verified_at: None,
                accuracy_notes: None,
                theme_id: None,
                created_at: now,
                updated_at: now,
            };
            self.deps.signal_repo.insert(&signal).await?;
        }

        if scoring.theme_link.create_new_theme {
            let now = Utc::now();
            let name = scoring
                .theme_link
                .new_theme
                .as_ref()
                .and_then(|v| v.get("name"))
                .and_then(|v| v.as_str())
                .unwrap_or(&item.title)
                .to_string();
            let mut theme = Theme::new(uuid::Uuid::new_v4().to_string(), name, now);
            theme.update_strength(10.0, now);
            self.deps.theme_repo.upsert(&theme).await?;
        } else if let Some(theme_id) = &scoring.theme_link.existing_theme_id {
            if let Some(existing) = active_themes.iter().find(|t| &t.id == theme_id) {
                let mut theme = existing.clone();
                theme.update_strength(theme.strength + 10.0, Utc::now());
                self.deps
                    .theme_repo
                    .update_strength(&theme.id, theme.strength, Some(theme.peak_strength), None)
                    .await?;
            }
        }

        Ok(())
    }

    /// Deterministic signal verification: every expired-but-unverified
    /// signal is checked against its target indicator's latest value (if
    /// it names one) and marked correct or wrong; signals with no target
    /// indicator are marked wrong (an unfalsifiable prediction cannot be
    /// confirmed correct).
    async fn verify_expired_signals(&self) -> Result<()> {
        let expired = self.deps.signal_repo.get_expired_unverified().await?;
        for signal in expired {
            let Some(indicator_id) = &signal.target_indicator else {
                self.deps.signal_repo.verify(&signal.id, SignalStatus::VerifiedWrong, None).await?;
                continue;
            };

            let Some(indicator) = self.deps.indicator_repo.get(indicator_id).await? else {
                self.deps.signal_repo.verify(&signal.id, SignalStatus::VerifiedWrong, None).await?;
                continue;
            };

            let actual = indicator.latest_value;
            let correct = matches_prediction(&signal, actual);
            let status = if correct { SignalStatus::VerifiedCorrect } else { SignalStatus::VerifiedWrong };
            self.deps.signal_repo.verify(&signal.id, status, Some(actual)).await?;
        }
        Ok(())
    }
}

fn matches_prediction(signal: &Signal, actual: f64) -> bool {
    if let (Some(low), Some(high)) = (signal.target_range_low, signal.target_range_high) {
        return actual >= low && actual <= high;
    }
    match signal.direction {
        Some(Trend::Up) => actual > 0.0,
        Some(Trend::Down) => actual < 0.0,
        Some(Trend::Stable) => actual == 0.0,
        None => false,
    }
}

fn parse_trend(direction: &str) -> Option<Trend> {
    match direction.to_ascii_lowercase().as_str() {
        "up" | "increase" | "higher" => Some(Trend::Up),
        "down" | "decrease" | "lower" => Some(Trend::Down),
        "stable" | "flat" | "unchanged" => Some(Trend::Stable),
        _ => None,
    }
}

fn parse_confidence(raw: &str) -> Confidence {
    match raw {
        "verified" => Confidence::Verified,
        "likely" => Confidence::Likely,
        _ => Confidence::Uncertain,
    }
}

fn parse_signal_confidence(raw: &str) -> SignalConfidence {
    match raw {
        "high" => SignalConfidence::High,
        "low" => SignalConfidence::Low,
        _ => SignalConfidence::Medium,
    }
}

#[derive(Debug, Deserialize, Default)]
struct CausalAnalysisJson {
    matched_template_id: Option<String>,
    #[serde(default)]
    chain: Vec<String>,
    #[serde(default = "default_confidence_str")]
    confidence: String,
    #[serde(default)]
    reasoning: String,
}

fn default_confidence_str() -> String {
    "uncertain".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use marketintel_adapters::{ContentExtractor, RawBundle, RawItem};
    use marketintel_core::domain::{CalendarRecord, CrawlerOutput, EventRecord, EventType, MetricType, RunStatus};
    use marketintel_core::storage::Database;
    use marketintel_llm::{CallContext as Ctx, Message, Response, Usage};
    use marketintel_core::config::{DatabaseConfig, RankerConfig};
    use marketintel_core::storage::{
        SqliteCalendarRepository, SqliteCausalAnalysisRepository, SqliteEventRepository,
        SqliteIndicatorHistoryRepository, SqliteIndicatorRepository, SqliteRunHistoryRepository,
        SqliteSignalRepository, SqliteThemeRepository,
    };
    use std::sync::Mutex;

    async fn test_db() -> Database {
        Database::connect(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            connect_timeout_secs: 5,
            run_migrations: true,
        })
        .await
        .unwrap()
    }

    struct OneShotAdapter {
        extractor: ContentExtractor,
    }

    #[async_trait]
    impl SourceAdapter for OneShotAdapter {
        fn name(&self) -> &str {
            "stub-wire"
        }

        async fn fetch(&self) -> Result<RawBundle> {
            let mut bundle = RawBundle::new();
            bundle.push(RawItem::metric(
                "exchange_rate",
                serde_json::json!({"id": "usd_vnd_central", "value": 25067.0}),
            ));
            bundle.push(RawItem::document(
                "news",
                "SBV raises policy rate",
                "http://example.test/1",
                serde_json::json!({}),
            ));
            Ok(bundle)
        }

        fn transform(&self, raw: RawBundle) -> CrawlerOutput {
            let mut out = CrawlerOutput::empty(self.name());
            for item in raw.items {
                if let Some(title) = item.title {
                    out.events.push(EventRecord::new(
                        EventType::News,
                        title,
                        self.name(),
                        item.url.unwrap_or_default(),
                        Utc::now(),
                    ));
                } else {
                    out.metrics.push(marketintel_core::domain::MetricRecord::new(
                        MetricType::ExchangeRate,
                        "usd_vnd_central",
                        "USD/VND central rate",
                        25067.0,
                        Utc::now(),
                        self.name(),
                    ));
                }
            }
            out.calendar.push(CalendarRecord {
                event_name: "CPI release".to_string(),
                country: "VN".to_string(),
                date: Utc::now(),
                time: None,
                importance: "high".to_string(),
                previous: None,
                forecast: None,
                actual: None,
            });
            out
        }

        fn extractor(&self) -> &ContentExtractor {
            &self.extractor
        }
    }

    struct ScriptedGateway {
        classify_reply: Mutex<Vec<String>>,
        score_reply: String,
    }

    #[async_trait]
    impl LlmGateway for ScriptedGateway {
        async fn generate(
            &self,
            _prompt: &str,
            _system: Option<&str>,
            _max_tokens: u32,
            _temperature: f32,
            ctx: &Ctx,
        ) -> Result<Response> {
            let content = if ctx.task_type == "pipeline" && self.classify_reply.lock().unwrap().len() > 0 {
                self.classify_reply.lock().unwrap().remove(0)
            } else {
                self.score_reply.clone()
            };
            Ok(Response {
                content,
                model: "stub".to_string(),
                usage: Usage::default(),
                stop_reason: Some("stop".to_string()),
                latency_ms: 1,
            })
        }

        async fn chat(
            &self,
            _messages: &[Message],
            _system: Option<&str>,
            _max_tokens: u32,
            _temperature: f32,
            _ctx: &Ctx,
        ) -> Result<Response> {
            unreachable!("pipeline only calls generate")
        }
    }

    async fn make_orchestrator(db: &Database, gateway: Arc<dyn LlmGateway>) -> Orchestrator {
        let pool = db.pool().clone();
        let classifier = Classifier::new(gateway.clone(), 3, 0.01);
        let scorer = Scorer::new(gateway, serde_json::json!({"templates": []}));
        let ranker = Ranker::new(RankerConfig::default());

        let deps = OrchestratorDeps {
            adapters: vec![Arc::new(OneShotAdapter { extractor: ContentExtractor::new() })],
            max_articles_per_source: None,
            classifier,
            scorer,
            ranker,
            context_lookback_days: 7,
            active_event_max_age_days: 30,
            indicator_repo: Arc::new(SqliteIndicatorRepository::new(pool.clone())),
            indicator_history_repo: Arc::new(SqliteIndicatorHistoryRepository::new(pool.clone())),
            calendar_repo: Arc::new(SqliteCalendarRepository::new(pool.clone())),
            event_repo: Arc::new(SqliteEventRepository::new(pool.clone())),
            causal_repo: Arc::new(SqliteCausalAnalysisRepository::new(pool.clone())),
            signal_repo: Arc::new(SqliteSignalRepository::new(pool.clone())),
            theme_repo: Arc::new(SqliteThemeRepository::new(pool.clone())),
            run_history_repo: Arc::new(SqliteRunHistoryRepository::new(pool)),
        };
        Orchestrator::new(deps)
    }

    #[tokio::test]
    async fn run_persists_indicator_event_and_run_history_on_cold_start() {
        let db = test_db().await;
        let gateway: Arc<dyn LlmGateway> = Arc::new(ScriptedGateway {
            classify_reply: Mutex::new(vec![
                r#"{"is_market_relevant": true, "category": "monetary_policy", "linked_indicators": ["usd_vnd_central"], "reasoning": "x"}"#.to_string(),
            ]),
            score_reply: r#"{"base_score": 80, "score_factors": {}, "causal_analysis": {}, "signal_output": {"create_signal": false}, "theme_link": {"create_new_theme": false}}"#.to_string(),
        });
        let orchestrator = make_orchestrator(&db, gateway).await;

        let run = orchestrator.run().await.unwrap();
        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(run.sources_crawled, 1);
        assert_eq!(run.events_collected, 1);
        assert_eq!(run.classified_relevant, 1);
        assert_eq!(run.scored, 1);
        assert_eq!(run.ranked, 1);

        let indicator = SqliteIndicatorRepository::new(db.pool().clone())
            .get("usd_vnd_central")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(indicator.latest_value, 25067.0);
    }

    #[tokio::test]
    async fn run_dedups_republish_on_second_pass() {
        let db = test_db().await;
        let gateway: Arc<dyn LlmGateway> = Arc::new(ScriptedGateway {
            classify_reply: Mutex::new(vec![
                r#"{"is_market_relevant": true, "category": "monetary_policy", "linked_indicators": [], "reasoning": "x"}"#.to_string(),
                r#"{"is_market_relevant": true, "category": "monetary_policy", "linked_indicators": [], "reasoning": "x"}"#.to_string(),
            ]),
            score_reply: r#"{"base_score": 80, "score_factors": {}, "causal_analysis": {}, "signal_output": {"create_signal": false}, "theme_link": {"create_new_theme": false}}"#.to_string(),
        });
        let orchestrator = make_orchestrator(&db, gateway).await;

        orchestrator.run().await.unwrap();
        let second = orchestrator.run().await.unwrap();

        assert_eq!(second.duplicates_skipped, 1);
        assert_eq!(second.events_collected, 1);
    }

    #[tokio::test]
    async fn classification_errors_are_recorded_not_propagated() {
        let db = test_db().await;
        let gateway: Arc<dyn LlmGateway> = Arc::new(ScriptedGateway {
            classify_reply: Mutex::new(vec!["garbage".to_string(), "garbage".to_string(), "garbage".to_string()]),
            score_reply: "{}".to_string(),
        });
        let orchestrator = make_orchestrator(&db, gateway).await;

        let run = orchestrator.run().await.unwrap();
        assert_eq!(run.status, RunStatus::Partial);
        assert_eq!(run.classification_errors, 1);
        assert!(!run.errors.is_empty());
    }
}
