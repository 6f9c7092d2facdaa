use sqlx::FromRow;

/// Row structs mirror the teacher's `storage::models` convention: sqlx
/// decodes timestamp/json columns as plain strings, and a `row_to_*`
/// conversion method (in `repository.rs`) parses them back into typed
/// domain structs.
#[derive(Debug, Clone, FromRow)]
pub struct IndicatorRow {
    pub id: String,
    pub name: String,
    pub name_vi: Option<String>,
    pub category: String,
    pub unit: String,
    pub latest_value: f64,
    pub change: f64,
    pub change_pct: f64,
    pub trend: String,
    pub source: String,
    pub source_url: Option<String>,
    pub updated_at: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct IndicatorHistoryRow {
    pub id: i64,
    pub indicator_id: String,
    pub value: f64,
    pub previous_value: Option<f64>,
    pub change: f64,
    pub change_pct: f64,
    pub volume: Option<f64>,
    pub date: String,
    pub recorded_at: String,
    pub source: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: String,
    pub hash: String,
    pub title: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub source: String,
    pub source_url: String,
    pub published_at: String,
    pub run_date: String,
    pub is_market_relevant: bool,
    pub category: Option<String>,
    pub region: Option<String>,
    pub linked_indicators: String,
    pub base_score: Option<f64>,
    pub score_factors: String,
    pub current_score: f64,
    pub decay_factor: f64,
    pub boost_factor: f64,
    pub display_section: String,
    pub hot_topic: bool,
    pub is_follow_up: bool,
    pub last_ranked_at: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CausalAnalysisRow {
    pub event_id: String,
    pub matched_template_id: Option<String>,
    pub chain: String,
    pub confidence: String,
    pub investigation_prompts: String,
    pub affected_indicators: String,
    pub reasoning: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct SignalRow {
    pub id: String,
    pub prediction: String,
    pub direction: Option<String>,
    pub target_indicator: Option<String>,
    pub target_range_low: Option<f64>,
    pub target_range_high: Option<f64>,
    pub confidence: String,
    pub timeframe_days: Option<i64>,
    pub expires_at: Option<String>,
    pub source_event_ids: String,
    pub source_event_id: Option<String>,
    pub reasoning: Option<String>,
    pub status: String,
    pub actual_value: Option<f64>,
    pub verified_at: Option<String>,
    pub accuracy_notes: Option<String>,
    pub theme_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct ThemeRow {
    pub id: String,
    pub name: String,
    pub name_vi: Option<String>,
    pub description: Option<String>,
    pub strength: f64,
    pub peak_strength: f64,
    pub status: String,
    pub first_seen_at: String,
    pub last_seen_at: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct WatchlistRow {
    pub id: String,
    pub watch_type: String,
    pub label: String,
    pub target_id: Option<String>,
    pub condition: Option<String>,
    pub trigger_date: Option<String>,
    pub status: String,
    pub snoozed_until: Option<String>,
    pub created_at: String,
    pub triggered_at: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CalendarRecordRow {
    pub id: i64,
    pub event_name: String,
    pub country: String,
    pub date: String,
    pub time: Option<String>,
    pub importance: String,
    pub previous: Option<String>,
    pub forecast: Option<String>,
    pub actual: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct RunHistoryRow {
    pub id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: String,
    pub sources_crawled: i64,
    pub metrics_ingested: i64,
    pub events_collected: i64,
    pub duplicates_skipped: i64,
    pub classified_relevant: i64,
    pub classified_irrelevant: i64,
    pub classification_errors: i64,
    pub scored: i64,
    pub ranked: i64,
    pub key_events_count: i64,
    pub summary: Option<String>,
    pub errors: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct LlmCallHistoryRow {
    pub id: String,
    pub timestamp: String,
    pub model: String,
    pub system_prompt: Option<String>,
    pub user_prompt: String,
    pub response: Option<String>,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    pub temperature: f64,
    pub max_tokens: Option<i64>,
    pub latency_ms: i64,
    pub stop_reason: Option<String>,
    pub task_type: String,
    pub run_id: String,
    pub is_valid_json: bool,
    pub error: Option<String>,
}
