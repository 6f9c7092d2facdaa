use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};

use crate::domain::{
    CalendarRecord, CausalAnalysis, Confidence, DisplaySection, Event, Indicator,
    IndicatorHistory, RunHistory, RunStatus, Signal, SignalAccuracyStats, SignalConfidence,
    SignalStatus, Theme, ThemeStatus, Trend, Watchlist, WatchlistStatus,
};
use crate::error::{MarketIntelError, Result};

use super::models::{
    CalendarRecordRow, CausalAnalysisRow, EventRow, IndicatorHistoryRow, IndicatorRow,
    RunHistoryRow, SignalRow, ThemeRow, WatchlistRow,
};

/// Parses a stored RFC3339 timestamp, falling back to `Utc::now()` on
/// corruption rather than failing the whole row read — the teacher's
/// `row_to_record` convention in `storage/repository.rs`.
fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_ts_opt(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.map(parse_ts)
}

fn parse_trend(raw: &str) -> Trend {
    match raw {
        "up" => Trend::Up,
        "down" => Trend::Down,
        _ => Trend::Stable,
    }
}

fn trend_str(trend: Trend) -> &'static str {
    match trend {
        Trend::Up => "up",
        Trend::Down => "down",
        Trend::Stable => "stable",
    }
}

fn parse_display_section(raw: &str) -> DisplaySection {
    match raw {
        "key_events" => DisplaySection::KeyEvents,
        "other_news" => DisplaySection::OtherNews,
        _ => DisplaySection::Archive,
    }
}

fn row_to_indicator(row: IndicatorRow) -> Indicator {
    Indicator {
        id: row.id,
        name: row.name,
        name_vi: row.name_vi,
        category: row.category,
        unit: row.unit,
        latest_value: row.latest_value,
        change: row.change,
        change_pct: row.change_pct,
        trend: parse_trend(&row.trend),
        source: row.source,
        source_url: row.source_url,
        updated_at: parse_ts(&row.updated_at),
    }
}

fn row_to_indicator_history(row: IndicatorHistoryRow) -> IndicatorHistory {
    IndicatorHistory {
        id: row.id,
        indicator_id: row.indicator_id,
        value: row.value,
        previous_value: row.previous_value,
        change: row.change,
        change_pct: row.change_pct,
        volume: row.volume,
        date: parse_ts(&row.date),
        recorded_at: parse_ts(&row.recorded_at),
        source: row.source,
    }
}

fn row_to_event(row: EventRow) -> Event {
    Event {
        id: row.id,
        hash: row.hash,
        title: row.title,
        summary: row.summary,
        content: row.content,
        source: row.source,
        source_url: row.source_url,
        published_at: parse_ts(&row.published_at),
        run_date: parse_ts(&row.run_date),
        is_market_relevant: row.is_market_relevant,
        category: row.category,
        region: row.region,
        linked_indicators: serde_json::from_str(&row.linked_indicators).unwrap_or_default(),
        base_score: row.base_score,
        score_factors: serde_json::from_str(&row.score_factors).unwrap_or(serde_json::Value::Null),
        current_score: row.current_score,
        decay_factor: row.decay_factor,
        boost_factor: row.boost_factor,
        display_section: parse_display_section(&row.display_section),
        hot_topic: row.hot_topic,
        is_follow_up: row.is_follow_up,
        last_ranked_at: parse_ts_opt(row.last_ranked_at.as_deref()),
    }
}

fn parse_confidence(raw: &str) -> Confidence {
    match raw {
        "verified" => Confidence::Verified,
        "likely" => Confidence::Likely,
        _ => Confidence::Uncertain,
    }
}

fn confidence_tag_str(confidence: Confidence) -> &'static str {
    match confidence {
        Confidence::Verified => "verified",
        Confidence::Likely => "likely",
        Confidence::Uncertain => "uncertain",
    }
}

fn row_to_causal_analysis(row: CausalAnalysisRow) -> CausalAnalysis {
    CausalAnalysis {
        event_id: row.event_id,
        matched_template_id: row.matched_template_id,
        chain: serde_json::from_str(&row.chain).unwrap_or_default(),
        confidence: parse_confidence(&row.confidence),
        investigation_prompts: serde_json::from_str(&row.investigation_prompts).unwrap_or_default(),
        affected_indicators: serde_json::from_str(&row.affected_indicators).unwrap_or_default(),
        reasoning: row.reasoning,
    }
}

fn row_to_signal(row: SignalRow) -> Signal {
    Signal {
        id: row.id,
        prediction: row.prediction,
        direction: row.direction.as_deref().map(parse_trend),
        target_indicator: row.target_indicator,
        target_range_low: row.target_range_low,
        target_range_high: row.target_range_high,
        confidence: match row.confidence.as_str() {
            "high" => SignalConfidence::High,
            "low" => SignalConfidence::Low,
            _ => SignalConfidence::Medium,
        },
        timeframe_days: row.timeframe_days,
        expires_at: parse_ts_opt(row.expires_at.as_deref()),
        source_event_ids: serde_json::from_str(&row.source_event_ids).unwrap_or_default(),
        source_event_id: row.source_event_id,
        reasoning: row.reasoning,
        status: match row.status.as_str() {
            "verified_correct" => SignalStatus::VerifiedCorrect,
            "verified_wrong" => SignalStatus::VerifiedWrong,
            "expired" => SignalStatus::Expired,
            _ => SignalStatus::Active,
        },
        actual_value: row.actual_value,
        verified_at: parse_ts_opt(row.verified_at.as_deref()),
        accuracy_notes: row.accuracy_notes,
        theme_id: row.theme_id,
        created_at: parse_ts(&row.created_at),
        updated_at: parse_ts(&row.updated_at),
    }
}

fn row_to_theme(row: ThemeRow) -> Theme {
    Theme {
        id: row.id,
        name: row.name,
        name_vi: row.name_vi,
        description: row.description,
        strength: row.strength,
        peak_strength: row.peak_strength,
        status: match row.status.as_str() {
            "active" => ThemeStatus::Active,
            "fading" => ThemeStatus::Fading,
            "archived" => ThemeStatus::Archived,
            _ => ThemeStatus::Emerging,
        },
        first_seen_at: parse_ts(&row.first_seen_at),
        last_seen_at: parse_ts(&row.last_seen_at),
    }
}

fn row_to_watchlist(row: WatchlistRow) -> Watchlist {
    use crate::domain::WatchlistType;
    Watchlist {
        id: row.id,
        watch_type: match row.watch_type.as_str() {
            "date" => WatchlistType::Date,
            "indicator" => WatchlistType::Indicator,
            _ => WatchlistType::Keyword,
        },
        label: row.label,
        target_id: row.target_id,
        condition: row.condition,
        trigger_date: parse_ts_opt(row.trigger_date.as_deref()),
        status: match row.status.as_str() {
            "triggered" => WatchlistStatus::Triggered,
            "dismissed" => WatchlistStatus::Dismissed,
            _ => WatchlistStatus::Watching,
        },
        snoozed_until: parse_ts_opt(row.snoozed_until.as_deref()),
        created_at: parse_ts(&row.created_at),
        triggered_at: parse_ts_opt(row.triggered_at.as_deref()),
    }
}

fn row_to_calendar(row: CalendarRecordRow) -> CalendarRecord {
    CalendarRecord {
        event_name: row.event_name,
        country: row.country,
        date: parse_ts(&row.date),
        time: row.time,
        importance: row.importance,
        previous: row.previous,
        forecast: row.forecast,
        actual: row.actual,
    }
}

fn row_to_run_history(row: RunHistoryRow) -> RunHistory {
    RunHistory {
        id: row.id,
        started_at: parse_ts(&row.started_at),
        finished_at: parse_ts_opt(row.finished_at.as_deref()),
        status: match row.status.as_str() {
            "partial" => RunStatus::Partial,
            "failed" => RunStatus::Failed,
            _ => RunStatus::Success,
        },
        sources_crawled: row.sources_crawled as u32,
        metrics_ingested: row.metrics_ingested as u32,
        events_collected: row.events_collected as u32,
        duplicates_skipped: row.duplicates_skipped as u32,
        classified_relevant: row.classified_relevant as u32,
        classified_irrelevant: row.classified_irrelevant as u32,
        classification_errors: row.classification_errors as u32,
        scored: row.scored as u32,
        ranked: row.ranked as u32,
        key_events_count: row.key_events_count as u32,
        summary: row.summary,
        errors: serde_json::from_str(&row.errors).unwrap_or_default(),
    }
}

#[async_trait]
pub trait IndicatorRepository: Send + Sync {
    async fn upsert(&self, indicator: &Indicator) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Indicator>>;
    async fn get_all_grouped(&self) -> Result<Vec<Indicator>>;
}

pub struct SqliteIndicatorRepository {
    pool: Pool<Sqlite>,
}

impl SqliteIndicatorRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IndicatorRepository for SqliteIndicatorRepository {
    async fn upsert(&self, indicator: &Indicator) -> Result<()> {
        let updated_at = indicator.updated_at.to_rfc3339();
        let trend = trend_str(indicator.trend);

        sqlx::query(
            "INSERT INTO indicators (id, name, name_vi, category, unit, latest_value, change, \
             change_pct, trend, source, source_url, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
             name = excluded.name, name_vi = excluded.name_vi, category = excluded.category, \
             unit = excluded.unit, latest_value = excluded.latest_value, change = excluded.change, \
             change_pct = excluded.change_pct, trend = excluded.trend, source = excluded.source, \
             source_url = excluded.source_url, updated_at = excluded.updated_at",
        )
        .bind(&indicator.id)
        .bind(&indicator.name)
        .bind(&indicator.name_vi)
        .bind(&indicator.category)
        .bind(&indicator.unit)
        .bind(indicator.latest_value)
        .bind(indicator.change)
        .bind(indicator.change_pct)
        .bind(trend)
        .bind(&indicator.source)
        .bind(&indicator.source_url)
        .bind(&updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Indicator>> {
        let row = sqlx::query_as::<_, IndicatorRow>("SELECT * FROM indicators WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(row_to_indicator))
    }

    async fn get_all_grouped(&self) -> Result<Vec<Indicator>> {
        let rows = sqlx::query_as::<_, IndicatorRow>(
            "SELECT * FROM indicators ORDER BY category, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_indicator).collect())
    }
}

#[async_trait]
pub trait IndicatorHistoryRepository: Send + Sync {
    /// Deduplicates by (indicator_id, date, value); returns `None` if the
    /// write was a no-op, otherwise the newly computed history row.
    async fn add_history(
        &self,
        indicator_id: &str,
        value: f64,
        date: DateTime<Utc>,
        source: &str,
        volume: Option<f64>,
    ) -> Result<Option<IndicatorHistory>>;

    async fn get_history(&self, indicator_id: &str, days: i64, limit: i64) -> Result<Vec<IndicatorHistory>>;
}

pub struct SqliteIndicatorHistoryRepository {
    pool: Pool<Sqlite>,
}

impl SqliteIndicatorHistoryRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IndicatorHistoryRepository for SqliteIndicatorHistoryRepository {
    async fn add_history(
        &self,
        indicator_id: &str,
        value: f64,
        date: DateTime<Utc>,
        source: &str,
        volume: Option<f64>,
    ) -> Result<Option<IndicatorHistory>> {
        let existing = sqlx::query_as::<_, IndicatorHistoryRow>(
            "SELECT * FROM indicator_history WHERE indicator_id = ? AND date = ? AND value = ?",
        )
        .bind(indicator_id)
        .bind(date.to_rfc3339())
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        if existing.is_some() {
            return Ok(None);
        }

        let previous = sqlx::query_as::<_, IndicatorHistoryRow>(
            "SELECT * FROM indicator_history WHERE indicator_id = ? ORDER BY date DESC LIMIT 1",
        )
        .bind(indicator_id)
        .fetch_optional(&self.pool)
        .await?;

        let previous_value = previous.map(|p| p.value);
        let (change, change_pct) = IndicatorHistory::compute_change(value, previous_value);
        let now = Utc::now();

        let date_str = date.to_rfc3339();
        let recorded_at_str = now.to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO indicator_history \
             (indicator_id, value, previous_value, change, change_pct, volume, date, recorded_at, source) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(indicator_id)
        .bind(value)
        .bind(previous_value)
        .bind(change)
        .bind(change_pct)
        .bind(volume)
        .bind(&date_str)
        .bind(&recorded_at_str)
        .bind(source)
        .execute(&self.pool)
        .await?;

        Ok(Some(IndicatorHistory {
            id: result.last_insert_rowid(),
            indicator_id: indicator_id.to_string(),
            value,
            previous_value,
            change,
            change_pct,
            volume,
            date,
            recorded_at: now,
            source: source.to_string(),
        }))
    }

    async fn get_history(&self, indicator_id: &str, days: i64, limit: i64) -> Result<Vec<IndicatorHistory>> {
        let cutoff = (Utc::now() - chrono::Duration::days(days)).to_rfc3339();
        let rows = sqlx::query_as::<_, IndicatorHistoryRow>(
            "SELECT * FROM indicator_history WHERE indicator_id = ? AND date >= ? \
             ORDER BY date DESC LIMIT ?",
        )
        .bind(indicator_id)
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_indicator_history).collect())
    }
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn insert(&self, event: &Event) -> Result<()>;
    async fn find_by_hash(&self, hash: &str) -> Result<Option<Event>>;
    async fn get_recent_titles(&self, source: Option<&str>, days: i64) -> Result<Vec<String>>;
    async fn get_active_events(&self, max_age_days: i64) -> Result<Vec<Event>>;
    #[allow(clippy::too_many_arguments)]
    async fn update_scores(
        &self,
        id: &str,
        current_score: f64,
        decay_factor: f64,
        boost_factor: f64,
        display_section: DisplaySection,
        hot_topic: bool,
        last_ranked_at: DateTime<Utc>,
    ) -> Result<()>;
    async fn get_by_section(&self, section: DisplaySection, limit: i64, offset: i64) -> Result<Vec<Event>>;
}

pub struct SqliteEventRepository {
    pool: Pool<Sqlite>,
}

impl SqliteEventRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventRepository for SqliteEventRepository {
    async fn insert(&self, event: &Event) -> Result<()> {
        let linked_indicators = serde_json::to_string(&event.linked_indicators)?;
        let score_factors = serde_json::to_string(&event.score_factors)?;

        sqlx::query(
            "INSERT INTO events \
             (id, hash, title, summary, content, source, source_url, published_at, run_date, \
              is_market_relevant, category, region, linked_indicators, base_score, score_factors, \
              current_score, decay_factor, boost_factor, display_section, hot_topic, is_follow_up, \
              last_ranked_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.id)
        .bind(&event.hash)
        .bind(&event.title)
        .bind(&event.summary)
        .bind(&event.content)
        .bind(&event.source)
        .bind(&event.source_url)
        .bind(event.published_at.to_rfc3339())
        .bind(event.run_date.to_rfc3339())
        .bind(event.is_market_relevant)
        .bind(&event.category)
        .bind(&event.region)
        .bind(linked_indicators)
        .bind(event.base_score)
        .bind(score_factors)
        .bind(event.current_score)
        .bind(event.decay_factor)
        .bind(event.boost_factor)
        .bind(event.display_section.as_str())
        .bind(event.hot_topic)
        .bind(event.is_follow_up)
        .bind(event.last_ranked_at.map(|ts| ts.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<Event>> {
        let row = sqlx::query_as::<_, EventRow>("SELECT * FROM events WHERE hash = ?")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(row_to_event))
    }

    async fn get_recent_titles(&self, source: Option<&str>, days: i64) -> Result<Vec<String>> {
        let cutoff = (Utc::now() - chrono::Duration::days(days)).to_rfc3339();

        let rows: Vec<(String,)> = match source {
            Some(source) => {
                sqlx::query_as(
                    "SELECT title FROM events WHERE source = ? AND published_at >= ?",
                )
                .bind(source)
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT title FROM events WHERE published_at >= ?")
                    .bind(cutoff)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(rows.into_iter().map(|(title,)| title).collect())
    }

    async fn get_active_events(&self, max_age_days: i64) -> Result<Vec<Event>> {
        let cutoff = (Utc::now() - chrono::Duration::days(max_age_days)).to_rfc3339();
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT * FROM events WHERE published_at >= ? AND display_section != 'archive'",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_event).collect())
    }

    async fn update_scores(
        &self,
        id: &str,
        current_score: f64,
        decay_factor: f64,
        boost_factor: f64,
        display_section: DisplaySection,
        hot_topic: bool,
        last_ranked_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE events SET current_score = ?, decay_factor = ?, boost_factor = ?, \
             display_section = ?, hot_topic = ?, last_ranked_at = ? WHERE id = ?",
        )
        .bind(current_score)
        .bind(decay_factor)
        .bind(boost_factor)
        .bind(display_section.as_str())
        .bind(hot_topic)
        .bind(last_ranked_at.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_section(&self, section: DisplaySection, limit: i64, offset: i64) -> Result<Vec<Event>> {
        let order_by = match section {
            DisplaySection::KeyEvents => "current_score DESC",
            _ => "published_at DESC",
        };
        let query = format!(
            "SELECT * FROM events WHERE display_section = ? ORDER BY {order_by} LIMIT ? OFFSET ?"
        );

        let rows = sqlx::query_as::<_, EventRow>(&query)
            .bind(section.as_str())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(row_to_event).collect())
    }
}

/// 0..1 row per event, written alongside the event during Stage 2
/// persistence when the scorer's `causal_analysis` output matched a
/// template or produced a reasoning chain.
#[async_trait]
pub trait CausalAnalysisRepository: Send + Sync {
    async fn upsert(&self, analysis: &CausalAnalysis) -> Result<()>;
    async fn get(&self, event_id: &str) -> Result<Option<CausalAnalysis>>;
}

pub struct SqliteCausalAnalysisRepository {
    pool: Pool<Sqlite>,
}

impl SqliteCausalAnalysisRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CausalAnalysisRepository for SqliteCausalAnalysisRepository {
    async fn upsert(&self, analysis: &CausalAnalysis) -> Result<()> {
        let chain = serde_json::to_string(&analysis.chain)?;
        let investigation_prompts = serde_json::to_string(&analysis.investigation_prompts)?;
        let affected_indicators = serde_json::to_string(&analysis.affected_indicators)?;

        sqlx::query(
            "INSERT INTO causal_analysis \
             (event_id, matched_template_id, chain, confidence, investigation_prompts, \
              affected_indicators, reasoning) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(event_id) DO UPDATE SET \
             matched_template_id = excluded.matched_template_id, chain = excluded.chain, \
             confidence = excluded.confidence, investigation_prompts = excluded.investigation_prompts, \
             affected_indicators = excluded.affected_indicators, reasoning = excluded.reasoning",
        )
        .bind(&analysis.event_id)
        .bind(&analysis.matched_template_id)
        .bind(chain)
        .bind(confidence_tag_str(analysis.confidence))
        .bind(investigation_prompts)
        .bind(affected_indicators)
        .bind(&analysis.reasoning)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, event_id: &str) -> Result<Option<CausalAnalysis>> {
        let row = sqlx::query_as::<_, CausalAnalysisRow>(
            "SELECT * FROM causal_analysis WHERE event_id = ?",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_causal_analysis))
    }
}

#[async_trait]
pub trait SignalRepository: Send + Sync {
    async fn insert(&self, signal: &Signal) -> Result<()>;
    async fn get_active(&self) -> Result<Vec<Signal>>;
    async fn get_by_status(&self, status: SignalStatus) -> Result<Vec<Signal>>;
    async fn get_expired_unverified(&self) -> Result<Vec<Signal>>;
    async fn verify(&self, id: &str, status: SignalStatus, actual_value: Option<f64>) -> Result<()>;
    async fn get_accuracy_stats(
        &self,
        days: i64,
        confidence: Option<SignalConfidence>,
        indicator: Option<&str>,
    ) -> Result<Vec<SignalAccuracyStats>>;
}

pub struct SqliteSignalRepository {
    pool: Pool<Sqlite>,
}

impl SqliteSignalRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

fn status_str(status: SignalStatus) -> &'static str {
    match status {
        SignalStatus::Active => "active",
        SignalStatus::VerifiedCorrect => "verified_correct",
        SignalStatus::VerifiedWrong => "verified_wrong",
        SignalStatus::Expired => "expired",
    }
}

fn confidence_str(confidence: SignalConfidence) -> &'static str {
    match confidence {
        SignalConfidence::High => "high",
        SignalConfidence::Medium => "medium",
        SignalConfidence::Low => "low",
    }
}

#[async_trait]
impl SignalRepository for SqliteSignalRepository {
    async fn insert(&self, signal: &Signal) -> Result<()> {
        let source_event_ids = serde_json::to_string(&signal.source_event_ids)?;

        sqlx::query(
            "INSERT INTO signals \
             (id, prediction, direction, target_indicator, target_range_low, target_range_high, \
              confidence, timeframe_days, expires_at, source_event_ids, source_event_id, reasoning, \
              status, actual_value, verified_at, accuracy_notes, theme_id, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&signal.id)
        .bind(&signal.prediction)
        .bind(signal.direction.map(trend_str))
        .bind(&signal.target_indicator)
        .bind(signal.target_range_low)
        .bind(signal.target_range_high)
        .bind(confidence_str(signal.confidence))
        .bind(signal.timeframe_days)
        .bind(signal.expires_at.map(|ts| ts.to_rfc3339()))
        .bind(source_event_ids)
        .bind(&signal.source_event_id)
        .bind(&signal.reasoning)
        .bind(status_str(signal.status))
        .bind(signal.actual_value)
        .bind(signal.verified_at.map(|ts| ts.to_rfc3339()))
        .bind(&signal.accuracy_notes)
        .bind(&signal.theme_id)
        .bind(signal.created_at.to_rfc3339())
        .bind(signal.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_active(&self) -> Result<Vec<Signal>> {
        let rows = sqlx::query_as::<_, SignalRow>("SELECT * FROM signals WHERE status = 'active'")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(row_to_signal).collect())
    }

    async fn get_by_status(&self, status: SignalStatus) -> Result<Vec<Signal>> {
        let rows = sqlx::query_as::<_, SignalRow>("SELECT * FROM signals WHERE status = ?")
            .bind(status_str(status))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(row_to_signal).collect())
    }

    async fn get_expired_unverified(&self) -> Result<Vec<Signal>> {
        let now = Utc::now().to_rfc3339();
        let rows = sqlx::query_as::<_, SignalRow>(
            "SELECT * FROM signals WHERE status = 'active' AND expires_at IS NOT NULL AND expires_at < ?",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_signal).collect())
    }

    async fn verify(&self, id: &str, status: SignalStatus, actual_value: Option<f64>) -> Result<()> {
        if !matches!(status, SignalStatus::VerifiedCorrect | SignalStatus::VerifiedWrong) {
            return Err(MarketIntelError::validation(
                "verify() requires a verified_correct or verified_wrong status",
            ));
        }

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE signals SET status = ?, actual_value = ?, verified_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status_str(status))
        .bind(actual_value)
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_accuracy_stats(
        &self,
        days: i64,
        confidence: Option<SignalConfidence>,
        indicator: Option<&str>,
    ) -> Result<Vec<SignalAccuracyStats>> {
        let cutoff = (Utc::now() - chrono::Duration::days(days)).to_rfc3339();

        let mut query = String::from(
            "SELECT confidence, target_indicator, status FROM signals \
             WHERE verified_at IS NOT NULL AND verified_at >= ?",
        );
        if confidence.is_some() {
            query.push_str(" AND confidence = ?");
        }
        if indicator.is_some() {
            query.push_str(" AND target_indicator = ?");
        }

        let mut q = sqlx::query_as::<_, (String, Option<String>, String)>(&query).bind(cutoff);
        if let Some(confidence) = confidence {
            q = q.bind(confidence_str(confidence));
        }
        if let Some(indicator) = indicator {
            q = q.bind(indicator);
        }

        let rows = q.fetch_all(&self.pool).await?;

        use std::collections::HashMap;
        let mut buckets: HashMap<(String, Option<String>), (u64, u64)> = HashMap::new();
        for (conf, indicator, status) in rows {
            let entry = buckets.entry((conf, indicator)).or_insert((0, 0));
            entry.0 += 1;
            if status == "verified_correct" {
                entry.1 += 1;
            }
        }

        Ok(buckets
            .into_iter()
            .map(|((conf, indicator), (verified, correct))| {
                let confidence = match conf.as_str() {
                    "high" => SignalConfidence::High,
                    "low" => SignalConfidence::Low,
                    _ => SignalConfidence::Medium,
                };
                SignalAccuracyStats::compute(confidence, indicator, verified, correct)
            })
            .collect())
    }
}

#[async_trait]
pub trait ThemeRepository: Send + Sync {
    async fn upsert(&self, theme: &Theme) -> Result<()>;
    async fn get_active_and_emerging(&self, limit: i64) -> Result<Vec<Theme>>;
    async fn update_strength(
        &self,
        id: &str,
        strength: f64,
        peak_strength: Option<f64>,
        status: Option<ThemeStatus>,
    ) -> Result<()>;
}

pub struct SqliteThemeRepository {
    pool: Pool<Sqlite>,
}

impl SqliteThemeRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

fn theme_status_str(status: ThemeStatus) -> &'static str {
    match status {
        ThemeStatus::Emerging => "emerging",
        ThemeStatus::Active => "active",
        ThemeStatus::Fading => "fading",
        ThemeStatus::Archived => "archived",
    }
}

#[async_trait]
impl ThemeRepository for SqliteThemeRepository {
    async fn upsert(&self, theme: &Theme) -> Result<()> {
        sqlx::query(
            "INSERT INTO themes (id, name, name_vi, description, strength, peak_strength, status, \
             first_seen_at, last_seen_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
             name = excluded.name, name_vi = excluded.name_vi, description = excluded.description, \
             strength = excluded.strength, peak_strength = excluded.peak_strength, \
             status = excluded.status, last_seen_at = excluded.last_seen_at",
        )
        .bind(&theme.id)
        .bind(&theme.name)
        .bind(&theme.name_vi)
        .bind(&theme.description)
        .bind(theme.strength)
        .bind(theme.peak_strength)
        .bind(theme_status_str(theme.status))
        .bind(theme.first_seen_at.to_rfc3339())
        .bind(theme.last_seen_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_active_and_emerging(&self, limit: i64) -> Result<Vec<Theme>> {
        let rows = sqlx::query_as::<_, ThemeRow>(
            "SELECT * FROM themes WHERE status IN ('active', 'emerging') \
             ORDER BY strength DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_theme).collect())
    }

    async fn update_strength(
        &self,
        id: &str,
        strength: f64,
        peak_strength: Option<f64>,
        status: Option<ThemeStatus>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let strength = strength.max(0.0);

        if let Some(peak_strength) = peak_strength {
            sqlx::query(
                "UPDATE themes SET strength = ?, peak_strength = MAX(peak_strength, ?), last_seen_at = ? WHERE id = ?",
            )
            .bind(strength)
            .bind(peak_strength)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                "UPDATE themes SET strength = ?, peak_strength = MAX(peak_strength, ?), last_seen_at = ? WHERE id = ?",
            )
            .bind(strength)
            .bind(strength)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        }

        if let Some(status) = status {
            sqlx::query("UPDATE themes SET status = ? WHERE id = ?")
                .bind(theme_status_str(status))
                .bind(id)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }
}

#[async_trait]
pub trait WatchlistRepository: Send + Sync {
    async fn insert(&self, watchlist: &Watchlist) -> Result<()>;
    async fn get_active(&self) -> Result<Vec<Watchlist>>;
    async fn get_triggered(&self) -> Result<Vec<Watchlist>>;
}

pub struct SqliteWatchlistRepository {
    pool: Pool<Sqlite>,
}

impl SqliteWatchlistRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

fn watch_type_str(watch_type: crate::domain::WatchlistType) -> &'static str {
    use crate::domain::WatchlistType;
    match watch_type {
        WatchlistType::Date => "date",
        WatchlistType::Indicator => "indicator",
        WatchlistType::Keyword => "keyword",
    }
}

fn watch_status_str(status: WatchlistStatus) -> &'static str {
    match status {
        WatchlistStatus::Watching => "watching",
        WatchlistStatus::Triggered => "triggered",
        WatchlistStatus::Dismissed => "dismissed",
    }
}

#[async_trait]
impl WatchlistRepository for SqliteWatchlistRepository {
    async fn insert(&self, watchlist: &Watchlist) -> Result<()> {
        sqlx::query(
            "INSERT INTO watchlists (id, watch_type, label, target_id, condition, trigger_date, \
             status, snoozed_until, created_at, triggered_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&watchlist.id)
        .bind(watch_type_str(watchlist.watch_type))
        .bind(&watchlist.label)
        .bind(&watchlist.target_id)
        .bind(&watchlist.condition)
        .bind(watchlist.trigger_date.map(|ts| ts.to_rfc3339()))
        .bind(watch_status_str(watchlist.status))
        .bind(watchlist.snoozed_until.map(|ts| ts.to_rfc3339()))
        .bind(watchlist.created_at.to_rfc3339())
        .bind(watchlist.triggered_at.map(|ts| ts.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_active(&self) -> Result<Vec<Watchlist>> {
        let rows = sqlx::query_as::<_, WatchlistRow>("SELECT * FROM watchlists WHERE status = 'watching'")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(row_to_watchlist).collect())
    }

    async fn get_triggered(&self) -> Result<Vec<Watchlist>> {
        let rows = sqlx::query_as::<_, WatchlistRow>("SELECT * FROM watchlists WHERE status = 'triggered'")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(row_to_watchlist).collect())
    }
}

#[async_trait]
pub trait CalendarRepository: Send + Sync {
    /// Unique-ignore by (date, event_name, country).
    async fn insert_unique(&self, record: &CalendarRecord) -> Result<bool>;
}

pub struct SqliteCalendarRepository {
    pool: Pool<Sqlite>,
}

impl SqliteCalendarRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CalendarRepository for SqliteCalendarRepository {
    async fn insert_unique(&self, record: &CalendarRecord) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO calendar_records \
             (event_name, country, date, time, importance, previous, forecast, actual) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.event_name)
        .bind(&record.country)
        .bind(record.date.to_rfc3339())
        .bind(&record.time)
        .bind(&record.importance)
        .bind(&record.previous)
        .bind(&record.forecast)
        .bind(&record.actual)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
pub trait RunHistoryRepository: Send + Sync {
    async fn insert(&self, run: &RunHistory) -> Result<()>;
    async fn get_latest(&self) -> Result<Option<RunHistory>>;
    async fn get_recent(&self, days: i64) -> Result<Vec<RunHistory>>;
}

pub struct SqliteRunHistoryRepository {
    pool: Pool<Sqlite>,
}

impl SqliteRunHistoryRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

fn run_status_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Success => "success",
        RunStatus::Partial => "partial",
        RunStatus::Failed => "failed",
    }
}

#[async_trait]
impl RunHistoryRepository for SqliteRunHistoryRepository {
    async fn insert(&self, run: &RunHistory) -> Result<()> {
        let errors = serde_json::to_string(&run.errors)?;

        sqlx::query(
            "INSERT INTO run_history \
             (id, started_at, finished_at, status, sources_crawled, metrics_ingested, \
              events_collected, duplicates_skipped, classified_relevant, classified_irrelevant, \
              classification_errors, scored, ranked, key_events_count, summary, errors) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
             finished_at = excluded.finished_at, status = excluded.status, \
             sources_crawled = excluded.sources_crawled, metrics_ingested = excluded.metrics_ingested, \
             events_collected = excluded.events_collected, duplicates_skipped = excluded.duplicates_skipped, \
             classified_relevant = excluded.classified_relevant, \
             classified_irrelevant = excluded.classified_irrelevant, \
             classification_errors = excluded.classification_errors, scored = excluded.scored, \
             ranked = excluded.ranked, key_events_count = excluded.key_events_count, \
             summary = excluded.summary, errors = excluded.errors",
        )
        .bind(&run.id)
        .bind(run.started_at.to_rfc3339())
        .bind(run.finished_at.map(|ts| ts.to_rfc3339()))
        .bind(run_status_str(run.status))
        .bind(run.sources_crawled)
        .bind(run.metrics_ingested)
        .bind(run.events_collected)
        .bind(run.duplicates_skipped)
        .bind(run.classified_relevant)
        .bind(run.classified_irrelevant)
        .bind(run.classification_errors)
        .bind(run.scored)
        .bind(run.ranked)
        .bind(run.key_events_count)
        .bind(&run.summary)
        .bind(errors)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_latest(&self) -> Result<Option<RunHistory>> {
        let row = sqlx::query_as::<_, RunHistoryRow>(
            "SELECT * FROM run_history ORDER BY started_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_run_history))
    }

    async fn get_recent(&self, days: i64) -> Result<Vec<RunHistory>> {
        let cutoff = (Utc::now() - chrono::Duration::days(days)).to_rfc3339();
        let rows = sqlx::query_as::<_, RunHistoryRow>(
            "SELECT * FROM run_history WHERE started_at >= ? ORDER BY started_at DESC",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_run_history).collect())
    }
}

#[async_trait]
pub trait LlmCallHistoryRepository: Send + Sync {
    async fn insert(&self, call: &crate::domain::LlmCallHistory) -> Result<()>;
}

pub struct SqliteLlmCallHistoryRepository {
    pool: Pool<Sqlite>,
}

impl SqliteLlmCallHistoryRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LlmCallHistoryRepository for SqliteLlmCallHistoryRepository {
    async fn insert(&self, call: &crate::domain::LlmCallHistory) -> Result<()> {
        sqlx::query(
            "INSERT INTO llm_call_history \
             (id, timestamp, model, system_prompt, user_prompt, response, input_tokens, \
              output_tokens, total_tokens, temperature, max_tokens, latency_ms, stop_reason, \
              task_type, run_id, is_valid_json, error) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&call.id)
        .bind(call.timestamp.to_rfc3339())
        .bind(&call.model)
        .bind(&call.system_prompt)
        .bind(&call.user_prompt)
        .bind(&call.response)
        .bind(call.input_tokens)
        .bind(call.output_tokens)
        .bind(call.total_tokens)
        .bind(call.temperature as f64)
        .bind(call.max_tokens)
        .bind(call.latency_ms as i64)
        .bind(&call.stop_reason)
        .bind(&call.task_type)
        .bind(&call.run_id)
        .bind(call.is_valid_json)
        .bind(&call.error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::domain::Indicator;
    use crate::storage::database::Database;

    async fn test_db() -> Database {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            connect_timeout_secs: 5,
            run_migrations: true,
        };
        Database::connect(&config).await.unwrap()
    }

    fn test_indicator(id: &str, value: f64) -> Indicator {
        Indicator {
            id: id.to_string(),
            name: "USD/VND central rate".to_string(),
            name_vi: None,
            category: "exchange_rate".to_string(),
            unit: "VND".to_string(),
            latest_value: value,
            change: 0.0,
            change_pct: 0.0,
            trend: Trend::Stable,
            source: "sbv".to_string(),
            source_url: None,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn indicator_upsert_is_idempotent_by_id() {
        let db = test_db().await;
        let repo = SqliteIndicatorRepository::new(db.pool().clone());

        repo.upsert(&test_indicator("usd_vnd_central", 25067.0)).await.unwrap();
        repo.upsert(&test_indicator("usd_vnd_central", 25100.0)).await.unwrap();

        let indicator = repo.get("usd_vnd_central").await.unwrap().unwrap();
        assert_eq!(indicator.latest_value, 25100.0);

        let all = repo.get_all_grouped().await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn indicator_history_add_history_dedups_same_day_same_value() {
        let db = test_db().await;
        let indicator_repo = SqliteIndicatorRepository::new(db.pool().clone());
        indicator_repo.upsert(&test_indicator("usd_vnd_central", 25067.0)).await.unwrap();

        let history_repo = SqliteIndicatorHistoryRepository::new(db.pool().clone());
        let date = Utc::now();

        let first = history_repo
            .add_history("usd_vnd_central", 25067.0, date, "sbv", None)
            .await
            .unwrap();
        assert!(first.is_some());

        let second = history_repo
            .add_history("usd_vnd_central", 25067.0, date, "sbv", None)
            .await
            .unwrap();
        assert!(second.is_none());

        let history = history_repo.get_history("usd_vnd_central", 7, 10).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn event_find_by_hash_detects_duplicates() {
        let db = test_db().await;
        let repo = SqliteEventRepository::new(db.pool().clone());

        let event = Event::new("Title", "sbv", "https://sbv.gov.vn/a", Utc::now(), "content body");
        repo.insert(&event).await.unwrap();

        let found = repo.find_by_hash(&event.hash).await.unwrap();
        assert!(found.is_some());

        let not_found = repo.find_by_hash("nonexistent").await.unwrap();
        assert!(not_found.is_none());
    }

    #[tokio::test]
    async fn event_get_recent_titles_filters_by_window() {
        let db = test_db().await;
        let repo = SqliteEventRepository::new(db.pool().clone());

        let recent = Event::new("Recent", "sbv", "https://sbv.gov.vn/a", Utc::now(), "c1");
        let old = Event::new(
            "Old",
            "sbv",
            "https://sbv.gov.vn/b",
            Utc::now() - chrono::Duration::days(30),
            "c2",
        );
        repo.insert(&recent).await.unwrap();
        repo.insert(&old).await.unwrap();

        let titles = repo.get_recent_titles(Some("sbv"), 7).await.unwrap();
        assert!(titles.contains(&"Recent".to_string()));
        assert!(!titles.contains(&"Old".to_string()));
    }

    #[tokio::test]
    async fn event_update_scores_persists_ranking_output() {
        let db = test_db().await;
        let repo = SqliteEventRepository::new(db.pool().clone());

        let event = Event::new("Title", "sbv", "https://sbv.gov.vn/a", Utc::now(), "content");
        repo.insert(&event).await.unwrap();

        repo.update_scores(
            &event.id,
            80.0,
            1.0,
            1.0,
            DisplaySection::KeyEvents,
            false,
            Utc::now(),
        )
        .await
        .unwrap();

        let updated = repo.find_by_hash(&event.hash).await.unwrap().unwrap();
        assert_eq!(updated.current_score, 80.0);
        assert_eq!(updated.display_section, DisplaySection::KeyEvents);
    }

    #[tokio::test]
    async fn calendar_insert_unique_ignores_duplicates() {
        let db = test_db().await;
        let repo = SqliteCalendarRepository::new(db.pool().clone());

        let record = CalendarRecord {
            event_name: "FOMC Rate Decision".to_string(),
            country: "US".to_string(),
            date: Utc::now(),
            time: Some("14:00".to_string()),
            importance: "high".to_string(),
            previous: None,
            forecast: None,
            actual: None,
        };

        assert!(repo.insert_unique(&record).await.unwrap());
        assert!(!repo.insert_unique(&record).await.unwrap());
    }

    #[tokio::test]
    async fn signal_verify_rejects_non_terminal_status() {
        let db = test_db().await;
        let repo = SqliteSignalRepository::new(db.pool().clone());

        let signal = Signal {
            id: "s1".to_string(),
            prediction: "USD/VND breaks 25500".to_string(),
            direction: Some(Trend::Up),
            target_indicator: Some("usd_vnd_central".to_string()),
            target_range_low: None,
            target_range_high: None,
            confidence: SignalConfidence::Medium,
            timeframe_days: Some(30),
            expires_at: Some(Utc::now() + chrono::Duration::days(30)),
            source_event_ids: vec![],
            source_event_id: None,
            reasoning: None,
            status: SignalStatus::Active,
            actual_value: None,
            verified_at: None,
            accuracy_notes: None,
            theme_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        repo.insert(&signal).await.unwrap();

        let err = repo.verify("s1", SignalStatus::Active, None).await;
        assert!(err.is_err());

        repo.verify("s1", SignalStatus::VerifiedCorrect, Some(25600.0)).await.unwrap();
        let verified = repo.get_by_status(SignalStatus::VerifiedCorrect).await.unwrap();
        assert_eq!(verified.len(), 1);
        assert!(verified[0].verified_at.is_some());
    }
}
