use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The canonical time-series kinds a source adapter can emit. Closed by
/// design: adapters must map source-specific labels onto one of these
/// before a record crosses the Transform boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    ExchangeRate,
    InterbankRate,
    PolicyRate,
    GoldPrice,
    Cpi,
    Omo,
    Credit,
    Index,
    BondYield,
    Commodity,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::ExchangeRate => "exchange_rate",
            MetricType::InterbankRate => "interbank_rate",
            MetricType::PolicyRate => "policy_rate",
            MetricType::GoldPrice => "gold_price",
            MetricType::Cpi => "cpi",
            MetricType::Omo => "omo",
            MetricType::Credit => "credit",
            MetricType::Index => "index",
            MetricType::BondYield => "bond_yield",
            MetricType::Commodity => "commodity",
        }
    }
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The canonical document kinds a source adapter can emit for the news
/// side of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    News,
    PressRelease,
    Circular,
    Announcement,
    LegalDocument,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::News => "news",
            EventType::PressRelease => "press_release",
            EventType::Circular => "circular",
            EventType::Announcement => "announcement",
            EventType::LegalDocument => "legal_document",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trend direction for an indicator's latest value relative to its
/// previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

/// A single canonical time-series datum, as emitted by a source
/// adapter's Transform step. `attributes` is an open map for per-type
/// side data (e.g. OMO per-term breakdown, trading volume).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRecord {
    pub metric_type: MetricType,
    pub metric_id: String,
    pub name: String,
    pub name_vi: Option<String>,
    pub category: String,
    pub value: f64,
    pub unit: String,
    pub date: DateTime<Utc>,
    pub attributes: serde_json::Value,
    pub source: String,
    pub source_url: Option<String>,
}

impl MetricRecord {
    pub fn new(
        metric_type: MetricType,
        metric_id: impl Into<String>,
        name: impl Into<String>,
        value: f64,
        date: DateTime<Utc>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            metric_type,
            metric_id: metric_id.into(),
            name: name.into(),
            name_vi: None,
            category: metric_type.as_str().to_string(),
            value,
            unit: String::new(),
            date,
            attributes: serde_json::Value::Object(Default::default()),
            source: source.into(),
            source_url: None,
        }
    }

    pub fn with_name_vi(mut self, name_vi: impl Into<String>) -> Self {
        self.name_vi = Some(name_vi.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_attributes(mut self, attributes: serde_json::Value) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }
}

/// A raw attachment (typically a PDF) discovered alongside a news/document
/// item, prior to content extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// A news or document item as produced by Transform, before Stage 1-3
/// analysis is attached. This is the pre-pipeline shape; `Event` (in
/// `domain::event`) is the post-pipeline persisted shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_type: EventType,
    pub title: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub source: String,
    pub source_url: String,
    pub published_at: DateTime<Utc>,
    pub attachments: Vec<Attachment>,
    pub attachment_texts: Vec<(String, String)>,
}

impl EventRecord {
    pub fn new(
        event_type: EventType,
        title: impl Into<String>,
        source: impl Into<String>,
        source_url: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type,
            title: title.into(),
            summary: None,
            content: None,
            source: source.into(),
            source_url: source_url.into(),
            published_at,
            attachments: Vec::new(),
            attachment_texts: Vec::new(),
        }
    }
}

/// A scheduled economic-calendar entry. Unique by (date, event_name, country).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarRecord {
    pub event_name: String,
    pub country: String,
    pub date: DateTime<Utc>,
    pub time: Option<String>,
    pub importance: String,
    pub previous: Option<String>,
    pub forecast: Option<String>,
    pub actual: Option<String>,
}

/// The canonical output of one adapter's `Run` operation: the only data
/// shape allowed to cross the adapter/orchestrator boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerOutput {
    pub source: String,
    pub crawled_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub stats: HashMap<String, serde_json::Value>,
    pub metrics: Vec<MetricRecord>,
    pub events: Vec<EventRecord>,
    pub calendar: Vec<CalendarRecord>,
}

impl CrawlerOutput {
    pub fn empty(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            crawled_at: Utc::now(),
            success: true,
            error: None,
            stats: HashMap::new(),
            metrics: Vec::new(),
            events: Vec::new(),
            calendar: Vec::new(),
        }
    }

    pub fn failed(source: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::empty(source)
        }
    }

    pub fn stat(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.stats.insert(key.to_string(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_type_round_trips_through_str() {
        for mt in [
            MetricType::ExchangeRate,
            MetricType::InterbankRate,
            MetricType::PolicyRate,
            MetricType::GoldPrice,
            MetricType::Cpi,
            MetricType::Omo,
            MetricType::Credit,
            MetricType::Index,
            MetricType::BondYield,
            MetricType::Commodity,
        ] {
            assert_eq!(mt.to_string(), mt.as_str());
        }
    }

    #[test]
    fn crawler_output_empty_is_success() {
        let out = CrawlerOutput::empty("sbv");
        assert!(out.success);
        assert!(out.error.is_none());
        assert!(out.metrics.is_empty());
    }

    #[test]
    fn crawler_output_failed_carries_error() {
        let out = CrawlerOutput::failed("sbv", "connection refused");
        assert!(!out.success);
        assert_eq!(out.error.as_deref(), Some("connection refused"));
    }
}
