//! A generic news-aggregator adapter: scrapes an index page for article
//! links, pulls the full body via the content extractor, and emits
//! `EventRecord`s only — no time-series metrics, no PDF attachments.
//! One instance covers one outlet (e.g. vnexpress, vneconomy,
//! vietcombank's market-commentary page); multiple instances are wired
//! up by the orchestrator, one per configured outlet.

use std::time::Duration;

use async_trait::async_trait;
use marketintel_core::domain::{CrawlerOutput, EventRecord, EventType};
use marketintel_core::Result;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::json;

use crate::adapter::{RawBundle, RawItem, SourceAdapter};
use crate::extractor::ContentExtractor;
use crate::ratelimit::RateLimiter;
use crate::text::parse_vn_datetime;

/// Published-date regex matching the `dd/mm/yyyy[, HH:MM]` byline
/// format common to Vietnamese financial news outlets.
fn byline_date_re() -> &'static Regex {
    static RE: once_cell::sync::OnceCell<Regex> = once_cell::sync::OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,2}/\d{1,2}/\d{4})(?:,?\s*(\d{1,2}:\d{2}))?").expect("static regex"))
}

pub struct NewsAdapter {
    client: Client,
    index_url: String,
    source_name: String,
    item_selector: String,
    rate_limiter: RateLimiter,
    extractor: ContentExtractor,
}

impl NewsAdapter {
    pub fn new(source_name: impl Into<String>, index_url: impl Into<String>, item_selector: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .user_agent("marketintel-adapters/0.1")
                .build()
                .expect("reqwest client config is valid"),
            index_url: index_url.into(),
            source_name: source_name.into(),
            item_selector: item_selector.into(),
            rate_limiter: RateLimiter::default(),
            extractor: ContentExtractor::new(),
        }
    }

    fn parse_published_at(&self, summary_html: &str) -> chrono::DateTime<chrono::Utc> {
        byline_date_re()
            .captures(summary_html)
            .and_then(|caps| {
                let date_part = caps.get(1)?.as_str();
                let time_part = caps.get(2).map(|m| m.as_str()).unwrap_or("00:00");
                parse_vn_datetime(&format!("{date_part} {time_part}"))
            })
            .unwrap_or_else(chrono::Utc::now)
    }
}

#[async_trait]
impl SourceAdapter for NewsAdapter {
    fn name(&self) -> &str {
        &self.source_name
    }

    async fn fetch(&self) -> Result<RawBundle> {
        self.rate_limiter.wait().await;

        let resp = self
            .client
            .get(&self.index_url)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| marketintel_core::MarketIntelError::adapter(self.name(), e.to_string()))?;
        let html = resp
            .text()
            .await
            .map_err(|e| marketintel_core::MarketIntelError::adapter(self.name(), e.to_string()))?;

        let document = Html::parse_document(&html);
        let selector = Selector::parse(&self.item_selector)
            .map_err(|e| marketintel_core::MarketIntelError::adapter(self.name(), format!("bad selector: {e:?}")))?;

        let mut bundle = RawBundle::new();
        for el in document.select(&selector) {
            let Some(href) = el.value().attr("href") else { continue };
            let title = el.text().collect::<String>().trim().to_string();
            if title.is_empty() {
                continue;
            }
            let summary_html = el.html();
            let published_at = self.parse_published_at(&summary_html);

            bundle.push(RawItem::document(
                "news",
                title,
                href.to_string(),
                json!({ "published_at": published_at.to_rfc3339() }),
            ));
        }
        Ok(bundle)
    }

    fn transform(&self, raw: RawBundle) -> CrawlerOutput {
        let mut output = CrawlerOutput::empty(self.name());

        for item in raw.items {
            let Some(title) = item.title.clone() else { continue };
            let Some(url) = item.url.clone() else { continue };
            let published_at = item
                .data
                .get("published_at")
                .and_then(|v| v.as_str())
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&chrono::Utc))
                .unwrap_or_else(chrono::Utc::now);

            let mut record = EventRecord::new(EventType::News, title, self.name(), url, published_at);
            record.content = item.content.clone();
            output.events.push(record);
        }

        output.stat("events_count", output.events.len() as u64);
        output
    }

    fn extractor(&self) -> &ContentExtractor {
        &self.extractor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_byline_date_with_time() {
        let adapter = NewsAdapter::new("vnexpress", "http://x", "a");
        let dt = adapter.parse_published_at("Thứ Hai, 27/7/2026, 09:15");
        assert_eq!(dt.format("%d/%m/%Y %H:%M").to_string(), "27/07/2026 09:15");
    }

    #[test]
    fn falls_back_to_now_when_no_byline_present() {
        let adapter = NewsAdapter::new("vnexpress", "http://x", "a");
        let before = chrono::Utc::now();
        let dt = adapter.parse_published_at("no date here");
        assert!(dt >= before);
    }

    #[test]
    fn transform_carries_extracted_content_into_event() {
        let adapter = NewsAdapter::new("vnexpress", "http://x", "a");
        let mut bundle = RawBundle::new();
        let mut item = RawItem::document("news", "Tiêu đề", "http://x/1", json!({}));
        item.content = Some("Nội dung bài viết".to_string());
        bundle.push(item);

        let output = adapter.transform(bundle);
        assert_eq!(output.events.len(), 1);
        assert_eq!(output.events[0].content.as_deref(), Some("Nội dung bài viết"));
    }
}
