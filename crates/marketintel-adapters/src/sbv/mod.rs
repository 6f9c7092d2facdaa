//! State Bank of Vietnam adapter: exchange rate, interbank/policy
//! rates, gold price, CPI, open-market-operations auctions, and
//! news/press releases/circulars, all scraped from the same site.

mod mappings;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use marketintel_core::domain::{
    Attachment, CrawlerOutput, EventRecord, EventType, MetricRecord, MetricType,
};
use marketintel_core::Result;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::json;
use tracing::warn;

use crate::adapter::{RawBundle, RawItem, SourceAdapter};
use crate::extractor::ContentExtractor;
use crate::ratelimit::RateLimiter;
use crate::text::{parse_vn_datetime_or_now, parse_vn_number};

use mappings::{gold_price_id, interbank_term_id, policy_rate_id};

const SOURCE_NAME: &str = "sbv";

pub struct SbvAdapter {
    client: Client,
    base_url: String,
    sjc_gold_url: String,
    rate_limiter: RateLimiter,
    extractor: ContentExtractor,
}

impl SbvAdapter {
    pub fn new(base_url: impl Into<String>, sjc_gold_url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .user_agent("marketintel-adapters/0.1")
                .build()
                .expect("reqwest client config is valid"),
            base_url: base_url.into(),
            sjc_gold_url: sjc_gold_url.into(),
            rate_limiter: RateLimiter::default(),
            extractor: ContentExtractor::new(),
        }
    }

    async fn get_text(&self, path: &str) -> Result<String> {
        self.rate_limiter.wait().await;
        let url = self.absolute_url(path);
        let resp = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| marketintel_core::MarketIntelError::adapter(SOURCE_NAME, e.to_string()))?;
        resp.text()
            .await
            .map_err(|e| marketintel_core::MarketIntelError::adapter(SOURCE_NAME, e.to_string()))
    }

    fn absolute_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
        }
    }

    async fn fetch_exchange_rate(&self, bundle: &mut RawBundle) {
        let Ok(html) = self.get_text("/exchange-rate").await else {
            warn!(adapter = SOURCE_NAME, "exchange rate page unavailable");
            return;
        };
        let values_re = Regex::new(r"var\s+tyGiaValues\s*=\s*\[([^\]]*)\]").expect("static regex");
        let dates_re = Regex::new(r"var\s+dates\s*=\s*\[([^\]]*)\]").expect("static regex");

        let Some(values_caps) = values_re.captures(&html) else { return };
        let Some(dates_caps) = dates_re.captures(&html) else { return };

        let values: Vec<&str> = values_caps[1].split(',').collect();
        let dates: Vec<&str> = dates_caps[1].split(',').collect();

        for (value_raw, date_raw) in values.iter().zip(dates.iter()) {
            let Some(value) = parse_vn_number(value_raw.trim_matches(|c| c == '\'' || c == '"')) else {
                continue;
            };
            let date = parse_vn_datetime_or_now(date_raw.trim_matches(|c| c == '\'' || c == '"'));
            bundle.push(RawItem::metric(
                "exchange_rate",
                json!({ "value": value, "date": date.to_rfc3339() }),
            ));
        }
    }

    async fn fetch_credit(&self, bundle: &mut RawBundle) {
        let Ok(html) = self.get_text("/credit-growth").await else { return };
        let values_re = Regex::new(r"ChartDuNoValues\s*=\s*\[([^\]]*)\]").expect("static regex");
        let labels_re = Regex::new(r"ChartDuNoLabels\s*=\s*\[([^\]]*)\]").expect("static regex");

        let Some(values_caps) = values_re.captures(&html) else { return };
        let Some(labels_caps) = labels_re.captures(&html) else { return };

        let values: Vec<&str> = values_caps[1].split(',').collect();
        let labels: Vec<&str> = labels_caps[1].split(',').collect();

        for (value_raw, label_raw) in values.iter().zip(labels.iter()) {
            let Some(value) = parse_vn_number(value_raw) else { continue };
            let label = label_raw.trim_matches(|c| c == '\'' || c == '"').to_string();
            bundle.push(RawItem::metric("credit", json!({ "value": value, "period": label })));
        }
    }

    async fn fetch_gold_price(&self, bundle: &mut RawBundle) {
        let resp = match self.client.get(&self.sjc_gold_url).send().await {
            Ok(r) => r,
            Err(_) => return,
        };
        let Ok(body) = resp.json::<serde_json::Value>().await else { return };
        let Some(rows) = body.as_array() else { return };

        for row in rows {
            let organization = row.get("organization").and_then(|v| v.as_str()).unwrap_or_default();
            if !organization.contains("SJC") {
                continue;
            }
            let gold_type = row.get("type_name").and_then(|v| v.as_str()).unwrap_or_default();
            let buy = row.get("buy").and_then(|v| v.as_f64());
            let sell = row.get("sell").and_then(|v| v.as_f64());
            bundle.push(RawItem::metric(
                "gold_price",
                json!({ "gold_type": gold_type, "buy": buy, "sell": sell }),
            ));
        }
    }

    async fn fetch_interest_rates(&self, bundle: &mut RawBundle) {
        let Ok(html) = self.get_text("/interest-rates").await else { return };
        let document = Html::parse_document(&html);
        let table_selector = Selector::parse("table.bi01-table").expect("static selector");
        let row_selector = Selector::parse("tr").expect("static selector");
        let cell_selector = Selector::parse("td").expect("static selector");

        for table in document.select(&table_selector) {
            let is_policy_table = table
                .value()
                .attr("data-kind")
                .map(|k| k == "policy")
                .unwrap_or(true);

            for row in table.select(&row_selector) {
                let cells: Vec<String> = row
                    .select(&cell_selector)
                    .map(|c| c.text().collect::<String>().trim().to_string())
                    .collect();
                if cells.len() < 2 {
                    continue;
                }
                let label = cells[0].clone();
                let Some(value) = parse_vn_number(&cells[1]) else { continue };

                if is_policy_table {
                    bundle.push(RawItem::metric("policy_rate", json!({ "rate_type": label, "value": value })));
                } else {
                    bundle.push(RawItem::metric("interbank_rate", json!({ "term": label, "value": value })));
                }
            }
        }
    }

    async fn fetch_cpi(&self, bundle: &mut RawBundle) {
        let Ok(html) = self.get_text("/cpi-news").await else { return };
        let re = Regex::new(
            r"CPI\s+tháng\s+(\d{1,2})/(\d{4})\s+(tăng|giảm)\s+([\d,]+)%",
        )
        .expect("static regex");

        for caps in re.captures_iter(&html) {
            let month = &caps[1];
            let year = &caps[2];
            let direction = &caps[3];
            let Some(magnitude) = parse_vn_number(&caps[4]) else { continue };
            let signed = if direction == "giảm" { -magnitude } else { magnitude };

            bundle.push(RawItem::metric(
                "cpi",
                json!({
                    "period": format!("{month}/{year}"),
                    "cpi_mom": signed,
                }),
            ));
        }
    }

    async fn fetch_omo(&self, bundle: &mut RawBundle) {
        let Ok(html) = self.get_text("/omo-results").await else { return };
        let document = Html::parse_document(&html);
        let row_selector = Selector::parse("tr[class^='ls01-']").expect("static selector");
        let cell_selector = Selector::parse("td").expect("static selector");

        let mut current_transaction_type = String::new();

        for row in document.select(&row_selector) {
            let is_total = row
                .value()
                .attr("class")
                .map(|c| c.contains("ls01-total"))
                .unwrap_or(false);

            let cells: Vec<String> = row
                .select(&cell_selector)
                .map(|c| c.text().collect::<String>().trim().to_string())
                .collect();
            if cells.is_empty() {
                continue;
            }

            if let Some(first) = cells.first() {
                if first.contains("Mua") || first.contains("Bán") {
                    current_transaction_type = first.clone();
                }
            }

            let Some(date) = cells.first() else { continue };
            let Some(term) = cells.get(1) else { continue };
            let Some(value) = cells.get(2).and_then(|v| parse_vn_number(v)) else { continue };

            bundle.push(RawItem::metric(
                "omo",
                json!({
                    "date": date,
                    "term": term,
                    "transaction_type": current_transaction_type,
                    "value": value,
                    "is_total": is_total,
                }),
            ));
        }
    }

    async fn fetch_news(&self, bundle: &mut RawBundle) {
        let Ok(html) = self.get_text("/news").await else { return };
        let document = Html::parse_document(&html);
        let link_selector = Selector::parse("a.news-item").expect("static selector");

        for link in document.select(&link_selector) {
            let Some(href) = link.value().attr("href") else { continue };
            let title = link.text().collect::<String>().trim().to_string();
            if title.is_empty() {
                continue;
            }
            let category = link.value().attr("data-category").unwrap_or("").to_string();

            let mut attachments = Vec::new();
            if let Some(pdf_href) = link.value().attr("data-pdf") {
                attachments.push(Attachment {
                    name: format!("{title}.pdf"),
                    url: self.absolute_url(pdf_href),
                    kind: "pdf".to_string(),
                });
            }

            let mut item = RawItem::document("news", title, self.absolute_url(href), json!({ "category": category }));
            item.attachments = attachments;
            bundle.push(item);
        }
    }
}

#[async_trait]
impl SourceAdapter for SbvAdapter {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch(&self) -> Result<RawBundle> {
        let mut bundle = RawBundle::new();
        self.fetch_exchange_rate(&mut bundle).await;
        self.fetch_credit(&mut bundle).await;
        self.fetch_gold_price(&mut bundle).await;
        self.fetch_interest_rates(&mut bundle).await;
        self.fetch_cpi(&mut bundle).await;
        self.fetch_omo(&mut bundle).await;
        self.fetch_news(&mut bundle).await;
        Ok(bundle)
    }

    fn transform(&self, raw: RawBundle) -> CrawlerOutput {
        let mut output = CrawlerOutput::empty(SOURCE_NAME);
        let mut omo_rows = Vec::new();

        for item in raw.items {
            match item.kind.as_str() {
                "exchange_rate" => transform_exchange_rate(&item, &mut output),
                "credit" => transform_credit(&item, &mut output),
                "gold_price" => transform_gold_price(&item, &mut output),
                "policy_rate" => transform_policy_rate(&item, &mut output),
                "interbank_rate" => transform_interbank_rate(&item, &mut output),
                "cpi" => transform_cpi(&item, &mut output),
                "omo" => omo_rows.push(item),
                "news" | "press_release" | "circular" => transform_news(&item, &mut output),
                other => warn!(adapter = SOURCE_NAME, kind = other, "unrecognized raw item kind"),
            }
        }

        output.metrics.extend(aggregate_omo(&omo_rows));
        output.stat("metrics_count", output.metrics.len() as u64);
        output.stat("events_count", output.events.len() as u64);
        output
    }

    fn extractor(&self) -> &ContentExtractor {
        &self.extractor
    }
}

fn transform_exchange_rate(item: &RawItem, output: &mut CrawlerOutput) {
    let Some(value) = item.data.get("value").and_then(|v| v.as_f64()) else { return };
    let date = item
        .data
        .get("date")
        .and_then(|v| v.as_str())
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&chrono::Utc))
        .unwrap_or_else(chrono::Utc::now);

    output.metrics.push(
        MetricRecord::new(MetricType::ExchangeRate, "usd_vnd_central", "USD/VND central rate", value, date, SOURCE_NAME)
            .with_name_vi("Tỷ giá trung tâm USD/VND")
            .with_unit("VND"),
    );
}

fn transform_credit(item: &RawItem, output: &mut CrawlerOutput) {
    let Some(value) = item.data.get("value").and_then(|v| v.as_f64()) else { return };
    let period = item.data.get("period").and_then(|v| v.as_str()).unwrap_or_default();
    output.metrics.push(
        MetricRecord::new(MetricType::Credit, "credit_growth", "Credit growth", value, chrono::Utc::now(), SOURCE_NAME)
            .with_name_vi("Tăng trưởng tín dụng")
            .with_unit("%")
            .with_attributes(json!({ "period": period })),
    );
}

fn transform_gold_price(item: &RawItem, output: &mut CrawlerOutput) {
    let Some(id) = gold_price_id(item.data.get("gold_type").and_then(|v| v.as_str()).unwrap_or_default()) else {
        return;
    };
    let Some(buy) = item.data.get("buy").and_then(|v| v.as_f64()) else { return };
    let sell = item.data.get("sell").and_then(|v| v.as_f64());

    output.metrics.push(
        MetricRecord::new(MetricType::GoldPrice, id, "SJC gold price (buy)", buy, chrono::Utc::now(), SOURCE_NAME)
            .with_unit("VND/lượng")
            .with_attributes(json!({ "sell": sell })),
    );
}

fn transform_policy_rate(item: &RawItem, output: &mut CrawlerOutput) {
    let rate_type = item.data.get("rate_type").and_then(|v| v.as_str()).unwrap_or_default();
    let Some(id) = policy_rate_id(rate_type) else {
        warn!(adapter = SOURCE_NAME, rate_type, "unrecognized policy rate type");
        return;
    };
    let Some(value) = item.data.get("value").and_then(|v| v.as_f64()) else { return };

    output.metrics.push(
        MetricRecord::new(MetricType::PolicyRate, id, rate_type, value, chrono::Utc::now(), SOURCE_NAME).with_unit("%"),
    );
}

fn transform_interbank_rate(item: &RawItem, output: &mut CrawlerOutput) {
    let term = item.data.get("term").and_then(|v| v.as_str()).unwrap_or_default();
    let Some(id) = interbank_term_id(term) else {
        warn!(adapter = SOURCE_NAME, term, "unrecognized interbank term");
        return;
    };
    let Some(value) = item.data.get("value").and_then(|v| v.as_f64()) else { return };

    output.metrics.push(
        MetricRecord::new(MetricType::InterbankRate, id, format!("Interbank rate ({term})"), value, chrono::Utc::now(), SOURCE_NAME)
            .with_unit("%"),
    );
}

/// A CPI release can describe month-on-month, year-on-year, year-to-date
/// and core inflation in the same announcement; emit one metric per
/// figure actually present rather than forcing all four.
fn transform_cpi(item: &RawItem, output: &mut CrawlerOutput) {
    let date = chrono::Utc::now();
    let fanout: &[(&str, &str, MetricType)] = &[
        ("cpi_mom", "CPI month-on-month", MetricType::Cpi),
        ("cpi_yoy", "CPI year-on-year", MetricType::Cpi),
        ("cpi_ytd", "CPI year-to-date", MetricType::Cpi),
        ("core_inflation", "Core inflation", MetricType::Cpi),
    ];

    for (field, name, metric_type) in fanout {
        if let Some(value) = item.data.get(*field).and_then(|v| v.as_f64()) {
            output.metrics.push(
                MetricRecord::new(*metric_type, *field, *name, value, date, SOURCE_NAME).with_unit("%"),
            );
        }
    }
}

fn transform_news(item: &RawItem, output: &mut CrawlerOutput) {
    let Some(title) = item.title.clone() else { return };
    let Some(url) = item.url.clone() else { return };
    let category = item.data.get("category").and_then(|v| v.as_str()).unwrap_or_default();

    let event_type = if category.contains("Thông cáo") {
        EventType::PressRelease
    } else if category.contains("Văn bản") {
        EventType::Circular
    } else {
        EventType::News
    };

    let mut record = EventRecord::new(event_type, title, SOURCE_NAME, url, chrono::Utc::now());
    record.content = item.content.clone();
    record.attachments = item.attachments.clone();
    record.attachment_texts = item.attachment_texts.clone();
    output.events.push(record);
}

/// Groups raw OMO rows by date, summing total inject/withdraw volume
/// and a normalized per-term breakdown, and always emits the daily net
/// even when one side of the ledger is zero.
fn aggregate_omo(rows: &[RawItem]) -> Vec<MetricRecord> {
    struct DayTotals {
        inject_total: f64,
        withdraw_total: f64,
        terms: HashMap<String, f64>,
    }

    let mut by_date: HashMap<String, DayTotals> = HashMap::new();

    for row in rows {
        let Some(date) = row.data.get("date").and_then(|v| v.as_str()) else { continue };
        let transaction_type = row.data.get("transaction_type").and_then(|v| v.as_str()).unwrap_or_default();
        let is_total = row.data.get("is_total").and_then(|v| v.as_bool()).unwrap_or(false);
        let Some(value) = row.data.get("value").and_then(|v| v.as_f64()) else { continue };

        let entry = by_date.entry(date.to_string()).or_insert_with(|| DayTotals {
            inject_total: 0.0,
            withdraw_total: 0.0,
            terms: HashMap::new(),
        });

        if is_total {
            if transaction_type.contains("Mua") {
                entry.inject_total += value;
            } else if transaction_type.contains("Bán") {
                entry.withdraw_total += value;
            }
        } else {
            let term = row.data.get("term").and_then(|v| v.as_str()).unwrap_or_default();
            let normalized = normalize_omo_term(term);
            *entry.terms.entry(normalized).or_insert(0.0) += value;
        }
    }

    let mut out = Vec::new();
    for (date, totals) in by_date {
        let Some(parsed_date) = crate::text::parse_vn_datetime(&date) else { continue };

        out.push(
            MetricRecord::new(
                MetricType::Omo,
                "omo_net_daily",
                "OMO net daily",
                totals.inject_total - totals.withdraw_total,
                parsed_date,
                SOURCE_NAME,
            )
            .with_unit("VND bn")
            .with_attributes(json!({ "terms": totals.terms })),
        );

        if totals.inject_total != 0.0 {
            out.push(MetricRecord::new(
                MetricType::Omo,
                "omo_inject_daily",
                "OMO inject daily",
                totals.inject_total,
                parsed_date,
                SOURCE_NAME,
            ));
        }
        if totals.withdraw_total != 0.0 {
            out.push(MetricRecord::new(
                MetricType::Omo,
                "omo_withdraw_daily",
                "OMO withdraw daily",
                totals.withdraw_total,
                parsed_date,
                SOURCE_NAME,
            ));
        }
    }

    out
}

fn normalize_omo_term(term: &str) -> String {
    if term.contains("28") {
        "28d".to_string()
    } else if term.contains("56") {
        "56d".to_string()
    } else if term.contains("14") {
        "14d".to_string()
    } else if term.contains('7') || term.contains("ngày") {
        "7d".to_string()
    } else {
        term.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn omo_row(date: &str, transaction_type: &str, term: &str, value: f64, is_total: bool) -> RawItem {
        RawItem::metric(
            "omo",
            json!({
                "date": date,
                "transaction_type": transaction_type,
                "term": term,
                "value": value,
                "is_total": is_total,
            }),
        )
    }

    #[test]
    fn omo_aggregation_nets_inject_and_withdraw() {
        let rows = vec![
            omo_row("2025-01-10", "Mua", "", 5000.0, true),
            omo_row("2025-01-10", "Bán", "", 2000.0, true),
            omo_row("2025-01-10", "Mua", "7 ngày", 5000.0, false),
        ];
        let metrics = aggregate_omo(&rows);

        let net = metrics.iter().find(|m| m.metric_id == "omo_net_daily").unwrap();
        assert_eq!(net.value, 3000.0);

        let inject = metrics.iter().find(|m| m.metric_id == "omo_inject_daily").unwrap();
        assert_eq!(inject.value, 5000.0);

        let withdraw = metrics.iter().find(|m| m.metric_id == "omo_withdraw_daily").unwrap();
        assert_eq!(withdraw.value, 2000.0);
    }

    #[test]
    fn omo_aggregation_skips_withdraw_metric_when_zero() {
        let rows = vec![omo_row("2025-01-11", "Mua", "", 1000.0, true)];
        let metrics = aggregate_omo(&rows);
        assert!(metrics.iter().all(|m| m.metric_id != "omo_withdraw_daily"));
        let net = metrics.iter().find(|m| m.metric_id == "omo_net_daily").unwrap();
        assert_eq!(net.value, 1000.0);
    }

    #[test]
    fn omo_term_normalization_matches_known_buckets() {
        assert_eq!(normalize_omo_term("7 ngày"), "7d");
        assert_eq!(normalize_omo_term("14 ngày"), "14d");
        assert_eq!(normalize_omo_term("28 ngày"), "28d");
        assert_eq!(normalize_omo_term("56 ngày"), "56d");
        assert_eq!(normalize_omo_term("qua đêm"), "qua đêm");
    }

    #[test]
    fn cpi_fanout_emits_only_present_fields() {
        let item = RawItem::metric(
            "cpi",
            json!({ "period": "6/2025", "cpi_mom": 0.5, "cpi_yoy": 3.2 }),
        );
        let mut output = CrawlerOutput::empty(SOURCE_NAME);
        transform_cpi(&item, &mut output);

        assert_eq!(output.metrics.len(), 2);
        assert!(output.metrics.iter().any(|m| m.metric_id == "cpi_mom" && m.value == 0.5));
        assert!(output.metrics.iter().any(|m| m.metric_id == "cpi_yoy" && m.value == 3.2));
        assert!(!output.metrics.iter().any(|m| m.metric_id == "cpi_ytd"));
    }

    #[test]
    fn news_category_maps_to_event_type() {
        let item = RawItem::document("news", "Thông cáo báo chí kỳ họp", "http://sbv/1", json!({ "category": "Thông cáo" }));
        let mut output = CrawlerOutput::empty(SOURCE_NAME);
        transform_news(&item, &mut output);
        assert_eq!(output.events[0].event_type, EventType::PressRelease);
    }

    #[test]
    fn gold_price_unknown_type_is_dropped() {
        let item = RawItem::metric("gold_price", json!({ "gold_type": "Vàng trang sức", "buy": 1.0 }));
        let mut output = CrawlerOutput::empty(SOURCE_NAME);
        transform_gold_price(&item, &mut output);
        assert!(output.metrics.is_empty());
    }
}
