//! The `SourceAdapter` trait: the one seam every data source crosses to
//! reach the rest of the pipeline.

use std::collections::HashSet;

use async_trait::async_trait;
use marketintel_core::domain::{Attachment, CrawlerOutput};
use marketintel_core::Result;
use tracing::{info, warn};

use crate::extractor::ContentExtractor;

/// One raw, untransformed datum as scraped from a source, tagged by
/// kind so `transform` can dispatch on it. Metric-bearing kinds (e.g.
/// `"exchange_rate"`, `"omo"`) carry their payload in `data`; document
/// kinds (`"news"`, `"press_release"`, `"circular"`) carry `title`/`url`
/// and, once `run` has extracted it, `content`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RawItem {
    pub kind: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub content: Option<String>,
    pub attachments: Vec<Attachment>,
    pub attachment_texts: Vec<(String, String)>,
    pub data: serde_json::Value,
}

impl RawItem {
    pub fn metric(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            title: None,
            url: None,
            content: None,
            attachments: Vec::new(),
            attachment_texts: Vec::new(),
            data,
        }
    }

    pub fn document(
        kind: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            kind: kind.into(),
            title: Some(title.into()),
            url: Some(url.into()),
            content: None,
            attachments: Vec::new(),
            attachment_texts: Vec::new(),
            data,
        }
    }

    pub fn is_document(&self) -> bool {
        self.title.is_some()
    }
}

/// Everything a `fetch()` call returned, prior to title-dedup, content
/// extraction and `transform()`.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct RawBundle {
    pub items: Vec<RawItem>,
}

impl RawBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: RawItem) {
        self.items.push(item);
    }
}

/// A source integration: fetches raw data, optionally enriches document
/// items with extracted body text, then deterministically transforms
/// everything into the canonical record types.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Talks to the network. The only method allowed to do I/O other
    /// than the content extractor this adapter drives from `run`.
    async fn fetch(&self) -> Result<RawBundle>;

    /// Pure and deterministic: maps raw tagged items onto canonical
    /// records. No I/O, no clock reads beyond what's already present in
    /// the raw data's own timestamps.
    fn transform(&self, raw: RawBundle) -> CrawlerOutput;

    /// The extractor this adapter uses to fill in `content` for
    /// document-kind raw items before transforming them.
    fn extractor(&self) -> &ContentExtractor;

    /// Orchestrates one full pass: fetch, drop documents already seen
    /// (by title), cap the number of new documents fetched, extract
    /// body text for the rest, then transform.
    async fn run(&self, max_articles: Option<usize>, existing_titles: &HashSet<String>) -> CrawlerOutput {
        let mut raw = match self.fetch().await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(adapter = self.name(), error = %err, "fetch failed");
                return CrawlerOutput::failed(self.name(), err.to_string());
            }
        };

        raw.items
            .retain(|item| !item.is_document() || !is_seen(item, existing_titles));

        if let Some(max) = max_articles {
            let mut seen_docs = 0usize;
            raw.items.retain(|item| {
                if !item.is_document() {
                    return true;
                }
                seen_docs += 1;
                seen_docs <= max
            });
        }

        for item in raw.items.iter_mut().filter(|i| i.is_document()) {
            let Some(url) = item.url.clone() else { continue };
            match self.extractor().extract(&url).await {
                Ok(text) => item.content = Some(text),
                Err(err) => {
                    warn!(adapter = self.name(), url = %url, error = %err, "content extraction failed");
                }
            }
            for attachment in item.attachments.clone() {
                match self.extractor().extract(&attachment.url).await {
                    Ok(text) => item.attachment_texts.push((attachment.url.clone(), text)),
                    Err(err) => {
                        warn!(adapter = self.name(), url = %attachment.url, error = %err, "attachment extraction failed");
                    }
                }
            }
        }

        let output = self.transform(raw);
        info!(
            adapter = self.name(),
            metrics = output.metrics.len(),
            events = output.events.len(),
            calendar = output.calendar.len(),
            "run complete"
        );
        output
    }
}

fn is_seen(item: &RawItem, existing_titles: &HashSet<String>) -> bool {
    item.title
        .as_ref()
        .map(|t| existing_titles.contains(t))
        .unwrap_or(false)
}
