//! Stage 1: market-relevance classification.
//!
//! Grounded on `original_source/backend/processor/classifier/classifier.py`.
//! One deliberate departure from that original: where the Python
//! `classify()` swallows any exception into a default, non-relevant
//! result, this classifier raises [`MarketIntelError::ClassificationFailed`]
//! once its retry budget is exhausted and never returns a result — a
//! caller that gets `Ok` has a genuine LLM-backed classification, not a
//! fail-safe guess silently mixed into the same result type.

use std::time::Duration;

use marketintel_core::{MarketIntelError, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::gateway::{CallContext, LlmGateway};

const CLASSIFICATION_TEMPERATURE: f32 = 0.1;
const CLASSIFICATION_MAX_TOKENS: u32 = 1024;

/// One item awaiting classification. Field names mirror the dict shape
/// `Classifier.classify` reads from in the original.
#[derive(Debug, Clone)]
pub struct NewsItem {
    pub title: String,
    pub content: String,
    pub source: String,
    pub date: String,
}

/// Field-for-field match of `original_source`'s `ClassificationResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub is_market_relevant: bool,
    pub category: Option<String>,
    #[serde(default)]
    pub linked_indicators: Vec<String>,
    pub reasoning: String,
}

pub struct Classifier<G: LlmGateway> {
    gateway: G,
    max_retries: u32,
    retry_delay: Duration,
}

impl<G: LlmGateway> Classifier<G> {
    pub fn new(gateway: G, max_retries: u32, retry_delay_secs: f64) -> Self {
        Self {
            gateway,
            max_retries: max_retries.max(1),
            retry_delay: Duration::from_secs_f64(retry_delay_secs),
        }
    }

    /// Classifies one item, retrying up to `max_retries` times on
    /// malformed JSON by switching to a "fix_json" repair prompt that
    /// shows the model its own broken output. Raises rather than
    /// defaulting once every attempt has failed.
    pub async fn classify(&self, item: &NewsItem, ctx: &CallContext) -> Result<ClassificationResult> {
        let prompt = classification_prompt(item);
        let mut last_error: Option<String> = None;
        let mut last_raw_output: Option<String> = None;

        for attempt in 1..=self.max_retries {
            let current_prompt = match &last_raw_output {
                Some(raw) if attempt > 1 => fix_json_prompt(item, raw, last_error.as_deref().unwrap_or("unknown error")),
                _ => prompt.clone(),
            };

            let response = self
                .gateway
                .generate(&current_prompt, None, CLASSIFICATION_MAX_TOKENS, CLASSIFICATION_TEMPERATURE, ctx)
                .await;

            let raw_output = match response {
                Ok(resp) => resp.content,
                Err(err) => {
                    last_error = Some(err.to_string());
                    warn!(attempt, max_retries = self.max_retries, error = %err, "llm call failed in classifier");
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                    continue;
                }
            };

            if raw_output.trim().is_empty() {
                last_error = Some("empty response from LLM".to_string());
                warn!(attempt, "empty response from LLM in classifier");
                last_raw_output = Some(raw_output);
                if attempt < self.max_retries {
                    tokio::time::sleep(self.retry_delay).await;
                }
                continue;
            }

            match parse_classification_response(&raw_output) {
                Ok(result) => return Ok(result),
                Err(err) => {
                    last_error = Some(err.to_string());
                    last_raw_output = Some(raw_output);
                    warn!(attempt, max_retries = self.max_retries, error = %err, "classification parse error");
                    if attempt < self.max_retries {
                        info!(attempt, "retrying classification with fix_json prompt");
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(MarketIntelError::ClassificationFailed {
            attempts: self.max_retries,
            last_error: last_error.unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}

fn classification_prompt(item: &NewsItem) -> String {
    format!(
        "Classify the following Vietnamese/global macro-financial news item.\n\
         Title: {}\n\
         Source: {}\n\
         Date: {}\n\
         Content: {}\n\n\
         Respond with a single JSON object with keys: \
         is_market_relevant (bool), category (string or null), \
         linked_indicators (array of indicator ids), reasoning (string).",
        item.title, item.source, item.date, item.content
    )
}

fn fix_json_prompt(item: &NewsItem, invalid_response: &str, error_message: &str) -> String {
    format!(
        "The previous response to this task was not valid JSON and must be corrected.\n\
         Original task: Classify news: {}\n\
         Invalid response:\n{invalid_response}\n\
         Parse error: {error_message}\n\n\
         Respond again with ONLY the corrected JSON object, no markdown fences, no commentary.",
        truncate(&item.title, 100),
    )
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Strips markdown code fences and trailing commas before parsing, the
/// same cleanup `Classifier._parse_response` applies in the original.
fn parse_classification_response(raw_output: &str) -> std::result::Result<ClassificationResult, serde_json::Error> {
    let cleaned = clean_json_text(raw_output);
    serde_json::from_str(&cleaned)
}

pub(crate) fn clean_json_text(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(stripped) = text.strip_prefix("```") {
        text = stripped;
        text = text.strip_prefix("json").unwrap_or(text);
        if let Some(end) = text.rfind("```") {
            text = &text[..end];
        }
    }
    let text = text.trim();

    let no_trailing_commas = strip_trailing_commas(text);
    no_trailing_commas
}

/// Removes a trailing comma that immediately precedes a closing `}` or
/// `]`, ignoring whitespace in between.
fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                i += 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}
