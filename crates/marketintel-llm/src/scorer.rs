//! Stage 2: scoring and causal analysis for market-relevant events.
//!
//! Grounded on `original_source/backend/processor/scorer/scorer.py` and
//! `processor/scorer/context_summary.py`. Unlike the classifier, the
//! original's scorer already degrades gracefully on error rather than
//! raising, and this repository keeps that contract (§9 open question:
//! parse failures surface as a low-reliability default rather than
//! halting the pipeline) — the `reliability: "low"` sentinel inside
//! `score_factors` is this crate's addition, marking a degraded result
//! so the orchestrator and downstream consumers can tell it apart from
//! one the model actually produced.

use std::time::Duration;

use marketintel_core::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::classifier::clean_json_text;
use crate::gateway::{CallContext, LlmGateway};

const SCORING_TEMPERATURE: f32 = 0.3;
const SCORING_MAX_TOKENS: u32 = 2048;
const CONTEXT_SUMMARY_MAX_TOKENS: u32 = 800;
const CONTEXT_SUMMARY_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone)]
pub struct ClassifiedItem {
    pub title: String,
    pub content: String,
    pub source: String,
    pub date: String,
    pub category: Option<String>,
    pub linked_indicators: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalOutput {
    #[serde(default)]
    pub create_signal: bool,
    pub prediction: Option<String>,
    pub target_indicator: Option<String>,
    pub direction: Option<String>,
    pub target_range_low: Option<f64>,
    pub target_range_high: Option<f64>,
    #[serde(default = "default_confidence")]
    pub confidence: String,
    pub timeframe_days: Option<i64>,
    pub reasoning: Option<String>,
}

fn default_confidence() -> String {
    "medium".to_string()
}

impl Default for SignalOutput {
    fn default() -> Self {
        Self {
            create_signal: false,
            prediction: None,
            target_indicator: None,
            direction: None,
            target_range_low: None,
            target_range_high: None,
            confidence: default_confidence(),
            timeframe_days: None,
            reasoning: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ThemeLink {
    pub existing_theme_id: Option<String>,
    #[serde(default)]
    pub create_new_theme: bool,
    pub new_theme: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringResult {
    pub base_score: i32,
    pub score_factors: serde_json::Value,
    pub causal_analysis: serde_json::Value,
    pub signal_output: SignalOutput,
    pub theme_link: ThemeLink,
    #[serde(skip)]
    pub raw_output: String,
    #[serde(skip)]
    pub parse_error: Option<String>,
}

/// Raw JSON shape an LLM response parses into, prior to defaulting.
#[derive(Debug, Deserialize)]
struct RawScoringResponse {
    #[serde(default = "default_base_score")]
    base_score: i32,
    #[serde(default)]
    score_factors: serde_json::Value,
    #[serde(default)]
    causal_analysis: serde_json::Value,
    #[serde(default)]
    signal_output: SignalOutput,
    #[serde(default)]
    theme_link: ThemeLink,
}

fn default_base_score() -> i32 {
    50
}

pub struct Scorer<G: LlmGateway> {
    gateway: G,
    templates: serde_json::Value,
    call_max_retries: u32,
    call_retry_delay: Duration,
}

impl<G: LlmGateway> Scorer<G> {
    pub fn new(gateway: G, templates: serde_json::Value) -> Self {
        Self::with_retry_config(gateway, templates, 2, 2.0)
    }

    /// As [`Scorer::new`], but with an explicit retry budget for transient
    /// LLM *call* failures (timeout, remote error) — spec.md §7 item 4
    /// ("retried ... 2x for scorer"). Malformed-JSON responses are not
    /// retried; those default immediately per §4.7.
    pub fn with_retry_config(
        gateway: G,
        templates: serde_json::Value,
        call_max_retries: u32,
        call_retry_delay_secs: f64,
    ) -> Self {
        Self {
            gateway,
            templates,
            call_max_retries: call_max_retries.max(1),
            call_retry_delay: Duration::from_secs_f64(call_retry_delay_secs),
        }
    }

    /// Scores one classified item against the current analysis context.
    /// Never returns `Err` for an LLM/parse failure: a transient call
    /// failure is retried up to `call_max_retries` times, and once that
    /// budget is exhausted (or the response fails to parse) it degrades to
    /// [`error_result`] so one bad item doesn't halt the whole pass (the
    /// orchestrator's per-item failure isolation still applies to
    /// genuinely fatal errors like a cancelled run).
    pub async fn score(
        &self,
        item: &ClassifiedItem,
        previous_context_summary: &str,
        active_signals: &[serde_json::Value],
        active_themes: &[serde_json::Value],
        lookback_days: i64,
        ctx: &CallContext,
    ) -> ScoringResult {
        let prompt = self.scoring_prompt(item, previous_context_summary, active_signals, active_themes, lookback_days);

        let mut last_error = String::new();
        for attempt in 1..=self.call_max_retries {
            let response = self
                .gateway
                .generate(&prompt, None, SCORING_MAX_TOKENS, SCORING_TEMPERATURE, ctx)
                .await;

            match response {
                Ok(resp) => {
                    return match parse_scoring_response(&resp.content) {
                        Ok(mut result) => {
                            result.raw_output = resp.content;
                            result
                        }
                        Err(err) => {
                            warn!(error = %err, "failed to parse scoring response");
                            error_result(&err.to_string())
                        }
                    };
                }
                Err(err) => {
                    last_error = err.to_string();
                    warn!(attempt, max_retries = self.call_max_retries, error = %last_error, "llm call failed in scorer");
                    if attempt < self.call_max_retries {
                        tokio::time::sleep(self.call_retry_delay).await;
                    }
                }
            }
        }

        error_result(&last_error)
    }

    fn scoring_prompt(
        &self,
        item: &ClassifiedItem,
        previous_context_summary: &str,
        active_signals: &[serde_json::Value],
        active_themes: &[serde_json::Value],
        lookback_days: i64,
    ) -> String {
        let signals_json = if active_signals.is_empty() {
            "No active signals.".to_string()
        } else {
            serde_json::to_string_pretty(active_signals).unwrap_or_default()
        };
        let themes_json = if active_themes.is_empty() {
            "No active themes.".to_string()
        } else {
            serde_json::to_string_pretty(active_themes).unwrap_or_default()
        };
        let summary = if previous_context_summary.trim().is_empty() {
            "No previous context available."
        } else {
            previous_context_summary
        };

        format!(
            "Score the following classified news item for market significance and perform causal analysis.\n\
             Title: {}\n\
             Source: {}\n\
             Date: {}\n\
             Category: {}\n\
             Linked indicators: {:?}\n\
             Content: {}\n\n\
             Lookback window: {lookback_days} days.\n\
             Previous context summary:\n{summary}\n\n\
             Active signals:\n{signals_json}\n\n\
             Active themes:\n{themes_json}\n\n\
             Causal templates:\n{}\n\n\
             Respond with a single JSON object with keys: base_score (0-100 integer), \
             score_factors (object), causal_analysis (object with matched_template_id, chain, \
             confidence, reasoning), signal_output (object), theme_link (object).",
            item.title,
            item.source,
            item.date,
            item.category.as_deref().unwrap_or("unknown"),
            item.linked_indicators,
            item.content,
            serde_json::to_string_pretty(&self.templates).unwrap_or_default(),
        )
    }

    /// Condenses the previous run's context into a short summary for the
    /// next run's scoring prompt, grounded on
    /// `processor/scorer/context_summary.py`'s `generate_context_summary`.
    pub async fn summarize_context(&self, previous_context: &str, lookback_days: i64, ctx: &CallContext) -> String {
        if previous_context.trim().is_empty() {
            return "Đây là lần phân tích đầu tiên, chưa có context từ các lần trước.".to_string();
        }

        let prompt = format!(
            "Summarize the following prior analysis context into a concise brief \
             for use in the next scoring pass, covering the last {lookback_days} days:\n\n{previous_context}"
        );

        match self
            .gateway
            .generate(&prompt, None, CONTEXT_SUMMARY_MAX_TOKENS, CONTEXT_SUMMARY_TEMPERATURE, ctx)
            .await
        {
            Ok(resp) => resp.content,
            Err(err) => {
                warn!(error = %err, "failed to generate context summary");
                "Context summary generation failed.".to_string()
            }
        }
    }
}

fn parse_scoring_response(raw_output: &str) -> std::result::Result<ScoringResult, serde_json::Error> {
    let cleaned = clean_json_text(raw_output);
    let raw: RawScoringResponse = serde_json::from_str(&cleaned)?;
    Ok(ScoringResult {
        base_score: raw.base_score,
        score_factors: raw.score_factors,
        causal_analysis: raw.causal_analysis,
        signal_output: raw.signal_output,
        theme_link: raw.theme_link,
        raw_output: String::new(),
        parse_error: None,
    })
}

/// Balanced default result on LLM/parse failure, per this repository's
/// §9 open-question resolution: `score_factors.reliability` is set to
/// `"low"` so downstream ranking and display can flag it, but the run
/// continues rather than aborting.
fn error_result(error_msg: &str) -> ScoringResult {
    ScoringResult {
        base_score: 30,
        score_factors: serde_json::json!({
            "direct_indicator_impact": 10,
            "policy_significance": 5,
            "market_breadth": 5,
            "novelty": 5,
            "source_authority": 5,
            "reliability": "low",
        }),
        causal_analysis: serde_json::json!({
            "matched_template_id": null,
            "chain": [],
            "confidence": "uncertain",
            "reasoning": format!("Scoring error: {error_msg}"),
        }),
        signal_output: SignalOutput::default(),
        theme_link: ThemeLink::default(),
        raw_output: String::new(),
        parse_error: Some(error_msg.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{Message, Response, Usage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubGateway {
        reply: String,
        should_fail: bool,
        calls: AtomicUsize,
    }

    impl StubGateway {
        fn new(reply: impl Into<String>, should_fail: bool) -> Self {
            Self {
                reply: reply.into(),
                should_fail,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmGateway for StubGateway {
        async fn generate(
            &self,
            _prompt: &str,
            _system: Option<&str>,
            _max_tokens: u32,
            _temperature: f32,
            _ctx: &CallContext,
        ) -> Result<Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.should_fail {
                return Err(marketintel_core::MarketIntelError::LlmCallFailed("down".to_string()));
            }
            Ok(Response {
                content: self.reply.clone(),
                model: "stub".to_string(),
                usage: Usage::default(),
                stop_reason: Some("stop".to_string()),
                latency_ms: 2,
            })
        }

        async fn chat(
            &self,
            _messages: &[Message],
            _system: Option<&str>,
            _max_tokens: u32,
            _temperature: f32,
            _ctx: &CallContext,
        ) -> Result<Response> {
            unreachable!("scorer only uses generate")
        }
    }

    fn item() -> ClassifiedItem {
        ClassifiedItem {
            title: "SBV raises policy rate".to_string(),
            content: "50bps hike".to_string(),
            source: "sbv".to_string(),
            date: "2026-07-27".to_string(),
            category: Some("monetary_policy".to_string()),
            linked_indicators: vec!["policy_refinancing_rate".to_string()],
        }
    }

    #[tokio::test]
    async fn scores_successfully_and_carries_raw_output() {
        let reply = r#"{
            "base_score": 85,
            "score_factors": {"direct_indicator_impact": 30},
            "causal_analysis": {"matched_template_id": "rate_hike", "chain": ["a", "b"], "confidence": "likely", "reasoning": "direct"},
            "signal_output": {"create_signal": true, "prediction": "VND weakens", "confidence": "high"},
            "theme_link": {"create_new_theme": false}
        }"#;
        let scorer = Scorer::new(StubGateway::new(reply, false), serde_json::json!({"templates": []}));
        let ctx = CallContext::new("score", "run-1");
        let result = scorer.score(&item(), "", &[], &[], 7, &ctx).await;

        assert_eq!(result.base_score, 85);
        assert!(result.parse_error.is_none());
        assert!(result.signal_output.create_signal);
    }

    #[tokio::test]
    async fn llm_failure_retries_call_before_degrading_to_low_reliability_default() {
        let gateway = StubGateway::new(String::new(), true);
        let scorer = Scorer::with_retry_config(gateway, serde_json::json!({"templates": []}), 2, 0.01);
        let ctx = CallContext::new("score", "run-1");
        let result = scorer.score(&item(), "", &[], &[], 7, &ctx).await;

        assert_eq!(result.base_score, 30);
        assert_eq!(result.score_factors["reliability"], "low");
        assert!(result.parse_error.is_some());
        assert_eq!(scorer_calls(&scorer), 2);
    }

    #[tokio::test]
    async fn llm_call_recovers_on_retry_after_one_transient_failure() {
        let gateway = FlakyGateway {
            fail_first_n: AtomicUsize::new(1),
            reply: r#"{
                "base_score": 60,
                "score_factors": {},
                "causal_analysis": {},
                "signal_output": {"create_signal": false},
                "theme_link": {"create_new_theme": false}
            }"#
            .to_string(),
            calls: AtomicUsize::new(0),
        };
        let scorer = Scorer::with_retry_config(gateway, serde_json::json!({"templates": []}), 2, 0.01);
        let ctx = CallContext::new("score", "run-1");
        let result = scorer.score(&item(), "", &[], &[], 7, &ctx).await;

        assert_eq!(result.base_score, 60);
        assert!(result.parse_error.is_none());
    }

    #[tokio::test]
    async fn malformed_json_degrades_to_low_reliability_default_without_retrying_the_call() {
        let gateway = StubGateway::new("not json", false);
        let scorer = Scorer::new(gateway, serde_json::json!({"templates": []}));
        let ctx = CallContext::new("score", "run-1");
        let result = scorer.score(&item(), "", &[], &[], 7, &ctx).await;

        assert_eq!(result.base_score, 30);
        assert_eq!(result.score_factors["reliability"], "low");
        assert_eq!(scorer_calls(&scorer), 1);
    }

    fn scorer_calls(scorer: &Scorer<StubGateway>) -> usize {
        scorer.gateway.calls.load(Ordering::SeqCst)
    }

    struct FlakyGateway {
        fail_first_n: AtomicUsize,
        reply: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmGateway for FlakyGateway {
        async fn generate(
            &self,
            _prompt: &str,
            _system: Option<&str>,
            _max_tokens: u32,
            _temperature: f32,
            _ctx: &CallContext,
        ) -> Result<Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first_n.load(Ordering::SeqCst) > 0 {
                self.fail_first_n.fetch_sub(1, Ordering::SeqCst);
                return Err(marketintel_core::MarketIntelError::LlmCallFailed("down".to_string()));
            }
            Ok(Response {
                content: self.reply.clone(),
                model: "stub".to_string(),
                usage: Usage::default(),
                stop_reason: Some("stop".to_string()),
                latency_ms: 2,
            })
        }

        async fn chat(
            &self,
            _messages: &[Message],
            _system: Option<&str>,
            _max_tokens: u32,
            _temperature: f32,
            _ctx: &CallContext,
        ) -> Result<Response> {
            unreachable!("scorer only uses generate")
        }
    }

    #[tokio::test]
    async fn context_summary_short_circuits_when_no_previous_context() {
        let scorer = Scorer::new(StubGateway::new("unused", false), serde_json::json!({}));
        let ctx = CallContext::new("context_summary", "run-1");
        let summary = scorer.summarize_context("", 7, &ctx).await;
        assert!(summary.contains("lần phân tích đầu tiên"));
    }
}
