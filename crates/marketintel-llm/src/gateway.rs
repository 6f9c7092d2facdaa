//! The LLM Gateway: a uniform `generate`/`chat` interface over a remote
//! OpenAI-compatible chat-completions endpoint, plus fire-and-forget call
//! logging.
//!
//! Grounded on `original_source/backend/llm/base.py`'s `LLMClient`, with
//! two deliberate departures: the ambient `contextvars`-based
//! task-type/run-id pair becomes an explicit [`CallContext`] argument on
//! every call, and the original's raw background-thread-plus-fresh-
//! event-loop log writer becomes a bounded channel drained by one
//! detached task, dropping (and counting) records rather than blocking
//! the caller when the queue is full.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use marketintel_core::domain::LlmCallHistory;
use marketintel_core::storage::LlmCallHistoryRepository;
use marketintel_core::{MarketIntelError, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

/// Call-site metadata threaded through every gateway call. Replaces the
/// original's per-thread `set_llm_context`/`get_llm_context` pair: the
/// caller passes it explicitly instead of relying on ambient state that
/// doesn't survive a task being polled on a different worker thread.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub task_type: String,
    pub run_id: String,
}

impl CallContext {
    pub fn new(task_type: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            run_id: run_id.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Standard response shape, field-for-field matching
/// `original_source`'s `LLMResponse` dataclass.
#[derive(Debug, Clone)]
pub struct Response {
    pub content: String,
    pub model: String,
    pub usage: Usage,
    pub stop_reason: Option<String>,
    pub latency_ms: u64,
}

/// The one seam every Stage 1/2 component crosses to reach an LLM.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        max_tokens: u32,
        temperature: f32,
        ctx: &CallContext,
    ) -> Result<Response>;

    async fn chat(
        &self,
        messages: &[Message],
        system: Option<&str>,
        max_tokens: u32,
        temperature: f32,
        ctx: &CallContext,
    ) -> Result<Response>;
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    model: Option<String>,
    choices: Vec<ChoiceWire>,
    usage: Option<UsageWire>,
}

#[derive(Deserialize)]
struct ChoiceWire {
    message: MessageBodyWire,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct MessageBodyWire {
    content: String,
}

#[derive(Deserialize)]
struct UsageWire {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Drains call records onto a bounded channel and persists them from a
/// single detached task, so a burst of classifier/scorer calls never
/// blocks waiting on a database write. A full queue drops the oldest
/// pending write's replacement (the newest record) and counts it; the
/// gateway's caller never sees or waits on this.
#[derive(Clone)]
pub struct CallLogger {
    tx: mpsc::Sender<LlmCallHistory>,
    dropped: Arc<AtomicU64>,
}

impl CallLogger {
    pub fn spawn(repo: Arc<dyn LlmCallHistoryRepository>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<LlmCallHistory>(capacity);
        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                if let Err(err) = repo.insert(&record).await {
                    warn!(error = %err, call_id = %record.id, "failed to persist llm call history");
                }
            }
        });
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    fn log(&self, record: LlmCallHistory) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(dropped_total = total, "llm call history queue full, dropping record");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("llm call history worker is gone, dropping record");
            }
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub struct HttpLlmGateway {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
    logger: Option<CallLogger>,
}

impl HttpLlmGateway {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
        logger: Option<CallLogger>,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("marketintel-llm/0.1")
                .build()
                .expect("reqwest client config is valid"),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout: Duration::from_secs(timeout_secs),
            logger,
        }
    }

    async fn call(
        &self,
        messages: &[Message],
        system: Option<&str>,
        max_tokens: u32,
        temperature: f32,
        ctx: &CallContext,
    ) -> Result<Response> {
        let mut wire_messages = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = system {
            wire_messages.push(WireMessage { role: "system", content: system });
        }
        for msg in messages {
            wire_messages.push(WireMessage { role: &msg.role, content: &msg.content });
        }

        let body = ChatCompletionRequest {
            model: &self.model,
            messages: wire_messages,
            max_tokens,
            temperature,
        };

        let started = Instant::now();
        let result = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let parsed = match result {
            Ok(resp) if resp.status().is_success() => resp
                .json::<ChatCompletionResponse>()
                .await
                .map_err(|e| MarketIntelError::LlmCallFailed(format!("malformed response body: {e}"))),
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                Err(MarketIntelError::LlmCallFailed(format!("status {status}: {body}")))
            }
            Err(e) => Err(MarketIntelError::from(e)),
        };

        let parsed = match parsed {
            Ok(p) => p,
            Err(err) => {
                marketintel_core::observability::LlmMetrics::record_call(&ctx.task_type, latency_ms as f64, false);
                if let Some(logger) = &self.logger {
                    logger.log(build_failure_call_record(&self.model, messages, system, max_tokens, temperature, latency_ms, ctx, &err));
                }
                return Err(err);
            }
        };
        let choice = match parsed.choices.into_iter().next() {
            Some(c) => c,
            None => {
                marketintel_core::observability::LlmMetrics::record_call(&ctx.task_type, latency_ms as f64, false);
                let err = MarketIntelError::LlmCallFailed("empty choices array".to_string());
                if let Some(logger) = &self.logger {
                    logger.log(build_failure_call_record(&self.model, messages, system, max_tokens, temperature, latency_ms, ctx, &err));
                }
                return Err(err);
            }
        };

        let response = Response {
            content: choice.message.content,
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
            usage: parsed
                .usage
                .map(|u| Usage {
                    input_tokens: u.prompt_tokens,
                    output_tokens: u.completion_tokens,
                })
                .unwrap_or_default(),
            stop_reason: choice.finish_reason,
            latency_ms,
        };

        marketintel_core::observability::LlmMetrics::record_call(&ctx.task_type, latency_ms as f64, true);

        if let Some(logger) = &self.logger {
            logger.log(build_call_record(messages, system, &response, max_tokens, temperature, ctx));
        }

        Ok(response)
    }
}

fn user_prompt_of(messages: &[Message]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

fn new_call_id() -> String {
    format!("llm_{}_{}", chrono::Utc::now().format("%Y%m%d%H%M%S"), &uuid::Uuid::new_v4().simple().to_string()[..8])
}

fn build_call_record(
    messages: &[Message],
    system: Option<&str>,
    response: &Response,
    max_tokens: u32,
    temperature: f32,
    ctx: &CallContext,
) -> LlmCallHistory {
    let is_valid_json = serde_json::from_str::<serde_json::Value>(&response.content).is_ok();

    LlmCallHistory {
        id: new_call_id(),
        timestamp: chrono::Utc::now(),
        model: response.model.clone(),
        system_prompt: system.map(|s| s.to_string()),
        user_prompt: user_prompt_of(messages),
        response: Some(response.content.clone()),
        input_tokens: Some(response.usage.input_tokens),
        output_tokens: Some(response.usage.output_tokens),
        total_tokens: Some(response.usage.total()),
        temperature,
        max_tokens: Some(max_tokens),
        latency_ms: response.latency_ms,
        stop_reason: response.stop_reason.clone(),
        task_type: ctx.task_type.clone(),
        run_id: ctx.run_id.clone(),
        is_valid_json,
        error: None,
    }
}

/// Builds the `LlmCallHistory` row for a failed call (malformed body, a
/// non-success HTTP status, or an empty choices array) — spec.md §4.5
/// and §7 item 3 require a row for failed calls too, with
/// `is_valid_json=false` and the error populated, same as a successful
/// call's row carries the response.
fn build_failure_call_record(
    model: &str,
    messages: &[Message],
    system: Option<&str>,
    max_tokens: u32,
    temperature: f32,
    latency_ms: u64,
    ctx: &CallContext,
    err: &MarketIntelError,
) -> LlmCallHistory {
    LlmCallHistory {
        id: new_call_id(),
        timestamp: chrono::Utc::now(),
        model: model.to_string(),
        system_prompt: system.map(|s| s.to_string()),
        user_prompt: user_prompt_of(messages),
        response: None,
        input_tokens: None,
        output_tokens: None,
        total_tokens: None,
        temperature,
        max_tokens: Some(max_tokens),
        latency_ms,
        stop_reason: None,
        task_type: ctx.task_type.clone(),
        run_id: ctx.run_id.clone(),
        is_valid_json: false,
        error: Some(err.to_string()),
    }
}

#[async_trait]
impl LlmGateway for HttpLlmGateway {
    async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        max_tokens: u32,
        temperature: f32,
        ctx: &CallContext,
    ) -> Result<Response> {
        self.call(&[Message::user(prompt)], system, max_tokens, temperature, ctx).await
    }

    async fn chat(
        &self,
        messages: &[Message],
        system: Option<&str>,
        max_tokens: u32,
        temperature: f32,
        ctx: &CallContext,
    ) -> Result<Response> {
        self.call(messages, system, max_tokens, temperature, ctx).await
    }
}

/// Lets an `Arc<dyn LlmGateway>` be handed directly to `Classifier`/`Scorer`,
/// which are generic over `G: LlmGateway` rather than taking a trait
/// object themselves — this is what lets the orchestrator share one
/// gateway instance across both stages.
#[async_trait]
impl LlmGateway for Arc<dyn LlmGateway> {
    async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        max_tokens: u32,
        temperature: f32,
        ctx: &CallContext,
    ) -> Result<Response> {
        (**self).generate(prompt, system, max_tokens, temperature, ctx).await
    }

    async fn chat(
        &self,
        messages: &[Message],
        system: Option<&str>,
        max_tokens: u32,
        temperature: f32,
        ctx: &CallContext,
    ) -> Result<Response> {
        (**self).chat(messages, system, max_tokens, temperature, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "model": "glm-4-test",
            "choices": [{"message": {"content": content}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 42, "completion_tokens": 7}
        })
    }

    #[tokio::test]
    async fn generate_returns_first_choice_content_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_body("hello world")))
            .mount(&server)
            .await;

        let gateway = HttpLlmGateway::new(
            format!("{}/chat/completions", server.uri()),
            "test-key",
            "glm-4-test",
            30,
            None,
        );
        let ctx = CallContext::new("test", "run-1");
        let response = gateway.generate("hi", None, 100, 0.1, &ctx).await.unwrap();

        assert_eq!(response.content, "hello world");
        assert_eq!(response.usage.input_tokens, 42);
        assert_eq!(response.usage.output_tokens, 7);
        assert_eq!(response.stop_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn non_success_status_becomes_llm_call_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .mount(&server)
            .await;

        let gateway = HttpLlmGateway::new(
            format!("{}/chat/completions", server.uri()),
            "test-key",
            "glm-4-test",
            30,
            None,
        );
        let ctx = CallContext::new("test", "run-1");
        let err = gateway.generate("hi", None, 100, 0.1, &ctx).await.unwrap_err();
        assert!(matches!(err, MarketIntelError::LlmCallFailed(_)));
    }

    #[tokio::test]
    async fn empty_choices_is_an_error_not_a_panic() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "glm-4-test",
                "choices": [],
            })))
            .mount(&server)
            .await;

        let gateway = HttpLlmGateway::new(
            format!("{}/chat/completions", server.uri()),
            "test-key",
            "glm-4-test",
            30,
            None,
        );
        let ctx = CallContext::new("test", "run-1");
        let err = gateway.generate("hi", None, 100, 0.1, &ctx).await.unwrap_err();
        assert!(matches!(err, MarketIntelError::LlmCallFailed(_)));
    }

    #[derive(Default)]
    struct RecordingRepo {
        records: std::sync::Mutex<Vec<LlmCallHistory>>,
    }

    #[async_trait]
    impl LlmCallHistoryRepository for RecordingRepo {
        async fn insert(&self, call: &LlmCallHistory) -> Result<()> {
            self.records.lock().unwrap().push(call.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn failed_call_is_logged_with_invalid_json_and_error_populated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .mount(&server)
            .await;

        let repo = Arc::new(RecordingRepo::default());
        let logger = CallLogger::spawn(repo.clone(), 8);
        let gateway = HttpLlmGateway::new(
            format!("{}/chat/completions", server.uri()),
            "test-key",
            "glm-4-test",
            30,
            Some(logger),
        );
        let ctx = CallContext::new("test", "run-1");
        let err = gateway.generate("hi", None, 100, 0.1, &ctx).await.unwrap_err();
        assert!(matches!(err, MarketIntelError::LlmCallFailed(_)));

        // give the detached logging task a chance to drain the channel.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let records = repo.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.model, "glm-4-test");
        assert!(!record.is_valid_json);
        assert!(record.error.is_some());
        assert!(record.response.is_none());
    }

    #[tokio::test]
    async fn empty_choices_failure_is_also_logged() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "glm-4-test",
                "choices": [],
            })))
            .mount(&server)
            .await;

        let repo = Arc::new(RecordingRepo::default());
        let logger = CallLogger::spawn(repo.clone(), 8);
        let gateway = HttpLlmGateway::new(
            format!("{}/chat/completions", server.uri()),
            "test-key",
            "glm-4-test",
            30,
            Some(logger),
        );
        let ctx = CallContext::new("test", "run-1");
        let err = gateway.generate("hi", None, 100, 0.1, &ctx).await.unwrap_err();
        assert!(matches!(err, MarketIntelError::LlmCallFailed(_)));

        tokio::time::sleep(Duration::from_millis(50)).await;

        let records = repo.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].is_valid_json);
        assert_eq!(records[0].error.as_deref(), Some("empty choices array"));
    }

    #[tokio::test]
    async fn call_logger_drops_records_past_capacity_instead_of_blocking() {
        struct NeverInsertsRepo;

        #[async_trait]
        impl LlmCallHistoryRepository for NeverInsertsRepo {
            async fn insert(&self, _call: &LlmCallHistory) -> Result<()> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }

        let logger = CallLogger::spawn(Arc::new(NeverInsertsRepo), 1);
        let ctx = CallContext::new("test", "run-1");
        let response = Response {
            content: "{}".to_string(),
            model: "glm-4-test".to_string(),
            usage: Usage::default(),
            stop_reason: None,
            latency_ms: 5,
        };

        for _ in 0..5 {
            logger.log(build_call_record(&[Message::user("x")], None, &response, 10, 0.1, &ctx));
        }

        assert!(logger.dropped_count() > 0);
    }
}
