use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Partial,
    Failed,
}

/// One row per orchestrator pass. The `TaskResult` analogue from the
/// teacher's compliance scheduler, generalized to this pipeline's fixed
/// step sequence rather than arbitrary task types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunHistory {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub sources_crawled: u32,
    pub metrics_ingested: u32,
    pub events_collected: u32,
    pub duplicates_skipped: u32,
    pub classified_relevant: u32,
    pub classified_irrelevant: u32,
    pub classification_errors: u32,
    pub scored: u32,
    pub ranked: u32,
    pub key_events_count: u32,
    pub summary: Option<String>,
    pub errors: Vec<String>,
}

impl RunHistory {
    pub fn start(now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: now,
            finished_at: None,
            status: RunStatus::Success,
            sources_crawled: 0,
            metrics_ingested: 0,
            events_collected: 0,
            duplicates_skipped: 0,
            classified_relevant: 0,
            classified_irrelevant: 0,
            classification_errors: 0,
            scored: 0,
            ranked: 0,
            key_events_count: 0,
            summary: None,
            errors: Vec::new(),
        }
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn finish(&mut self, now: DateTime<Utc>, status: RunStatus, summary: impl Into<String>) {
        self.finished_at = Some(now);
        self.status = status;
        self.summary = Some(summary.into());
    }
}

/// Per-LLM-call audit row. Append-only. Fields beyond spec.md's listed
/// subset (`temperature`, `max_tokens`) are kept from the original's
/// `LLMCallRecord` dataclass for audit completeness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCallHistory {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub system_prompt: Option<String>,
    pub user_prompt: String,
    pub response: Option<String>,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub latency_ms: u64,
    pub stop_reason: Option<String>,
    pub task_type: String,
    pub run_id: String,
    pub is_valid_json: bool,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_history_starts_as_success() {
        let run = RunHistory::start(Utc::now());
        assert_eq!(run.status, RunStatus::Success);
        assert!(run.finished_at.is_none());
    }

    #[test]
    fn run_history_finish_sets_status_and_timestamp() {
        let mut run = RunHistory::start(Utc::now());
        run.record_error("adapter sbv timed out");
        run.finish(Utc::now(), RunStatus::Partial, "1/2 sources ok");
        assert_eq!(run.status, RunStatus::Partial);
        assert!(run.finished_at.is_some());
        assert_eq!(run.errors.len(), 1);
    }
}
