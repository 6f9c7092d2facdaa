use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Which display tier an event currently occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplaySection {
    KeyEvents,
    OtherNews,
    Archive,
}

impl DisplaySection {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplaySection::KeyEvents => "key_events",
            DisplaySection::OtherNews => "other_news",
            DisplaySection::Archive => "archive",
        }
    }
}

impl std::fmt::Display for DisplaySection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Confidence tag shared by causal analyses and signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Verified,
    Likely,
    Uncertain,
}

/// A news/document item subject to Stage 1-3 analysis. Created during a
/// run, filled synchronously by classification and scoring, and mutated
/// each pass by the ranker. Never deleted, only demoted by tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub hash: String,
    pub title: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub source: String,
    pub source_url: String,
    pub published_at: DateTime<Utc>,
    pub run_date: DateTime<Utc>,

    // Stage 1 outputs
    pub is_market_relevant: bool,
    pub category: Option<String>,
    pub region: Option<String>,
    pub linked_indicators: Vec<String>,

    // Stage 2 outputs
    pub base_score: Option<f64>,
    pub score_factors: serde_json::Value,

    // Stage 3 outputs
    pub current_score: f64,
    pub decay_factor: f64,
    pub boost_factor: f64,
    pub display_section: DisplaySection,
    pub hot_topic: bool,

    pub is_follow_up: bool,
    pub last_ranked_at: Option<DateTime<Utc>>,
}

impl Event {
    /// Content hash used for dedup: title | source | first ~200 chars of
    /// content. Deterministic given identical inputs.
    pub fn compute_hash(title: &str, source: &str, content: &str) -> String {
        let snippet: String = content.chars().take(200).collect();
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        hasher.update(b"|");
        hasher.update(source.as_bytes());
        hasher.update(b"|");
        hasher.update(snippet.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn new(
        title: impl Into<String>,
        source: impl Into<String>,
        source_url: impl Into<String>,
        published_at: DateTime<Utc>,
        content_for_hash: &str,
    ) -> Self {
        let title = title.into();
        let source = source.into();
        let hash = Self::compute_hash(&title, &source, content_for_hash);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            hash,
            title,
            summary: None,
            content: None,
            source,
            source_url: source_url.into(),
            published_at,
            run_date: Utc::now(),
            is_market_relevant: false,
            category: None,
            region: None,
            linked_indicators: Vec::new(),
            base_score: None,
            score_factors: serde_json::Value::Null,
            current_score: 0.0,
            decay_factor: 0.0,
            boost_factor: 1.0,
            display_section: DisplaySection::Archive,
            hot_topic: false,
            is_follow_up: false,
            last_ranked_at: None,
        }
    }
}

/// 0..1 per event: the Stage 2 causal explanation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CausalAnalysis {
    pub event_id: String,
    pub matched_template_id: Option<String>,
    pub chain: Vec<String>,
    pub confidence: Confidence,
    pub investigation_prompts: Vec<String>,
    pub affected_indicators: Vec<String>,
    pub reasoning: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_hash_is_deterministic() {
        let h1 = Event::compute_hash("Title", "sbv", "some content here");
        let h2 = Event::compute_hash("Title", "sbv", "some content here");
        assert_eq!(h1, h2);
    }

    #[test]
    fn compute_hash_only_uses_first_200_chars_of_content() {
        let long_tail_a = format!("{}{}", "x".repeat(200), "A-specific-tail");
        let long_tail_b = format!("{}{}", "x".repeat(200), "B-specific-tail");
        let h1 = Event::compute_hash("Title", "sbv", &long_tail_a);
        let h2 = Event::compute_hash("Title", "sbv", &long_tail_b);
        assert_eq!(h1, h2);
    }

    #[test]
    fn compute_hash_differs_on_title() {
        let h1 = Event::compute_hash("Title A", "sbv", "content");
        let h2 = Event::compute_hash("Title B", "sbv", "content");
        assert_ne!(h1, h2);
    }
}
