use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::config::RankerConfig;
use crate::domain::DisplaySection;

/// A minimal, owned view over an `Event` plus the bits the ranker needs
/// that live on other entities (the causal analysis's matched template).
/// Kept separate from `domain::Event` so the ranker stays a pure function
/// over plain data, the way `original_source/processor/ranker/ranker.py`'s
/// `rank_event` takes a dict rather than an ORM row.
#[derive(Debug, Clone)]
pub struct RankableEvent {
    pub id: String,
    pub published_at: DateTime<Utc>,
    pub base_score: f64,
    pub linked_indicators: Vec<String>,
    pub category: Option<String>,
    pub matched_template_id: Option<String>,
    pub is_market_relevant: bool,
    pub is_follow_up: bool,
}

/// The per-event output of one ranking pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingResult {
    pub event_id: String,
    pub age_days: i64,
    pub original_score: f64,
    pub decay_factor: f64,
    pub boost_factor: f64,
    pub final_score: f64,
    pub display_section: DisplaySection,
    pub hot_topic: bool,
}

/// Per-tier counts after one `rank_all` pass, as written into the
/// `RunHistory` summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionCounts {
    pub key_events: usize,
    pub other_news: usize,
    pub archive: usize,
}

/// Stage 3: pure, synchronous, no LLM. Given the same inputs and the
/// same `today` reference it produces byte-identical outputs.
pub struct Ranker {
    config: RankerConfig,
}

impl Ranker {
    pub fn new(config: RankerConfig) -> Self {
        Self { config }
    }

    /// Piecewise decay by age in days (clamped to >= 0).
    pub fn decay_factor(age_days: i64) -> f64 {
        let age_days = age_days.max(0);
        match age_days {
            0..=1 => 1.00,
            2..=3 => 0.85,
            4..=7 => 0.60,
            8..=14 => 0.30,
            15..=30 => 0.10,
            _ => 0.00,
        }
    }

    /// Product of applicable multipliers: follow-up (x1.5), hot topic
    /// (x1.2), links >= 2 indicators (x1.1). Default 1.0 if none apply.
    pub fn boost_factor(event: &RankableEvent, hot_topics: &HashSet<String>) -> f64 {
        let mut boost = 1.0;

        if event.is_follow_up {
            boost *= 1.5;
        }

        let is_hot = event
            .category
            .as_deref()
            .map(|c| hot_topics.contains(c))
            .unwrap_or(false)
            || event
                .matched_template_id
                .as_deref()
                .map(|t| hot_topics.contains(t))
                .unwrap_or(false);
        if is_hot {
            boost *= 1.2;
        }

        if event.linked_indicators.len() >= 2 {
            boost *= 1.1;
        }

        boost
    }

    fn determine_display_section(
        &self,
        final_score: f64,
        linked_indicator_count: usize,
        age_days: i64,
        decay: f64,
        is_market_relevant: bool,
    ) -> DisplaySection {
        if !is_market_relevant || decay == 0.0 || age_days > self.config.active_event_max_age_days
        {
            return DisplaySection::Archive;
        }
        if final_score >= self.config.threshold_key_events && linked_indicator_count >= 1 {
            DisplaySection::KeyEvents
        } else if final_score >= self.config.threshold_other_news {
            DisplaySection::OtherNews
        } else {
            DisplaySection::Archive
        }
    }

    /// Ranks a single event against `today` and the current hot-topic set.
    pub fn rank_event(
        &self,
        event: &RankableEvent,
        today: DateTime<Utc>,
        hot_topics: &HashSet<String>,
    ) -> RankingResult {
        let age_days = (today.date_naive() - event.published_at.date_naive()).num_days().max(0);
        let decay = Self::decay_factor(age_days);
        let boost = Self::boost_factor(event, hot_topics);
        let final_score = round2(event.base_score * decay * boost);

        let hot_topic = event
            .category
            .as_deref()
            .map(|c| hot_topics.contains(c))
            .unwrap_or(false)
            || event
                .matched_template_id
                .as_deref()
                .map(|t| hot_topics.contains(t))
                .unwrap_or(false);

        let display_section = self.determine_display_section(
            final_score,
            event.linked_indicators.len(),
            age_days,
            decay,
            event.is_market_relevant,
        );

        RankingResult {
            event_id: event.id.clone(),
            age_days,
            original_score: event.base_score,
            decay_factor: decay,
            boost_factor: boost,
            final_score,
            display_section,
            hot_topic,
        }
    }

    /// Ranks the full active set, then enforces `max_key_events`
    /// deterministically: sort by final score descending (ties broken by
    /// most-recent `published_at`), demote overflow past the cap.
    pub fn rank_all(
        &self,
        events: &[RankableEvent],
        today: DateTime<Utc>,
        hot_topics: &HashSet<String>,
    ) -> (Vec<RankingResult>, SectionCounts) {
        let mut results: Vec<RankingResult> =
            events.iter().map(|e| self.rank_event(e, today, hot_topics)).collect();

        let published_at: HashMap<&str, DateTime<Utc>> =
            events.iter().map(|e| (e.id.as_str(), e.published_at)).collect();

        results.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let a_pub = published_at.get(a.event_id.as_str());
                    let b_pub = published_at.get(b.event_id.as_str());
                    b_pub.cmp(&a_pub)
                })
        });

        let mut key_event_seen = 0usize;
        for result in results.iter_mut() {
            if result.display_section == DisplaySection::KeyEvents {
                key_event_seen += 1;
                if key_event_seen > self.config.max_key_events {
                    result.display_section = DisplaySection::OtherNews;
                }
            }
        }

        let mut counts = SectionCounts::default();
        for result in &results {
            match result.display_section {
                DisplaySection::KeyEvents => counts.key_events += 1,
                DisplaySection::OtherNews => counts.other_news += 1,
                DisplaySection::Archive => counts.archive += 1,
            }
        }

        (results, counts)
    }

    /// Frequency-based hot-topic detection: groups the active set by
    /// `category` (skipping null/"internal") and by `matched_template_id`;
    /// any key with count >= `hot_topic_min_occurrences` within the last
    /// `hot_topic_window_days` is "hot".
    pub fn detect_hot_topics(&self, events: &[RankableEvent], today: DateTime<Utc>) -> HashSet<String> {
        let mut counts: HashMap<String, u32> = HashMap::new();

        for event in events {
            let age_days = (today.date_naive() - event.published_at.date_naive()).num_days();
            if age_days < 0 || age_days > self.config.hot_topic_window_days {
                continue;
            }

            if let Some(category) = &event.category {
                if category != "internal" {
                    *counts.entry(category.clone()).or_insert(0) += 1;
                }
            }
            if let Some(template_id) = &event.matched_template_id {
                *counts.entry(template_id.clone()).or_insert(0) += 1;
            }
        }

        counts
            .into_iter()
            .filter(|(_, count)| *count >= self.config.hot_topic_min_occurrences)
            .map(|(key, _)| key)
            .collect()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn make_event(id: &str, base_score: f64, published_at: DateTime<Utc>) -> RankableEvent {
        RankableEvent {
            id: id.to_string(),
            published_at,
            base_score,
            linked_indicators: vec!["usd_vnd_central".to_string()],
            category: None,
            matched_template_id: None,
            is_market_relevant: true,
            is_follow_up: false,
        }
    }

    #[test]
    fn decay_boundaries_match_spec_table() {
        assert_eq!(Ranker::decay_factor(0), 1.00);
        assert_eq!(Ranker::decay_factor(1), 1.00);
        assert_eq!(Ranker::decay_factor(2), 0.85);
        assert_eq!(Ranker::decay_factor(3), 0.85);
        assert_eq!(Ranker::decay_factor(4), 0.60);
        assert_eq!(Ranker::decay_factor(7), 0.60);
        assert_eq!(Ranker::decay_factor(8), 0.30);
        assert_eq!(Ranker::decay_factor(14), 0.30);
        assert_eq!(Ranker::decay_factor(15), 0.10);
        assert_eq!(Ranker::decay_factor(30), 0.10);
        assert_eq!(Ranker::decay_factor(31), 0.00);
    }

    #[test]
    fn decay_clamps_negative_age_to_zero_days() {
        assert_eq!(Ranker::decay_factor(-5), 1.00);
    }

    #[test]
    fn scenario_ranker_boundaries_key_events() {
        let ranker = Ranker::new(RankerConfig::default());
        let today = Utc::now();
        let event = make_event("e1", 80.0, today);
        let result = ranker.rank_event(&event, today, &HashSet::new());

        assert_eq!(result.decay_factor, 1.0);
        assert_eq!(result.boost_factor, 1.0);
        assert_eq!(result.final_score, 80.00);
        assert_eq!(result.display_section, DisplaySection::KeyEvents);
    }

    #[test]
    fn scenario_ranker_boundaries_archive_after_decay() {
        let ranker = Ranker::new(RankerConfig::default());
        let today = Utc::now();
        let event = make_event("e1", 80.0, today - chrono::Duration::days(10));
        let result = ranker.rank_event(&event, today, &HashSet::new());

        assert_eq!(result.decay_factor, 0.30);
        assert_eq!(result.final_score, 24.00);
        assert_eq!(result.display_section, DisplaySection::Archive);
    }

    #[test]
    fn max_key_events_cap_demotes_overflow_by_score_then_recency() {
        let ranker = Ranker::new(RankerConfig {
            max_key_events: 2,
            ..RankerConfig::default()
        });
        let today = Utc::now();
        let events = vec![
            make_event("low-old", 90.0, today - chrono::Duration::days(2)),
            make_event("high", 95.0, today),
            make_event("mid", 92.0, today - chrono::Duration::days(1)),
        ];

        let (results, counts) = ranker.rank_all(&events, today, &HashSet::new());
        assert_eq!(counts.key_events, 2);

        let key_event_ids: Vec<&str> = results
            .iter()
            .filter(|r| r.display_section == DisplaySection::KeyEvents)
            .map(|r| r.event_id.as_str())
            .collect();
        assert_eq!(key_event_ids, vec!["high", "mid"]);
    }

    #[test]
    fn rank_all_is_idempotent_given_same_today() {
        let ranker = Ranker::new(RankerConfig::default());
        let today = Utc::now();
        let events = vec![
            make_event("e1", 75.0, today),
            make_event("e2", 50.0, today - chrono::Duration::days(3)),
        ];

        let (first, _) = ranker.rank_all(&events, today, &HashSet::new());
        let (second, _) = ranker.rank_all(&events, today, &HashSet::new());
        assert_eq!(first, second);
    }

    #[test]
    fn detect_hot_topics_requires_minimum_occurrences() {
        let ranker = Ranker::new(RankerConfig::default());
        let today = Utc::now();
        let mut events = vec![];
        for i in 0..3 {
            let mut e = make_event(&format!("e{i}"), 50.0, today);
            e.category = Some("omo".to_string());
            events.push(e);
        }
        let hot = ranker.detect_hot_topics(&events, today);
        assert!(hot.contains("omo"));
    }

    #[test]
    fn detect_hot_topics_skips_internal_category() {
        let ranker = Ranker::new(RankerConfig::default());
        let today = Utc::now();
        let mut events = vec![];
        for i in 0..5 {
            let mut e = make_event(&format!("e{i}"), 50.0, today);
            e.category = Some("internal".to_string());
            events.push(e);
        }
        let hot = ranker.detect_hot_topics(&events, today);
        assert!(!hot.contains("internal"));
    }

    #[test]
    fn boost_factor_composes_all_applicable_multipliers() {
        let mut event = make_event("e1", 50.0, Utc::now());
        event.is_follow_up = true;
        event.linked_indicators = vec!["a".to_string(), "b".to_string()];
        event.category = Some("omo".to_string());

        let mut hot = HashSet::new();
        hot.insert("omo".to_string());

        let boost = Ranker::boost_factor(&event, &hot);
        assert!((boost - (1.5 * 1.2 * 1.1)).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn decay_factor_is_always_in_unit_range(age_days in -100i64..1000i64) {
            let decay = Ranker::decay_factor(age_days);
            prop_assert!((0.0..=1.0).contains(&decay));
        }

        #[test]
        fn final_score_never_exceeds_base_times_max_boost(base_score in 0.0f64..100.0, age_days in 0i64..40) {
            let ranker = Ranker::new(RankerConfig::default());
            let today = Utc::now();
            let event = make_event("e1", base_score, today - chrono::Duration::days(age_days));
            let result = ranker.rank_event(&event, today, &HashSet::new());
            // no follow-up/hot-topic/indicator-breadth boosts applied here beyond the
            // single linked indicator in make_event, so boost stays at 1.0
            prop_assert!(result.final_score <= base_score + 0.01);
        }
    }
}
