use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::Trend;

/// Status of a bounded prediction. Field-for-field grounded on
/// `original_source/backend/database/models/insights/signal.py`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Active,
    VerifiedCorrect,
    VerifiedWrong,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalConfidence {
    High,
    Medium,
    Low,
}

/// A bounded, verifiable short-term prediction linked to one indicator
/// and one or more source events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub prediction: String,
    pub direction: Option<Trend>,
    pub target_indicator: Option<String>,
    pub target_range_low: Option<f64>,
    pub target_range_high: Option<f64>,
    pub confidence: SignalConfidence,
    pub timeframe_days: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub source_event_ids: Vec<String>,
    pub source_event_id: Option<String>,
    pub reasoning: Option<String>,
    pub status: SignalStatus,
    pub actual_value: Option<f64>,
    pub verified_at: Option<DateTime<Utc>>,
    pub accuracy_notes: Option<String>,
    pub theme_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Signal {
    /// `expires_at` is monotonically non-decreasing as `timeframe_days`
    /// grows, given the same anchor timestamp.
    pub fn expiry_for(anchor: DateTime<Utc>, timeframe_days: i64) -> DateTime<Utc> {
        anchor + chrono::Duration::days(timeframe_days.max(0))
    }

    pub fn is_verified(&self) -> bool {
        matches!(
            self.status,
            SignalStatus::VerifiedCorrect | SignalStatus::VerifiedWrong
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeStatus {
    Emerging,
    Active,
    Fading,
    Archived,
}

/// A named cluster of related events/signals/indicators with a strength
/// scalar that rises and falls across passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub id: String,
    pub name: String,
    pub name_vi: Option<String>,
    pub description: Option<String>,
    pub strength: f64,
    pub peak_strength: f64,
    pub status: ThemeStatus,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl Theme {
    pub fn new(id: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            name_vi: None,
            description: None,
            strength: 0.0,
            peak_strength: 0.0,
            status: ThemeStatus::Emerging,
            first_seen_at: now,
            last_seen_at: now,
        }
    }

    /// Updates strength and tracks the running peak; strength is clamped
    /// to be non-negative per the data model's invariant.
    pub fn update_strength(&mut self, strength: f64, now: DateTime<Utc>) {
        self.strength = strength.max(0.0);
        if self.strength > self.peak_strength {
            self.peak_strength = self.strength;
        }
        self.last_seen_at = now;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchlistType {
    Date,
    Indicator,
    Keyword,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchlistStatus {
    Watching,
    Triggered,
    Dismissed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Neq,
}

impl ComparisonOp {
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Gte),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Lte),
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Neq),
            _ => None,
        }
    }

    pub fn evaluate(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            ComparisonOp::Gt => lhs > rhs,
            ComparisonOp::Gte => lhs >= rhs,
            ComparisonOp::Lt => lhs < rhs,
            ComparisonOp::Lte => lhs <= rhs,
            ComparisonOp::Eq => (lhs - rhs).abs() < f64::EPSILON,
            ComparisonOp::Neq => (lhs - rhs).abs() >= f64::EPSILON,
        }
    }
}

/// A declarative trigger: `condition` has syntax `OP VALUE`
/// (e.g. `"> 25500"`), parsed with [`ComparisonOp::parse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Watchlist {
    pub id: String,
    pub watch_type: WatchlistType,
    pub label: String,
    pub target_id: Option<String>,
    pub condition: Option<String>,
    pub trigger_date: Option<DateTime<Utc>>,
    pub status: WatchlistStatus,
    pub snoozed_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub triggered_at: Option<DateTime<Utc>>,
}

impl Watchlist {
    /// Validates the data-model invariant: `trigger_date` is set iff
    /// `watch_type == Date`.
    pub fn has_valid_trigger_date(&self) -> bool {
        match self.watch_type {
            WatchlistType::Date => self.trigger_date.is_some(),
            _ => self.trigger_date.is_none(),
        }
    }

    pub fn is_snoozed(&self, now: DateTime<Utc>) -> bool {
        self.snoozed_until.map(|until| until > now).unwrap_or(false)
    }
}

/// Aggregated accuracy for verified signals, bucketed by confidence and
/// optionally by indicator. Backs the `get_accuracy_stats` read surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalAccuracyStats {
    pub confidence: SignalConfidence,
    pub indicator: Option<String>,
    pub verified_count: u64,
    pub correct_count: u64,
    pub accuracy_pct: f64,
}

impl SignalAccuracyStats {
    pub fn compute(confidence: SignalConfidence, indicator: Option<String>, verified: u64, correct: u64) -> Self {
        let accuracy_pct = if verified > 0 {
            (correct as f64 / verified as f64) * 100.0
        } else {
            0.0
        };
        Self {
            confidence,
            indicator,
            verified_count: verified,
            correct_count: correct,
            accuracy_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_expiry_grows_monotonically_with_timeframe() {
        let anchor = Utc::now();
        let short = Signal::expiry_for(anchor, 7);
        let long = Signal::expiry_for(anchor, 30);
        assert!(long > short);
    }

    #[test]
    fn signal_expiry_clamps_negative_timeframe_to_zero() {
        let anchor = Utc::now();
        assert_eq!(Signal::expiry_for(anchor, -5), anchor);
    }

    #[test]
    fn theme_strength_never_goes_negative() {
        let mut theme = Theme::new("t1", "Rate Hike Cycle", Utc::now());
        theme.update_strength(-5.0, Utc::now());
        assert_eq!(theme.strength, 0.0);
    }

    #[test]
    fn theme_tracks_peak_strength() {
        let mut theme = Theme::new("t1", "Rate Hike Cycle", Utc::now());
        theme.update_strength(10.0, Utc::now());
        theme.update_strength(4.0, Utc::now());
        assert_eq!(theme.strength, 4.0);
        assert_eq!(theme.peak_strength, 10.0);
    }

    #[test]
    fn comparison_op_parses_all_operators() {
        assert_eq!(ComparisonOp::parse(">"), Some(ComparisonOp::Gt));
        assert_eq!(ComparisonOp::parse(">="), Some(ComparisonOp::Gte));
        assert_eq!(ComparisonOp::parse("<"), Some(ComparisonOp::Lt));
        assert_eq!(ComparisonOp::parse("<="), Some(ComparisonOp::Lte));
        assert_eq!(ComparisonOp::parse("=="), Some(ComparisonOp::Eq));
        assert_eq!(ComparisonOp::parse("!="), Some(ComparisonOp::Neq));
        assert_eq!(ComparisonOp::parse("~="), None);
    }

    #[test]
    fn watchlist_trigger_date_invariant() {
        let mut wl = Watchlist {
            id: "w1".into(),
            watch_type: WatchlistType::Date,
            label: "FOMC meeting".into(),
            target_id: None,
            condition: None,
            trigger_date: Some(Utc::now()),
            status: WatchlistStatus::Watching,
            snoozed_until: None,
            created_at: Utc::now(),
            triggered_at: None,
        };
        assert!(wl.has_valid_trigger_date());

        wl.watch_type = WatchlistType::Keyword;
        assert!(!wl.has_valid_trigger_date());
    }
}
