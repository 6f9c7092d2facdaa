use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::Trend;

/// A time-series identity: one row per `id`, upserted on every metric
/// ingest, never deleted. Mirrors `original_source`'s `indicators.py`
/// model, with `category` kept as a free string since upstream
/// categories vary (exchange_rate, interbank, gold, cpi, omo, bond, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Indicator {
    pub id: String,
    pub name: String,
    pub name_vi: Option<String>,
    pub category: String,
    pub unit: String,
    pub latest_value: f64,
    pub change: f64,
    pub change_pct: f64,
    pub trend: Trend,
    pub source: String,
    pub source_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Indicator {
    pub fn trend_for(change: f64) -> Trend {
        if change > 0.0 {
            Trend::Up
        } else if change < 0.0 {
            Trend::Down
        } else {
            Trend::Stable
        }
    }
}

/// One datum in an indicator's time series. Uniqueness is enforced on
/// `(indicator_id, date, value)` so a same-day republish with an
/// identical value is a no-op rather than a new row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorHistory {
    pub id: i64,
    pub indicator_id: String,
    pub value: f64,
    pub previous_value: Option<f64>,
    pub change: f64,
    pub change_pct: f64,
    pub volume: Option<f64>,
    pub date: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub source: String,
}

impl IndicatorHistory {
    /// Computes change/change_pct against the previous value. A
    /// `previous_value` of zero yields a `change_pct` of 0.0 rather than
    /// dividing by zero.
    pub fn compute_change(value: f64, previous_value: Option<f64>) -> (f64, f64) {
        match previous_value {
            Some(prev) if prev != 0.0 => {
                let change = value - prev;
                (change, (change / prev) * 100.0)
            }
            Some(prev) => (value - prev, 0.0),
            None => (0.0, 0.0),
        }
    }
}
