pub mod event;
pub mod indicator;
pub mod insight;
pub mod record;
pub mod run;

pub use event::{CausalAnalysis, Confidence, DisplaySection, Event};
pub use indicator::{Indicator, IndicatorHistory};
pub use insight::{
    ComparisonOp, Signal, SignalAccuracyStats, SignalConfidence, SignalStatus, Theme, ThemeStatus,
    Watchlist, WatchlistStatus, WatchlistType,
};
pub use record::{
    Attachment, CalendarRecord, CrawlerOutput, EventRecord, EventType, MetricRecord, MetricType,
    Trend,
};
pub use run::{LlmCallHistory, RunHistory, RunStatus};
