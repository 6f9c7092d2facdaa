pub mod database;
pub mod models;
pub mod repository;

pub use database::{Database, PoolStats};
pub use repository::{
    CalendarRepository, CausalAnalysisRepository, EventRepository, IndicatorHistoryRepository,
    IndicatorRepository, LlmCallHistoryRepository, RunHistoryRepository, SignalRepository,
    SqliteCalendarRepository, SqliteCausalAnalysisRepository, SqliteEventRepository,
    SqliteIndicatorHistoryRepository, SqliteIndicatorRepository, SqliteLlmCallHistoryRepository,
    SqliteRunHistoryRepository, SqliteSignalRepository, SqliteThemeRepository,
    SqliteWatchlistRepository, ThemeRepository, WatchlistRepository,
};
