use thiserror::Error;

pub type Result<T> = std::result::Result<T, MarketIntelError>;

/// Crate-wide error taxonomy. Variants group by the kinds in the error
/// handling design rather than by call site: transient network/LLM
/// failures are retried locally by their owning component and only
/// cross this boundary once their retry budget is exhausted.
#[derive(Error, Debug)]
pub enum MarketIntelError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("toml deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("adapter '{source}' failed: {message}")]
    AdapterFailed { source: String, message: String },

    #[error("content extraction failed for {url}: {message}")]
    ExtractionFailed { url: String, message: String },

    #[error("classification failed after {attempts} attempts: {last_error}")]
    ClassificationFailed { attempts: u32, last_error: String },

    #[error("llm call failed: {0}")]
    LlmCallFailed(String),

    #[error("llm call cancelled")]
    Cancelled,

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MarketIntelError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        MarketIntelError::Config(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        MarketIntelError::Validation(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        MarketIntelError::Internal(msg.into())
    }

    pub fn adapter<S: Into<String>, M: Into<String>>(source: S, message: M) -> Self {
        MarketIntelError::AdapterFailed {
            source: source.into(),
            message: message.into(),
        }
    }

    /// Whether this error kind should be retried by a caller still holding
    /// retry budget. Persistence conflicts and not-found are never retryable.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MarketIntelError::Http(_) | MarketIntelError::Database(_)
        )
    }
}
