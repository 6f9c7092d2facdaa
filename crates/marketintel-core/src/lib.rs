pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod observability;
pub mod storage;

pub use config::Config;
pub use error::{MarketIntelError, Result};
pub use observability::RunId;
