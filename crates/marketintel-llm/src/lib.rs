//! LLM gateway, Stage 1 classifier and Stage 2 scorer.

pub mod classifier;
pub mod gateway;
pub mod scorer;

pub use classifier::{Classifier, ClassificationResult, NewsItem};
pub use gateway::{CallContext, CallLogger, HttpLlmGateway, LlmGateway, Message, Response, Usage};
pub use scorer::{ClassifiedItem, Scorer, ScoringResult, SignalOutput, ThemeLink};
