pub mod ranker;

pub use ranker::{Ranker, RankableEvent, RankingResult, SectionCounts};
