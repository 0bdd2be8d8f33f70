pub mod engine;
pub mod extract;
pub mod scheduler;
pub mod translate;

pub use engine::{EngineConfig, MatchingEngine};
pub use extract::{DenseSnapshot, SubgraphExtractor};
pub use scheduler::{GreedyOutcome, GreedyScheduler, PeriodOutcome, greedy_ratio};
pub use translate::{MatchResult, ResultTranslator};
