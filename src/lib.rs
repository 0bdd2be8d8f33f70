pub mod cover;
pub mod error;
pub mod experiment;
pub mod graph;
pub mod pipeline;
pub mod population;

pub use cover::{Cover, CoverBounds, CoverSolver, DenseGraph, Formulation, solve_cover};
pub use error::{MatchingError, Result};
pub use experiment::{ComparisonRecord, PoolKind, SimulationConfig, run_batch, run_comparison};
pub use graph::{
    Adjacency, AdjacencyRepr, EntityAttributes, EntityId, ExchangeGraph, FeatureRepr, Features,
    PendingRemovals, RemovalState, Time,
};
pub use pipeline::{
    EngineConfig, GreedyOutcome, GreedyScheduler, MatchResult, MatchingEngine, greedy_ratio,
};
pub use population::{AboGenerator, PopulationGenerator, SaidmanGenerator, StaticPool};
