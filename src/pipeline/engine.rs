use std::time::{Duration, Instant};

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::cover::{CoverBounds, Formulation, solve_cover};
use crate::error::{MatchingError, Result, check_window};
use crate::graph::{ExchangeGraph, RemovalState, Time};
use crate::pipeline::extract::SubgraphExtractor;
use crate::pipeline::translate::{MatchResult, ResultTranslator};
use crate::population::PopulationGenerator;

const OBJECTIVE_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub formulation: Formulation,
    pub bounds: CoverBounds,
    pub time_limit: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            formulation: Formulation::default(),
            bounds: CoverBounds::new(3, 3),
            time_limit: None,
        }
    }
}

/// Living set → dense snapshot → cover → entity ids, with the solver output
/// checked against the exchange graph before it is returned.
#[derive(Debug, Clone, Default)]
pub struct MatchingEngine {
    config: EngineConfig,
}

impl MatchingEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn optimal<G: PopulationGenerator>(
        &self,
        graph: &ExchangeGraph<G>,
        t_begin: Time,
        t_end: Time,
    ) -> Result<MatchResult> {
        self.optimal_with(graph, graph.removals(), t_begin, t_end)
    }

    pub fn optimal_with<G: PopulationGenerator>(
        &self,
        graph: &ExchangeGraph<G>,
        removals: &RemovalState,
        t_begin: Time,
        t_end: Time,
    ) -> Result<MatchResult> {
        check_window(t_begin, t_end)?;
        let start = Instant::now();
        let living = graph.living_with(removals, t_begin, t_end)?;
        let snapshot = SubgraphExtractor::extract(graph, &living)?;
        if snapshot.is_empty() {
            trace!("Empty living set on [{t_begin}, {t_end}]");
            return Ok(MatchResult::empty());
        }

        let bounds = self.config.bounds;
        let cover = solve_cover(
            snapshot.shared_graph(),
            bounds,
            self.config.formulation,
            self.config.time_limit,
        )?;

        let weight = cover.check(snapshot.graph(), bounds)?;
        let tolerance = OBJECTIVE_TOLERANCE * cover.objective.abs().max(1.0);
        if (weight - cover.objective).abs() > tolerance {
            return Err(MatchingError::invariant(format!(
                "Solver objective {} disagrees with extracted cover weight {}",
                cover.objective, weight
            )));
        }

        let result = ResultTranslator::translate(&snapshot, &cover)?;
        for cycle in &result.cycles {
            if !graph.validate_cycle(cycle) {
                return Err(MatchingError::invariant(format!(
                    "Returned cycle {cycle:?} uses a missing edge"
                )));
            }
        }
        for chain in &result.chains {
            if !graph.validate_chain(chain) {
                return Err(MatchingError::invariant(format!(
                    "Returned chain {chain:?} is not a valid NDD chain"
                )));
            }
        }

        debug!(
            "Solved [{}, {}] with {}: {} pairs, {} NDDs, objective {:.3}, {} cycles, {} chains \
             in {:?}",
            t_begin,
            t_end,
            self.config.formulation,
            snapshot.pair_count(),
            snapshot.ndd_count(),
            result.objective,
            result.cycles.len(),
            result.chains.len(),
            start.elapsed()
        );
        Ok(result)
    }
}
