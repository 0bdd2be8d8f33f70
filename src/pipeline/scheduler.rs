use std::time::Instant;

use log::{debug, info};
use serde::Serialize;

use crate::error::{Result, check_window};
use crate::graph::{EntityId, ExchangeGraph, PendingRemovals, Time};
use crate::pipeline::engine::MatchingEngine;
use crate::population::PopulationGenerator;

#[derive(Debug, Clone, Serialize)]
pub struct PeriodOutcome {
    pub time: Time,
    pub objective: f64,
    pub matched: Vec<EntityId>,
}

#[derive(Debug, Clone)]
pub struct GreedyOutcome {
    pub objective: f64,
    pub matched: Vec<EntityId>,
    pub periods: Vec<PeriodOutcome>,
    /// The removal state after the run. The graph is untouched until the
    /// caller passes this to [`ExchangeGraph::commit_removals`].
    pub removals: PendingRemovals,
}

/// Period-by-period matching with no knowledge of later arrivals. Entities
/// matched at `t` are removed as of `t` before `t + 1` is solved.
pub struct GreedyScheduler<'a> {
    engine: &'a MatchingEngine,
}

impl<'a> GreedyScheduler<'a> {
    pub fn new(engine: &'a MatchingEngine) -> Self {
        Self { engine }
    }

    pub fn run<G: PopulationGenerator>(
        &self,
        graph: &ExchangeGraph<G>,
        t_begin: Time,
        t_end: Time,
    ) -> Result<GreedyOutcome> {
        check_window(t_begin, t_end)?;
        let start = Instant::now();
        let mut pending = graph.fork_removals();
        let mut objective = 0.0;
        let mut matched = Vec::new();
        let mut periods = Vec::with_capacity((t_end - t_begin) as usize);

        for t in t_begin..t_end {
            let result = self.engine.optimal_with(graph, &pending.state, t, t)?;
            if !result.matched.is_empty() {
                pending.state.mark(t, result.matched.iter().copied());
            }
            debug!(
                "Period {}: objective {:.3}, matched {}",
                t,
                result.objective,
                result.matched.len()
            );
            objective += result.objective;
            matched.extend(result.matched.iter().copied());
            periods.push(PeriodOutcome {
                time: t,
                objective: result.objective,
                matched: result.matched,
            });
        }

        info!(
            "Greedy over [{}, {}): objective {:.3}, {} matched in {:?}",
            t_begin,
            t_end,
            objective,
            matched.len(),
            start.elapsed()
        );
        Ok(GreedyOutcome {
            objective,
            matched,
            periods,
            removals: pending,
        })
    }
}

/// `greedy / optimal`, NaN when the optimum is zero.
pub fn greedy_ratio(greedy: f64, optimal: f64) -> f64 {
    if optimal > 0.0 { greedy / optimal } else { f64::NAN }
}
