//! Maximum-weight vertex-disjoint cycle and chain covers.
//!
//! Every formulation builds a binary program over a [`DenseGraph`] (pairs and
//! NDDs relabelled to `0..n`) and returns a [`Cover`] in the same index
//! space. They agree on the optimal objective and differ in model size and
//! relaxation strength.

pub mod chains;
pub mod cycles;
pub mod lazy;
pub mod model;

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{MatchingError, Result};

pub use chains::{EnumeratedChains, PositionIndexedChains};
pub use cycles::{EnumeratedCycles, PositionIndexedCycles};
pub use lazy::LazyEdgeSolver;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DenseEdge {
    pub source: usize,
    pub target: usize,
    pub weight: f64,
}

impl DenseEdge {
    pub fn new(source: usize, target: usize) -> Self {
        Self {
            source,
            target,
            weight: 1.0,
        }
    }

    pub fn weighted(source: usize, target: usize, weight: f64) -> Self {
        Self {
            source,
            target,
            weight,
        }
    }
}

/// Pairs `0..pair_count`, NDDs `0..ndd_count`. Pair edges run pair → pair,
/// NDD edges run NDD → pair.
#[derive(Debug, Clone, Default)]
pub struct DenseGraph {
    pair_count: usize,
    ndd_count: usize,
    pair_edges: Vec<DenseEdge>,
    ndd_edges: Vec<DenseEdge>,
    pair_out: Vec<Vec<usize>>,
    pair_in: Vec<Vec<usize>>,
    ndd_out: Vec<Vec<usize>>,
}

impl DenseGraph {
    pub fn new(
        pair_count: usize,
        ndd_count: usize,
        pair_edges: Vec<DenseEdge>,
        ndd_edges: Vec<DenseEdge>,
    ) -> Result<Self> {
        let mut pair_out = vec![Vec::new(); pair_count];
        let mut pair_in = vec![Vec::new(); pair_count];
        let mut ndd_out = vec![Vec::new(); ndd_count];
        let mut seen = HashSet::new();

        for (idx, edge) in pair_edges.iter().enumerate() {
            if edge.source >= pair_count || edge.target >= pair_count {
                return Err(MatchingError::invalid(format!(
                    "Pair edge {}->{} outside 0..{}",
                    edge.source, edge.target, pair_count
                )));
            }
            if edge.source == edge.target {
                return Err(MatchingError::invalid(format!(
                    "Pair edge {0}->{0} is a self-loop",
                    edge.source
                )));
            }
            if !seen.insert((false, edge.source, edge.target)) {
                return Err(MatchingError::invalid(format!(
                    "Duplicate pair edge {}->{}",
                    edge.source, edge.target
                )));
            }
            pair_out[edge.source].push(idx);
            pair_in[edge.target].push(idx);
        }
        for (idx, edge) in ndd_edges.iter().enumerate() {
            if edge.source >= ndd_count || edge.target >= pair_count {
                return Err(MatchingError::invalid(format!(
                    "NDD edge {}->{} outside 0..{} -> 0..{}",
                    edge.source, edge.target, ndd_count, pair_count
                )));
            }
            if !seen.insert((true, edge.source, edge.target)) {
                return Err(MatchingError::invalid(format!(
                    "Duplicate NDD edge {}->{}",
                    edge.source, edge.target
                )));
            }
            ndd_out[edge.source].push(idx);
        }

        Ok(Self {
            pair_count,
            ndd_count,
            pair_edges,
            ndd_edges,
            pair_out,
            pair_in,
            ndd_out,
        })
    }

    pub fn pair_count(&self) -> usize {
        self.pair_count
    }

    pub fn ndd_count(&self) -> usize {
        self.ndd_count
    }

    pub fn pair_edges(&self) -> &[DenseEdge] {
        &self.pair_edges
    }

    pub fn ndd_edges(&self) -> &[DenseEdge] {
        &self.ndd_edges
    }

    pub fn pair_out(&self, v: usize) -> impl Iterator<Item = &DenseEdge> + '_ {
        self.pair_out[v].iter().map(|&idx| &self.pair_edges[idx])
    }

    pub fn pair_in(&self, v: usize) -> impl Iterator<Item = &DenseEdge> + '_ {
        self.pair_in[v].iter().map(|&idx| &self.pair_edges[idx])
    }

    pub fn ndd_out(&self, n: usize) -> impl Iterator<Item = &DenseEdge> + '_ {
        self.ndd_out[n].iter().map(|&idx| &self.ndd_edges[idx])
    }

    pub fn pair_edge_weight(&self, source: usize, target: usize) -> Option<f64> {
        if source >= self.pair_count {
            return None;
        }
        self.pair_out(source)
            .find(|edge| edge.target == target)
            .map(|edge| edge.weight)
    }

    pub fn ndd_edge_weight(&self, ndd: usize, target: usize) -> Option<f64> {
        if ndd >= self.ndd_count {
            return None;
        }
        self.ndd_out(ndd)
            .find(|edge| edge.target == target)
            .map(|edge| edge.weight)
    }

    /// Hop counts from `root` over pair edges, staying on vertices `≥ floor`
    /// and stopping after `limit` hops. `reverse` walks edges backwards.
    pub fn pair_distances(
        &self,
        root: usize,
        floor: usize,
        limit: usize,
        reverse: bool,
    ) -> Vec<Option<usize>> {
        let mut dist = vec![None; self.pair_count];
        let mut queue = VecDeque::new();
        dist[root] = Some(0);
        queue.push_back(root);
        while let Some(v) = queue.pop_front() {
            let depth = dist[v].unwrap_or_default();
            if depth >= limit {
                continue;
            }
            let next: Vec<usize> = if reverse {
                self.pair_in(v).map(|edge| edge.source).collect()
            } else {
                self.pair_out(v).map(|edge| edge.target).collect()
            };
            for w in next {
                if w >= floor && dist[w].is_none() {
                    dist[w] = Some(depth + 1);
                    queue.push_back(w);
                }
            }
        }
        dist
    }

    pub fn ndd_distances(&self, limit: usize) -> Vec<Option<usize>> {
        let mut dist = vec![None; self.pair_count];
        let mut queue = VecDeque::new();
        if limit == 0 {
            return dist;
        }
        for edge in &self.ndd_edges {
            if dist[edge.target].is_none() {
                dist[edge.target] = Some(1);
                queue.push_back(edge.target);
            }
        }
        while let Some(v) = queue.pop_front() {
            let depth = dist[v].unwrap_or_default();
            if depth >= limit {
                continue;
            }
            for edge in self.pair_out(v) {
                if dist[edge.target].is_none() {
                    dist[edge.target] = Some(depth + 1);
                    queue.push_back(edge.target);
                }
            }
        }
        dist
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverBounds {
    pub max_cycle: usize,
    pub max_chain: usize,
}

impl CoverBounds {
    pub fn new(max_cycle: usize, max_chain: usize) -> Self {
        Self {
            max_cycle,
            max_chain,
        }
    }

    pub fn cycles_enabled(&self) -> bool {
        self.max_cycle >= 2
    }

    pub fn chains_enabled(&self) -> bool {
        self.max_chain >= 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenseChain {
    pub ndd: usize,
    pub pairs: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cover {
    pub objective: f64,
    pub cycles: Vec<Vec<usize>>,
    pub chains: Vec<DenseChain>,
}

impl Cover {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn matched_pairs(&self) -> usize {
        self.cycles.iter().map(Vec::len).sum::<usize>()
            + self.chains.iter().map(|chain| chain.pairs.len()).sum::<usize>()
    }

    /// Check disjointness, length bounds and edge validity, and return the
    /// total edge weight of the cover.
    pub fn check(&self, graph: &DenseGraph, bounds: CoverBounds) -> Result<f64> {
        let mut used_pairs = HashSet::new();
        let mut used_ndds = HashSet::new();
        let mut weight = 0.0;

        for cycle in &self.cycles {
            if cycle.is_empty() || cycle.len() > bounds.max_cycle {
                return Err(MatchingError::invariant(format!(
                    "Cycle {:?} violates length bound {}",
                    cycle, bounds.max_cycle
                )));
            }
            for (pos, &v) in cycle.iter().enumerate() {
                if !used_pairs.insert(v) {
                    return Err(MatchingError::invariant(format!(
                        "Pair {v} appears in more than one structure"
                    )));
                }
                let next = cycle[(pos + 1) % cycle.len()];
                weight += graph.pair_edge_weight(v, next).ok_or_else(|| {
                    MatchingError::invariant(format!(
                        "Cycle {cycle:?} uses missing edge {v}->{next}"
                    ))
                })?;
            }
        }

        for chain in &self.chains {
            if chain.pairs.len() > bounds.max_chain {
                return Err(MatchingError::invariant(format!(
                    "Chain from NDD {} with {} pairs violates length bound {}",
                    chain.ndd,
                    chain.pairs.len(),
                    bounds.max_chain
                )));
            }
            if !used_ndds.insert(chain.ndd) {
                return Err(MatchingError::invariant(format!(
                    "NDD {} starts more than one chain",
                    chain.ndd
                )));
            }
            let mut previous: Option<usize> = None;
            for &v in &chain.pairs {
                if !used_pairs.insert(v) {
                    return Err(MatchingError::invariant(format!(
                        "Pair {v} appears in more than one structure"
                    )));
                }
                let step = match previous {
                    None => graph.ndd_edge_weight(chain.ndd, v),
                    Some(prev) => graph.pair_edge_weight(prev, v),
                };
                weight += step.ok_or_else(|| {
                    MatchingError::invariant(format!(
                        "Chain from NDD {} uses a missing edge into {}",
                        chain.ndd, v
                    ))
                })?;
                previous = Some(v);
            }
        }
        Ok(weight)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    pub fn new(limit: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            limit,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None)
    }

    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn check(&self) -> Result<()> {
        match self.limit {
            Some(limit) if self.start.elapsed() >= limit => {
                Err(MatchingError::SolverTimeout { limit })
            }
            _ => Ok(()),
        }
    }
}

pub trait CoverSolver {
    fn solve(&self, graph: &DenseGraph, bounds: CoverBounds, deadline: &Deadline) -> Result<Cover>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Formulation {
    #[default]
    #[serde(
        rename = "pief",
        alias = "hpief_prime_full_red",
        alias = "hpief_prime",
        alias = "hpief_2prime"
    )]
    PositionIndexed,
    #[serde(rename = "picef")]
    Picef,
    #[serde(rename = "ccf")]
    CycleChain,
    #[serde(rename = "lazy_edge")]
    LazyEdge,
}

impl Formulation {
    pub const ALL: [Formulation; 4] = [
        Formulation::PositionIndexed,
        Formulation::Picef,
        Formulation::CycleChain,
        Formulation::LazyEdge,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Formulation::PositionIndexed => "pief",
            Formulation::Picef => "picef",
            Formulation::CycleChain => "ccf",
            Formulation::LazyEdge => "lazy_edge",
        }
    }
}

impl fmt::Display for Formulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Formulation {
    type Err = MatchingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pief" | "hpief_prime_full_red" | "hpief_prime" | "hpief_2prime" => {
                Ok(Formulation::PositionIndexed)
            }
            "picef" => Ok(Formulation::Picef),
            "ccf" => Ok(Formulation::CycleChain),
            "lazy_edge" => Ok(Formulation::LazyEdge),
            other => Err(MatchingError::invalid(format!(
                "Cannot understand formulation '{other}'"
            ))),
        }
    }
}

impl CoverSolver for Formulation {
    fn solve(&self, graph: &DenseGraph, bounds: CoverBounds, deadline: &Deadline) -> Result<Cover> {
        match self {
            Formulation::PositionIndexed => model::solve_composite::<
                PositionIndexedCycles,
                PositionIndexedChains,
            >(graph, bounds, deadline),
            Formulation::Picef => model::solve_composite::<EnumeratedCycles, PositionIndexedChains>(
                graph, bounds, deadline,
            ),
            Formulation::CycleChain => model::solve_composite::<EnumeratedCycles, EnumeratedChains>(
                graph, bounds, deadline,
            ),
            Formulation::LazyEdge => LazyEdgeSolver.solve(graph, bounds, deadline),
        }
    }
}

static SOLVER_WORKERS: AtomicUsize = AtomicUsize::new(0);

pub fn running_solver_workers() -> usize {
    SOLVER_WORKERS.load(Ordering::SeqCst)
}

struct WorkerSlot;

impl WorkerSlot {
    fn acquire() -> Self {
        SOLVER_WORKERS.fetch_add(1, Ordering::SeqCst);
        WorkerSlot
    }
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        SOLVER_WORKERS.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Solve on a worker thread so a stuck solve surfaces as
/// [`MatchingError::SolverTimeout`] once `time_limit` has passed.
pub fn solve_cover(
    graph: Arc<DenseGraph>,
    bounds: CoverBounds,
    formulation: Formulation,
    time_limit: Option<Duration>,
) -> Result<Cover> {
    let deadline = Deadline::new(time_limit);
    let Some(limit) = time_limit else {
        return formulation.solve(&graph, bounds, &deadline);
    };

    let (sender, receiver) = mpsc::channel();
    let worker_graph = Arc::clone(&graph);
    let slot = WorkerSlot::acquire();
    thread::Builder::new()
        .name(format!("cover-{formulation}"))
        .spawn(move || {
            let _slot = slot;
            let result = formulation.solve(&worker_graph, bounds, &deadline);
            if sender.send(result).is_err() {
                debug!(
                    "Abandoned {} worker finished after {:?}",
                    formulation,
                    deadline.elapsed()
                );
            }
        })
        .map_err(|err| MatchingError::SolverFailure(format!("spawn solver worker: {err}")))?;

    match receiver.recv_timeout(limit) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            warn!(
                "Formulation {} exceeded {:?} on {} pairs / {} NDDs; abandoning its worker \
                 ({} solver workers running)",
                formulation,
                limit,
                graph.pair_count(),
                graph.ndd_count(),
                running_solver_workers()
            );
            Err(MatchingError::SolverTimeout { limit })
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(MatchingError::SolverFailure(
            "solver worker exited without a result".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_two_cycles() -> DenseGraph {
        DenseGraph::new(
            4,
            0,
            vec![
                DenseEdge::new(0, 1),
                DenseEdge::new(1, 0),
                DenseEdge::new(2, 3),
                DenseEdge::new(3, 2),
            ],
            Vec::new(),
        )
        .expect("graph")
    }

    #[test]
    fn dense_graph_rejects_bad_edges() {
        assert!(DenseGraph::new(2, 0, vec![DenseEdge::new(0, 2)], Vec::new()).is_err());
        assert!(DenseGraph::new(2, 0, vec![DenseEdge::new(1, 1)], Vec::new()).is_err());
        assert!(
            DenseGraph::new(2, 0, vec![DenseEdge::new(0, 1), DenseEdge::new(0, 1)], Vec::new())
                .is_err()
        );
        assert!(DenseGraph::new(2, 1, Vec::new(), vec![DenseEdge::new(1, 0)]).is_err());
    }

    #[test]
    fn distances_honour_floor_and_limit() {
        let graph = DenseGraph::new(
            4,
            1,
            vec![
                DenseEdge::new(0, 1),
                DenseEdge::new(1, 2),
                DenseEdge::new(2, 3),
                DenseEdge::new(3, 0),
            ],
            vec![DenseEdge::new(0, 1)],
        )
        .expect("graph");
        let forward = graph.pair_distances(0, 0, 2, false);
        assert_eq!(forward, vec![Some(0), Some(1), Some(2), None]);
        let backward = graph.pair_distances(0, 0, 3, true);
        assert_eq!(backward, vec![Some(0), Some(3), Some(2), Some(1)]);
        let floored = graph.pair_distances(1, 1, 5, false);
        assert_eq!(floored, vec![None, Some(0), Some(1), Some(2)]);
        assert_eq!(graph.ndd_distances(2), vec![None, Some(1), Some(2), None]);
    }

    #[test]
    fn check_flags_overlap_and_bounds() {
        let graph = two_two_cycles();
        let overlapping = Cover {
            objective: 4.0,
            cycles: vec![vec![0, 1], vec![1, 0]],
            chains: Vec::new(),
        };
        assert!(matches!(
            overlapping.check(&graph, CoverBounds::new(2, 0)),
            Err(MatchingError::InvariantViolation(_))
        ));

        let valid = Cover {
            objective: 4.0,
            cycles: vec![vec![0, 1], vec![2, 3]],
            chains: Vec::new(),
        };
        assert_eq!(valid.check(&graph, CoverBounds::new(2, 0)).ok(), Some(4.0));
        assert!(valid.check(&graph, CoverBounds::new(0, 0)).is_err());
    }

    #[test]
    fn formulation_names_parse() {
        assert_eq!(
            "hpief_prime_full_red".parse::<Formulation>().ok(),
            Some(Formulation::PositionIndexed)
        );
        assert_eq!("ccf".parse::<Formulation>().ok(), Some(Formulation::CycleChain));
        assert!(matches!(
            "branch_and_price".parse::<Formulation>(),
            Err(MatchingError::InvalidArgument(_))
        ));
        for formulation in Formulation::ALL {
            assert_eq!(formulation.name().parse::<Formulation>().ok(), Some(formulation));
        }
    }

    #[test]
    fn timed_out_worker_stops_at_the_shared_deadline() {
        let graph = Arc::new(two_two_cycles());
        let result = solve_cover(
            Arc::clone(&graph),
            CoverBounds::new(2, 0),
            Formulation::CycleChain,
            Some(Duration::from_nanos(1)),
        );
        assert!(result.is_err_and(|err| err.is_timeout()));

        let waited = Instant::now();
        while running_solver_workers() > 0 {
            assert!(
                waited.elapsed() < Duration::from_secs(10),
                "solver worker still running"
            );
            thread::sleep(Duration::from_millis(5));
        }
        let solved = solve_cover(graph, CoverBounds::new(2, 0), Formulation::CycleChain, None)
            .expect("solve");
        assert_eq!(solved.objective.round(), 4.0);
    }

    #[test]
    fn formulation_deserializes_from_aliases() {
        let parsed: Formulation = serde_json::from_str("\"hpief_2prime\"").expect("alias");
        assert_eq!(parsed, Formulation::PositionIndexed);
        let named: Formulation = serde_json::from_str("\"lazy_edge\"").expect("name");
        assert_eq!(named, Formulation::LazyEdge);
    }
}
