use std::collections::{HashMap, HashSet};

use log::debug;

use crate::cover::chains::PositionIndexedChains;
use crate::cover::model::{Assignment, ChainFormulation, CoverModel, VarId};
use crate::cover::{Cover, CoverBounds, CoverSolver, DenseGraph, Deadline};
use crate::error::Result;

/// Position-indexed chains plus unbounded cycle edges. Every run of
/// `max_cycle` edges on an over-long cycle is capped at `max_cycle - 1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LazyEdgeSolver;

impl CoverSolver for LazyEdgeSolver {
    fn solve(&self, graph: &DenseGraph, bounds: CoverBounds, deadline: &Deadline) -> Result<Cover> {
        solve_lazily(graph, bounds, deadline).map(|(cover, _)| cover)
    }
}

fn solve_lazily(
    graph: &DenseGraph,
    bounds: CoverBounds,
    deadline: &Deadline,
) -> Result<(Cover, usize)> {
    if !bounds.cycles_enabled() && !bounds.chains_enabled() {
        return Ok((Cover::empty(), 0));
    }

    // Path cuts as sorted pair edge indices.
    let mut cuts: HashSet<Vec<usize>> = HashSet::new();
    let mut round = 0usize;
    loop {
        deadline.check()?;
        round += 1;

        let mut model = CoverModel::new(graph);
        let chains = if bounds.chains_enabled() {
            Some(PositionIndexedChains::build(
                graph,
                bounds.max_chain,
                &mut model,
                deadline,
            )?)
        } else {
            None
        };

        let mut edge_vars: Vec<VarId> = Vec::new();
        if bounds.cycles_enabled() {
            let mut inflow: Vec<Vec<VarId>> = vec![Vec::new(); graph.pair_count()];
            let mut outflow: Vec<Vec<VarId>> = vec![Vec::new(); graph.pair_count()];
            edge_vars.reserve(graph.pair_edges().len());
            for edge in graph.pair_edges() {
                let var = model.binary(edge.weight);
                model.occupy_pair(edge.target, var);
                inflow[edge.target].push(var);
                outflow[edge.source].push(var);
                edge_vars.push(var);
            }
            for v in 0..graph.pair_count() {
                model.require_balance(&inflow[v], &outflow[v]);
            }
            for cut in &cuts {
                let ids: Vec<VarId> = cut.iter().map(|&idx| edge_vars[idx]).collect();
                model.require_cap(&ids, (cut.len() - 1) as f64);
            }
        }

        let assignment = model.solve()?;
        let cycles = selected_cycles(graph, &edge_vars, &assignment);

        let mut added = 0usize;
        for cycle in cycles.iter().filter(|cycle| cycle.len() > bounds.max_cycle) {
            for cut in path_cuts(cycle, bounds.max_cycle) {
                if cuts.insert(cut) {
                    added += 1;
                }
            }
        }

        debug!(
            "Lazy edge round {}: objective {:.3}, {} cycles, {} new cuts ({} total)",
            round,
            assignment.objective(),
            cycles.len(),
            added,
            cuts.len()
        );
        if added == 0 {
            let cover = Cover {
                objective: assignment.objective(),
                cycles: cycles
                    .into_iter()
                    .map(|cycle| cycle.into_iter().map(|(v, _)| v).collect())
                    .collect(),
                chains: chains
                    .map(|part| part.extract(&assignment))
                    .unwrap_or_default(),
            };
            return Ok((cover, round));
        }
    }
}

type CycleEdges = Vec<(usize, usize)>;

fn selected_cycles(
    graph: &DenseGraph,
    edge_vars: &[VarId],
    assignment: &Assignment,
) -> Vec<CycleEdges> {
    let mut successor: HashMap<usize, (usize, usize)> = HashMap::new();
    for (idx, &var) in edge_vars.iter().enumerate() {
        if assignment.selected(var) {
            let edge = graph.pair_edges()[idx];
            successor.insert(edge.source, (edge.target, idx));
        }
    }

    let mut starts: Vec<usize> = successor.keys().copied().collect();
    starts.sort_unstable();
    let mut visited = HashSet::new();
    let mut cycles = Vec::new();
    for start in starts {
        let mut cycle = Vec::new();
        let mut current = start;
        while visited.insert(current) {
            let Some(&(next, idx)) = successor.get(&current) else {
                break;
            };
            cycle.push((current, idx));
            current = next;
        }
        if !cycle.is_empty() {
            cycles.push(cycle);
        }
    }
    cycles
}

fn path_cuts(cycle: &CycleEdges, max_cycle: usize) -> Vec<Vec<usize>> {
    let len = cycle.len();
    (0..len)
        .map(|start| {
            let mut edges: Vec<usize> = (0..max_cycle)
                .map(|offset| cycle[(start + offset) % len].1)
                .collect();
            edges.sort_unstable();
            edges
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cover::{DenseChain, DenseEdge};

    fn complete(pairs: usize, ndds: usize) -> DenseGraph {
        let mut pair_edges = Vec::new();
        for u in 0..pairs {
            for v in 0..pairs {
                if u != v {
                    pair_edges.push(DenseEdge::new(u, v));
                }
            }
        }
        let ndd_edges = (0..ndds)
            .flat_map(|n| (0..pairs).map(move |v| DenseEdge::new(n, v)))
            .collect();
        DenseGraph::new(pairs, ndds, pair_edges, ndd_edges).expect("graph")
    }

    #[test]
    fn long_cycle_is_cut_until_short_ones_remain() {
        // 0→1→2→0 plus the 2-cycle 0⇄1.
        let graph = DenseGraph::new(
            3,
            0,
            vec![
                DenseEdge::new(0, 1),
                DenseEdge::new(1, 2),
                DenseEdge::new(2, 0),
                DenseEdge::new(1, 0),
            ],
            Vec::new(),
        )
        .expect("graph");
        let cover = LazyEdgeSolver
            .solve(&graph, CoverBounds::new(2, 0), &Deadline::unlimited())
            .expect("solve");
        assert_eq!(cover.objective.round(), 2.0);
        assert_eq!(cover.cycles.len(), 1);
        assert_eq!(cover.check(&graph, CoverBounds::new(2, 0)).ok(), Some(2.0));
    }

    #[test]
    fn chains_respect_the_bound_without_cuts() {
        let graph = DenseGraph::new(
            3,
            1,
            vec![DenseEdge::new(0, 1), DenseEdge::new(1, 2)],
            vec![DenseEdge::new(0, 0)],
        )
        .expect("graph");
        let (cover, rounds) =
            solve_lazily(&graph, CoverBounds::new(0, 2), &Deadline::unlimited()).expect("solve");
        assert_eq!(rounds, 1);
        assert_eq!(cover.objective.round(), 2.0);
        assert_eq!(
            cover.chains,
            vec![DenseChain {
                ndd: 0,
                pairs: vec![0, 1]
            }]
        );
    }

    #[test]
    fn disabled_cycles_solve_in_one_round_on_a_dense_pool() {
        // Every pair donates to every other: thousands of cycles, none usable.
        let graph = complete(8, 2);
        let (cover, rounds) =
            solve_lazily(&graph, CoverBounds::new(0, 2), &Deadline::unlimited()).expect("solve");
        assert_eq!(rounds, 1);
        assert!(cover.cycles.is_empty());
        assert_eq!(cover.objective.round(), 4.0);
        assert_eq!(cover.check(&graph, CoverBounds::new(0, 2)).ok(), Some(4.0));
    }

    #[test]
    fn path_cuts_converge_on_a_complete_digraph() {
        let graph = complete(6, 0);
        let bounds = CoverBounds::new(3, 0);
        let cover = LazyEdgeSolver
            .solve(&graph, bounds, &Deadline::unlimited())
            .expect("solve");
        assert_eq!(cover.objective.round(), 6.0);
        assert!(cover.cycles.iter().all(|cycle| cycle.len() <= 3));
        assert_eq!(cover.check(&graph, bounds).ok(), Some(6.0));
    }

    #[test]
    fn every_window_of_a_long_cycle_is_cut() {
        let cycle: CycleEdges = vec![(0, 10), (1, 11), (2, 12), (3, 13)];
        let cuts = path_cuts(&cycle, 2);
        assert_eq!(
            cuts,
            vec![vec![10, 11], vec![11, 12], vec![12, 13], vec![10, 13]]
        );
    }
}
