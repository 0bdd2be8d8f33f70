use std::collections::HashMap;

use log::debug;

use crate::cover::model::{Assignment, CoverModel, CycleFormulation, VarId};
use crate::cover::{DenseGraph, Deadline};
use crate::error::Result;

const DEADLINE_POLL: usize = 4096;

/// Edge variables `x[root][pos][u→v]`, one copy of the graph per cycle's
/// lowest vertex. Positions run `1..=max_cycle`, which bounds the length;
/// an edge only gets a position if the remaining hops back to `root` fit.
#[derive(Debug, Default)]
pub struct PositionIndexedCycles {
    copies: Vec<CycleCopy>,
}

#[derive(Debug)]
struct CycleCopy {
    root: usize,
    edges: Vec<(usize, usize, VarId)>,
}

impl CycleFormulation for PositionIndexedCycles {
    fn build(
        graph: &DenseGraph,
        max_cycle: usize,
        model: &mut CoverModel,
        deadline: &Deadline,
    ) -> Result<Self> {
        let mut copies = Vec::new();
        let hop_limit = max_cycle.saturating_sub(1);

        for root in 0..graph.pair_count() {
            deadline.check()?;
            let from_root = graph.pair_distances(root, root, hop_limit, false);
            let to_root = graph.pair_distances(root, root, hop_limit, true);

            let mut inflow: HashMap<(usize, usize), Vec<VarId>> = HashMap::new();
            let mut outflow: HashMap<(usize, usize), Vec<VarId>> = HashMap::new();
            let mut edges = Vec::new();

            for source in root..graph.pair_count() {
                let Some(hops_in) = from_root[source] else {
                    continue;
                };
                for edge in graph.pair_out(source) {
                    let target = edge.target;
                    if target < root {
                        continue;
                    }
                    let Some(hops_out) = to_root[target] else {
                        continue;
                    };
                    let (first, last) = if source == root {
                        (1, 1)
                    } else {
                        (hops_in + 1, max_cycle.saturating_sub(hops_out))
                    };
                    for pos in first..=last {
                        let var = model.binary(edge.weight);
                        model.occupy_pair(target, var);
                        inflow.entry((target, pos)).or_default().push(var);
                        outflow.entry((source, pos)).or_default().push(var);
                        edges.push((source, target, var));
                    }
                }
            }

            if edges.is_empty() {
                continue;
            }

            let empty = Vec::new();
            for vertex in (root + 1)..graph.pair_count() {
                if from_root[vertex].is_none() {
                    continue;
                }
                for pos in 1..max_cycle {
                    let arriving = inflow.get(&(vertex, pos)).unwrap_or(&empty);
                    let leaving = outflow.get(&(vertex, pos + 1)).unwrap_or(&empty);
                    model.require_balance(arriving, leaving);
                }
            }
            let closing: Vec<VarId> = (1..=max_cycle)
                .filter_map(|pos| inflow.get(&(root, pos)))
                .flatten()
                .copied()
                .collect();
            let opening = outflow.get(&(root, 1)).unwrap_or(&empty);
            model.require_balance(&closing, opening);

            copies.push(CycleCopy { root, edges });
        }

        debug!(
            "Position-indexed cycles: {} copies, {} edge variables",
            copies.len(),
            copies.iter().map(|copy| copy.edges.len()).sum::<usize>()
        );
        Ok(Self { copies })
    }

    fn extract(&self, assignment: &Assignment) -> Vec<Vec<usize>> {
        let mut cycles = Vec::new();
        for copy in &self.copies {
            let successor: HashMap<usize, usize> = copy
                .edges
                .iter()
                .filter(|(_, _, var)| assignment.selected(*var))
                .map(|&(source, target, _)| (source, target))
                .collect();
            let Some(&first) = successor.get(&copy.root) else {
                continue;
            };
            let mut cycle = vec![copy.root];
            let mut current = first;
            while current != copy.root && cycle.len() <= successor.len() {
                cycle.push(current);
                match successor.get(&current) {
                    Some(&next) => current = next,
                    None => break,
                }
            }
            cycles.push(cycle);
        }
        cycles
    }
}

#[derive(Debug, Default)]
pub struct EnumeratedCycles {
    cycles: Vec<(Vec<usize>, VarId)>,
}

impl EnumeratedCycles {
    pub fn enumerate(
        graph: &DenseGraph,
        max_cycle: usize,
        deadline: &Deadline,
    ) -> Result<Vec<Vec<usize>>> {
        let mut found = Vec::new();
        let mut visited = 0usize;
        for root in 0..graph.pair_count() {
            deadline.check()?;
            let to_root = graph.pair_distances(root, root, max_cycle.saturating_sub(1), true);
            let mut on_path = vec![false; graph.pair_count()];
            on_path[root] = true;
            let mut path = vec![root];
            extend_cycle(
                graph,
                max_cycle,
                &to_root,
                &mut path,
                &mut on_path,
                &mut found,
                &mut visited,
                deadline,
            )?;
        }
        Ok(found)
    }
}

#[allow(clippy::too_many_arguments)]
fn extend_cycle(
    graph: &DenseGraph,
    max_cycle: usize,
    to_root: &[Option<usize>],
    path: &mut Vec<usize>,
    on_path: &mut [bool],
    found: &mut Vec<Vec<usize>>,
    visited: &mut usize,
    deadline: &Deadline,
) -> Result<()> {
    *visited += 1;
    if *visited % DEADLINE_POLL == 0 {
        deadline.check()?;
    }
    let root = path[0];
    let Some(&last) = path.last() else {
        return Ok(());
    };
    for edge in graph.pair_out(last) {
        let next = edge.target;
        if next == root {
            if path.len() >= 2 {
                found.push(path.clone());
            }
            continue;
        }
        if next < root || on_path[next] || path.len() >= max_cycle {
            continue;
        }
        let fits = to_root[next].is_some_and(|hops| path.len() + hops <= max_cycle);
        if !fits {
            continue;
        }
        path.push(next);
        on_path[next] = true;
        extend_cycle(
            graph, max_cycle, to_root, path, on_path, found, visited, deadline,
        )?;
        on_path[next] = false;
        path.pop();
    }
    Ok(())
}

impl CycleFormulation for EnumeratedCycles {
    fn build(
        graph: &DenseGraph,
        max_cycle: usize,
        model: &mut CoverModel,
        deadline: &Deadline,
    ) -> Result<Self> {
        let found = Self::enumerate(graph, max_cycle, deadline)?;
        let mut cycles = Vec::with_capacity(found.len());
        for cycle in found {
            let weight: f64 = (0..cycle.len())
                .filter_map(|i| graph.pair_edge_weight(cycle[i], cycle[(i + 1) % cycle.len()]))
                .sum();
            let var = model.binary(weight);
            for &v in &cycle {
                model.occupy_pair(v, var);
            }
            cycles.push((cycle, var));
        }
        debug!("Enumerated {} cycles up to length {}", cycles.len(), max_cycle);
        Ok(Self { cycles })
    }

    fn extract(&self, assignment: &Assignment) -> Vec<Vec<usize>> {
        self.cycles
            .iter()
            .filter(|(_, var)| assignment.selected(*var))
            .map(|(cycle, _)| cycle.clone())
            .collect()
    }
}
