use std::collections::HashMap;

use log::debug;

use crate::cover::model::{Assignment, ChainFormulation, CoverModel, VarId};
use crate::cover::{DenseChain, DenseGraph, Deadline};
use crate::error::Result;

const DEADLINE_POLL: usize = 4096;

/// Edge variables `y[pos][u→v]`: the NDD edge sits at position 1 and the
/// `k`-th pair edge of a chain at position `k + 1`, so positions
/// `1..=max_chain` bound the number of pairs a chain reaches.
#[derive(Debug, Default)]
pub struct PositionIndexedChains {
    starts: Vec<(usize, usize, VarId)>,
    steps: HashMap<(usize, usize), Vec<(usize, VarId)>>,
}

impl ChainFormulation for PositionIndexedChains {
    fn build(
        graph: &DenseGraph,
        max_chain: usize,
        model: &mut CoverModel,
        deadline: &Deadline,
    ) -> Result<Self> {
        deadline.check()?;
        let mut starts = Vec::new();
        let mut steps: HashMap<(usize, usize), Vec<(usize, VarId)>> = HashMap::new();
        let mut inflow: HashMap<(usize, usize), Vec<VarId>> = HashMap::new();
        let mut outflow: HashMap<(usize, usize), Vec<VarId>> = HashMap::new();

        for ndd in 0..graph.ndd_count() {
            for edge in graph.ndd_out(ndd) {
                let var = model.binary(edge.weight);
                model.occupy_ndd(ndd, var);
                model.occupy_pair(edge.target, var);
                inflow.entry((edge.target, 1)).or_default().push(var);
                starts.push((ndd, edge.target, var));
            }
        }

        let reach = graph.ndd_distances(max_chain);
        for source in 0..graph.pair_count() {
            let Some(hops) = reach[source] else {
                continue;
            };
            for edge in graph.pair_out(source) {
                for pos in (hops + 1)..=max_chain {
                    let var = model.binary(edge.weight);
                    model.occupy_pair(edge.target, var);
                    inflow.entry((edge.target, pos)).or_default().push(var);
                    outflow.entry((source, pos)).or_default().push(var);
                    steps
                        .entry((source, pos))
                        .or_default()
                        .push((edge.target, var));
                }
            }
        }

        let empty = Vec::new();
        let mut keys: Vec<(usize, usize)> = outflow.keys().copied().collect();
        keys.sort_unstable();
        for (vertex, pos) in keys {
            let leaving = outflow.get(&(vertex, pos)).unwrap_or(&empty);
            let arriving = inflow.get(&(vertex, pos - 1)).unwrap_or(&empty);
            model.require_at_most(leaving, arriving);
        }

        debug!(
            "Position-indexed chains: {} start edges, {} step variables",
            starts.len(),
            steps.values().map(Vec::len).sum::<usize>()
        );
        Ok(Self { starts, steps })
    }

    fn extract(&self, assignment: &Assignment) -> Vec<DenseChain> {
        let mut chains = Vec::new();
        for &(ndd, first, var) in &self.starts {
            if !assignment.selected(var) {
                continue;
            }
            let mut pairs = vec![first];
            let mut current = first;
            let mut pos = 2;
            while let Some(next) = self.steps.get(&(current, pos)).and_then(|options| {
                options
                    .iter()
                    .find(|(_, var)| assignment.selected(*var))
                    .map(|(target, _)| *target)
            }) {
                pairs.push(next);
                current = next;
                pos += 1;
            }
            chains.push(DenseChain { ndd, pairs });
        }
        chains
    }
}

#[derive(Debug, Default)]
pub struct EnumeratedChains {
    chains: Vec<(DenseChain, VarId)>,
}

impl EnumeratedChains {
    pub fn enumerate(
        graph: &DenseGraph,
        max_chain: usize,
        deadline: &Deadline,
    ) -> Result<Vec<DenseChain>> {
        let mut found = Vec::new();
        let mut visited = 0usize;
        let mut on_path = vec![false; graph.pair_count()];
        for ndd in 0..graph.ndd_count() {
            deadline.check()?;
            for edge in graph.ndd_out(ndd) {
                let mut path = vec![edge.target];
                on_path[edge.target] = true;
                extend_chain(
                    graph,
                    ndd,
                    max_chain,
                    &mut path,
                    &mut on_path,
                    &mut found,
                    &mut visited,
                    deadline,
                )?;
                on_path[edge.target] = false;
            }
        }
        Ok(found)
    }
}

#[allow(clippy::too_many_arguments)]
fn extend_chain(
    graph: &DenseGraph,
    ndd: usize,
    max_chain: usize,
    path: &mut Vec<usize>,
    on_path: &mut [bool],
    found: &mut Vec<DenseChain>,
    visited: &mut usize,
    deadline: &Deadline,
) -> Result<()> {
    *visited += 1;
    if *visited % DEADLINE_POLL == 0 {
        deadline.check()?;
    }
    found.push(DenseChain {
        ndd,
        pairs: path.clone(),
    });
    if path.len() >= max_chain {
        return Ok(());
    }
    let Some(&last) = path.last() else {
        return Ok(());
    };
    for edge in graph.pair_out(last) {
        if on_path[edge.target] {
            continue;
        }
        path.push(edge.target);
        on_path[edge.target] = true;
        extend_chain(graph, ndd, max_chain, path, on_path, found, visited, deadline)?;
        on_path[edge.target] = false;
        path.pop();
    }
    Ok(())
}

fn chain_weight(graph: &DenseGraph, chain: &DenseChain) -> f64 {
    let mut weight = 0.0;
    let mut previous: Option<usize> = None;
    for &v in &chain.pairs {
        weight += match previous {
            None => graph.ndd_edge_weight(chain.ndd, v),
            Some(prev) => graph.pair_edge_weight(prev, v),
        }
        .unwrap_or_default();
        previous = Some(v);
    }
    weight
}

impl ChainFormulation for EnumeratedChains {
    fn build(
        graph: &DenseGraph,
        max_chain: usize,
        model: &mut CoverModel,
        deadline: &Deadline,
    ) -> Result<Self> {
        let found = Self::enumerate(graph, max_chain, deadline)?;
        let mut chains = Vec::with_capacity(found.len());
        for chain in found {
            let var = model.binary(chain_weight(graph, &chain));
            model.occupy_ndd(chain.ndd, var);
            for &v in &chain.pairs {
                model.occupy_pair(v, var);
            }
            chains.push((chain, var));
        }
        debug!("Enumerated {} chains up to {} pairs", chains.len(), max_chain);
        Ok(Self { chains })
    }

    fn extract(&self, assignment: &Assignment) -> Vec<DenseChain> {
        self.chains
            .iter()
            .filter(|(_, var)| assignment.selected(*var))
            .map(|(chain, _)| chain.clone())
            .collect()
    }
}
