use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, warn};

use crate::cover::{DenseEdge, DenseGraph};
use crate::error::{MatchingError, Result};
use crate::graph::{EntityId, ExchangeGraph};
use crate::population::PopulationGenerator;

/// A living set relabelled into the solver's index space. Pairs and NDDs are
/// numbered separately, each in ascending entity-id order.
#[derive(Debug, Clone, Default)]
pub struct DenseSnapshot {
    pair_index: IndexMap<EntityId, usize>,
    ndd_index: IndexMap<EntityId, usize>,
    graph: Arc<DenseGraph>,
}

impl DenseSnapshot {
    pub fn graph(&self) -> &DenseGraph {
        &self.graph
    }

    pub fn shared_graph(&self) -> Arc<DenseGraph> {
        Arc::clone(&self.graph)
    }

    pub fn pair_count(&self) -> usize {
        self.pair_index.len()
    }

    pub fn ndd_count(&self) -> usize {
        self.ndd_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pair_index.is_empty() && self.ndd_index.is_empty()
    }

    pub fn pair_position(&self, id: EntityId) -> Option<usize> {
        self.pair_index.get(&id).copied()
    }

    pub fn ndd_position(&self, id: EntityId) -> Option<usize> {
        self.ndd_index.get(&id).copied()
    }

    pub fn pair_id(&self, position: usize) -> Option<EntityId> {
        self.pair_index.get_index(position).map(|(id, _)| *id)
    }

    pub fn ndd_id(&self, position: usize) -> Option<EntityId> {
        self.ndd_index.get_index(position).map(|(id, _)| *id)
    }

    pub fn pairs(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.pair_index.keys().copied()
    }

    pub fn ndds(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.ndd_index.keys().copied()
    }
}

pub struct SubgraphExtractor;

impl SubgraphExtractor {
    /// Induced subgraph over `ids`, split into pairs and NDDs. Edges into an
    /// NDD are dropped since an NDD never receives a kidney.
    pub fn extract<G: PopulationGenerator>(
        graph: &ExchangeGraph<G>,
        ids: &[EntityId],
    ) -> Result<DenseSnapshot> {
        let mut sorted = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut pair_index = IndexMap::new();
        let mut ndd_index = IndexMap::new();
        for id in &sorted {
            let entity = graph
                .entity(*id)
                .ok_or_else(|| MatchingError::invalid(format!("Unknown entity id {id}")))?;
            if entity.is_ndd() {
                let position = ndd_index.len();
                ndd_index.insert(*id, position);
            } else {
                let position = pair_index.len();
                pair_index.insert(*id, position);
            }
        }

        let mut pair_edges = Vec::new();
        let mut ndd_edges = Vec::new();
        let mut dropped = 0usize;
        for id in &sorted {
            for (target, weight) in graph.successors(*id) {
                if let Some(&dense_target) = pair_index.get(&target) {
                    if let Some(&dense_source) = pair_index.get(id) {
                        pair_edges.push(DenseEdge::weighted(dense_source, dense_target, weight));
                    } else if let Some(&dense_source) = ndd_index.get(id) {
                        ndd_edges.push(DenseEdge::weighted(dense_source, dense_target, weight));
                    }
                } else if ndd_index.contains_key(&target) {
                    dropped += 1;
                }
            }
        }
        if dropped > 0 {
            warn!("Dropped {dropped} edges pointing at NDDs");
        }

        let dense = DenseGraph::new(pair_index.len(), ndd_index.len(), pair_edges, ndd_edges)?;
        debug!(
            "Extracted {} pairs, {} NDDs, {} pair edges, {} NDD edges",
            dense.pair_count(),
            dense.ndd_count(),
            dense.pair_edges().len(),
            dense.ndd_edges().len()
        );
        Ok(DenseSnapshot {
            pair_index,
            ndd_index,
            graph: Arc::new(dense),
        })
    }
}
