use indexmap::IndexMap;
use log::{debug, trace};
use petgraph::Direction;
use petgraph::prelude::NodeIndex;
use petgraph::visit::EdgeRef;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::error::{MatchingError, Result, check_window};
use crate::graph::model::{
    Compatibility, CompatibilityGraph, Entity, EntityAttributes, EntityId, Time,
};
use crate::graph::removal::{PendingRemovals, RemovalState};
use crate::population::{PopulationGenerator, StaticPool};

/// Every pair and NDD ever created in a simulation run, with their
/// compatibility edges and the record of who has been matched away.
#[derive(Debug, Clone)]
pub struct ExchangeGraph<G = StaticPool> {
    pub(crate) graph: CompatibilityGraph,
    pub(crate) node_lookup: IndexMap<EntityId, NodeIndex>,
    removals: RemovalState,
    generator: G,
    time_length: Time,
    seed: u64,
}

impl ExchangeGraph<StaticPool> {
    pub fn empty() -> Self {
        Self::new(StaticPool, 0, 0)
    }
}

impl<G: PopulationGenerator> ExchangeGraph<G> {
    pub fn new(generator: G, time_length: Time, seed: u64) -> Self {
        Self {
            graph: CompatibilityGraph::default(),
            node_lookup: IndexMap::new(),
            removals: RemovalState::new(),
            generator,
            time_length,
            seed,
        }
    }

    pub fn generate(generator: G, time_length: Time, seed: u64) -> Result<Self> {
        let mut graph = Self::new(generator, time_length, seed);
        graph.populate(0, time_length, seed)?;
        Ok(graph)
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn time_length(&self) -> Time {
        self.time_length
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn len(&self) -> usize {
        self.node_lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_lookup.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Erase everything entering at or after `t_begin`, then draw the
    /// entrants of `[t_begin, t_end)` and connect them to each other and to
    /// the survivors. Edges among survivors are left as they were.
    pub fn populate(&mut self, t_begin: Time, t_end: Time, seed: u64) -> Result<Vec<EntityId>> {
        check_window(t_begin, t_end)?;
        self.erase_from(t_begin);
        self.time_length = self.time_length.max(t_end);

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let old_ids: Vec<EntityId> = self.node_lookup.keys().copied().collect();
        let features = self
            .generator
            .draw_node_features(&mut rng, t_begin, t_end)?;
        let new_ids = self.insert_entities(features);

        let edges = {
            let old: Vec<&Entity> = old_ids.iter().filter_map(|id| self.entity(*id)).collect();
            let new: Vec<&Entity> = new_ids.iter().filter_map(|id| self.entity(*id)).collect();
            let mut edges = self.generator.draw_edges(&mut rng, &new, &new);
            if !old.is_empty() {
                edges.extend(self.generator.draw_edges(&mut rng, &old, &new));
                edges.extend(self.generator.draw_edges(&mut rng, &new, &old));
            }
            edges
        };
        for (source, target) in &edges {
            self.connect(*source, *target, 1.0)?;
        }

        debug!(
            "Populated [{}, {}) with {} entities and {} edges (seed {})",
            t_begin,
            t_end,
            new_ids.len(),
            edges.len(),
            seed
        );
        Ok(new_ids)
    }

    pub fn insert_entities<I>(&mut self, attributes: I) -> Vec<EntityId>
    where
        I: IntoIterator<Item = EntityAttributes>,
    {
        let mut next_id = self.next_id();
        let mut inserted = Vec::new();
        for attrs in attributes {
            let id = next_id;
            next_id += 1;
            let idx = self.graph.add_node(Entity {
                id,
                attributes: attrs,
            });
            self.node_lookup.insert(id, idx);
            inserted.push(id);
        }
        inserted
    }

    pub fn connect(&mut self, source: EntityId, target: EntityId, weight: f64) -> Result<()> {
        if source == target {
            return Err(MatchingError::invalid(format!(
                "Entity {source} cannot donate to itself"
            )));
        }
        let source_idx = self.index_of(source)?;
        let target_idx = self.index_of(target)?;
        if self.graph[target_idx].is_ndd() {
            return Err(MatchingError::invalid(format!(
                "Entity {target} is a non-directed donor and cannot receive"
            )));
        }
        self.graph
            .update_edge(source_idx, target_idx, Compatibility { weight });
        Ok(())
    }

    pub fn erase_from(&mut self, t: Time) {
        let doomed: Vec<EntityId> = self
            .node_lookup
            .iter()
            .filter(|&(_, idx)| self.graph[*idx].entry() >= t)
            .map(|(id, _)| *id)
            .collect();
        for id in &doomed {
            if let Some(idx) = self.node_lookup.shift_remove(id) {
                self.graph.remove_node(idx);
            }
        }
        self.removals.clear_after(t);
        if !doomed.is_empty() {
            trace!("Erased {} entities entering at or after {}", doomed.len(), t);
        }
    }

    /// Ids alive at some point of `[t_begin, t_end]` and not removed as of
    /// `t_begin`, ascending.
    pub fn living(&self, t_begin: Time, t_end: Time) -> Result<Vec<EntityId>> {
        self.living_with(&self.removals, t_begin, t_end)
    }

    pub fn living_with(
        &self,
        removals: &RemovalState,
        t_begin: Time,
        t_end: Time,
    ) -> Result<Vec<EntityId>> {
        check_window(t_begin, t_end)?;
        let removed = removals.removed_as_of(t_begin);
        Ok(self
            .node_lookup
            .iter()
            .filter(|&(id, idx)| {
                self.graph[*idx].attributes.alive_during(t_begin, t_end) && !removed.contains(id)
            })
            .map(|(id, _)| *id)
            .collect())
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.node_lookup
            .get(&id)
            .and_then(|idx| self.graph.node_weight(*idx))
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.node_lookup
            .values()
            .filter_map(|idx| self.graph.node_weight(*idx))
    }

    pub fn edge_weight(&self, source: EntityId, target: EntityId) -> Option<f64> {
        let source_idx = self.node_lookup.get(&source)?;
        let target_idx = self.node_lookup.get(&target)?;
        self.graph
            .find_edge(*source_idx, *target_idx)
            .and_then(|edge| self.graph.edge_weight(edge))
            .map(|compat| compat.weight)
    }

    pub fn has_edge(&self, source: EntityId, target: EntityId) -> bool {
        self.edge_weight(source, target).is_some()
    }

    pub fn successors(&self, id: EntityId) -> Vec<(EntityId, f64)> {
        let Some(idx) = self.node_lookup.get(&id) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(*idx, Direction::Outgoing)
            .map(|edge| (self.graph[edge.target()].id, edge.weight().weight))
            .collect()
    }

    pub fn validate_cycle(&self, cycle: &[EntityId]) -> bool {
        if cycle.is_empty() {
            return false;
        }
        (0..cycle.len()).all(|i| self.has_edge(cycle[i], cycle[(i + 1) % cycle.len()]))
    }

    pub fn validate_chain(&self, chain: &[EntityId]) -> bool {
        let Some((head, rest)) = chain.split_first() else {
            return false;
        };
        if !self.entity(*head).is_some_and(Entity::is_ndd) {
            return false;
        }
        if rest
            .iter()
            .any(|id| self.entity(*id).is_none_or(Entity::is_ndd))
        {
            return false;
        }
        chain.windows(2).all(|pair| self.has_edge(pair[0], pair[1]))
    }

    pub fn removals(&self) -> &RemovalState {
        &self.removals
    }

    pub fn mark_removed(&mut self, t: Time, ids: &[EntityId]) -> Result<()> {
        for id in ids {
            self.index_of(*id)?;
        }
        self.removals.mark(t, ids.iter().copied());
        Ok(())
    }

    pub fn fork_removals(&self) -> PendingRemovals {
        PendingRemovals {
            base_version: self.removals.version(),
            state: self.removals.clone(),
        }
    }

    /// Adopt removals produced from this graph's state, unless that state
    /// has moved on since the copy was taken.
    pub fn commit_removals(&mut self, pending: PendingRemovals) -> Result<()> {
        if pending.base_version != self.removals.version() {
            return Err(MatchingError::invalid(format!(
                "Stale removal state: based on version {}, graph is at version {}",
                pending.base_version,
                self.removals.version()
            )));
        }
        self.removals = pending.state;
        Ok(())
    }

    fn index_of(&self, id: EntityId) -> Result<NodeIndex> {
        self.node_lookup
            .get(&id)
            .copied()
            .ok_or_else(|| MatchingError::invalid(format!("Unknown entity id {id}")))
    }

    fn next_id(&self) -> EntityId {
        self.node_lookup.keys().max().map_or(0, |max| max + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::SaidmanGenerator;

    fn two_cycle_graph() -> ExchangeGraph {
        let mut graph = ExchangeGraph::empty();
        let ids = graph.insert_entities([
            EntityAttributes::pair(0, 5),
            EntityAttributes::pair(1, 6),
            EntityAttributes::pair(7, 9),
        ]);
        graph.connect(ids[0], ids[1], 1.0).expect("edge 0->1");
        graph.connect(ids[1], ids[0], 1.0).expect("edge 1->0");
        graph
    }

    #[test]
    fn living_respects_window_and_removals() {
        let mut graph = two_cycle_graph();
        assert_eq!(graph.living(0, 0).expect("living"), vec![0]);
        assert_eq!(graph.living(2, 2).expect("living"), vec![0, 1]);
        assert_eq!(graph.living(5, 8).expect("living"), vec![0, 1, 2]);

        graph.mark_removed(3, &[0]).expect("mark");
        assert_eq!(graph.living(2, 2).expect("living"), vec![0, 1]);
        assert_eq!(graph.living(3, 3).expect("living"), vec![1]);
    }

    #[test]
    fn reversed_window_is_invalid() {
        let graph = two_cycle_graph();
        assert!(matches!(
            graph.living(4, 3),
            Err(MatchingError::InvalidArgument(_))
        ));
    }

    #[test]
    fn validate_cycle_checks_wraparound_edge() {
        let mut graph = two_cycle_graph();
        assert!(graph.validate_cycle(&[0, 1]));
        assert!(!graph.validate_cycle(&[0, 1, 2]));
        assert!(!graph.validate_cycle(&[]));
        graph.connect(1, 2, 1.0).expect("edge 1->2");
        assert!(!graph.validate_cycle(&[0, 1, 2]));
        graph.connect(2, 0, 1.0).expect("edge 2->0");
        assert!(graph.validate_cycle(&[0, 1, 2]));
    }

    #[test]
    fn connect_rejects_self_loops_unknown_ids_and_ndd_targets() {
        let mut graph = two_cycle_graph();
        let ndd = graph.insert_entities([EntityAttributes::ndd(0, 9)])[0];
        assert!(graph.connect(0, 0, 1.0).is_err());
        assert!(graph.connect(0, 99, 1.0).is_err());
        assert!(graph.connect(0, ndd, 1.0).is_err());
        assert!(graph.connect(ndd, 0, 1.0).is_ok());
        assert!(graph.validate_chain(&[ndd, 0, 1]));
        assert!(!graph.validate_chain(&[0, 1]));
    }

    #[test]
    fn erase_from_drops_late_entities_and_records() {
        let mut graph = two_cycle_graph();
        graph.mark_removed(1, &[0]).expect("mark");
        graph.mark_removed(8, &[2]).expect("mark");
        graph.erase_from(7);
        assert_eq!(graph.len(), 2);
        assert!(graph.entity(2).is_none());
        assert!(graph.removals().removed_at(8).next().is_none());
        assert!(graph.removals().is_removed(0, 1));
    }

    #[test]
    fn repopulating_a_suffix_is_deterministic() {
        let generator = SaidmanGenerator::new(4.0, 0.1, 0.1).expect("generator");
        let mut graph = ExchangeGraph::generate(generator, 20, 3).expect("generate");
        graph.populate(10, 20, 99).expect("first suffix");
        let ids_first: Vec<_> = graph.living(0, 20).expect("living");
        let edges_first = graph.edge_count();

        graph.populate(10, 20, 99).expect("second suffix");
        assert_eq!(graph.living(0, 20).expect("living"), ids_first);
        assert_eq!(graph.edge_count(), edges_first);
    }

    #[test]
    fn stale_commit_is_rejected() {
        let mut graph = two_cycle_graph();
        let mut pending = graph.fork_removals();
        pending.state.mark(0, [0]);
        graph.mark_removed(0, &[1]).expect("mark");
        assert!(graph.commit_removals(pending).is_err());

        let mut fresh = graph.fork_removals();
        fresh.state.mark(2, [0]);
        graph.commit_removals(fresh).expect("commit");
        assert!(graph.removals().is_removed(0, 2));
    }
}
