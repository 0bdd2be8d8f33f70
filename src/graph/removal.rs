use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::graph::model::{EntityId, Time};

/// Entities taken out of the pool by matching, keyed by the time they left.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalState {
    records: BTreeMap<Time, BTreeSet<EntityId>>,
    version: u64,
}

impl RemovalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_empty(&self) -> bool {
        self.records.values().all(BTreeSet::is_empty)
    }

    pub fn mark<I>(&mut self, t: Time, ids: I)
    where
        I: IntoIterator<Item = EntityId>,
    {
        self.records.entry(t).or_default().extend(ids);
        self.version += 1;
    }

    pub fn removed_as_of(&self, t: Time) -> HashSet<EntityId> {
        self.records
            .range(..=t)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }

    pub fn is_removed(&self, id: EntityId, t: Time) -> bool {
        self.records.range(..=t).any(|(_, ids)| ids.contains(&id))
    }

    pub fn removed_at(&self, t: Time) -> impl Iterator<Item = EntityId> + '_ {
        self.records.get(&t).into_iter().flatten().copied()
    }

    pub fn clear_after(&mut self, t: Time) {
        if t == Time::MAX {
            return;
        }
        let dropped = self.records.split_off(&(t + 1));
        if !dropped.is_empty() {
            self.version += 1;
        }
    }

    pub fn total_removed(&self) -> usize {
        self.records.values().map(BTreeSet::len).sum()
    }
}

#[derive(Debug, Clone)]
pub struct PendingRemovals {
    pub base_version: u64,
    pub state: RemovalState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removal_applies_from_its_time_onward() {
        let mut state = RemovalState::new();
        state.mark(3, [7, 8]);
        assert!(!state.is_removed(7, 2));
        assert!(state.is_removed(7, 3));
        assert!(state.is_removed(8, 10));
        assert_eq!(state.removed_as_of(2).len(), 0);
        assert_eq!(state.removed_as_of(5).len(), 2);
    }

    #[test]
    fn clear_after_keeps_boundary_records() {
        let mut state = RemovalState::new();
        state.mark(1, [1]);
        state.mark(2, [2]);
        state.mark(4, [4]);
        let before = state.version();
        state.clear_after(2);
        assert!(state.version() > before);
        assert_eq!(state.total_removed(), 2);
        assert_eq!(state.removed_at(2).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn every_mark_bumps_version() {
        let mut state = RemovalState::new();
        state.mark(0, []);
        state.mark(0, [1]);
        assert_eq!(state.version(), 2);
    }
}
