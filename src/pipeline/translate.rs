use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::cover::Cover;
use crate::error::{MatchingError, Result};
use crate::graph::EntityId;
use crate::pipeline::extract::DenseSnapshot;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub objective: f64,
    /// Cycle members first, then each chain's NDD followed by its pairs.
    pub matched: Vec<EntityId>,
    pub cycles: Vec<Vec<EntityId>>,
    pub chains: Vec<Vec<EntityId>>,
}

impl MatchResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn matched_pairs(&self) -> usize {
        self.cycles.iter().map(Vec::len).sum::<usize>()
            + self
                .chains
                .iter()
                .map(|chain| chain.len().saturating_sub(1))
                .sum::<usize>()
    }
}

pub struct ResultTranslator;

impl ResultTranslator {
    pub fn translate(snapshot: &DenseSnapshot, cover: &Cover) -> Result<MatchResult> {
        let mut seen = HashSet::new();
        let mut matched = Vec::with_capacity(cover.matched_pairs() + cover.chains.len());

        let mut cycles = Vec::with_capacity(cover.cycles.len());
        for cycle in &cover.cycles {
            let ids = cycle
                .iter()
                .map(|&position| lookup(snapshot.pair_id(position), "pair", position))
                .collect::<Result<Vec<_>>>()?;
            record(&mut seen, &mut matched, &ids)?;
            cycles.push(ids);
        }

        let mut chains = Vec::with_capacity(cover.chains.len());
        for chain in &cover.chains {
            let mut ids = Vec::with_capacity(chain.pairs.len() + 1);
            ids.push(lookup(snapshot.ndd_id(chain.ndd), "NDD", chain.ndd)?);
            for &position in &chain.pairs {
                ids.push(lookup(snapshot.pair_id(position), "pair", position)?);
            }
            record(&mut seen, &mut matched, &ids)?;
            chains.push(ids);
        }

        Ok(MatchResult {
            objective: cover.objective,
            matched,
            cycles,
            chains,
        })
    }
}

fn lookup(id: Option<EntityId>, kind: &str, position: usize) -> Result<EntityId> {
    id.ok_or_else(|| {
        MatchingError::invariant(format!(
            "Cover refers to {kind} index {position} outside the snapshot"
        ))
    })
}

fn record(
    seen: &mut HashSet<EntityId>,
    matched: &mut Vec<EntityId>,
    ids: &[EntityId],
) -> Result<()> {
    for &id in ids {
        if !seen.insert(id) {
            return Err(MatchingError::invariant(format!(
                "Entity {id} matched more than once"
            )));
        }
        matched.push(id);
    }
    Ok(())
}
