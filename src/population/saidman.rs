use indexmap::IndexMap;
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, RngCore};

use crate::error::{MatchingError, Result};
use crate::graph::model::{Entity, EntityAttributes, EntityId, Time};
use crate::population::{
    ArrivalProcess, PopulationGenerator, blood_sampler, draw_blood, draw_gender,
    structurally_compatible,
};

pub const PRA_FREQ: [f64; 3] = [0.7019, 0.2, 0.0981];
pub const CROSS_MATCH_PROB: [f64; 3] = [0.05, 0.45, 0.9];

/// Saidman et al. pool: ABO compatibility plus a PRA-driven crossmatch lottery.
#[derive(Debug, Clone)]
pub struct SaidmanGenerator {
    arrivals: ArrivalProcess,
}

impl SaidmanGenerator {
    pub fn new(entry_rate: f64, death_rate: f64, fraction_ndd: f64) -> Result<Self> {
        Ok(Self {
            arrivals: ArrivalProcess::new(entry_rate, death_rate, fraction_ndd)?,
        })
    }

    pub fn arrivals(&self) -> &ArrivalProcess {
        &self.arrivals
    }
}

impl PopulationGenerator for SaidmanGenerator {
    fn label(&self) -> &str {
        "RSU"
    }

    fn draw_node_features(
        &self,
        rng: &mut dyn RngCore,
        t_begin: Time,
        t_end: Time,
    ) -> Result<Vec<EntityAttributes>> {
        let blood = blood_sampler()?;
        let pra = WeightedIndex::new(PRA_FREQ)
            .map_err(|err| MatchingError::invalid(format!("PRA frequencies: {err}")))?;

        let arrivals = self.arrivals.draw(rng, t_begin, t_end)?;
        let mut drawn = Vec::with_capacity(arrivals.len());
        for arrival in arrivals {
            let patient_blood = draw_blood(&blood, rng);
            let donor_blood = draw_blood(&blood, rng);
            let gender = draw_gender(rng);
            let pra_class = pra.sample(rng);
            let mut extra = IndexMap::new();
            extra.insert("pra_class".to_string(), serde_json::Value::from(pra_class));
            drawn.push(EntityAttributes {
                entry: arrival.entry,
                death: arrival.death,
                patient_blood,
                donor_blood,
                gender,
                cross_match_prob: CROSS_MATCH_PROB[pra_class],
                ndd: arrival.ndd,
                extra,
            });
        }
        Ok(drawn)
    }

    fn draw_edges(
        &self,
        rng: &mut dyn RngCore,
        sources: &[&Entity],
        targets: &[&Entity],
    ) -> Vec<(EntityId, EntityId)> {
        let mut edges = Vec::new();
        for source in sources {
            for target in targets {
                if !structurally_compatible(source, target) {
                    continue;
                }
                // The lottery runs on the donating side's probability.
                let cross_match_negative =
                    rng.r#gen::<f64>() > source.attributes.cross_match_prob;
                if !cross_match_negative {
                    continue;
                }
                if source
                    .attributes
                    .donor_blood
                    .can_donate_to(target.attributes.patient_blood)
                {
                    edges.push((source.id, target.id));
                }
            }
        }
        edges
    }
}
