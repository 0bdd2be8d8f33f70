use rand::{Rng, RngCore};

use crate::error::{MatchingError, Result};
use crate::graph::model::{Entity, EntityAttributes, EntityId, Time};
use crate::population::{
    ArrivalProcess, PopulationGenerator, blood_sampler, draw_blood, draw_gender,
    structurally_compatible,
};

/// Blood-type-only pool with one crossmatch probability for everybody.
#[derive(Debug, Clone)]
pub struct AboGenerator {
    arrivals: ArrivalProcess,
    cross_match_prob: f64,
}

impl AboGenerator {
    pub fn new(entry_rate: f64, death_rate: f64, fraction_ndd: f64) -> Result<Self> {
        Ok(Self {
            arrivals: ArrivalProcess::new(entry_rate, death_rate, fraction_ndd)?,
            cross_match_prob: 0.0,
        })
    }

    pub fn with_cross_match_prob(mut self, prob: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&prob) {
            return Err(MatchingError::invalid(format!(
                "cross_match_prob must lie in [0, 1], got {prob}"
            )));
        }
        self.cross_match_prob = prob;
        Ok(self)
    }
}

impl PopulationGenerator for AboGenerator {
    fn label(&self) -> &str {
        "ABO"
    }

    fn draw_node_features(
        &self,
        rng: &mut dyn RngCore,
        t_begin: Time,
        t_end: Time,
    ) -> Result<Vec<EntityAttributes>> {
        let blood = blood_sampler()?;
        let arrivals = self.arrivals.draw(rng, t_begin, t_end)?;
        Ok(arrivals
            .into_iter()
            .map(|arrival| {
                let patient_blood = draw_blood(&blood, rng);
                let donor_blood = draw_blood(&blood, rng);
                let mut attrs = if arrival.ndd {
                    EntityAttributes::ndd(arrival.entry, arrival.death)
                } else {
                    EntityAttributes::pair(arrival.entry, arrival.death)
                }
                .with_blood(patient_blood, donor_blood);
                attrs.gender = draw_gender(rng);
                attrs.cross_match_prob = self.cross_match_prob;
                attrs
            })
            .collect())
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
                if !structurally_compatible(source, target)
                    || !source
                        .attributes
                        .donor_blood
                        .can_donate_to(target.attributes.patient_blood)
                {
                    continue;
                }
                if self.cross_match_prob > 0.0 && rng.r#gen::<f64>() <= self.cross_match_prob {
                    continue;
                }
                edges.push((source.id, target.id));
            }
        }
        edges
    }
}
