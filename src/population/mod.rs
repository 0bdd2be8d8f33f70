//! Population generators: the source of entrants and of their compatibility
//! edges. The exchange graph only relies on the [`PopulationGenerator`]
//! contract, so pools with different distributions are interchangeable.

pub mod abo;
pub mod saidman;

use rand::RngCore;
use rand::distributions::{Bernoulli, Distribution, WeightedIndex};
use rand_distr::{Geometric, Poisson};

use crate::error::{MatchingError, Result};
use crate::graph::model::{BloodType, Entity, EntityAttributes, EntityId, Gender, Time};

pub use abo::AboGenerator;
pub use saidman::SaidmanGenerator;

pub const BLOOD_FREQ: [f64; 4] = [0.4814, 0.3373, 0.1428, 0.0385];
pub const FEMALE_FREQ: f64 = 0.4090;

pub trait PopulationGenerator: Send + Sync {
    fn label(&self) -> &str;

    /// Attributes for every entity entering during `[t_begin, t_end)`,
    /// ordered by entry time.
    fn draw_node_features(
        &self,
        rng: &mut dyn RngCore,
        t_begin: Time,
        t_end: Time,
    ) -> Result<Vec<EntityAttributes>>;

    fn draw_edges(
        &self,
        rng: &mut dyn RngCore,
        sources: &[&Entity],
        targets: &[&Entity],
    ) -> Vec<(EntityId, EntityId)>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StaticPool;

impl PopulationGenerator for StaticPool {
    fn label(&self) -> &str {
        "STATIC"
    }

    fn draw_node_features(
        &self,
        _rng: &mut dyn RngCore,
        _t_begin: Time,
        _t_end: Time,
    ) -> Result<Vec<EntityAttributes>> {
        Ok(Vec::new())
    }

    fn draw_edges(
        &self,
        _rng: &mut dyn RngCore,
        _sources: &[&Entity],
        _targets: &[&Entity],
    ) -> Vec<(EntityId, EntityId)> {
        Vec::new()
    }
}

/// Poisson arrivals per period, geometric sojourns, Bernoulli NDD share.
#[derive(Debug, Clone, Copy)]
pub struct ArrivalProcess {
    pub entry_rate: f64,
    pub death_rate: f64,
    pub fraction_ndd: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct Arrival {
    pub entry: Time,
    pub death: Time,
    pub ndd: bool,
}

impl ArrivalProcess {
    pub fn new(entry_rate: f64, death_rate: f64, fraction_ndd: f64) -> Result<Self> {
        if !entry_rate.is_finite() || entry_rate < 0.0 {
            return Err(MatchingError::invalid(format!(
                "entry_rate must be a non-negative number, got {entry_rate}"
            )));
        }
        if !(death_rate > 0.0 && death_rate <= 1.0) {
            return Err(MatchingError::invalid(format!(
                "death_rate must lie in (0, 1], got {death_rate}"
            )));
        }
        if !(0.0..=1.0).contains(&fraction_ndd) {
            return Err(MatchingError::invalid(format!(
                "fraction_ndd must lie in [0, 1], got {fraction_ndd}"
            )));
        }
        Ok(Self {
            entry_rate,
            death_rate,
            fraction_ndd,
        })
    }

    pub fn draw(&self, rng: &mut dyn RngCore, t_begin: Time, t_end: Time) -> Result<Vec<Arrival>> {
        let sojourn = Geometric::new(self.death_rate)
            .map_err(|err| MatchingError::invalid(format!("death_rate: {err}")))?;
        let ndd = Bernoulli::new(self.fraction_ndd)
            .map_err(|err| MatchingError::invalid(format!("fraction_ndd: {err}")))?;
        let arrivals = if self.entry_rate > 0.0 {
            Some(
                Poisson::new(self.entry_rate)
                    .map_err(|err| MatchingError::invalid(format!("entry_rate: {err}")))?,
            )
        } else {
            None
        };

        let mut drawn = Vec::new();
        for entry in t_begin..t_end {
            let count = match &arrivals {
                Some(poisson) => {
                    let sample: f64 = poisson.sample(rng);
                    sample as usize
                }
                None => 0,
            };
            for _ in 0..count {
                // Geometric counts failures; the sojourn counts the trial that ends it too.
                let failures = sojourn.sample(rng);
                let stay = Time::try_from(failures.saturating_add(1)).unwrap_or(Time::MAX);
                drawn.push(Arrival {
                    entry,
                    death: entry.saturating_add(stay),
                    ndd: ndd.sample(rng),
                });
            }
        }
        Ok(drawn)
    }
}

pub(crate) fn blood_sampler() -> Result<WeightedIndex<f64>> {
    WeightedIndex::new(BLOOD_FREQ)
        .map_err(|err| MatchingError::invalid(format!("blood type frequencies: {err}")))
}

pub(crate) fn draw_blood(sampler: &WeightedIndex<f64>, rng: &mut dyn RngCore) -> BloodType {
    BloodType::ALL[sampler.sample(rng)]
}

pub(crate) fn draw_gender(rng: &mut dyn RngCore) -> Gender {
    let female = Bernoulli::new(FEMALE_FREQ).map_or(false, |dist| dist.sample(rng));
    if female { Gender::Female } else { Gender::Male }
}

pub(crate) fn structurally_compatible(source: &Entity, target: &Entity) -> bool {
    source.id != target.id
        && !target.is_ndd()
        && source.attributes.overlaps(&target.attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn arrivals_are_ordered_and_outlive_entry() {
        let process = ArrivalProcess::new(4.0, 0.2, 0.1).expect("valid process");
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(11);
        let arrivals = process.draw(&mut rng, 5, 25).expect("draw arrivals");
        assert!(!arrivals.is_empty());
        assert!(arrivals.windows(2).all(|w| w[0].entry <= w[1].entry));
        for arrival in &arrivals {
            assert!((5..25).contains(&arrival.entry));
            assert!(arrival.death > arrival.entry);
        }
    }

    #[test]
    fn zero_entry_rate_draws_nobody() {
        let process = ArrivalProcess::new(0.0, 0.5, 0.0).expect("valid process");
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        assert!(process.draw(&mut rng, 0, 100).expect("draw").is_empty());
    }

    #[test]
    fn out_of_range_rates_are_rejected() {
        assert!(matches!(
            ArrivalProcess::new(1.0, 0.0, 0.0),
            Err(MatchingError::InvalidArgument(_))
        ));
        assert!(matches!(
            ArrivalProcess::new(-1.0, 0.5, 0.0),
            Err(MatchingError::InvalidArgument(_))
        ));
        assert!(matches!(
            ArrivalProcess::new(1.0, 0.5, 1.5),
            Err(MatchingError::InvalidArgument(_))
        ));
    }
}
