//! Greedy-versus-hindsight comparison runs, the unit of work of the driver.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cover::{CoverBounds, Formulation};
use crate::error::{MatchingError, Result};
use crate::graph::{ExchangeGraph, Time};
use crate::pipeline::{EngineConfig, GreedyScheduler, MatchingEngine, greedy_ratio};
use crate::population::{AboGenerator, PopulationGenerator, SaidmanGenerator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    #[default]
    Saidman,
    Abo,
}

impl FromStr for PoolKind {
    type Err = MatchingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "saidman" | "rsu" => Ok(PoolKind::Saidman),
            "abo" => Ok(PoolKind::Abo),
            other => Err(MatchingError::invalid(format!("Unknown pool '{other}'"))),
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolKind::Saidman => f.write_str("saidman"),
            PoolKind::Abo => f.write_str("abo"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub pool: PoolKind,
    pub entry_rate: f64,
    pub death_rate: f64,
    pub time_length: Time,
    pub fraction_ndd: f64,
    pub max_cycle: usize,
    pub max_chain: usize,
    pub formulation: Formulation,
    pub seed: Option<u64>,
    pub time_limit_secs: Option<f64>,
    pub replications: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            pool: PoolKind::Saidman,
            entry_rate: 5.0,
            death_rate: 0.1,
            time_length: 100,
            fraction_ndd: 0.1,
            max_cycle: 0,
            max_chain: 3,
            formulation: Formulation::PositionIndexed,
            seed: None,
            time_limit_secs: None,
            replications: 1,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.entry_rate.is_finite() || self.entry_rate < 0.0 {
            return Err(MatchingError::invalid(format!(
                "entry_rate must be a non-negative number, got {}",
                self.entry_rate
            )));
        }
        if !(self.death_rate > 0.0 && self.death_rate <= 1.0) {
            return Err(MatchingError::invalid(format!(
                "death_rate must lie in (0, 1], got {}",
                self.death_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.fraction_ndd) {
            return Err(MatchingError::invalid(format!(
                "fraction_ndd must lie in [0, 1], got {}",
                self.fraction_ndd
            )));
        }
        if let Some(secs) = self.time_limit_secs {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(MatchingError::invalid(format!(
                    "time_limit_secs must be positive, got {secs}"
                )));
            }
        }
        if self.replications == 0 {
            return Err(MatchingError::invalid("replications must be at least 1"));
        }
        Ok(())
    }

    pub fn bounds(&self) -> CoverBounds {
        CoverBounds::new(self.max_cycle, self.max_chain)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            formulation: self.formulation,
            bounds: self.bounds(),
            time_limit: self.time_limit_secs.map(Duration::from_secs_f64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRecord {
    pub pool_label: String,
    pub entry_rate: f64,
    pub death_rate: f64,
    pub time_length: Time,
    pub fraction_ndd: f64,
    pub max_cycle: usize,
    pub max_chain: usize,
    pub optimal_objective: f64,
    pub greedy_objective: f64,
    pub ratio: f64,
    pub wall_time: f64,
    pub seed: u64,
    pub formulation: Formulation,
}

impl ComparisonRecord {
    pub const CSV_HEADER: &'static str = concat!(
        "pool_label,entry_rate,death_rate,time_length,fraction_ndd,",
        "max_cycle,max_chain,optimal_objective,greedy_objective,ratio,wall_time"
    );

    pub fn to_csv_row(&self) -> String {
        [
            self.pool_label.clone(),
            self.entry_rate.to_string(),
            self.death_rate.to_string(),
            self.time_length.to_string(),
            self.fraction_ndd.to_string(),
            self.max_cycle.to_string(),
            self.max_chain.to_string(),
            self.optimal_objective.to_string(),
            self.greedy_objective.to_string(),
            self.ratio.to_string(),
            self.wall_time.to_string(),
        ]
        .join(",")
    }
}

/// Generate a pool over `[0, time_length)`, then compare the hindsight
/// optimum over the whole horizon with the period-by-period greedy policy.
pub fn run_comparison(config: &SimulationConfig) -> Result<ComparisonRecord> {
    config.validate()?;
    let seed = config.seed.unwrap_or_else(rand::random);
    match config.pool {
        PoolKind::Saidman => {
            let generator =
                SaidmanGenerator::new(config.entry_rate, config.death_rate, config.fraction_ndd)?;
            compare(generator, config, seed)
        }
        PoolKind::Abo => {
            let generator =
                AboGenerator::new(config.entry_rate, config.death_rate, config.fraction_ndd)?;
            compare(generator, config, seed)
        }
    }
}

fn compare<G: PopulationGenerator>(
    generator: G,
    config: &SimulationConfig,
    seed: u64,
) -> Result<ComparisonRecord> {
    let start = Instant::now();
    let graph = ExchangeGraph::generate(generator, config.time_length, seed)?;
    info!(
        "Pool {} (seed {}): {} entities, {} edges over {} periods",
        graph.generator().label(),
        seed,
        graph.len(),
        graph.edge_count(),
        config.time_length
    );

    let engine = MatchingEngine::new(config.engine_config());
    let optimal = engine.optimal(&graph, 0, config.time_length)?;
    info!("Optimal objective {:.3}", optimal.objective);

    let greedy = GreedyScheduler::new(&engine).run(&graph, 0, config.time_length)?;
    let ratio = greedy_ratio(greedy.objective, optimal.objective);

    Ok(ComparisonRecord {
        pool_label: graph.generator().label().to_string(),
        entry_rate: config.entry_rate,
        death_rate: config.death_rate,
        time_length: config.time_length,
        fraction_ndd: config.fraction_ndd,
        max_cycle: config.max_cycle,
        max_chain: config.max_chain,
        optimal_objective: optimal.objective,
        greedy_objective: greedy.objective,
        ratio,
        wall_time: start.elapsed().as_secs_f64(),
        seed,
        formulation: config.formulation,
    })
}

pub fn run_batch(config: &SimulationConfig) -> Result<Vec<ComparisonRecord>> {
    config.validate()?;
    let base = config.seed.unwrap_or_else(rand::random);
    (0..config.replications)
        .into_par_iter()
        .map(|i| {
            let replication = SimulationConfig {
                seed: Some(base.wrapping_add(i as u64)),
                ..config.clone()
            };
            run_comparison(&replication)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_with_defaults() {
        let parsed: SimulationConfig =
            serde_json::from_str(r#"{"pool": "abo", "max_chain": 2, "formulation": "ccf"}"#)
                .expect("config");
        assert_eq!(parsed.pool, PoolKind::Abo);
        assert_eq!(parsed.max_chain, 2);
        assert_eq!(parsed.formulation, Formulation::CycleChain);
        assert_eq!(parsed.entry_rate, SimulationConfig::default().entry_rate);
    }

    #[test]
    fn validate_rejects_out_of_range_rates() {
        let bad_death = SimulationConfig {
            death_rate: 0.0,
            ..SimulationConfig::default()
        };
        assert!(bad_death.validate().is_err());
        let bad_ndd = SimulationConfig {
            fraction_ndd: 1.5,
            ..SimulationConfig::default()
        };
        assert!(bad_ndd.validate().is_err());
        let bad_limit = SimulationConfig {
            time_limit_secs: Some(-1.0),
            ..SimulationConfig::default()
        };
        assert!(bad_limit.validate().is_err());
        assert!(SimulationConfig::default().validate().is_ok());
    }

    #[test]
    fn csv_row_has_one_field_per_header_column() {
        let record = ComparisonRecord {
            pool_label: "RSU".to_string(),
            entry_rate: 5.0,
            death_rate: 0.1,
            time_length: 10,
            fraction_ndd: 0.1,
            max_cycle: 0,
            max_chain: 3,
            optimal_objective: 0.0,
            greedy_objective: 0.0,
            ratio: f64::NAN,
            wall_time: 0.5,
            seed: 1,
            formulation: Formulation::PositionIndexed,
        };
        let row = record.to_csv_row();
        assert!(row.starts_with("RSU,5,0.1,10,0.1,0,3,"));
        assert!(row.contains("NaN"));
        assert_eq!(
            row.split(',').count(),
            ComparisonRecord::CSV_HEADER.split(',').count()
        );
    }

    #[test]
    fn small_comparison_keeps_greedy_below_optimum() {
        let config = SimulationConfig {
            entry_rate: 2.0,
            death_rate: 0.3,
            time_length: 6,
            max_cycle: 2,
            max_chain: 2,
            seed: Some(11),
            ..SimulationConfig::default()
        };
        let record = run_comparison(&config).expect("comparison");
        assert_eq!(record.seed, 11);
        assert_eq!(record.pool_label, "RSU");
        assert!(record.greedy_objective <= record.optimal_objective + 1e-6);
    }
}
