//! Adjacency and feature snapshots of the living set, in the shape a learned
//! matching policy consumes. Rows and columns follow ascending entity id.

use std::str::FromStr;

use indexmap::IndexMap;
use nalgebra::DMatrix;

use crate::error::{MatchingError, Result};
use crate::graph::exchange::ExchangeGraph;
use crate::graph::model::{BloodType, EntityId, Gender, Time};
use crate::population::PopulationGenerator;

pub const FEATURE_COLUMNS: [&str; 11] = [
    "p_o",
    "p_a",
    "p_b",
    "d_o",
    "d_a",
    "d_b",
    "waiting_time",
    "time_to_death",
    "is_female",
    "cross_match_prob",
    "is_ndd",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjacencyRepr {
    Dense,
    Sparse,
}

impl FromStr for AdjacencyRepr {
    type Err = MatchingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dense" | "numpy" => Ok(Self::Dense),
            "sparse" => Ok(Self::Sparse),
            other => Err(MatchingError::invalid(format!(
                "Unknown adjacency representation '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureRepr {
    Matrix,
    Labeled,
}

impl FromStr for FeatureRepr {
    type Err = MatchingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "matrix" | "numpy" => Ok(Self::Matrix),
            "labeled" | "pandas" => Ok(Self::Labeled),
            other => Err(MatchingError::invalid(format!(
                "Unknown feature representation '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Features {
    Matrix(DMatrix<f64>),
    Labeled(IndexMap<EntityId, IndexMap<&'static str, f64>>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Adjacency {
    Dense(DMatrix<f64>),
    /// Coordinate list of `(row, col, weight)` over an `order × order` matrix.
    Sparse {
        order: usize,
        entries: Vec<(usize, usize, f64)>,
    },
}

impl Adjacency {
    pub fn order(&self) -> usize {
        match self {
            Adjacency::Dense(matrix) => matrix.nrows(),
            Adjacency::Sparse { order, .. } => *order,
        }
    }

    pub fn nnz(&self) -> usize {
        match self {
            Adjacency::Dense(matrix) => matrix.iter().filter(|value| **value != 0.0).count(),
            Adjacency::Sparse { entries, .. } => entries.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PolicySnapshot {
    pub time: Time,
    pub ids: Vec<EntityId>,
    pub adjacency: Adjacency,
    pub features: DMatrix<f64>,
}

impl<G: PopulationGenerator> ExchangeGraph<G> {
    pub fn adjacency(&self, t: Time, repr: AdjacencyRepr) -> Result<Adjacency> {
        let ids = self.living(t, t)?;
        Ok(self.adjacency_over(&ids, repr))
    }

    pub fn features(&self, t: Time, repr: FeatureRepr) -> Result<Features> {
        let ids = self.living(t, t)?;
        let matrix = self.features_over(&ids, t);
        Ok(match repr {
            FeatureRepr::Matrix => Features::Matrix(matrix),
            FeatureRepr::Labeled => Features::Labeled(
                ids.iter()
                    .enumerate()
                    .map(|(row, id)| {
                        let columns = FEATURE_COLUMNS
                            .iter()
                            .enumerate()
                            .map(|(col, name)| (*name, matrix[(row, col)]))
                            .collect();
                        (*id, columns)
                    })
                    .collect(),
            ),
        })
    }

    pub fn policy_snapshot(&self, t: Time, repr: AdjacencyRepr) -> Result<PolicySnapshot> {
        let ids = self.living(t, t)?;
        Ok(PolicySnapshot {
            time: t,
            adjacency: self.adjacency_over(&ids, repr),
            features: self.features_over(&ids, t),
            ids,
        })
    }

    fn adjacency_over(&self, ids: &[EntityId], repr: AdjacencyRepr) -> Adjacency {
        let position: IndexMap<EntityId, usize> =
            ids.iter().enumerate().map(|(pos, id)| (*id, pos)).collect();
        let mut entries = Vec::new();
        for (row, id) in ids.iter().enumerate() {
            for (target, weight) in self.successors(*id) {
                if let Some(&col) = position.get(&target) {
                    entries.push((row, col, weight));
                }
            }
        }
        entries.sort_by_key(|&(row, col, _)| (row, col));

        match repr {
            AdjacencyRepr::Sparse => Adjacency::Sparse {
                order: ids.len(),
                entries,
            },
            AdjacencyRepr::Dense => {
                let mut matrix = DMatrix::zeros(ids.len(), ids.len());
                for (row, col, weight) in entries {
                    matrix[(row, col)] = weight;
                }
                Adjacency::Dense(matrix)
            }
        }
    }

    fn features_over(&self, ids: &[EntityId], t: Time) -> DMatrix<f64> {
        let mut matrix = DMatrix::zeros(ids.len(), FEATURE_COLUMNS.len());
        for (row, id) in ids.iter().enumerate() {
            let Some(entity) = self.entity(*id) else {
                continue;
            };
            let attrs = &entity.attributes;
            let flag = |value: bool| if value { 1.0 } else { 0.0 };
            matrix[(row, 0)] = flag(attrs.patient_blood == BloodType::O);
            matrix[(row, 1)] = flag(attrs.patient_blood == BloodType::A);
            matrix[(row, 2)] = flag(attrs.patient_blood == BloodType::B);
            matrix[(row, 3)] = flag(attrs.donor_blood == BloodType::O);
            matrix[(row, 4)] = flag(attrs.donor_blood == BloodType::A);
            matrix[(row, 5)] = flag(attrs.donor_blood == BloodType::B);
            matrix[(row, 6)] = f64::from(t) - f64::from(attrs.entry);
            matrix[(row, 7)] = f64::from(attrs.death) - f64::from(t);
            matrix[(row, 8)] = flag(attrs.gender == Gender::Female);
            matrix[(row, 9)] = attrs.cross_match_prob;
            matrix[(row, 10)] = flag(attrs.ndd);
        }
        matrix
    }
}
