use std::fmt;

use indexmap::IndexMap;
use petgraph::stable_graph::StableDiGraph;
use serde::{Deserialize, Serialize};

pub type Time = u32;
pub type EntityId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BloodType {
    O,
    A,
    B,
    AB,
}

impl BloodType {
    pub const ALL: [BloodType; 4] = [BloodType::O, BloodType::A, BloodType::B, BloodType::AB];

    pub fn can_donate_to(self, recipient: BloodType) -> bool {
        self == BloodType::O || recipient == BloodType::AB || self == recipient
    }
}

impl fmt::Display for BloodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BloodType::O => "O",
            BloodType::A => "A",
            BloodType::B => "B",
            BloodType::AB => "AB",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

/// Attributes drawn for a new entrant. Compatibility is decided from these;
/// the optimizer never looks at them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityAttributes {
    pub entry: Time,
    pub death: Time,
    pub patient_blood: BloodType,
    pub donor_blood: BloodType,
    pub gender: Gender,
    pub cross_match_prob: f64,
    pub ndd: bool,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub extra: IndexMap<String, serde_json::Value>,
}

impl EntityAttributes {
    pub fn pair(entry: Time, death: Time) -> Self {
        Self {
            entry,
            death: death.max(entry),
            patient_blood: BloodType::O,
            donor_blood: BloodType::O,
            gender: Gender::Male,
            cross_match_prob: 0.0,
            ndd: false,
            extra: IndexMap::new(),
        }
    }

    pub fn ndd(entry: Time, death: Time) -> Self {
        Self {
            ndd: true,
            ..Self::pair(entry, death)
        }
    }

    pub fn with_blood(mut self, patient: BloodType, donor: BloodType) -> Self {
        self.patient_blood = patient;
        self.donor_blood = donor;
        self
    }

    pub fn overlaps(&self, other: &EntityAttributes) -> bool {
        self.entry <= other.death && self.death >= other.entry
    }

    pub fn alive_during(&self, t_begin: Time, t_end: Time) -> bool {
        self.entry <= t_end && self.death >= t_begin
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub id: EntityId,
    #[serde(flatten)]
    pub attributes: EntityAttributes,
}

impl Entity {
    pub fn is_ndd(&self) -> bool {
        self.attributes.ndd
    }

    pub fn entry(&self) -> Time {
        self.attributes.entry
    }

    pub fn death(&self) -> Time {
        self.attributes.death
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Compatibility {
    pub weight: f64,
}

impl Default for Compatibility {
    fn default() -> Self {
        Self { weight: 1.0 }
    }
}

pub type CompatibilityGraph = StableDiGraph<Entity, Compatibility>;
