pub mod exchange;
pub mod export;
pub mod model;
pub mod removal;

pub use exchange::ExchangeGraph;
pub use export::{Adjacency, AdjacencyRepr, FeatureRepr, Features, PolicySnapshot};
pub use model::{BloodType, Entity, EntityAttributes, EntityId, Gender, Time};
pub use removal::{PendingRemovals, RemovalState};
