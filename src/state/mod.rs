// Entity store and per-entity merge

mod engine;
mod entity;

pub use engine::{EntityStore, GroupIndex, StoreError};
pub use entity::{Entity, EntityUpdate, ExperimentStatus, FieldValue, GroupType, MergeOutcome};

#[cfg(test)]
mod tests;
