use crate::reconcile::{Status, StatusCandidate, StatusSource};
use crate::state::entity::{
    Entity, EntityUpdate, ExperimentStatus, FieldValue, GroupType, MergeOutcome,
};
use crate::topology::{EntityKind, Topology};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::RwLock;
use tracing::{debug, info};

/// Merge errors
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The id is not part of the topology
    NoSuchEntity(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NoSuchEntity(id) => write!(f, "no such entity '{}'", id),
        }
    }
}

impl std::error::Error for StoreError {}

/// Group name -> sorted member ids
pub type GroupIndex = BTreeMap<String, Vec<String>>;

/// Entity store holding the reconciled per-entity view of the fleet.
///
/// Entities exist only if the topology named them; `merge` never creates
/// one. All mutation goes through `merge`, which locks just the shard that
/// owns the entity, so unrelated entities update independently while updates
/// to one entity are serialized.
pub struct EntityStore {
    entities: DashMap<String, Entity>,

    /// Built once from the topology and never mutated afterwards
    walls: GroupIndex,
    segments: GroupIndex,

    experiment: RwLock<ExperimentStatus>,
}

impl EntityStore {
    /// Create the store with every topology entity in its initial state
    pub fn from_topology(topology: &Topology) -> Self {
        let entities = DashMap::with_capacity(topology.len());
        let mut walls = GroupIndex::new();
        let mut segments = GroupIndex::new();

        for entry in topology.entries() {
            for wall in &entry.walls {
                walls.entry(wall.clone()).or_default().push(entry.id.clone());
            }
            for segment in &entry.segments {
                segments
                    .entry(segment.clone())
                    .or_default()
                    .push(entry.id.clone());
            }
            entities.insert(entry.id.clone(), Entity::from_topology(entry));
        }

        for members in walls.values_mut().chain(segments.values_mut()) {
            members.sort();
        }

        info!(
            entities = entities.len(),
            walls = walls.len(),
            segments = segments.len(),
            "Entity store loaded from topology"
        );

        Self {
            entities,
            walls,
            segments,
            experiment: RwLock::new(ExperimentStatus::default()),
        }
    }

    /// Merge a partial update into one entity (core state mutation).
    ///
    /// Fields overwrite by key and leave other fields untouched. A supplied
    /// status replaces the stored one only if `at` is not older than the
    /// stored observation; a stale status is dropped silently while the
    /// fields of the same update still apply.
    pub fn merge(
        &self,
        entity_id: &str,
        update: EntityUpdate,
        at: DateTime<Utc>,
    ) -> Result<MergeOutcome, StoreError> {
        let mut entity = self
            .entities
            .get_mut(entity_id)
            .ok_or_else(|| StoreError::NoSuchEntity(entity_id.to_string()))?;

        let fields_updated = update.fields.len();
        for (name, value) in update.fields {
            entity.fields.insert(
                name,
                FieldValue {
                    value,
                    observed_at: at,
                },
            );
        }

        let status_applied = match update.status {
            Some(candidate) => {
                let applied = entity.status.apply(candidate, at);
                if !applied {
                    debug!(
                        entity_id = %entity_id,
                        candidate = %candidate.value,
                        source = ?candidate.source,
                        "Discarding stale status update"
                    );
                }
                applied
            }
            None => false,
        };

        entity.last_received = Some(match entity.last_received {
            Some(previous) if previous > at => previous,
            _ => at,
        });

        Ok(MergeOutcome {
            fields_updated,
            status_applied,
        })
    }

    /// Record an operator-decided status (e.g., deactivated after shutdown)
    pub fn set_manual_status(
        &self,
        entity_id: &str,
        status: Status,
        at: DateTime<Utc>,
    ) -> Result<MergeOutcome, StoreError> {
        info!(entity_id = %entity_id, status = %status, "Manual status change");
        self.merge(
            entity_id,
            EntityUpdate::status_only(StatusCandidate::new(status, StatusSource::Manual)),
            at,
        )
    }

    /// Get a consistent snapshot of one entity
    pub fn get(&self, entity_id: &str) -> Option<Entity> {
        self.entities.get(entity_id).map(|e| e.clone())
    }

    /// Snapshots of all entities, sorted by id
    pub fn all(&self) -> Vec<Entity> {
        let mut all: Vec<Entity> = self.entities.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Current entity id set, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entities.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.entities.contains_key(entity_id)
    }

    pub fn kind_of(&self, entity_id: &str) -> Option<EntityKind> {
        self.entities.get(entity_id).map(|e| e.kind)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Static membership index for a group type
    pub fn group_index(&self, group_type: GroupType) -> &GroupIndex {
        match group_type {
            GroupType::Walls => &self.walls,
            GroupType::Segments => &self.segments,
        }
    }

    pub fn experiment(&self) -> ExperimentStatus {
        self.experiment
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set_experiment(&self, status: ExperimentStatus) {
        info!(active = status.active, message = %status.message, "Experiment status updated");
        *self
            .experiment
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = status;
    }
}
