use crate::reconcile::{StatusCandidate, StatusObservation};
use crate::topology::{EntityKind, TopologyEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// A telemetry field value and when it was observed
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub value: Value,
    pub observed_at: DateTime<Utc>,
}

/// Entity is one managed device or port in the fleet
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Entity {
    /// Canonical identifier (e.g., "A01", "Midspan-1/3")
    pub id: String,

    pub kind: EntityKind,

    /// Wall membership, fixed at topology load
    pub walls: BTreeSet<String>,

    /// Segment membership, fixed at topology load
    pub segments: BTreeSet<String>,

    /// Last-write-wins per field
    pub fields: HashMap<String, FieldValue>,

    pub status: StatusObservation,

    /// Most recent merge of any kind
    pub last_received: Option<DateTime<Utc>>,
}

impl Entity {
    pub(crate) fn from_topology(entry: &TopologyEntry) -> Self {
        Self {
            id: entry.id.clone(),
            kind: entry.kind,
            walls: entry.walls.iter().cloned().collect(),
            segments: entry.segments.iter().cloned().collect(),
            fields: HashMap::new(),
            status: StatusObservation::initial(),
            last_received: None,
        }
    }

    /// Membership set for a group type
    pub fn groups(&self, group_type: GroupType) -> &BTreeSet<String> {
        match group_type {
            GroupType::Walls => &self.walls,
            GroupType::Segments => &self.segments,
        }
    }

    /// Current value of a field, if any
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).map(|f| &f.value)
    }
}

/// The two independent group dimensions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupType {
    Walls,
    Segments,
}

impl GroupType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "walls" => Some(GroupType::Walls),
            "segments" => Some(GroupType::Segments),
            _ => None,
        }
    }
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupType::Walls => f.write_str("walls"),
            GroupType::Segments => f.write_str("segments"),
        }
    }
}

/// Partial update applied by `EntityStore::merge`
#[derive(Clone, Debug, Default)]
pub struct EntityUpdate {
    pub fields: Map<String, Value>,
    pub status: Option<StatusCandidate>,
}

impl EntityUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_only(candidate: StatusCandidate) -> Self {
        Self {
            fields: Map::new(),
            status: Some(candidate),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn with_status(mut self, candidate: StatusCandidate) -> Self {
        self.status = Some(candidate);
        self
    }
}

/// Result of a successful merge
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeOutcome {
    pub fields_updated: usize,
    /// False when no status was supplied or the supplied one was stale
    pub status_applied: bool,
}

/// Engine-wide experiment banner state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExperimentStatus {
    pub active: bool,
    pub message: String,
    pub observed_at: Option<DateTime<Utc>>,
}

impl Default for ExperimentStatus {
    fn default() -> Self {
        Self {
            active: false,
            message: String::new(),
            observed_at: None,
        }
    }
}
