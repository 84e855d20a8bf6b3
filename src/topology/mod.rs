// Static topology: the full entity list with group membership
//
// Loaded once at startup. Any problem here is fatal because the engine has
// nothing to operate on without it.

use crate::identity::canonical_id;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;


/// Kind of managed device
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Tile,
    Midspan,
    MidspanPort,
    Pdu,
    PduPort,
    Server,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Tile,
        EntityKind::Midspan,
        EntityKind::MidspanPort,
        EntityKind::Pdu,
        EntityKind::PduPort,
        EntityKind::Server,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Tile => "tile",
            EntityKind::Midspan => "midspan",
            EntityKind::MidspanPort => "midspan-port",
            EntityKind::Pdu => "pdu",
            EntityKind::PduPort => "pdu-port",
            EntityKind::Server => "server",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `[[entity]]` entry of the topology file
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TopologyEntry {
    pub id: String,
    pub kind: EntityKind,
    #[serde(default)]
    pub walls: Vec<String>,
    #[serde(default)]
    pub segments: Vec<String>,
}

/// Validated topology with canonical ids
#[derive(Clone, Debug)]
pub struct Topology {
    entries: Vec<TopologyEntry>,
}

#[derive(Deserialize)]
struct TopologyFile {
    #[serde(default)]
    entity: Vec<TopologyEntry>,
}

/// Topology load errors (all fatal at startup)
#[derive(Debug)]
pub enum TopologyError {
    Io(String),
    Parse(String),
    Empty,
    EmptyId,
    DuplicateId(String),
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyError::Io(e) => write!(f, "failed to read topology: {}", e),
            TopologyError::Parse(e) => write!(f, "malformed topology: {}", e),
            TopologyError::Empty => write!(f, "topology contains no entities"),
            TopologyError::EmptyId => write!(f, "topology entry with empty id"),
            TopologyError::DuplicateId(id) => {
                write!(f, "duplicate entity id '{}' after normalization", id)
            }
        }
    }
}

impl std::error::Error for TopologyError {}

impl Topology {
    /// Validate raw entries: canonicalize ids, reject empty input, empty ids
    /// and ids that collide after normalization.
    pub fn from_entries(entries: Vec<TopologyEntry>) -> Result<Self, TopologyError> {
        if entries.is_empty() {
            return Err(TopologyError::Empty);
        }

        let mut seen = HashSet::with_capacity(entries.len());
        let mut canonical = Vec::with_capacity(entries.len());

        for mut entry in entries {
            let raw = entry.id.trim();
            if raw.is_empty() {
                return Err(TopologyError::EmptyId);
            }

            entry.id = canonical_id(raw);
            if !seen.insert(entry.id.clone()) {
                return Err(TopologyError::DuplicateId(entry.id));
            }

            entry.walls.sort();
            entry.walls.dedup();
            entry.segments.sort();
            entry.segments.dedup();

            canonical.push(entry);
        }

        Ok(Self { entries: canonical })
    }

    /// Parse topology from TOML text
    pub fn from_toml(text: &str) -> Result<Self, TopologyError> {
        let file: TopologyFile =
            toml::from_str(text).map_err(|e| TopologyError::Parse(e.to_string()))?;
        Self::from_entries(file.entity)
    }

    pub fn entries(&self) -> &[TopologyEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Load topology from a TOML file
pub fn load_topology(path: &Path) -> Result<Topology, TopologyError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| TopologyError::Io(e.to_string()))?;
    Topology::from_toml(&contents)
}
