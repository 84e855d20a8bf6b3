use crate::topology::EntityKind;
use serde::{Deserialize, Serialize};

/// Configuration for the liveness prober
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Run the periodic loop
    pub enabled: bool,

    /// Interval between rounds (seconds)
    pub interval_seconds: u64,

    /// Delay before the first round after startup (seconds)
    pub initial_delay_seconds: u64,

    /// Per-probe timeout (milliseconds)
    pub timeout_ms: u64,

    /// Maximum probes in flight at once
    pub max_concurrency: usize,

    /// Host to probe; `{id}` is replaced by the entity id
    pub hostname_template: String,

    /// Kinds to probe (empty = all). Port ids contain a '/' and make no
    /// usable hostname, so only tiles are probed by default.
    pub kinds: Vec<EntityKind>,
}

impl ProbeConfig {
    pub fn hostname_for(&self, entity_id: &str) -> String {
        self.hostname_template.replace("{id}", entity_id)
    }

    pub fn probes_kind(&self, kind: EntityKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 100,
            initial_delay_seconds: 1,
            timeout_ms: 1000,
            max_concurrency: 32,
            hostname_template: "rpi-{id}.local".to_string(),
            kinds: vec![EntityKind::Tile],
        }
    }
}
