// Ingest routing
//
// Transport callbacks never touch the store directly. They wrap each decoded
// record in an `InboundMessage` and push it onto a bounded queue; a single
// `IngestRouter` loop drains the queue and performs the merges.

mod router;

pub use router::{IngestError, IngestRouter, RouteOutcome};

use crate::topology::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc;


/// Named inbound channels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    Tile,
    Midspan,
    MidspanPort,
    Pdu,
    PduPort,
    Server,
    Experiment,
    ControlAck,
}

impl Channel {
    pub const ALL: [Channel; 8] = [
        Channel::Tile,
        Channel::Midspan,
        Channel::MidspanPort,
        Channel::Pdu,
        Channel::PduPort,
        Channel::Server,
        Channel::Experiment,
        Channel::ControlAck,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Tile => "tile",
            Channel::Midspan => "midspan",
            Channel::MidspanPort => "midspan-port",
            Channel::Pdu => "pdu",
            Channel::PduPort => "pdu-port",
            Channel::Server => "server",
            Channel::Experiment => "experiment",
            Channel::ControlAck => "control-ack",
        }
    }

    /// Entity kind served by a telemetry channel (None for non-entity channels)
    pub fn target_kind(&self) -> Option<EntityKind> {
        match self {
            Channel::Tile => Some(EntityKind::Tile),
            Channel::Midspan => Some(EntityKind::Midspan),
            Channel::MidspanPort => Some(EntityKind::MidspanPort),
            Channel::Pdu => Some(EntityKind::Pdu),
            Channel::PduPort => Some(EntityKind::PduPort),
            Channel::Server => Some(EntityKind::Server),
            Channel::Experiment | Channel::ControlAck => None,
        }
    }

    /// Whether messages on this channel address a port of a device
    pub fn is_port_channel(&self) -> bool {
        matches!(self, Channel::MidspanPort | Channel::PduPort)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded record delivered on a channel
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub channel: Channel,
    pub payload: Value,
    /// Wall-clock receipt time; used as the observation timestamp
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Wrap a payload received now
    pub fn new(channel: Channel, payload: Value) -> Self {
        Self::at(channel, payload, Utc::now())
    }

    pub fn at(channel: Channel, payload: Value, received_at: DateTime<Utc>) -> Self {
        Self {
            channel,
            payload,
            received_at,
        }
    }
}

/// Create the bounded ingest queue
pub fn ingest_queue(capacity: usize) -> (mpsc::Sender<InboundMessage>, mpsc::Receiver<InboundMessage>) {
    mpsc::channel(capacity.max(1))
}
