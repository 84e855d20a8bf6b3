use super::{Channel, InboundMessage};
use crate::control::ControlService;
use crate::identity::{canonical_id, port_key};
use crate::reconcile::{parse_telemetry_status, StatusCandidate, StatusSource};
use crate::state::{EntityStore, EntityUpdate, ExperimentStatus, MergeOutcome, StoreError};
use crate::topology::EntityKind;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Reasons an inbound message is dropped
#[derive(Debug, Clone, PartialEq)]
pub enum IngestError {
    NotAnObject,
    MissingId,
    MissingPort,
    MissingRequestId,
    /// Canonical id has no entity in the topology
    UnmappedDevice { raw: String, entity_id: String },
    KindMismatch {
        entity_id: String,
        expected: EntityKind,
        actual: EntityKind,
    },
    ControlUnavailable,
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::NotAnObject => write!(f, "payload must be a JSON object"),
            IngestError::MissingId => write!(f, "payload has no usable 'id'"),
            IngestError::MissingPort => write!(f, "payload has no usable 'port'"),
            IngestError::MissingRequestId => write!(f, "ack has no 'request_id'"),
            IngestError::UnmappedDevice { raw, entity_id } => {
                write!(f, "no entity for id '{}' (normalized as '{}')", raw, entity_id)
            }
            IngestError::KindMismatch {
                entity_id,
                expected,
                actual,
            } => write!(
                f,
                "entity '{}' is a {}, channel serves {}",
                entity_id, actual, expected
            ),
            IngestError::ControlUnavailable => write!(f, "control channel not configured"),
        }
    }
}

impl std::error::Error for IngestError {}

/// What a successfully routed message did
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Merged {
        entity_id: String,
        outcome: MergeOutcome,
    },
    Experiment(ExperimentStatus),
    /// Whether the ack matched a pending request
    Acknowledged(bool),
}

/// Single consumer of the ingest queue
pub struct IngestRouter {
    store: Arc<EntityStore>,
    control: Option<Arc<ControlService>>,
}

impl IngestRouter {
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self {
            store,
            control: None,
        }
    }

    /// Route control acknowledgements to `control`
    pub fn with_control(mut self, control: Arc<ControlService>) -> Self {
        self.control = Some(control);
        self
    }

    /// Drain the queue until every sender is gone
    pub async fn run(self, mut rx: mpsc::Receiver<InboundMessage>) {
        info!("Ingest router started");

        while let Some(message) = rx.recv().await {
            let channel = message.channel;
            if let Err(e) = self.handle(message).await {
                warn!(channel = %channel, error = %e, "Dropping inbound message");
            }
        }

        warn!("Ingest queue closed, router stopping");
    }

    /// Route one message. Errors are local to this message.
    pub async fn handle(&self, message: InboundMessage) -> Result<RouteOutcome, IngestError> {
        match message.channel {
            Channel::Experiment => self.handle_experiment(message.payload, message.received_at),
            Channel::ControlAck => self.handle_ack(message.payload).await,
            channel => self.handle_telemetry(channel, message.payload, message.received_at),
        }
    }

    fn handle_telemetry(
        &self,
        channel: Channel,
        payload: Value,
        at: DateTime<Utc>,
    ) -> Result<RouteOutcome, IngestError> {
        let mut fields = match payload {
            Value::Object(map) => map,
            _ => return Err(IngestError::NotAnObject),
        };

        let raw_id = identifying_value(&fields, "id").ok_or(IngestError::MissingId)?;
        let entity_id = if channel.is_port_channel() {
            let port = identifying_value(&fields, "port").ok_or(IngestError::MissingPort)?;
            fields.remove("port");
            port_key(&raw_id, &port)
        } else {
            canonical_id(&raw_id)
        };
        fields.remove("id");

        let actual = self
            .store
            .kind_of(&entity_id)
            .ok_or_else(|| IngestError::UnmappedDevice {
                raw: raw_id.clone(),
                entity_id: entity_id.clone(),
            })?;
        if let Some(expected) = channel.target_kind() {
            if expected != actual {
                return Err(IngestError::KindMismatch {
                    entity_id,
                    expected,
                    actual,
                });
            }
        }

        let status = fields.remove("status").and_then(|raw| {
            let parsed = parse_telemetry_status(&raw);
            if parsed.is_none() {
                debug!(entity_id = %entity_id, status = %raw, "Ignoring unrecognized telemetry status");
            }
            parsed
        });

        let update = EntityUpdate {
            fields,
            status: status.map(|s| StatusCandidate::new(s, StatusSource::Telemetry)),
        };

        let outcome = self
            .store
            .merge(&entity_id, update, at)
            .map_err(|e| match e {
                StoreError::NoSuchEntity(entity_id) => IngestError::UnmappedDevice {
                    raw: raw_id,
                    entity_id,
                },
            })?;

        debug!(
            channel = %channel,
            entity_id = %entity_id,
            fields = outcome.fields_updated,
            status_applied = outcome.status_applied,
            "Telemetry merged"
        );

        Ok(RouteOutcome::Merged { entity_id, outcome })
    }

    fn handle_experiment(
        &self,
        payload: Value,
        at: DateTime<Utc>,
    ) -> Result<RouteOutcome, IngestError> {
        let fields = match payload {
            Value::Object(map) => map,
            _ => return Err(IngestError::NotAnObject),
        };

        let status = ExperimentStatus {
            active: fields.get("status").and_then(Value::as_str) == Some("active"),
            message: fields
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            observed_at: Some(at),
        };

        self.store.set_experiment(status.clone());
        Ok(RouteOutcome::Experiment(status))
    }

    async fn handle_ack(&self, payload: Value) -> Result<RouteOutcome, IngestError> {
        let fields = match payload {
            Value::Object(map) => map,
            _ => return Err(IngestError::NotAnObject),
        };

        let request_id =
            identifying_value(&fields, "request_id").ok_or(IngestError::MissingRequestId)?;
        let control = self.control.as_ref().ok_or(IngestError::ControlUnavailable)?;

        match control.acknowledge(&request_id).await {
            Ok(confirmed) => Ok(RouteOutcome::Acknowledged(confirmed)),
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Failed to confirm control request");
                Ok(RouteOutcome::Acknowledged(false))
            }
        }
    }
}

/// Read an identifying key that may arrive as a string or a number
fn identifying_value(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
