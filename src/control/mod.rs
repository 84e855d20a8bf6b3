//! Outbound control channel.
//!
//! Operators send `shutdown`/`reboot` commands to devices over the pub/sub
//! transport. Each command carries a request id that the device echoes back
//! in an acknowledgement; the engine then confirms the request. A shutdown
//! is the only path by which an entity becomes `deactivated`.

use crate::identity::canonical_id;
use crate::reconcile::Status;
use crate::state::EntityStore;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

mod pending;

pub use pending::{run_pending_cleanup, PendingRequest, PendingRequests};

/// Commands a device understands
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlCommand {
    Shutdown,
    Reboot,
}

impl ControlCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlCommand::Shutdown => "shutdown",
            ControlCommand::Reboot => "reboot",
        }
    }
}

impl FromStr for ControlCommand {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shutdown" => Ok(ControlCommand::Shutdown),
            "reboot" => Ok(ControlCommand::Reboot),
            other => Err(ControlError::UnsupportedCommand(other.to_string())),
        }
    }
}

/// Control channel errors
#[derive(Debug)]
pub enum ControlError {
    UnsupportedCommand(String),
    UnknownEntity(String),
    Publish(String),
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::UnsupportedCommand(c) => write!(f, "unsupported command '{}'", c),
            ControlError::UnknownEntity(id) => write!(f, "unknown entity '{}'", id),
            ControlError::Publish(e) => write!(f, "failed to publish command: {}", e),
        }
    }
}

impl std::error::Error for ControlError {}

/// Transport used to deliver commands and confirmations.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn publish(&self, subject: String, payload: Vec<u8>) -> anyhow::Result<()>;
}

/// Sends commands, tracks pending requests and confirms acknowledgements
pub struct ControlService {
    sink: Arc<dyn CommandSink>,
    store: Arc<EntityStore>,
    pending: PendingRequests,
    subject_prefix: String,
}

impl ControlService {
    pub fn new(
        sink: Arc<dyn CommandSink>,
        store: Arc<EntityStore>,
        subject_prefix: impl Into<String>,
        request_expiry_seconds: i64,
    ) -> Self {
        Self {
            sink,
            store,
            pending: PendingRequests::new(request_expiry_seconds),
            subject_prefix: subject_prefix.into(),
        }
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// Publish a command to one device.
    ///
    /// Returns the request id the device will echo in its acknowledgement.
    pub async fn send(&self, raw_id: &str, command: ControlCommand) -> Result<String, ControlError> {
        let entity_id = canonical_id(raw_id);
        if !self.store.contains(&entity_id) {
            return Err(ControlError::UnknownEntity(entity_id));
        }

        let request_id = self.pending.create(&entity_id);
        let subject = format!("{}.{}", self.subject_prefix, entity_id);
        let payload = json!({
            "request_id": request_id,
            "command": command.as_str(),
        });

        if let Err(e) = self.sink.publish(subject.clone(), payload.to_string().into_bytes()).await {
            self.pending.consume(&request_id);
            return Err(ControlError::Publish(e.to_string()));
        }

        info!(
            entity_id = %entity_id,
            command = command.as_str(),
            request_id = %request_id,
            subject = %subject,
            "Control command sent"
        );

        if command == ControlCommand::Shutdown {
            if let Err(e) = self
                .store
                .set_manual_status(&entity_id, Status::Deactivated, Utc::now())
            {
                warn!(entity_id = %entity_id, error = %e, "Failed to mark entity deactivated");
            }
        }

        Ok(request_id)
    }

    /// Handle a device acknowledgement.
    ///
    /// Returns true if the request was pending and a confirmation was sent.
    /// Unknown or expired request ids are ignored.
    pub async fn acknowledge(&self, request_id: &str) -> Result<bool, ControlError> {
        let request = match self.pending.consume(request_id) {
            Some(r) => r,
            None => {
                debug!(request_id = %request_id, "Ignoring ack for unknown or expired request");
                return Ok(false);
            }
        };

        let subject = format!("{}.confirm.{}", self.subject_prefix, request.device_id);
        let payload = json!({ "request_id": request_id });

        self.sink
            .publish(subject.clone(), payload.to_string().into_bytes())
            .await
            .map_err(|e| ControlError::Publish(e.to_string()))?;

        info!(
            request_id = %request_id,
            entity_id = %request.device_id,
            subject = %subject,
            "Control request confirmed"
        );

        Ok(true)
    }
}
