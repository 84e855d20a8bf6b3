use crate::ingest::Channel;
use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

/// NATS configuration
#[derive(Clone, Debug, Deserialize)]
pub struct NatsConfig {
    pub url: String,
    #[serde(default)]
    pub subjects: NatsSubjects,
    /// Commands go to `<prefix>.<device>`, confirmations to `<prefix>.confirm.<device>`
    #[serde(default = "default_control_prefix")]
    pub control_prefix: String,
}

fn default_control_prefix() -> String {
    "rpi.control".to_string()
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            subjects: NatsSubjects::default(),
            control_prefix: default_control_prefix(),
        }
    }
}

/// Subject subscribed for each inbound channel
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct NatsSubjects {
    pub tile: String,
    pub midspan: String,
    pub midspan_port: String,
    pub pdu: String,
    pub pdu_port: String,
    pub server: String,
    pub experiment: String,
    pub control_ack: String,
}

impl Default for NatsSubjects {
    fn default() -> Self {
        Self {
            tile: "rpi.data".to_string(),
            midspan: "midspan.data".to_string(),
            midspan_port: "midspan.port.data".to_string(),
            pdu: "pdu.data".to_string(),
            pdu_port: "pdu.port.data".to_string(),
            server: "server.data".to_string(),
            experiment: "experiment".to_string(),
            control_ack: "rpi.control.ack.>".to_string(),
        }
    }
}

impl NatsSubjects {
    pub fn for_channel(&self, channel: Channel) -> &str {
        match channel {
            Channel::Tile => &self.tile,
            Channel::Midspan => &self.midspan,
            Channel::MidspanPort => &self.midspan_port,
            Channel::Pdu => &self.pdu,
            Channel::PduPort => &self.pdu_port,
            Channel::Server => &self.server,
            Channel::Experiment => &self.experiment,
            Channel::ControlAck => &self.control_ack,
        }
    }
}

/// Core NATS connection shared by subscribers and the command sink
pub struct NatsClient {
    client: async_nats::Client,
}

impl NatsClient {
    /// Connect to NATS
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS");

        Ok(Self { client })
    }

    /// Get underlying NATS client
    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }
}
