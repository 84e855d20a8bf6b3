use crate::control::CommandSink;
use anyhow::Context;
use async_trait::async_trait;

/// Publishes control traffic on core NATS
#[derive(Clone)]
pub struct NatsCommandSink {
    client: async_nats::Client,
}

impl NatsCommandSink {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CommandSink for NatsCommandSink {
    async fn publish(&self, subject: String, payload: Vec<u8>) -> anyhow::Result<()> {
        self.client
            .publish(subject.clone(), payload.into())
            .await
            .with_context(|| format!("Failed to publish to '{}'", subject))?;

        tracing::debug!(subject = %subject, "Published control message");

        Ok(())
    }
}
