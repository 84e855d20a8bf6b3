use super::NatsSubjects;
use crate::ingest::{Channel, InboundMessage};
use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Decode one raw payload. Anything that is not JSON is dropped here.
pub fn decode_payload(channel: Channel, payload: &[u8]) -> Option<InboundMessage> {
    match serde_json::from_slice(payload) {
        Ok(value) => Some(InboundMessage::new(channel, value)),
        Err(e) => {
            warn!(channel = %channel, error = %e, "Dropping undecodable payload");
            None
        }
    }
}

/// Forward every message on one subject into the ingest queue.
///
/// Returns when the subscription ends or the queue is closed.
pub async fn run_channel_subscriber(
    client: async_nats::Client,
    channel: Channel,
    subject: String,
    tx: mpsc::Sender<InboundMessage>,
) -> Result<()> {
    let mut subscriber = client
        .subscribe(subject.clone())
        .await
        .with_context(|| format!("Failed to subscribe to '{}'", subject))?;

    info!(channel = %channel, subject = %subject, "Subscribed");

    while let Some(msg) = subscriber.next().await {
        let Some(inbound) = decode_payload(channel, &msg.payload) else {
            continue;
        };
        if tx.send(inbound).await.is_err() {
            warn!(channel = %channel, "Ingest queue closed, subscriber stopping");
            return Ok(());
        }
    }

    warn!(channel = %channel, subject = %subject, "Subscription stream ended");
    Ok(())
}

/// Spawn one subscriber task per inbound channel
pub fn spawn_subscribers(
    client: &async_nats::Client,
    subjects: &NatsSubjects,
    tx: &mpsc::Sender<InboundMessage>,
) -> Vec<JoinHandle<()>> {
    Channel::ALL
        .iter()
        .map(|&channel| {
            let client = client.clone();
            let subject = subjects.for_channel(channel).to_string();
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Err(e) = run_channel_subscriber(client, channel, subject, tx).await {
                    error!(channel = %channel, error = %e, "Subscriber failed");
                }
            })
        })
        .collect()
}
