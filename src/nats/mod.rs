// NATS transport: inbound subscriptions and outbound control publishing

mod client;
mod sink;
mod subscriber;

pub use client::{NatsClient, NatsConfig, NatsSubjects};
pub use sink::NatsCommandSink;
pub use subscriber::{decode_payload, run_channel_subscriber, spawn_subscribers};
