//! Liveness prober.
//!
//! Periodically sweeps every known entity with a reachability check and
//! feeds the results back through the store's merge path, stamped with the
//! round's start time. Rounds are single-flight: a trigger that arrives
//! while a round is running does nothing.

pub mod config;
mod prober;

pub use config::ProbeConfig;
pub use prober::{LivenessProber, RoundGuard, RoundOutcome, RoundReport};

use crate::reconcile::Status;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;


/// Result of one reachability check
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Reachability {
    Reachable,
    Unreachable,
    /// Neither answer can be trusted; leaves status untouched
    Ambiguous,
}

impl Reachability {
    /// Status implied by the result
    pub fn status(&self) -> Option<Status> {
        match self {
            Reachability::Reachable => Some(Status::Working),
            Reachability::Unreachable => Some(Status::Faulty),
            Reachability::Ambiguous => None,
        }
    }
}

/// Reachability check against one host.
///
/// Implementations should honour `timeout` but the prober enforces it as
/// well.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self, host: &str, timeout: Duration) -> Reachability;
}

/// HEAD request against `http://<host>`
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn probe(&self, host: &str, timeout: Duration) -> Reachability {
        let url = format!("http://{}", host);

        match self.client.head(&url).timeout(timeout).send().await {
            // Any response, even an error status, means the host is up
            Ok(_) => Reachability::Reachable,
            Err(e) if e.is_timeout() || e.is_connect() => Reachability::Unreachable,
            Err(e) => {
                tracing::debug!(host = %host, error = %e, "Ambiguous probe result");
                Reachability::Ambiguous
            }
        }
    }
}
