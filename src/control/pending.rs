use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// A command waiting for the device's acknowledgement
#[derive(Clone, Debug)]
pub struct PendingRequest {
    pub device_id: String,
    pub created_at: DateTime<Utc>,
}

/// Pending control requests with automatic expiration
#[derive(Clone)]
pub struct PendingRequests {
    requests: Arc<Mutex<HashMap<String, PendingRequest>>>,
    expiry_duration: Duration,
}

impl PendingRequests {
    /// Create a new tracker
    ///
    /// # Arguments
    /// * `expiry_seconds` - How long a request waits for its ack (default: 60)
    pub fn new(expiry_seconds: i64) -> Self {
        Self {
            requests: Arc::new(Mutex::new(HashMap::new())),
            expiry_duration: Duration::seconds(expiry_seconds),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingRequest>> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a new request for `device_id` and return its id (UUID v4)
    pub fn create(&self, device_id: &str) -> String {
        let request_id = Uuid::new_v4().to_string();
        let request = PendingRequest {
            device_id: device_id.to_string(),
            created_at: Utc::now(),
        };

        self.lock().insert(request_id.clone(), request);

        request_id
    }

    /// Remove a request, returning it if it existed and had not expired
    pub fn consume(&self, request_id: &str) -> Option<PendingRequest> {
        let request = self.lock().remove(request_id)?;

        if Utc::now() - request.created_at > self.expiry_duration {
            return None;
        }

        Some(request)
    }

    /// Drop expired requests. Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut requests = self.lock();
        let now = Utc::now();
        let before = requests.len();

        requests.retain(|_, request| now - request.created_at <= self.expiry_duration);

        before - requests.len()
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }
}

/// Background task to periodically purge expired requests
pub async fn run_pending_cleanup(pending: PendingRequests, interval_seconds: u64) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_seconds.max(1)));

    loop {
        interval.tick().await;
        let removed = pending.cleanup_expired();
        if removed > 0 {
            tracing::info!(removed, "Dropped stale control requests");
        }
        tracing::debug!("Control request cleanup complete, {} pending", pending.count());
    }
}
