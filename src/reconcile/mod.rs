// Status reconciliation
//
// Telemetry and probes both produce status candidates. A candidate replaces
// the stored status only when it is at least as recent as what is stored;
// the source of the candidate plays no part in the decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Derived device status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Working,
    Faulty,
    Deactivated,
    Unknown,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Working => "working",
            Status::Faulty => "faulty",
            Status::Deactivated => "deactivated",
            Status::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "working" => Some(Status::Working),
            "faulty" => Some(Status::Faulty),
            "deactivated" => Some(Status::Deactivated),
            "unknown" => Some(Status::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a status observation came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusSource {
    Telemetry,
    Probe,
    Manual,
}

/// A status value offered to the store
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusCandidate {
    pub value: Status,
    pub source: StatusSource,
}

impl StatusCandidate {
    pub fn new(value: Status, source: StatusSource) -> Self {
        Self { value, source }
    }
}

/// Stored status with its observation time and source.
///
/// `observed_at` and `source` are `None` until the first observation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusObservation {
    pub value: Status,
    pub observed_at: Option<DateTime<Utc>>,
    pub source: Option<StatusSource>,
}

impl StatusObservation {
    /// Status of an entity nobody has reported on yet
    pub fn initial() -> Self {
        Self {
            value: Status::Unknown,
            observed_at: None,
            source: None,
        }
    }

    /// Freshness rule: a candidate observed at `at` is applicable when it is
    /// not older than the stored observation. Ties go to the candidate.
    pub fn accepts(&self, at: DateTime<Utc>) -> bool {
        match self.observed_at {
            None => true,
            Some(current) => at >= current,
        }
    }

    /// Apply a candidate if the freshness rule allows it. Returns whether the
    /// stored status was replaced.
    pub fn apply(&mut self, candidate: StatusCandidate, at: DateTime<Utc>) -> bool {
        if !self.accepts(at) {
            return false;
        }

        self.value = candidate.value;
        self.observed_at = Some(at);
        self.source = Some(candidate.source);
        true
    }
}

impl Default for StatusObservation {
    fn default() -> Self {
        Self::initial()
    }
}

/// Interpret the `status` field of a telemetry message.
///
/// Telemetry can only report a device as working or faulty. Values that do
/// not clearly mean either (including "deactivated") yield `None`.
pub fn parse_telemetry_status(value: &Value) -> Option<Status> {
    match value {
        Value::Bool(true) => Some(Status::Working),
        Value::Bool(false) => Some(Status::Faulty),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(Status::Working),
            Some(0) => Some(Status::Faulty),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "working" | "ok" | "online" | "alive" | "active" | "enabled" | "up" | "1"
            | "true" => Some(Status::Working),
            "faulty" | "failed" | "fail" | "error" | "offline" | "inactive" | "disabled"
            | "down" | "0" | "false" => Some(Status::Faulty),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_initial_accepts_anything() {
        let mut status = StatusObservation::initial();
        assert_eq!(status.value, Status::Unknown);
        assert!(status.accepts(at(0)));

        assert!(status.apply(StatusCandidate::new(Status::Faulty, StatusSource::Probe), at(0)));
        assert_eq!(status.value, Status::Faulty);
        assert_eq!(status.observed_at, Some(at(0)));
        assert_eq!(status.source, Some(StatusSource::Probe));
    }

    #[test]
    fn test_older_candidate_discarded() {
        let mut status = StatusObservation::initial();
        status.apply(StatusCandidate::new(Status::Faulty, StatusSource::Telemetry), at(100));

        let applied =
            status.apply(StatusCandidate::new(Status::Working, StatusSource::Probe), at(50));

        assert!(!applied);
        assert_eq!(status.value, Status::Faulty);
        assert_eq!(status.observed_at, Some(at(100)));
        assert_eq!(status.source, Some(StatusSource::Telemetry));
    }

    #[test]
    fn test_equal_timestamp_applies() {
        let mut status = StatusObservation::initial();
        status.apply(StatusCandidate::new(Status::Working, StatusSource::Probe), at(10));

        assert!(status.apply(StatusCandidate::new(Status::Faulty, StatusSource::Telemetry), at(10)));
        assert_eq!(status.value, Status::Faulty);
    }

    #[test]
    fn test_source_does_not_grant_precedence() {
        let mut status = StatusObservation::initial();
        status.apply(StatusCandidate::new(Status::Deactivated, StatusSource::Manual), at(10));

        assert!(status.apply(StatusCandidate::new(Status::Working, StatusSource::Probe), at(11)));
        assert_eq!(status.value, Status::Working);
    }

    #[test]
    fn test_parse_telemetry_status_strings() {
        assert_eq!(parse_telemetry_status(&json!("working")), Some(Status::Working));
        assert_eq!(parse_telemetry_status(&json!("Enabled")), Some(Status::Working));
        assert_eq!(parse_telemetry_status(&json!("1")), Some(Status::Working));
        assert_eq!(parse_telemetry_status(&json!("FAULTY")), Some(Status::Faulty));
        assert_eq!(parse_telemetry_status(&json!("Disabled")), Some(Status::Faulty));
        assert_eq!(parse_telemetry_status(&json!("0")), Some(Status::Faulty));
    }

    #[test]
    fn test_parse_telemetry_status_scalars() {
        assert_eq!(parse_telemetry_status(&json!(true)), Some(Status::Working));
        assert_eq!(parse_telemetry_status(&json!(false)), Some(Status::Faulty));
        assert_eq!(parse_telemetry_status(&json!(1)), Some(Status::Working));
        assert_eq!(parse_telemetry_status(&json!(0)), Some(Status::Faulty));
        assert_eq!(parse_telemetry_status(&json!(7)), None);
    }

    #[test]
    fn test_telemetry_never_deactivates() {
        assert_eq!(parse_telemetry_status(&json!("deactivated")), None);
        assert_eq!(parse_telemetry_status(&json!("sleeping")), None);
        assert_eq!(parse_telemetry_status(&json!(null)), None);
        assert_eq!(parse_telemetry_status(&json!({"value": "working"})), None);
    }
}
