//! Wire types shared between services
//!
//! `JobAnnouncement` travels over the broker; `LogEvent` is what workers post
//! to the log service; `LogPayload` is what live viewers receive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::LogRecord;

/// Announcement published once per created job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobAnnouncement {
    pub job_id: i64,
    pub service_name: String,
    pub direction_id: i64,
}

impl JobAnnouncement {
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}

/// Progress event posted by a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub job_id: i64,
    #[serde(default = "default_level")]
    pub level: String,
    pub message: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl LogEvent {
    pub fn info(job_id: i64, message: impl Into<String>) -> Self {
        Self { job_id, level: "info".to_string(), message: message.into() }
    }

    pub fn error(job_id: i64, message: impl Into<String>) -> Self {
        Self { job_id, level: "error".to_string(), message: message.into() }
    }
}

/// Event as delivered to live viewers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogPayload {
    pub job_id: i64,
    pub level: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl From<LogRecord> for LogPayload {
    fn from(record: LogRecord) -> Self {
        Self {
            job_id: record.job_id,
            level: record.level,
            message: record.message,
            created_at: record.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_announcement_wire_format() {
        let announcement = JobAnnouncement {
            job_id: 12,
            service_name: "vk".to_string(),
            direction_id: 3,
        };
        let value: serde_json::Value =
            serde_json::from_slice(&announcement.to_bytes().unwrap()).unwrap();

        assert_eq!(
            value,
            serde_json::json!({"job_id": 12, "service_name": "vk", "direction_id": 3})
        );
    }

    #[test]
    fn test_announcement_rejects_garbage() {
        assert!(JobAnnouncement::from_bytes(b"not json").is_err());
        assert!(JobAnnouncement::from_bytes(br#"{"job_id": "x"}"#).is_err());
    }

    #[test]
    fn test_log_event_level_defaults_to_info() {
        let event: LogEvent = serde_json::from_str(r#"{"job_id": 1, "message": "hi"}"#).unwrap();
        assert_eq!(event.level, "info");
    }
}
