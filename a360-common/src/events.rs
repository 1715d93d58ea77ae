//! Event types for the A360 watcher
//!
//! One `WatcherEvent` is produced at every ingestion stage transition. Events are pushed
//! to connected UI clients and appended to the event log; they are never stored anywhere
//! else.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

/// Stage tag carried by every watcher event
pub const WATCHER_STAGE: &str = "COMFY_OUTPUT";

/// `type` tag of event-log lines
pub const EVENT_LOG_TYPE: &str = "WATCHER_EVENT";

/// Ingestion status vocabulary (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IngestStatus {
    /// Ingestible file name seen in the watched folder
    Detected,
    /// Subject resolved to an archive base path
    Validated,
    /// Processing of the file stopped (see `reason`)
    Error,
    /// File copied into the archive
    Stored,
    /// Ledger transaction started
    Ingesting,
    /// Ledger updated and dataset index appended
    Ingested,
}

impl IngestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStatus::Detected => "DETECTED",
            IngestStatus::Validated => "VALIDATED",
            IngestStatus::Error => "ERROR",
            IngestStatus::Stored => "STORED",
            IngestStatus::Ingesting => "INGESTING",
            IngestStatus::Ingested => "INGESTED",
        }
    }
}

impl fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason attached to an `ERROR` event (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    /// Subject has no Base_Path in the Subjects table (even after a refresh)
    #[serde(rename = "no base path for subject")]
    NoBasePath,
    /// File size never settled before the stability timeout
    #[serde(rename = "unstable file")]
    UnstableFile,
    /// Copy into the archive (or relocation of the previous file) failed
    #[serde(rename = "copy failed")]
    CopyFailed,
    /// Ledger document held open by another process
    #[serde(rename = "ledger locked")]
    LedgerLocked,
    /// Any other ledger transaction failure
    #[serde(rename = "ledger update failed")]
    LedgerUpdateFailed,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::NoBasePath => "no base path for subject",
            FailureReason::UnstableFile => "unstable file",
            FailureReason::CopyFailed => "copy failed",
            FailureReason::LedgerLocked => "ledger locked",
            FailureReason::LedgerUpdateFailed => "ledger update failed",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status event for one file at one stage
///
/// Serialized in camelCase with `extra` fields flattened into the top-level object:
/// `{"subjectId":"S010","stage":"COMFY_OUTPUT","image":"A35","status":"STORED",...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherEvent {
    pub subject_id: String,
    pub stage: String,
    /// Age tag, `A{age}` without padding
    pub image: String,
    pub status: IngestStatus,
    pub path: Option<String>,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WatcherEvent {
    pub fn new(subject_id: &str, age: u32, status: IngestStatus, path: Option<&Path>) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            stage: WATCHER_STAGE.to_string(),
            image: format!("A{}", age),
            status,
            path: path.map(|p| p.display().to_string()),
            timestamp: crate::time::epoch_seconds(),
            extra: Map::new(),
        }
    }

    /// Attach an extra top-level field
    pub fn with_extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    /// Attach the failure reason of an `ERROR` event
    pub fn with_reason(self, reason: FailureReason) -> Self {
        self.with_extra("reason", reason.as_str())
    }

    pub fn reason(&self) -> Option<&str> {
        self.extra.get("reason").and_then(Value::as_str)
    }

    /// Serialize once for fan-out
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// One line of the event log: the event plus `utc` and `type` fields
#[derive(Debug, Serialize)]
pub struct EventLogRecord<'a> {
    pub utc: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(flatten)]
    pub event: &'a WatcherEvent,
}

impl<'a> EventLogRecord<'a> {
    pub fn new(event: &'a WatcherEvent) -> Self {
        Self {
            utc: crate::time::utc_now_iso(),
            kind: EVENT_LOG_TYPE,
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_event_serializes_camel_case_with_flattened_extra() {
        let path = PathBuf::from("/out/S010_A35_0001.png");
        let event = WatcherEvent::new("S010", 35, IngestStatus::Stored, Some(&path))
            .with_extra("overwrite", false)
            .with_extra("bytes", 1234u64);

        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["subjectId"], "S010");
        assert_eq!(value["stage"], "COMFY_OUTPUT");
        assert_eq!(value["image"], "A35");
        assert_eq!(value["status"], "STORED");
        assert_eq!(value["path"], "/out/S010_A35_0001.png");
        assert_eq!(value["overwrite"], false);
        assert_eq!(value["bytes"], 1234);
        assert!(value["timestamp"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn test_image_tag_is_unpadded() {
        let event = WatcherEvent::new("S001", 5, IngestStatus::Detected, None);
        assert_eq!(event.image, "A5");
        assert!(event.path.is_none());
    }

    #[test]
    fn test_error_event_carries_reason_phrase() {
        let event = WatcherEvent::new("S404", 40, IngestStatus::Error, None)
            .with_reason(FailureReason::NoBasePath);
        assert_eq!(event.reason(), Some("no base path for subject"));

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["status"], "ERROR");
        assert_eq!(value["reason"], "no base path for subject");
    }

    #[test]
    fn test_event_log_record_has_type_and_utc() {
        let event = WatcherEvent::new("S002", 70, IngestStatus::Ingested, None);
        let value = serde_json::to_value(EventLogRecord::new(&event)).unwrap();
        assert_eq!(value["type"], "WATCHER_EVENT");
        assert!(value["utc"].as_str().unwrap().ends_with("+00:00"));
        assert_eq!(value["subjectId"], "S002");
        assert_eq!(value["status"], "INGESTED");
    }

    #[test]
    fn test_failure_reason_serde_matches_display() {
        for reason in [
            FailureReason::NoBasePath,
            FailureReason::UnstableFile,
            FailureReason::CopyFailed,
            FailureReason::LedgerLocked,
            FailureReason::LedgerUpdateFailed,
        ] {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason));
        }
    }
}
