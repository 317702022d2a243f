//! Long-running operation status.
//!
//! Every submission (analyze, classify, build) answers `202 Accepted` with an
//! `Operation-Location` header; GET on that locator returns this body.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Operation state as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationState {
    /// Accepted but not picked up yet.
    NotStarted,
    /// In progress.
    Running,
    /// Completed successfully.
    Succeeded,
    /// Completed with an error.
    Failed,
    /// Cancelled by the service or the caller.
    Canceled,
    /// Any value this crate does not know about.
    #[serde(other)]
    Unknown,
}

impl OperationState {
    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationState::NotStarted | OperationState::Running)
    }

    /// Wire name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::NotStarted => "notStarted",
            OperationState::Running => "running",
            OperationState::Succeeded => "succeeded",
            OperationState::Failed => "failed",
            OperationState::Canceled => "canceled",
            OperationState::Unknown => "unknown",
        }
    }
}

/// Common fields of an operation status body.
///
/// The operation-specific result (`analyzeResult` or `result`) is left in the
/// raw body; use the typed views in [`crate::ops`] to read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStatus {
    /// Current state.
    pub status: OperationState,
    /// Operation identifier (classifier builds only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    /// Progress percentage (classifier builds only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_completed: Option<u32>,
    /// When the operation was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<DateTime<Utc>>,
    /// When the operation was last updated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_date_time: Option<DateTime<Utc>>,
    /// Error details, present when the state is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl OperationStatus {
    /// Parse the common fields from a raw status body.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    /// Failure reason suitable for reporting.
    pub fn failure_reason(&self) -> String {
        match &self.error {
            Some(err) => err.to_string(),
            None => format!("operation {}", self.status.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_running() {
        let status = OperationStatus::from_value(&json!({
            "status": "running",
            "createdDateTime": "2024-03-05T16:01:40Z",
            "lastUpdatedDateTime": "2024-03-05T16:01:45Z"
        }))
        .unwrap();
        assert_eq!(status.status, OperationState::Running);
        assert!(!status.status.is_terminal());
        assert!(status.created_date_time.is_some());
    }

    #[test]
    fn test_parse_failed_with_error() {
        let status = OperationStatus::from_value(&json!({
            "status": "failed",
            "error": {"code": "InvalidRequest", "message": "Training data missing."}
        }))
        .unwrap();
        assert_eq!(status.status, OperationState::Failed);
        assert!(status.status.is_terminal());
        assert_eq!(status.failure_reason(), "InvalidRequest: Training data missing.");
    }

    #[test]
    fn test_unknown_state_is_terminal() {
        let status = OperationStatus::from_value(&json!({"status": "paused"})).unwrap();
        assert_eq!(status.status, OperationState::Unknown);
        assert!(status.status.is_terminal());
        assert_eq!(status.failure_reason(), "operation unknown");
    }

    #[test]
    fn test_not_started_wire_name() {
        let json = serde_json::to_string(&OperationState::NotStarted).unwrap();
        assert_eq!(json, "\"notStarted\"");
    }
}
