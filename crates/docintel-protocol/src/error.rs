//! Error bodies returned by the service.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error envelope (`{"error": {...}}`) returned with non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// The error details.
    pub error: ApiError,
}

/// Service error details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Stable error code, e.g. `InvalidRequest` or `InvalidImage`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Target of the error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Nested detail errors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ApiError>,
    /// More specific error, if any.
    #[serde(default, rename = "innererror", skip_serializing_if = "Option::is_none")]
    pub inner_error: Option<InnerError>,
}

/// Inner error chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InnerError {
    /// Inner error code.
    pub code: String,
    /// Inner error message.
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiError {
    /// Create an error with a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            target: None,
            details: Vec::new(),
            inner_error: None,
        }
    }

    /// Most specific code available (inner error code wins).
    pub fn specific_code(&self) -> &str {
        self.inner_error
            .as_ref()
            .map(|inner| inner.code.as_str())
            .unwrap_or(&self.code)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner_error {
            Some(inner) => match &inner.message {
                Some(msg) => write!(f, "{}: {} ({}: {})", self.code, self.message, inner.code, msg),
                None => write!(f, "{}: {} ({})", self.code, self.message, inner.code),
            },
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}
