//! Built-in defaults (layer 1)

use docintel_protocol::{API_VERSION, LAYOUT_MODEL_ID};
use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// REST API version (default: 2024-02-29-preview)
    pub api_version: String,

    /// Model used by `analyze-layout` (default: prebuilt-layout)
    pub layout_model_id: String,

    /// Categories with fewer eligible files are not uploaded (default: 5)
    pub min_files_per_category: usize,

    /// Minimum image width in pixels (default: 50)
    pub min_image_width: u32,

    /// Minimum image height in pixels (default: 50)
    pub min_image_height: u32,

    /// First poll wait in seconds (default: 5)
    pub initial_wait_seconds: u64,

    /// Multiplier applied to the wait after every attempt (default: 2)
    pub backoff_factor: u32,

    /// Upper bound of a single wait in seconds (default: 60)
    pub max_wait_seconds: u64,

    /// Status queries before giving up (default: 15)
    pub max_attempts: u32,

    /// HTTP connect timeout in seconds (default: 30)
    pub connect_timeout_seconds: u64,

    /// HTTP request timeout in seconds (default: 300)
    pub request_timeout_seconds: u64,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            layout_model_id: LAYOUT_MODEL_ID.to_string(),
            min_files_per_category: 5,
            min_image_width: 50,
            min_image_height: 50,
            initial_wait_seconds: 5,
            backoff_factor: 2,
            max_wait_seconds: 60,
            max_attempts: 15,
            connect_timeout_seconds: 30,
            request_timeout_seconds: 300,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "endpoint": null,
            "api_key": null,
            "api_version": self.api_version,
            "container_ref": null,
            "root_directory": null,
            "testing_directory": null,
            "classifier_id": null,
            "classifier_description": null,
            "base_classifier_id": null,
            "layout_model_id": self.layout_model_id,
            "manifest": {
                "min_files_per_category": self.min_files_per_category,
                "min_image_width": self.min_image_width,
                "min_image_height": self.min_image_height
            },
            "poll": {
                "initial_wait_seconds": self.initial_wait_seconds,
                "backoff_factor": self.backoff_factor,
                "max_wait_seconds": self.max_wait_seconds,
                "max_attempts": self.max_attempts
            },
            "http": {
                "connect_timeout_seconds": self.connect_timeout_seconds,
                "request_timeout_seconds": self.request_timeout_seconds
            }
        })
    }
}
