//! Typed lane configuration
//!
//! `LaneConfig` is the explicit configuration object handed to clients and
//! workflows. Nothing below the CLI reads the process environment.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults::BuiltinDefaults;
use super::effective::ConfigError;
use crate::poller::RetryPolicy;

/// Explicit configuration for every workflow
#[derive(Clone, Serialize, Deserialize)]
pub struct LaneConfig {
    /// Document-analysis resource endpoint, e.g. `https://name.cognitiveservices.azure.com`
    pub endpoint: Option<String>,
    /// Resource key sent as `Ocp-Apim-Subscription-Key`
    pub api_key: Option<String>,
    /// REST API version
    pub api_version: String,
    /// Blob container SAS URL
    pub container_ref: Option<String>,
    /// Training data root; its subdirectories are the categories
    pub root_directory: Option<PathBuf>,
    /// Directory of documents to classify
    pub testing_directory: Option<PathBuf>,
    /// Classifier used by `classify` and created by `build-classifier`
    pub classifier_id: Option<String>,
    /// Description attached to a new classifier
    pub classifier_description: Option<String>,
    /// Classifier to extend when building
    pub base_classifier_id: Option<String>,
    /// Model used for layout analysis
    pub layout_model_id: String,
    pub manifest: ManifestSettings,
    pub poll: PollSettings,
    pub http: HttpSettings,
}

/// Manifest thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestSettings {
    pub min_files_per_category: usize,
    pub min_image_width: u32,
    pub min_image_height: u32,
}

/// Poll retry policy, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSettings {
    pub initial_wait_seconds: u64,
    pub backoff_factor: u32,
    pub max_wait_seconds: u64,
    pub max_attempts: u32,
}

/// HTTP client timeouts, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    pub connect_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
}

impl Default for LaneConfig {
    fn default() -> Self {
        let d = BuiltinDefaults::default();
        Self {
            endpoint: None,
            api_key: None,
            api_version: d.api_version,
            container_ref: None,
            root_directory: None,
            testing_directory: None,
            classifier_id: None,
            classifier_description: None,
            base_classifier_id: None,
            layout_model_id: d.layout_model_id,
            manifest: ManifestSettings {
                min_files_per_category: d.min_files_per_category,
                min_image_width: d.min_image_width,
                min_image_height: d.min_image_height,
            },
            poll: PollSettings {
                initial_wait_seconds: d.initial_wait_seconds,
                backoff_factor: d.backoff_factor,
                max_wait_seconds: d.max_wait_seconds,
                max_attempts: d.max_attempts,
            },
            http: HttpSettings {
                connect_timeout_seconds: d.connect_timeout_seconds,
                request_timeout_seconds: d.request_timeout_seconds,
            },
        }
    }
}

impl fmt::Debug for LaneConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaneConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_version", &self.api_version)
            .field("container_ref", &self.container_ref.as_ref().map(|_| "[REDACTED]"))
            .field("root_directory", &self.root_directory)
            .field("testing_directory", &self.testing_directory)
            .field("classifier_id", &self.classifier_id)
            .field("layout_model_id", &self.layout_model_id)
            .field("manifest", &self.manifest)
            .field("poll", &self.poll)
            .field("http", &self.http)
            .finish()
    }
}

impl LaneConfig {
    pub fn require_endpoint(&self) -> Result<&str, ConfigError> {
        require(&self.endpoint, "endpoint", "AZURE_DOCUMENT_INTELLIGENCE_ENDPOINT")
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        require(&self.api_key, "api_key", "AZURE_DOCUMENT_INTELLIGENCE_KEY")
    }

    pub fn require_container_ref(&self) -> Result<&str, ConfigError> {
        require(&self.container_ref, "container_ref", "AZURE_STORAGE_CONTAINER_SAS_URL")
    }

    pub fn require_classifier_id(&self) -> Result<&str, ConfigError> {
        require(&self.classifier_id, "classifier_id", "CLASSIFIER_ID")
    }

    pub fn require_root_directory(&self) -> Result<&PathBuf, ConfigError> {
        self.root_directory.as_ref().ok_or(ConfigError::Missing {
            key: "root_directory",
            env: "TRAINING_DOCUMENTS",
        })
    }

    pub fn require_testing_directory(&self) -> Result<&PathBuf, ConfigError> {
        self.testing_directory.as_ref().ok_or(ConfigError::Missing {
            key: "testing_directory",
            env: "TESTING_DOCUMENTS",
        })
    }

    /// Poll policy as durations
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_wait: Duration::from_secs(self.poll.initial_wait_seconds),
            backoff_factor: self.poll.backoff_factor,
            max_wait: Duration::from_secs(self.poll.max_wait_seconds),
            max_attempts: self.poll.max_attempts,
        }
    }
}

fn require<'a>(
    value: &'a Option<String>,
    key: &'static str,
    env: &'static str,
) -> Result<&'a str, ConfigError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing { key, env })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_builtin() {
        let config = LaneConfig::default();
        assert_eq!(config.manifest.min_files_per_category, 5);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_require_missing() {
        let config = LaneConfig::default();
        let err = config.require_endpoint().unwrap_err();
        assert!(err.to_string().contains("AZURE_DOCUMENT_INTELLIGENCE_ENDPOINT"));
        assert!(config.require_root_directory().is_err());
    }

    #[test]
    fn test_require_rejects_empty() {
        let config = LaneConfig {
            classifier_id: Some(String::new()),
            ..LaneConfig::default()
        };
        assert!(config.require_classifier_id().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = LaneConfig {
            api_key: Some("super-secret".to_string()),
            container_ref: Some("https://a/c?sig=zzz".to_string()),
            ..LaneConfig::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("sig=zzz"));
        assert!(debug.contains("[REDACTED]"));
    }
}
