//! Effective configuration with provenance
//!
//! The effective config is the merge of four layers (built-in defaults, TOML
//! file, environment, CLI flags) plus a record of where each layer came from.
//! Secrets stay in memory only; every serialized view is redacted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use super::defaults::BuiltinDefaults;
use super::lane::LaneConfig;
use super::merge::merge_layers;

/// Schema identifier for the rendered effective config
pub const SCHEMA_ID: &str = "docintel/effective_config@1";

/// Environment variables read by the CLI, mapped to config keys.
///
/// Later entries win when two variables map to the same key, so the
/// document-intelligence names override the legacy form-recognizer names.
pub const ENV_VARS: &[(&str, &str)] = &[
    ("AZURE_FORM_RECOGNIZER_ENDPOINT", "endpoint"),
    ("AZURE_FORM_RECOGNIZER_KEY", "api_key"),
    ("AZURE_DOCUMENT_INTELLIGENCE_ENDPOINT", "endpoint"),
    ("AZURE_DOCUMENT_INTELLIGENCE_KEY", "api_key"),
    ("AZURE_STORAGE_CONTAINER_SAS_URL", "container_ref"),
    ("TRAINING_DOCUMENTS", "root_directory"),
    ("TESTING_DOCUMENTS", "testing_directory"),
    ("CLASSIFIER_ID", "classifier_id"),
    ("CLASSIFIER_DESCRIPTION", "classifier_description"),
    ("BASE_CLASSIFIER_ID", "base_classifier_id"),
];

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Env,
    Cli,
}

/// A contributing config source with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    /// Origin of this source
    pub origin: ConfigOrigin,

    /// File path (file layer only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (file layer only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Effective configuration with full provenance
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    /// When this config was computed
    pub created_at: DateTime<Utc>,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,

    /// The merged configuration object (unredacted)
    config: Value,
}

/// Serialized, redacted view of an [`EffectiveConfig`]
#[derive(Debug, Clone, Serialize)]
pub struct RedactedConfig {
    pub schema_id: String,
    pub created_at: DateTime<Utc>,
    pub config: Value,
    pub sources: Vec<ConfigSource>,
    pub redactions: Vec<String>,
}

/// Keys that contain secrets and are redacted entirely
const SECRET_KEYS: &[&str] = &["api_key", "password", "token", "secret", "credential"];

impl ConfigSource {
    fn layer(origin: ConfigOrigin) -> Self {
        Self {
            origin,
            path: None,
            digest: None,
        }
    }
}

impl EffectiveConfig {
    /// Merge the layers in precedence order and validate the result
    ///
    /// A config file that does not exist is skipped; one that exists but
    /// cannot be read or parsed is an error.
    pub fn build(
        config_path: Option<&Path>,
        env_overrides: Option<Value>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut layered = vec![(
            ConfigSource::layer(ConfigOrigin::Builtin),
            BuiltinDefaults::default().to_value(),
        )];

        if let Some(path) = config_path.filter(|p| p.exists()) {
            let (value, digest) = Self::load_toml_file(path)?;
            let source = ConfigSource {
                path: Some(path.display().to_string()),
                digest: Some(digest),
                ..ConfigSource::layer(ConfigOrigin::File)
            };
            layered.push((source, value));
        }
        if let Some(env) = env_overrides {
            layered.push((ConfigSource::layer(ConfigOrigin::Env), env));
        }
        if let Some(cli) = cli_overrides {
            layered.push((ConfigSource::layer(ConfigOrigin::Cli), cli));
        }

        let (sources, layers): (Vec<_>, Vec<_>) = layered.into_iter().unzip();
        let config = merge_layers(layers);
        Self::validate_config(&config)?;

        Ok(Self {
            created_at: Utc::now(),
            sources,
            config,
        })
    }

    /// Collect the environment layer through `lookup`.
    ///
    /// Unset and empty variables are skipped. Returns `None` when no
    /// variable contributed.
    pub fn env_layer<F>(lookup: F) -> Option<Value>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut map = serde_json::Map::new();
        for (var, key) in ENV_VARS {
            if let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) {
                map.insert((*key).to_string(), Value::String(value));
            }
        }
        if map.is_empty() {
            None
        } else {
            Some(Value::Object(map))
        }
    }

    /// Parse a TOML file into a JSON layer, with the SHA-256 of its bytes
    fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
        let bytes = fs::read(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
        let digest = hex::encode(Sha256::digest(&bytes));

        let text = std::str::from_utf8(&bytes)
            .map_err(|e| ConfigError::ParseError(format!("{} is not UTF-8: {}", path.display(), e)))?;
        let value: Value = toml::from_str(text)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;

        Ok((value, digest))
    }

    /// Redacted copy of the merged config and the redacted key paths
    pub fn redacted(&self) -> RedactedConfig {
        let mut config = self.config.clone();
        let mut redactions = Vec::new();
        Self::redact_recursive(&mut config, String::new(), &mut redactions);
        RedactedConfig {
            schema_id: SCHEMA_ID.to_string(),
            created_at: self.created_at,
            config,
            sources: self.sources.clone(),
            redactions,
        }
    }

    fn redact_recursive(value: &mut Value, path: String, redactions: &mut Vec<String>) {
        let children: Vec<(String, &mut Value)> = match value {
            Value::Object(map) => map
                .iter_mut()
                .map(|(key, child)| (join_path(&path, key), child))
                .collect(),
            Value::Array(items) => items
                .iter_mut()
                .enumerate()
                .map(|(i, child)| (format!("{}[{}]", path, i), child))
                .collect(),
            _ => return,
        };

        for (child_path, child) in children {
            let replacement = match child.as_str() {
                Some(_) if is_secret_key(&child_path) => Some("[REDACTED]".to_string()),
                Some(text) => strip_sas_query(text),
                None => None,
            };
            match replacement {
                Some(text) => {
                    *child = Value::String(text);
                    redactions.push(child_path);
                }
                None => Self::redact_recursive(child, child_path, redactions),
            }
        }
    }

    /// Validate configuration values
    fn validate_config(config: &Value) -> Result<(), ConfigError> {
        let get = |path: &str| value_at(config, path).and_then(Value::as_u64);

        if get("manifest.min_files_per_category") == Some(0) {
            return Err(ConfigError::ValidationError(
                "manifest.min_files_per_category must be at least 1".to_string(),
            ));
        }

        if get("poll.max_attempts") == Some(0) {
            return Err(ConfigError::ValidationError(
                "poll.max_attempts must be at least 1".to_string(),
            ));
        }

        if get("poll.backoff_factor") == Some(0) {
            return Err(ConfigError::ValidationError(
                "poll.backoff_factor must be at least 1".to_string(),
            ));
        }

        if let (Some(initial), Some(max)) = (get("poll.initial_wait_seconds"), get("poll.max_wait_seconds")) {
            if initial > max {
                return Err(ConfigError::ValidationError(format!(
                    "poll.initial_wait_seconds ({}) must not exceed poll.max_wait_seconds ({})",
                    initial, max
                )));
            }
        }

        if let Some(endpoint) = config.get("endpoint").and_then(|v| v.as_str()) {
            if !endpoint.starts_with("https://") && !endpoint.starts_with("http://") {
                return Err(ConfigError::ValidationError(format!(
                    "endpoint must be an http(s) URL, got '{}'",
                    endpoint
                )));
            }
        }

        Ok(())
    }

    /// Deserialize the merged config into the typed [`LaneConfig`]
    pub fn lane_config(&self) -> Result<LaneConfig, ConfigError> {
        LaneConfig::deserialize(&self.config)
            .map_err(|e| ConfigError::ParseError(format!("invalid configuration: {}", e)))
    }

    /// Serialize the redacted view to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.redacted())
    }
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

/// Whether the last key of `path` names a secret
fn is_secret_key(path: &str) -> bool {
    let key = path.rsplit('.').next().unwrap_or(path).to_lowercase();
    SECRET_KEYS.iter().any(|secret| key.contains(secret))
}

/// Value at a dotted path such as `poll.max_attempts`
fn value_at<'a>(config: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(config, |current, key| current.get(key))
}

/// Replace the query of a URL carrying a SAS signature.
fn strip_sas_query(value: &str) -> Option<String> {
    let (base, query) = value.split_once('?')?;
    if query.contains("sig=") {
        Some(format!("{}?[REDACTED]", base))
    } else {
        None
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Missing required setting '{key}' (set it in the config file or via {env})")]
    Missing { key: &'static str, env: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_build_with_defaults_only() {
        let config = EffectiveConfig::build(None, None, None).unwrap();
        let lane = config.lane_config().unwrap();

        assert_eq!(lane.poll.max_attempts, 15);
        assert_eq!(lane.layout_model_id, "prebuilt-layout");
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].origin, ConfigOrigin::Builtin);
    }

    #[test]
    fn test_load_toml_file() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "endpoint = \"https://di.example.com\"").unwrap();
        writeln!(temp, "[poll]").unwrap();
        writeln!(temp, "max_attempts = 4").unwrap();

        let config = EffectiveConfig::build(Some(temp.path()), None, None).unwrap();
        let lane = config.lane_config().unwrap();

        assert_eq!(lane.endpoint.as_deref(), Some("https://di.example.com"));
        assert_eq!(lane.poll.max_attempts, 4);
        assert_eq!(lane.poll.initial_wait_seconds, 5);
        assert_eq!(config.sources[1].origin, ConfigOrigin::File);
        assert_eq!(config.sources[1].digest.as_ref().unwrap().len(), 64);
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let config =
            EffectiveConfig::build(Some(Path::new("/nonexistent/docintel.toml")), None, None).unwrap();
        assert_eq!(config.sources.len(), 1);
    }

    #[test]
    fn test_env_layer_mapping() {
        let vars: HashMap<&str, &str> = [
            ("AZURE_FORM_RECOGNIZER_KEY", "legacy-key"),
            ("AZURE_DOCUMENT_INTELLIGENCE_KEY", "new-key"),
            ("TRAINING_DOCUMENTS", "/data/train"),
            ("CLASSIFIER_ID", ""),
        ]
        .into_iter()
        .collect();

        let layer = EffectiveConfig::env_layer(|name| vars.get(name).map(|v| v.to_string())).unwrap();

        assert_eq!(layer["api_key"], "new-key");
        assert_eq!(layer["root_directory"], "/data/train");
        assert!(layer.get("classifier_id").is_none(), "empty values are skipped");
    }

    #[test]
    fn test_env_layer_empty() {
        assert!(EffectiveConfig::env_layer(|_| None).is_none());
    }

    #[test]
    fn test_cli_overrides_env() {
        let env = serde_json::json!({"classifier_id": "from-env"});
        let cli = serde_json::json!({"classifier_id": "from-cli"});

        let config = EffectiveConfig::build(None, Some(env), Some(cli)).unwrap();
        assert_eq!(
            config.lane_config().unwrap().classifier_id.as_deref(),
            Some("from-cli")
        );
        assert_eq!(config.sources.len(), 3);
    }

    #[test]
    fn test_validation_zero_attempts() {
        let cli = serde_json::json!({"poll": {"max_attempts": 0}});
        let err = EffectiveConfig::build(None, None, Some(cli)).unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn test_validation_initial_exceeds_max() {
        let cli = serde_json::json!({"poll": {"initial_wait_seconds": 90}});
        let err = EffectiveConfig::build(None, None, Some(cli)).unwrap_err();
        assert!(err.to_string().contains("initial_wait_seconds"));
    }

    #[test]
    fn test_validation_endpoint_scheme() {
        let cli = serde_json::json!({"endpoint": "di.example.com"});
        assert!(EffectiveConfig::build(None, None, Some(cli)).is_err());
    }

    #[test]
    fn test_redaction() {
        let cli = serde_json::json!({
            "api_key": "secret123",
            "container_ref": "https://acct.blob.core.windows.net/train?sv=2022&sig=abc",
            "root_directory": "/data"
        });

        let config = EffectiveConfig::build(None, None, Some(cli)).unwrap();
        let redacted = config.redacted();

        assert_eq!(redacted.config["api_key"], "[REDACTED]");
        assert_eq!(
            redacted.config["container_ref"],
            "https://acct.blob.core.windows.net/train?[REDACTED]"
        );
        assert_eq!(redacted.config["root_directory"], "/data");
        assert!(redacted.redactions.contains(&"api_key".to_string()));
        assert!(redacted.redactions.contains(&"container_ref".to_string()));

        // the in-memory config keeps the secret for the clients
        assert_eq!(config.lane_config().unwrap().api_key.as_deref(), Some("secret123"));
        assert!(!config.to_json().unwrap().contains("secret123"));
    }

    #[test]
    fn test_null_api_key_not_reported_as_redacted() {
        let config = EffectiveConfig::build(None, None, None).unwrap();
        assert!(!config.redacted().redactions.contains(&"api_key".to_string()));
    }

    #[test]
    fn test_lane_config_roundtrip() {
        let cli = serde_json::json!({
            "endpoint": "https://di.example.com",
            "api_key": "k",
            "root_directory": "/data/train"
        });
        let lane = EffectiveConfig::build(None, None, Some(cli)).unwrap().lane_config().unwrap();

        assert_eq!(lane.endpoint.as_deref(), Some("https://di.example.com"));
        assert_eq!(lane.manifest.min_files_per_category, 5);
        assert_eq!(lane.poll.max_attempts, 15);
    }
}
