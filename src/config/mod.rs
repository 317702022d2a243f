//! Configuration
//!
//! Four layers merged in precedence order:
//! 1. Built-in defaults
//! 2. TOML config file (`.docintel/config.toml` unless `--config` is given)
//! 3. Environment variables
//! 4. CLI flags

mod defaults;
mod effective;
mod lane;
mod merge;

pub use defaults::BuiltinDefaults;
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig, RedactedConfig, ENV_VARS};
pub use lane::{HttpSettings, LaneConfig, ManifestSettings, PollSettings};
pub use merge::{deep_merge, merge_layers};
