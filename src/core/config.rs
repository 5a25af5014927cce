//! Configuration management for the grid bridge
//!
//! Settings are resolved from defaults, an optional TOML file and
//! `GRIDBRIDGE_*` environment variables, in that order, then validated.

use crate::core::error::{Error, Result};
use crate::dialect::insert::DuplicateInsertPreventionStrategy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config file looked up by [`Config::load`]
pub const DEFAULT_CONFIG_FILE: &str = "gridbridge.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Datastore configuration
    pub datastore: DatastoreConfig,

    /// Id generation defaults
    pub sequences: SequenceConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Available datastore providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// In-memory map datastore
    #[default]
    Map,
}

impl std::str::FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "map" => Ok(ProviderKind::Map),
            other => Err(Error::config(format!("Unknown datastore provider: {}", other))),
        }
    }
}

/// Datastore configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatastoreConfig {
    /// Provider backing the dialect
    pub provider: ProviderKind,

    /// Duplicate insert detection of the provider's dialect
    pub duplicate_insert_strategy: DuplicateInsertPreventionStrategy,

    /// Wrap the dialect so writes are deferred into the unit of work's queue
    pub batching: bool,

    /// Wrap the dialect so every call emits a trace event
    pub trace_dialect_calls: bool,
}

/// Id generation defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    /// Value returned by the first call on a fresh source
    pub default_initial_value: i64,

    /// Step between consecutive values
    pub default_increment: i64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Map,
            duplicate_insert_strategy: DuplicateInsertPreventionStrategy::LookUp,
            batching: true,
            trace_dialect_calls: false,
        }
    }
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            default_initial_value: 1,
            default_increment: 1,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::config(format!("Invalid boolean for {}: {}", name, value))),
    }
}

impl Config {
    /// Load configuration from the default config file and environment variables
    pub fn load() -> Result<Self> {
        let mut config = if Path::new(DEFAULT_CONFIG_FILE).exists() {
            Self::from_file(DEFAULT_CONFIG_FILE)?
        } else {
            Config::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file; missing sections and keys take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&contents)
    }

    /// Parse TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable source
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Datastore overrides
        if let Some(provider) = lookup("GRIDBRIDGE_PROVIDER") {
            self.datastore.provider = provider.parse()?;
        }

        if let Some(strategy) = lookup("GRIDBRIDGE_DUPLICATE_INSERT_STRATEGY") {
            self.datastore.duplicate_insert_strategy = match strategy.as_str() {
                "look_up" => DuplicateInsertPreventionStrategy::LookUp,
                "native" => DuplicateInsertPreventionStrategy::Native,
                other => {
                    return Err(Error::config(format!(
                        "Invalid duplicate insert strategy: {}",
                        other
                    )))
                }
            };
        }

        if let Some(batching) = lookup("GRIDBRIDGE_BATCHING") {
            self.datastore.batching = parse_bool("GRIDBRIDGE_BATCHING", &batching)?;
        }

        if let Some(trace) = lookup("GRIDBRIDGE_TRACE_DIALECT_CALLS") {
            self.datastore.trace_dialect_calls =
                parse_bool("GRIDBRIDGE_TRACE_DIALECT_CALLS", &trace)?;
        }

        // Sequence overrides
        if let Some(initial) = lookup("GRIDBRIDGE_SEQUENCE_INITIAL_VALUE") {
            self.sequences.default_initial_value = initial
                .parse()
                .map_err(|e| Error::config(format!("Invalid sequence initial value: {}", e)))?;
        }

        if let Some(increment) = lookup("GRIDBRIDGE_SEQUENCE_INCREMENT") {
            self.sequences.default_increment = increment
                .parse()
                .map_err(|e| Error::config(format!("Invalid sequence increment: {}", e)))?;
        }

        // Logging overrides
        if let Some(level) = lookup("GRIDBRIDGE_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = lookup("GRIDBRIDGE_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.sequences.default_increment == 0 {
            return Err(Error::config("Sequence increment must not be zero"));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => return Err(Error::config(format!("Invalid log level: {}", other))),
        }

        match self.logging.format.as_str() {
            "json" | "pretty" | "compact" => {}
            other => return Err(Error::config(format!("Invalid log format: {}", other))),
        }

        Ok(())
    }
}

/// Load configuration, falling back to defaults when loading fails
pub fn load_config_or_default(path: Option<&Path>) -> Config {
    let loaded = match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Using default configuration: {}", e);
            Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.datastore.provider, ProviderKind::Map);
        assert_eq!(config.sequences.default_increment, 1);
    }

    #[test]
    fn test_partial_toml_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[datastore]
duplicate_insert_strategy = "native"
batching = false

[sequences]
default_initial_value = 100
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(
            config.datastore.duplicate_insert_strategy,
            DuplicateInsertPreventionStrategy::Native
        );
        assert!(!config.datastore.batching);
        assert_eq!(config.sequences.default_initial_value, 100);
        assert_eq!(config.sequences.default_increment, 1);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut config = Config::default();
        config.datastore.trace_dialect_calls = true;
        config.logging.format = "json".into();

        let text = toml::to_string(&config).unwrap();
        assert_eq!(Config::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("GRIDBRIDGE_DUPLICATE_INSERT_STRATEGY", "native"),
            ("GRIDBRIDGE_BATCHING", "off"),
            ("GRIDBRIDGE_SEQUENCE_INCREMENT", "5"),
            ("GRIDBRIDGE_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(
            config.datastore.duplicate_insert_strategy,
            DuplicateInsertPreventionStrategy::Native
        );
        assert!(!config.datastore.batching);
        assert_eq!(config.sequences.default_increment, 5);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_overrides_are_rejected() {
        let mut config = Config::default();
        let result = config
            .apply_overrides(|name| (name == "GRIDBRIDGE_BATCHING").then(|| "maybe".to_string()));
        assert!(matches!(result, Err(Error::Config(_))));

        let result = config
            .apply_overrides(|name| (name == "GRIDBRIDGE_PROVIDER").then(|| "redis".to_string()));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_toml_is_rejected() {
        assert!(matches!(Config::from_toml("[datastore\nbatching = "), Err(Error::Toml(_))));
        assert!(matches!(
            Config::from_toml("[datastore]\nduplicate_insert_strategy = \"optimistic\""),
            Err(Error::Toml(_))
        ));
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.sequences.default_increment = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.level = "verbose".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.format = "xml".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_or_default(Some(&dir.path().join("absent.toml")));
        assert_eq!(config, Config::default());
    }
}
