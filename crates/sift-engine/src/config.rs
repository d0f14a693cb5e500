//! Engine configuration

use serde::{Deserialize, Serialize};
use sift_core::{Error, Result};
use sift_plugins::DispatchTimeouts;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Plugin registry document; no registry means no plugins
    #[serde(default)]
    pub plugin_registry_path: Option<PathBuf>,

    /// Per-capability plugin deadlines
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Backfill settings
    #[serde(default)]
    pub backfill: BackfillConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            plugin_registry_path: None,
            dispatch: DispatchConfig::default(),
            backfill: BackfillConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a YAML document; an empty document yields the defaults
    pub fn from_yaml(content: &str) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(content)
            .map_err(|e| Error::config(format!("invalid engine config: {}", e)))?;
        if value.is_null() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_value(value)
            .map_err(|e| Error::config(format!("invalid engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_yaml(&content)?;

        // Registry paths are relative to the config file
        if let (Some(registry), Some(parent)) = (&config.plugin_registry_path, path.parent()) {
            if registry.is_relative() {
                config.plugin_registry_path = Some(parent.join(registry));
            }
        }
        Ok(config)
    }

    /// Load from an optional file and apply command-line overrides
    pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(path) = &overrides.plugin_registry_path {
            self.plugin_registry_path = Some(path.clone());
        }
        if let Some(concurrency) = overrides.backfill_concurrency {
            self.backfill.concurrency = concurrency;
        }
        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let dispatch = &self.dispatch;
        for (name, value) in [
            ("dispatch.ingest_hook_timeout_ms", dispatch.ingest_hook_timeout_ms),
            ("dispatch.stream_classifier_timeout_ms", dispatch.stream_classifier_timeout_ms),
            ("dispatch.default_timeout_ms", dispatch.default_timeout_ms),
        ] {
            if value == 0 {
                return Err(Error::config(format!("{} must be greater than 0", name)));
            }
        }
        if self.backfill.concurrency == 0 {
            return Err(Error::config("backfill.concurrency must be greater than 0"));
        }
        Ok(())
    }

    pub fn dispatch_timeouts(&self) -> DispatchTimeouts {
        DispatchTimeouts {
            ingest_hook: Duration::from_millis(self.dispatch.ingest_hook_timeout_ms),
            stream_classifier: Duration::from_millis(self.dispatch.stream_classifier_timeout_ms),
            default: Duration::from_millis(self.dispatch.default_timeout_ms),
        }
    }
}

/// Values set on the command line take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub plugin_registry_path: Option<PathBuf>,
    pub backfill_concurrency: Option<usize>,
    pub log_format: Option<LogFormat>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    #[serde(default = "default_ingest_hook_timeout_ms")]
    pub ingest_hook_timeout_ms: u64,

    #[serde(default = "default_classifier_timeout_ms")]
    pub stream_classifier_timeout_ms: u64,

    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            ingest_hook_timeout_ms: default_ingest_hook_timeout_ms(),
            stream_classifier_timeout_ms: default_classifier_timeout_ms(),
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackfillConfig {
    /// Maximum article evaluations in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_ingest_hook_timeout_ms() -> u64 {
    2_000
}

fn default_classifier_timeout_ms() -> u64 {
    5_000
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_concurrency() -> usize {
    num_cpus::get().max(1)
}
