use std::path::PathBuf;

use chrono::Duration;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::decision::DecisionConfig;
use crate::events::{EventConfig, LinkBudget};
use crate::observer::{Observer, ObserverRegistry};
use crate::orbit::{OrbitalElement, PropagationConfig};
use crate::visibility::{LoadTable, VisibilityConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid {field}: {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub elements: ElementsConfig,
    #[serde(default)]
    pub propagation: PropagationConfig,
    #[serde(default)]
    pub visibility: VisibilityConfig,
    #[serde(default)]
    pub link_budget: LinkBudget,
    #[serde(default)]
    pub events: EventConfig,
    #[serde(default)]
    pub decision: DecisionConfig,
    #[serde(default)]
    pub loads: LoadTable,
    pub observers: Vec<Observer>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ElementsConfig {
    pub tle_dir: Option<PathBuf>,
    #[serde(deserialize_with = "de_duration")]
    pub reload_interval: Duration,
    /// Element sets written directly in the configuration.
    pub inline: Vec<OrbitalElement>,
}

impl Default for ElementsConfig {
    fn default() -> Self {
        Self {
            tle_dir: None,
            reload_interval: Duration::hours(1),
            inline: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.elements.reload_interval <= Duration::zero() {
            return Err(ConfigError::invalid(
                "elements.reload_interval",
                "must be positive",
            ));
        }
        let p = &self.propagation;
        if p.degraded_epoch_drift > p.max_epoch_drift {
            return Err(ConfigError::invalid(
                "propagation.degraded_epoch_drift",
                "must not exceed max_epoch_drift",
            ));
        }
        if p.cache_capacity == 0 {
            return Err(ConfigError::invalid(
                "propagation.cache_capacity",
                "must be positive",
            ));
        }
        self.visibility.validate()?;
        self.link_budget.validate()?;
        self.events.validate()?;
        self.decision.validate()?;
        self.loads.validate()?;
        self.registry()?;
        Ok(())
    }

    pub fn registry(&self) -> Result<ObserverRegistry, ConfigError> {
        ObserverRegistry::new(self.observers.clone())
            .map_err(|e| ConfigError::invalid("observers", e.to_string()))
    }
}

/// Parse a human duration such as `30s`, `5min` or `7days`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime::parse_duration(s.trim())
        .map_err(|e| e.to_string())
        .and_then(|d| Duration::from_std(d).map_err(|e| e.to_string()))
}

pub(crate) fn de_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(serde::de::Error::custom)
}
