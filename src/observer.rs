use std::collections::BTreeMap;
use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::de_duration;
use crate::orbit::GroundStation;

#[derive(Debug, Error, PartialEq)]
pub enum ObserverError {
    #[error("unknown observer: {0}")]
    Unknown(ObserverId),
    #[error("duplicate observer: {0}")]
    Duplicate(ObserverId),
    #[error("observer {0}: location out of range")]
    InvalidLocation(ObserverId),
    #[error("observer {0}: elevation mask must be in [0, 90) degrees")]
    InvalidMask(ObserverId),
    #[error("observer {0}: cadence must be positive")]
    InvalidCadence(ObserverId),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObserverId(pub String);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObserverId {
    fn from(s: &str) -> Self {
        ObserverId(s.to_string())
    }
}

/// A registered ground terminal.
#[derive(Debug, Clone, Deserialize)]
pub struct Observer {
    pub id: ObserverId,
    pub location: GroundStation,
    #[serde(default = "default_mask")]
    pub elevation_mask_deg: f64,
    #[serde(default = "default_cadence", deserialize_with = "de_duration")]
    pub cadence: Duration,
}

fn default_mask() -> f64 {
    10.0
}

fn default_cadence() -> Duration {
    Duration::seconds(1)
}

impl Observer {
    pub fn new(id: impl Into<String>, location: GroundStation, elevation_mask_deg: f64) -> Self {
        Self {
            id: ObserverId(id.into()),
            location,
            elevation_mask_deg,
            cadence: default_cadence(),
        }
    }

    pub fn validate(&self) -> Result<(), ObserverError> {
        if !self.location.is_valid() {
            return Err(ObserverError::InvalidLocation(self.id.clone()));
        }
        if !(0.0..90.0).contains(&self.elevation_mask_deg) {
            return Err(ObserverError::InvalidMask(self.id.clone()));
        }
        if self.cadence <= Duration::zero() {
            return Err(ObserverError::InvalidCadence(self.id.clone()));
        }
        Ok(())
    }
}

/// Validated set of observers, looked up by id at the boundary.
#[derive(Debug, Clone, Default)]
pub struct ObserverRegistry {
    observers: BTreeMap<ObserverId, Observer>,
}

impl ObserverRegistry {
    pub fn new(observers: Vec<Observer>) -> Result<Self, ObserverError> {
        let mut registry = Self::default();
        for observer in observers {
            registry.register(observer)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, observer: Observer) -> Result<(), ObserverError> {
        observer.validate()?;
        if self.observers.contains_key(&observer.id) {
            return Err(ObserverError::Duplicate(observer.id));
        }
        self.observers.insert(observer.id.clone(), observer);
        Ok(())
    }

    pub fn get(&self, id: &ObserverId) -> Result<&Observer, ObserverError> {
        self.observers
            .get(id)
            .ok_or_else(|| ObserverError::Unknown(id.clone()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Observer> {
        self.observers.values()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}
