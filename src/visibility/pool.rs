use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::observer::ObserverId;
use crate::orbit::SatelliteId;
use crate::visibility::types::ObserverGeometry;

/// Estimated cell load per satellite, `0.0` idle to `1.0` saturated.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoadTable {
    pub default: f64,
    pub per_satellite: BTreeMap<SatelliteId, f64>,
}

impl Default for LoadTable {
    fn default() -> Self {
        Self {
            default: 0.5,
            per_satellite: BTreeMap::new(),
        }
    }
}

impl LoadTable {
    pub fn load(&self, satellite: SatelliteId) -> f64 {
        self.per_satellite
            .get(&satellite)
            .copied()
            .unwrap_or(self.default)
    }

    pub fn set(&mut self, satellite: SatelliteId, load: f64) {
        self.per_satellite.insert(satellite, load);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_range = |v: f64| (0.0..=1.0).contains(&v);
        if !in_range(self.default) {
            return Err(ConfigError::invalid("loads.default", "must be in [0, 1]"));
        }
        if let Some((id, _)) = self.per_satellite.iter().find(|(_, v)| !in_range(**v)) {
            return Err(ConfigError::invalid(
                format!("loads.per_satellite.{id}"),
                "must be in [0, 1]",
            ));
        }
        Ok(())
    }
}

/// A visible satellite offered to the decision layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub satellite_id: SatelliteId,
    pub geometry: ObserverGeometry,
    pub window_entry: DateTime<Utc>,
    pub predicted_exit: Option<DateTime<Utc>>,
    pub remaining_visibility: Duration,
    pub load: f64,
    pub degraded: bool,
}

impl Candidate {
    pub fn closes_within(&self, at: DateTime<Utc>, lookahead: Duration) -> bool {
        self.predicted_exit.is_some_and(|exit| exit - at <= lookahead)
    }
}

/// Visible candidates of one observer at one instant, highest elevation first.
///
/// An empty pool is a valid state meaning no handover is possible.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidatePool {
    pub observer_id: ObserverId,
    pub timestamp: DateTime<Utc>,
    candidates: Vec<Candidate>,
}

impl CandidatePool {
    pub fn new(observer_id: ObserverId, timestamp: DateTime<Utc>, mut candidates: Vec<Candidate>) -> Self {
        candidates.sort_by(|a, b| {
            b.geometry
                .elevation_deg
                .partial_cmp(&a.geometry.elevation_deg)
                .unwrap_or(Ordering::Equal)
                .then(a.satellite_id.cmp(&b.satellite_id))
        });
        Self {
            observer_id,
            timestamp,
            candidates,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn get(&self, satellite: SatelliteId) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.satellite_id == satellite)
    }

    pub fn contains(&self, satellite: SatelliteId) -> bool {
        self.get(satellite).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    /// Candidates other than `serving`.
    pub fn others(&self, serving: SatelliteId) -> impl Iterator<Item = &Candidate> {
        self.candidates
            .iter()
            .filter(move |c| c.satellite_id != serving)
    }
}
