use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{de_duration, ConfigError};
use crate::observer::{Observer, ObserverId};
use crate::orbit::{look_angles, PropagationError, SatelliteId, StateVector};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VisibilityConfig {
    /// Coarse step used when searching for mask crossings.
    #[serde(deserialize_with = "de_duration")]
    pub scan_step: Duration,
    /// Crossings are bisected down to this resolution.
    #[serde(deserialize_with = "de_duration")]
    pub refine_resolution: Duration,
    /// A window only closes after staying below the mask this long.
    #[serde(deserialize_with = "de_duration")]
    pub dwell: Duration,
    /// Closed windows are kept for audit this long.
    #[serde(deserialize_with = "de_duration")]
    pub retention: Duration,
    /// How far ahead the exit of an open window is searched.
    #[serde(deserialize_with = "de_duration")]
    pub exit_horizon: Duration,
    #[serde(deserialize_with = "de_duration")]
    pub exit_refresh: Duration,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            scan_step: Duration::seconds(20),
            refine_resolution: Duration::seconds(1),
            dwell: Duration::seconds(20),
            retention: Duration::minutes(10),
            exit_horizon: Duration::minutes(30),
            exit_refresh: Duration::seconds(60),
        }
    }
}

impl VisibilityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("visibility.scan_step", self.scan_step),
            ("visibility.refine_resolution", self.refine_resolution),
            ("visibility.exit_horizon", self.exit_horizon),
            ("visibility.exit_refresh", self.exit_refresh),
        ];
        for (field, value) in positive {
            if value <= Duration::zero() {
                return Err(ConfigError::invalid(field, "must be positive"));
            }
        }
        if self.dwell < Duration::zero() || self.retention < Duration::zero() {
            return Err(ConfigError::invalid(
                "visibility.dwell",
                "dwell and retention must not be negative",
            ));
        }
        if self.refine_resolution > self.scan_step {
            return Err(ConfigError::invalid(
                "visibility.refine_resolution",
                "must not exceed scan_step",
            ));
        }
        Ok(())
    }
}

/// One satellite as seen from one observer at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ObserverGeometry {
    pub satellite_id: SatelliteId,
    pub timestamp: DateTime<Utc>,
    pub elevation_deg: f64,
    pub azimuth_deg: f64,
    pub range_km: f64,
    pub range_rate_km_s: f64,
    /// Elevation is at or above the observer's mask.
    pub visible: bool,
    /// Derived from an element past the degraded drift bound.
    pub degraded: bool,
}

impl ObserverGeometry {
    pub fn compute(observer: &Observer, state: &StateVector) -> Self {
        let look = look_angles(&observer.location, state);
        Self {
            satellite_id: state.satellite_id,
            timestamp: state.timestamp,
            elevation_deg: look.elevation_deg,
            azimuth_deg: look.azimuth_deg,
            range_km: look.range_km,
            range_rate_km_s: look.range_rate_km_s,
            visible: look.elevation_deg >= observer.elevation_mask_deg,
            degraded: state.degraded,
        }
    }
}

/// Geometry of all propagated satellites for one observer at one instant.
#[derive(Debug)]
pub struct Observation {
    pub at: DateTime<Utc>,
    pub geometries: BTreeMap<SatelliteId, ObserverGeometry>,
    pub excluded: Vec<(SatelliteId, PropagationError)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WindowStatus {
    Open,
    Closed { closed_at: DateTime<Utc> },
}

/// Contiguous interval during which a satellite is above an observer's mask.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisibilityWindow {
    pub satellite_id: SatelliteId,
    pub observer_id: ObserverId,
    pub entry: DateTime<Utc>,
    /// `None` while no down-crossing was found within the exit horizon.
    pub predicted_exit: Option<DateTime<Utc>>,
    /// The satellite was already visible when observation started.
    pub entry_clipped: bool,
    pub status: WindowStatus,
    /// Incremented every time the exit estimate moves.
    pub revision: u32,
}

impl VisibilityWindow {
    pub fn open(
        satellite_id: SatelliteId,
        observer_id: ObserverId,
        entry: DateTime<Utc>,
        entry_clipped: bool,
    ) -> Self {
        Self {
            satellite_id,
            observer_id,
            entry,
            predicted_exit: None,
            entry_clipped,
            status: WindowStatus::Open,
            revision: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == WindowStatus::Open
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            WindowStatus::Closed { closed_at } => Some(closed_at),
            WindowStatus::Open => None,
        }
    }

    /// Replace the exit estimate, bumping the revision if it moved.
    pub fn refine_exit(&mut self, predicted_exit: Option<DateTime<Utc>>) {
        if self.predicted_exit != predicted_exit {
            self.predicted_exit = predicted_exit;
            self.revision += 1;
        }
    }

    pub fn close(&mut self, closed_at: DateTime<Utc>) {
        self.refine_exit(Some(closed_at));
        self.status = WindowStatus::Closed { closed_at };
    }

    /// Visibility left at `at`, capped by `horizon` when no exit is known.
    pub fn remaining(&self, at: DateTime<Utc>, horizon: Duration) -> Duration {
        match self.predicted_exit {
            Some(exit) => (exit - at).max(Duration::zero()).min(horizon),
            None => horizon,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        self.predicted_exit.map(|exit| exit - self.entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn refine_exit_only_bumps_on_change() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut window = VisibilityWindow::open(SatelliteId(1), "ntpu".into(), t0, false);
        window.refine_exit(Some(t0 + Duration::minutes(8)));
        window.refine_exit(Some(t0 + Duration::minutes(8)));
        assert_eq!(window.revision, 1);
        window.close(t0 + Duration::minutes(7));
        assert_eq!(window.revision, 2);
        assert_eq!(window.closed_at(), Some(t0 + Duration::minutes(7)));
    }

    #[test]
    fn remaining_is_capped_by_horizon() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut window = VisibilityWindow::open(SatelliteId(1), "ntpu".into(), t0, false);
        let horizon = Duration::minutes(10);
        assert_eq!(window.remaining(t0, horizon), horizon);
        window.refine_exit(Some(t0 + Duration::minutes(4)));
        assert_eq!(window.remaining(t0 + Duration::minutes(1), horizon), Duration::minutes(3));
        assert_eq!(window.remaining(t0 + Duration::minutes(5), horizon), Duration::zero());
    }

    #[test]
    fn rejects_resolution_coarser_than_step() {
        let config = VisibilityConfig {
            refine_resolution: Duration::seconds(30),
            ..VisibilityConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
