use std::collections::BTreeMap;

use chrono::Duration;
use serde::Deserialize;

use crate::config::{de_duration, ConfigError};
use crate::events::types::EventKind;
use crate::orbit::SatelliteId;

/// Time-to-trigger values allowed by TS 38.331, in milliseconds.
pub const TIME_TO_TRIGGER_MS: [i64; 16] = [
    0, 40, 64, 80, 100, 128, 160, 256, 320, 480, 512, 640, 1024, 1280, 2560, 5120,
];

const HYSTERESIS_RANGE_DB: (f64, f64) = (0.0, 30.0);
const RSRP_RANGE_DBM: (f64, f64) = (-156.0, -31.0);
const OFFSET_RANGE_DB: (f64, f64) = (-24.0, 24.0);
// distanceThreshold is 0..65525 in 50 m steps, hysteresisLocation 0..32768 in 10 m steps
const DISTANCE_RANGE_KM: (f64, f64) = (0.0, 3276.25);
const LOCATION_HYSTERESIS_RANGE_KM: (f64, f64) = (0.0, 327.68);

/// Event A4: neighbour becomes better than threshold.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct A4Config {
    pub threshold_dbm: f64,
    pub hysteresis_db: f64,
}

impl Default for A4Config {
    fn default() -> Self {
        Self {
            threshold_dbm: -110.0,
            hysteresis_db: 3.0,
        }
    }
}

/// Event A5: serving becomes worse than threshold1 and neighbour better
/// than threshold2.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct A5Config {
    pub threshold1_dbm: f64,
    pub threshold2_dbm: f64,
    pub hysteresis_db: f64,
}

impl Default for A5Config {
    fn default() -> Self {
        Self {
            threshold1_dbm: -115.0,
            threshold2_dbm: -105.0,
            hysteresis_db: 3.0,
        }
    }
}

/// Event D2: distance to serving grows past threshold1 and distance to the
/// candidate shrinks below threshold2.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct D2Config {
    pub threshold1_km: f64,
    pub threshold2_km: f64,
    pub hysteresis_km: f64,
}

impl Default for D2Config {
    fn default() -> Self {
        Self {
            threshold1_km: 1500.0,
            threshold2_km: 1200.0,
            hysteresis_km: 50.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    pub enabled: Vec<EventKind>,
    pub a4: A4Config,
    pub a5: A5Config,
    pub d2: D2Config,
    #[serde(deserialize_with = "de_duration")]
    pub time_to_trigger: Duration,
    /// Ofn, applied to every candidate.
    pub frequency_offset_db: f64,
    /// Ocn per satellite; unlisted satellites use 0 dB.
    pub cell_offsets_db: BTreeMap<SatelliteId, f64>,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            enabled: vec![EventKind::A4, EventKind::A5, EventKind::D2],
            a4: A4Config::default(),
            a5: A5Config::default(),
            d2: D2Config::default(),
            time_to_trigger: Duration::milliseconds(640),
            frequency_offset_db: 0.0,
            cell_offsets_db: BTreeMap::new(),
        }
    }
}

impl EventConfig {
    pub fn is_enabled(&self, kind: EventKind) -> bool {
        self.enabled.contains(&kind)
    }

    pub fn cell_offset_db(&self, satellite: SatelliteId) -> f64 {
        self.cell_offsets_db.get(&satellite).copied().unwrap_or(0.0)
    }

    /// Hysteresis configured for `kind`, in dB for A4/A5 and km for D2.
    pub fn hysteresis(&self, kind: EventKind) -> f64 {
        match kind {
            EventKind::A4 => self.a4.hysteresis_db,
            EventKind::A5 => self.a5.hysteresis_db,
            EventKind::D2 => self.d2.hysteresis_km,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("events.a4.threshold_dbm", self.a4.threshold_dbm, RSRP_RANGE_DBM)?;
        check_range("events.a4.hysteresis_db", self.a4.hysteresis_db, HYSTERESIS_RANGE_DB)?;
        check_range("events.a5.threshold1_dbm", self.a5.threshold1_dbm, RSRP_RANGE_DBM)?;
        check_range("events.a5.threshold2_dbm", self.a5.threshold2_dbm, RSRP_RANGE_DBM)?;
        check_range("events.a5.hysteresis_db", self.a5.hysteresis_db, HYSTERESIS_RANGE_DB)?;
        check_range("events.d2.threshold1_km", self.d2.threshold1_km, DISTANCE_RANGE_KM)?;
        check_range("events.d2.threshold2_km", self.d2.threshold2_km, DISTANCE_RANGE_KM)?;
        check_range(
            "events.d2.hysteresis_km",
            self.d2.hysteresis_km,
            LOCATION_HYSTERESIS_RANGE_KM,
        )?;
        check_range(
            "events.frequency_offset_db",
            self.frequency_offset_db,
            OFFSET_RANGE_DB,
        )?;
        for (satellite, offset) in &self.cell_offsets_db {
            check_range(
                &format!("events.cell_offsets_db.{satellite}"),
                *offset,
                OFFSET_RANGE_DB,
            )?;
        }
        let ttt_ms = self.time_to_trigger.num_milliseconds();
        if !TIME_TO_TRIGGER_MS.contains(&ttt_ms) {
            return Err(ConfigError::invalid(
                "events.time_to_trigger",
                format!("{ttt_ms} ms is not a TS 38.331 time-to-trigger value"),
            ));
        }
        Ok(())
    }
}

fn check_range(field: &str, value: f64, (min, max): (f64, f64)) -> Result<(), ConfigError> {
    if !value.is_finite() || value < min || value > max {
        return Err(ConfigError::invalid(
            field,
            format!("{value} outside [{min}, {max}]"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        EventConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_hysteresis() {
        let mut config = EventConfig::default();
        config.a4.hysteresis_db = 31.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { ref field, .. }) if field == "events.a4.hysteresis_db"
        ));
    }

    #[test]
    fn rejects_non_standard_time_to_trigger() {
        let config = EventConfig {
            time_to_trigger: Duration::milliseconds(700),
            ..EventConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn cell_offset_defaults_to_zero() {
        let mut config = EventConfig::default();
        config.cell_offsets_db.insert(SatelliteId(5), 2.5);
        assert_eq!(config.cell_offset_db(SatelliteId(5)), 2.5);
        assert_eq!(config.cell_offset_db(SatelliteId(6)), 0.0);
    }
}
