use std::f64::consts::{PI, TAU};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::orbit::error::ElementError;
use crate::orbit::{EARTH_EQUATORIAL_RADIUS_KM, EARTH_MU_KM3_S2};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Catalog number of a satellite.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SatelliteId(pub u32);

impl fmt::Display for SatelliteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mean orbital elements of one satellite at a reference epoch.
///
/// Angles are radians, mean motion is revolutions per day (the TLE unit),
/// `bstar` is the SGP4 drag term in inverse earth radii. A record is never
/// mutated after ingestion; a newer epoch replaces it in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrbitalElement {
    pub satellite_id: SatelliteId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub constellation: Option<String>,
    pub epoch: DateTime<Utc>,
    pub inclination_rad: f64,
    pub raan_rad: f64,
    pub eccentricity: f64,
    pub arg_perigee_rad: f64,
    pub mean_anomaly_rad: f64,
    pub mean_motion_rev_per_day: f64,
    #[serde(default)]
    pub bstar: f64,
}

impl OrbitalElement {
    /// Parse a two-line element set.
    pub fn from_tle(
        name: Option<String>,
        line1: &str,
        line2: &str,
        constellation: Option<String>,
    ) -> Result<Self, ElementError> {
        let elements = sgp4::Elements::from_tle(name, line1.as_bytes(), line2.as_bytes())
            .map_err(|e| ElementError::InvalidTle(e.to_string()))?;

        let norad_id = u32::try_from(elements.norad_id)
            .map_err(|_| ElementError::InvalidTle(format!("catalog number {}", elements.norad_id)))?;

        Ok(Self {
            satellite_id: SatelliteId(norad_id),
            name: elements.object_name.clone(),
            constellation,
            epoch: DateTime::<Utc>::from_naive_utc_and_offset(elements.datetime, Utc),
            inclination_rad: elements.inclination.to_radians(),
            raan_rad: elements.right_ascension.to_radians(),
            eccentricity: elements.eccentricity,
            arg_perigee_rad: elements.argument_of_perigee.to_radians(),
            mean_anomaly_rad: elements.mean_anomaly.to_radians(),
            mean_motion_rev_per_day: elements.mean_motion,
            bstar: elements.drag_term,
        })
    }

    /// Reject records that cannot describe a bound earth orbit.
    pub fn validate(&self) -> Result<(), ElementError> {
        let satellite = self.satellite_id;
        let fields = [
            ("inclination_rad", self.inclination_rad),
            ("raan_rad", self.raan_rad),
            ("eccentricity", self.eccentricity),
            ("arg_perigee_rad", self.arg_perigee_rad),
            ("mean_anomaly_rad", self.mean_anomaly_rad),
            ("mean_motion_rev_per_day", self.mean_motion_rev_per_day),
            ("bstar", self.bstar),
        ];
        if let Some((field, _)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ElementError::NonFinite { satellite, field });
        }
        if !(0.0..1.0).contains(&self.eccentricity) {
            return Err(ElementError::Eccentricity {
                satellite,
                value: self.eccentricity,
            });
        }
        if self.mean_motion_rev_per_day <= 0.0 {
            return Err(ElementError::MeanMotion {
                satellite,
                value: self.mean_motion_rev_per_day,
            });
        }
        if !(0.0..=PI).contains(&self.inclination_rad) {
            return Err(ElementError::Inclination {
                satellite,
                value: self.inclination_rad,
            });
        }
        let perigee_km = self.semi_major_axis_km() * (1.0 - self.eccentricity);
        if perigee_km < EARTH_EQUATORIAL_RADIUS_KM {
            return Err(ElementError::Perigee {
                satellite,
                perigee_km,
            });
        }
        Ok(())
    }

    pub fn mean_motion_rad_s(&self) -> f64 {
        self.mean_motion_rev_per_day * TAU / SECONDS_PER_DAY
    }

    pub fn semi_major_axis_km(&self) -> f64 {
        let n = self.mean_motion_rad_s();
        (EARTH_MU_KM3_S2 / (n * n)).cbrt()
    }

    /// Element set in the form the `sgp4` crate initialises from.
    pub(crate) fn to_sgp4(&self) -> sgp4::Elements {
        sgp4::Elements {
            object_name: self.name.clone(),
            international_designator: None,
            norad_id: u64::from(self.satellite_id.0),
            classification: sgp4::Classification::Unclassified,
            datetime: self.epoch.naive_utc(),
            mean_motion_dot: 0.0,
            mean_motion_ddot: 0.0,
            drag_term: self.bstar,
            element_set_number: 0,
            inclination: self.inclination_rad.to_degrees(),
            right_ascension: self.raan_rad.to_degrees(),
            eccentricity: self.eccentricity,
            argument_of_perigee: self.arg_perigee_rad.to_degrees(),
            mean_anomaly: self.mean_anomaly_rad.to_degrees(),
            mean_motion: self.mean_motion_rev_per_day,
            revolution_number: 0,
            ephemeris_type: 0,
        }
    }
}
