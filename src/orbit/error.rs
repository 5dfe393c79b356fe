use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::orbit::SatelliteId;

/// Reasons an element set is refused at ingestion.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ElementError {
    #[error("invalid tle: {0}")]
    InvalidTle(String),
    #[error("satellite {satellite}: non-finite value in field {field}")]
    NonFinite {
        satellite: SatelliteId,
        field: &'static str,
    },
    #[error("satellite {satellite}: eccentricity {value} outside [0, 1)")]
    Eccentricity { satellite: SatelliteId, value: f64 },
    #[error("satellite {satellite}: mean motion {value} rev/day must be positive")]
    MeanMotion { satellite: SatelliteId, value: f64 },
    #[error("satellite {satellite}: inclination {value} rad outside [0, pi]")]
    Inclination { satellite: SatelliteId, value: f64 },
    #[error("satellite {satellite}: perigee radius {perigee_km:.1} km is below the earth surface")]
    Perigee {
        satellite: SatelliteId,
        perigee_km: f64,
    },
    #[error("satellite {satellite}: sgp4 initialisation failed: {message}")]
    Initialisation {
        satellite: SatelliteId,
        message: String,
    },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PropagationError {
    #[error("element for satellite {satellite} is stale: epoch {epoch} is {drift} away from {at}")]
    StaleElement {
        satellite: SatelliteId,
        epoch: DateTime<Utc>,
        at: DateTime<Utc>,
        drift: Duration,
    },
    #[error("propagation of satellite {satellite} produced non-finite output")]
    NonFinite { satellite: SatelliteId },
    #[error("invalid element: {0}")]
    Element(#[from] ElementError),
    #[error("sgp4 error for satellite {satellite}: {message}")]
    Sgp4 {
        satellite: SatelliteId,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum TleLoadError {
    #[error("TLE directory not found: {0}")]
    DirectoryNotFound(String),
    #[error("TLE file read error: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Invalid TLE format in {file}: {message}")]
    InvalidTle { file: String, message: String },
}
