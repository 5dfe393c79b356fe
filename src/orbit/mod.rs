//! Orbit propagation: element sets, SGP4 with a regularised fallback,
//! shared element catalog and the topocentric geometry of a ground station.

mod cache;
mod catalog;
mod element;
mod equinoctial;
mod error;
mod geometry;
mod propagator;
mod tle_loader;

pub use cache::PropagationCache;
pub use catalog::{ElementCatalog, IngestReport};
pub use element::{OrbitalElement, SatelliteId};
pub use error::{ElementError, PropagationError, TleLoadError};
pub use geometry::{look_angles, GroundStation, LookAngles};
pub use propagator::{PreparedElement, PropagationConfig, PropagationModel, Propagator, StateVector};
pub use tle_loader::{parse_multi_tle, TleLoader};

#[cfg(test)]
pub(crate) use element::tests as test_support;

pub const EARTH_ROTATION_RAD_S: f64 = 7.292_115e-5;
pub const EARTH_EQUATORIAL_RADIUS_KM: f64 = 6378.137;
pub const EARTH_MU_KM3_S2: f64 = 398_600.4418;
pub const EARTH_J2: f64 = 1.082_626_68e-3;
