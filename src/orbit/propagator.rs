use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::de_duration;
use crate::orbit::cache::PropagationCache;
use crate::orbit::equinoctial::EquinoctialOrbit;
use crate::orbit::error::{ElementError, PropagationError};
use crate::orbit::{OrbitalElement, SatelliteId};

const NEAR_SINGULAR_ECCENTRICITY: f64 = 1e-6;
const NEAR_SINGULAR_INCLINATION_RAD: f64 = 1e-6;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    /// Beyond this distance from the element epoch propagation is refused.
    #[serde(deserialize_with = "de_duration")]
    pub max_epoch_drift: Duration,
    /// Beyond this distance results are still produced but flagged degraded.
    #[serde(deserialize_with = "de_duration")]
    pub degraded_epoch_drift: Duration,
    #[serde(deserialize_with = "de_duration")]
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            max_epoch_drift: Duration::days(7),
            degraded_epoch_drift: Duration::days(3),
            cache_ttl: Duration::minutes(10),
            cache_capacity: 100_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationModel {
    Sgp4,
    Equinoctial,
}

/// Inertial (TEME) position and velocity of a satellite at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StateVector {
    pub satellite_id: SatelliteId,
    pub timestamp: DateTime<Utc>,
    pub element_epoch: DateTime<Utc>,
    pub position_km: [f64; 3],
    pub velocity_km_s: [f64; 3],
    pub model: PropagationModel,
    /// Element epoch is further than the degraded drift bound from `timestamp`.
    pub degraded: bool,
}

/// An element set together with its propagation setup, computed once.
pub struct PreparedElement {
    element: OrbitalElement,
    sgp4: Option<sgp4::Constants>,
    fallback: EquinoctialOrbit,
    near_singular: bool,
}

impl std::fmt::Debug for PreparedElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedElement")
            .field("element", &self.element)
            .field("sgp4", &self.sgp4.is_some())
            .field("near_singular", &self.near_singular)
            .finish()
    }
}

impl PreparedElement {
    pub fn new(element: OrbitalElement) -> Result<Self, ElementError> {
        element.validate()?;

        let near_singular = element.eccentricity < NEAR_SINGULAR_ECCENTRICITY
            || element.inclination_rad < NEAR_SINGULAR_INCLINATION_RAD;

        let sgp4 = match sgp4::Constants::from_elements(&element.to_sgp4()) {
            Ok(constants) => Some(constants),
            Err(e) if near_singular => {
                debug!(
                    "sgp4 rejected near-singular satellite {} ({}), using equinoctial model",
                    element.satellite_id, e
                );
                None
            }
            Err(e) => {
                return Err(ElementError::Initialisation {
                    satellite: element.satellite_id,
                    message: e.to_string(),
                })
            }
        };

        Ok(Self {
            fallback: EquinoctialOrbit::from_element(&element),
            element,
            sgp4,
            near_singular,
        })
    }

    pub fn element(&self) -> &OrbitalElement {
        &self.element
    }

    pub fn satellite_id(&self) -> SatelliteId {
        self.element.satellite_id
    }

    pub fn epoch(&self) -> DateTime<Utc> {
        self.element.epoch
    }

    pub fn is_near_singular(&self) -> bool {
        self.near_singular
    }

    fn propagate_raw(
        &self,
        at: DateTime<Utc>,
    ) -> Result<([f64; 3], [f64; 3], PropagationModel), PropagationError> {
        let dt = at - self.element.epoch;
        let dt_s = dt.num_milliseconds() as f64 / 1000.0;

        if let Some(constants) = &self.sgp4 {
            match constants.propagate(sgp4::MinutesSinceEpoch(dt_s / 60.0)) {
                Ok(prediction) if is_finite(&prediction.position, &prediction.velocity) => {
                    return Ok((prediction.position, prediction.velocity, PropagationModel::Sgp4));
                }
                Ok(_) if !self.near_singular => {
                    return Err(PropagationError::NonFinite {
                        satellite: self.satellite_id(),
                    })
                }
                Err(e) if !self.near_singular => {
                    return Err(PropagationError::Sgp4 {
                        satellite: self.satellite_id(),
                        message: e.to_string(),
                    })
                }
                _ => {}
            }
        }

        let (position, velocity) = self.fallback.propagate(dt_s);
        Ok((position, velocity, PropagationModel::Equinoctial))
    }
}

fn is_finite(position: &[f64; 3], velocity: &[f64; 3]) -> bool {
    position.iter().chain(velocity.iter()).all(|v| v.is_finite())
}

/// Computes state vectors from prepared elements.
///
/// Propagation is a pure function of `(element, timestamp)`; the optional
/// cache only short-circuits recomputation.
#[derive(Debug, Clone)]
pub struct Propagator {
    config: PropagationConfig,
    cache: Option<Arc<PropagationCache>>,
}

impl Propagator {
    pub fn new(config: PropagationConfig) -> Self {
        Self {
            config,
            cache: None,
        }
    }

    pub fn with_cache(config: PropagationConfig, cache: Arc<PropagationCache>) -> Self {
        Self {
            config,
            cache: Some(cache),
        }
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    /// Prepare and propagate a bare element set in one go.
    pub fn propagate_element(
        &self,
        element: &OrbitalElement,
        at: DateTime<Utc>,
    ) -> Result<StateVector, PropagationError> {
        let prepared = PreparedElement::new(element.clone())?;
        self.propagate(&prepared, at)
    }

    pub fn propagate(
        &self,
        prepared: &PreparedElement,
        at: DateTime<Utc>,
    ) -> Result<StateVector, PropagationError> {
        let satellite = prepared.satellite_id();
        let epoch = prepared.epoch();
        let drift = (at - epoch).abs();
        if drift > self.config.max_epoch_drift {
            return Err(PropagationError::StaleElement {
                satellite,
                epoch,
                at,
                drift,
            });
        }

        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(satellite, at, epoch)) {
            return Ok(cached);
        }

        let (position_km, velocity_km_s, model) = prepared.propagate_raw(at)?;
        if !is_finite(&position_km, &velocity_km_s) {
            return Err(PropagationError::NonFinite { satellite });
        }

        let state = StateVector {
            satellite_id: satellite,
            timestamp: at,
            element_epoch: epoch,
            position_km,
            velocity_km_s,
            model,
            degraded: drift > self.config.degraded_epoch_drift,
        };

        if let Some(cache) = &self.cache {
            cache.insert(state);
        }
        Ok(state)
    }

    /// Propagate many satellites to one shared instant.
    pub fn propagate_batch<'a, I>(
        &self,
        elements: I,
        at: DateTime<Utc>,
    ) -> Vec<(SatelliteId, Result<StateVector, PropagationError>)>
    where
        I: IntoIterator<Item = &'a PreparedElement>,
    {
        elements
            .into_iter()
            .map(|prepared| (prepared.satellite_id(), self.propagate(prepared, at)))
            .collect()
    }
}
