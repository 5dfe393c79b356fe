use serde::Deserialize;

use crate::config::ConfigError;
use crate::visibility::ObserverGeometry;

/// Below this elevation the atmospheric loss is a flat penalty.
const LOW_ELEVATION_DEG: f64 = 5.0;
const LOW_ELEVATION_LOSS_DB: f64 = 10.0;
const ZENITH_ATMOSPHERIC_LOSS_DB: f64 = 0.5;

/// Deterministic downlink budget turning geometry into a pseudo-RSRP.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkBudget {
    pub frequency_ghz: f64,
    pub eirp_dbm: f64,
    pub rx_gain_dbi: f64,
}

impl Default for LinkBudget {
    fn default() -> Self {
        Self {
            frequency_ghz: 2.0,
            eirp_dbm: 43.0,
            rx_gain_dbi: 10.0,
        }
    }
}

impl LinkBudget {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.frequency_ghz.is_finite() && self.frequency_ghz > 0.0) {
            return Err(ConfigError::invalid(
                "link_budget.frequency_ghz",
                "must be positive",
            ));
        }
        if !self.eirp_dbm.is_finite() || !self.rx_gain_dbi.is_finite() {
            return Err(ConfigError::invalid(
                "link_budget",
                "eirp_dbm and rx_gain_dbi must be finite",
            ));
        }
        Ok(())
    }

    /// Free-space path loss in dB for a slant range in kilometres.
    pub fn free_space_path_loss_db(&self, range_km: f64) -> f64 {
        92.45 + 20.0 * range_km.max(1.0).log10() + 20.0 * self.frequency_ghz.log10()
    }

    pub fn rsrp_dbm(&self, range_km: f64, elevation_deg: f64) -> f64 {
        self.eirp_dbm + self.rx_gain_dbi
            - self.free_space_path_loss_db(range_km)
            - atmospheric_loss_db(elevation_deg)
    }

    pub fn rsrp_for(&self, geometry: &ObserverGeometry) -> f64 {
        self.rsrp_dbm(geometry.range_km, geometry.elevation_deg)
    }
}

pub fn atmospheric_loss_db(elevation_deg: f64) -> f64 {
    if elevation_deg > LOW_ELEVATION_DEG {
        ZENITH_ATMOSPHERIC_LOSS_DB / elevation_deg.to_radians().sin()
    } else {
        LOW_ELEVATION_LOSS_DB
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn path_loss_matches_friis() {
        let budget = LinkBudget::default();
        // 1000 km at 2 GHz
        assert_relative_eq!(
            budget.free_space_path_loss_db(1000.0),
            92.45 + 60.0 + 20.0 * 2.0_f64.log10(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn atmospheric_loss_grows_towards_the_horizon() {
        assert_relative_eq!(atmospheric_loss_db(90.0), 0.5, epsilon = 1e-12);
        assert_relative_eq!(atmospheric_loss_db(30.0), 1.0, epsilon = 1e-12);
        assert_eq!(atmospheric_loss_db(3.0), 10.0);
    }

    #[test]
    fn closer_satellite_is_stronger() {
        let budget = LinkBudget::default();
        assert!(budget.rsrp_dbm(600.0, 60.0) > budget.rsrp_dbm(1800.0, 15.0));
    }
}
