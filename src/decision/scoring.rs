use chrono::Duration;
use serde::Deserialize;

use crate::config::{de_duration, ConfigError};
use crate::visibility::Candidate;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Weights of the initial access score.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccessWeights {
    pub elevation: f64,
    pub visibility: f64,
    pub load: f64,
}

impl Default for AccessWeights {
    fn default() -> Self {
        Self {
            elevation: 0.5,
            visibility: 0.3,
            load: 0.2,
        }
    }
}

/// Weights of the composite score compared between serving and candidate.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HandoverWeights {
    pub signal: f64,
    pub elevation: f64,
    pub load: f64,
    pub visibility: f64,
}

impl Default for HandoverWeights {
    fn default() -> Self {
        Self {
            signal: 0.4,
            elevation: 0.2,
            load: 0.2,
            visibility: 0.2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub access_weights: AccessWeights,
    pub handover_weights: HandoverWeights,
    /// Score a candidate must beat the serving satellite by.
    pub ping_pong_margin: f64,
    /// A serving window closing within this triggers a forced handover.
    #[serde(deserialize_with = "de_duration")]
    pub forced_lookahead: Duration,
    /// A satellite left within this is not an event-path target.
    #[serde(deserialize_with = "de_duration")]
    pub cooldown: Duration,
    /// Remaining visibility at or beyond this scores 1.
    #[serde(deserialize_with = "de_duration")]
    pub visibility_horizon: Duration,
    /// RSRP scoring 0; `signal_floor_dbm + signal_span_db` scores 1.
    pub signal_floor_dbm: f64,
    pub signal_span_db: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            access_weights: AccessWeights::default(),
            handover_weights: HandoverWeights::default(),
            ping_pong_margin: 0.05,
            forced_lookahead: Duration::seconds(30),
            cooldown: Duration::seconds(30),
            visibility_horizon: Duration::minutes(10),
            signal_floor_dbm: -120.0,
            signal_span_db: 60.0,
        }
    }
}

impl DecisionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.access_weights;
        check_weights(
            "decision.access_weights",
            &[("elevation", a.elevation), ("visibility", a.visibility), ("load", a.load)],
        )?;
        let h = &self.handover_weights;
        check_weights(
            "decision.handover_weights",
            &[
                ("signal", h.signal),
                ("elevation", h.elevation),
                ("load", h.load),
                ("visibility", h.visibility),
            ],
        )?;
        if !(0.0..=1.0).contains(&self.ping_pong_margin) {
            return Err(ConfigError::invalid(
                "decision.ping_pong_margin",
                "must be in [0, 1]",
            ));
        }
        if self.forced_lookahead < Duration::zero() || self.cooldown < Duration::zero() {
            return Err(ConfigError::invalid(
                "decision.forced_lookahead",
                "lookahead and cooldown must not be negative",
            ));
        }
        if self.visibility_horizon <= Duration::zero() {
            return Err(ConfigError::invalid(
                "decision.visibility_horizon",
                "must be positive",
            ));
        }
        if !(self.signal_span_db.is_finite() && self.signal_span_db > 0.0)
            || !self.signal_floor_dbm.is_finite()
        {
            return Err(ConfigError::invalid(
                "decision.signal_span_db",
                "signal normalisation must be finite with a positive span",
            ));
        }
        Ok(())
    }

    pub fn access_score(&self, candidate: &Candidate) -> f64 {
        let w = &self.access_weights;
        w.elevation * elevation_term(candidate)
            + w.visibility * self.visibility_term(candidate)
            + w.load * load_term(candidate)
    }

    /// Composite of signal, geometry, load and remaining visibility in `[0, 1]`.
    pub fn handover_score(&self, candidate: &Candidate, rsrp_dbm: f64) -> f64 {
        let w = &self.handover_weights;
        let signal = ((rsrp_dbm - self.signal_floor_dbm) / self.signal_span_db).clamp(0.0, 1.0);
        w.signal * signal
            + w.elevation * elevation_term(candidate)
            + w.load * load_term(candidate)
            + w.visibility * self.visibility_term(candidate)
    }

    fn visibility_term(&self, candidate: &Candidate) -> f64 {
        let horizon = self.visibility_horizon.num_milliseconds() as f64;
        let remaining = candidate.remaining_visibility.num_milliseconds() as f64;
        (remaining / horizon).clamp(0.0, 1.0)
    }
}

fn elevation_term(candidate: &Candidate) -> f64 {
    (candidate.geometry.elevation_deg / 90.0).clamp(0.0, 1.0)
}

fn load_term(candidate: &Candidate) -> f64 {
    (1.0 - candidate.load).clamp(0.0, 1.0)
}

fn check_weights(section: &str, weights: &[(&str, f64)]) -> Result<(), ConfigError> {
    for (name, value) in weights {
        if !(0.0..=1.0).contains(value) {
            return Err(ConfigError::invalid(
                format!("{section}.{name}"),
                format!("{value} outside [0, 1]"),
            ));
        }
    }
    let sum: f64 = weights.iter().map(|(_, v)| v).sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(ConfigError::invalid(
            section,
            format!("weights sum to {sum}, expected 1"),
        ));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::orbit::SatelliteId;
    use crate::visibility::ObserverGeometry;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};

    pub fn candidate(id: u32, elevation_deg: f64, remaining_s: i64, load: f64) -> Candidate {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        Candidate {
            satellite_id: SatelliteId(id),
            geometry: ObserverGeometry {
                satellite_id: SatelliteId(id),
                timestamp: at,
                elevation_deg,
                azimuth_deg: 180.0,
                range_km: 550.0 / elevation_deg.to_radians().sin().max(0.2),
                range_rate_km_s: 0.0,
                visible: true,
                degraded: false,
            },
            window_entry: at - Duration::minutes(2),
            predicted_exit: Some(at + Duration::seconds(remaining_s)),
            remaining_visibility: Duration::seconds(remaining_s),
            load,
            degraded: false,
        }
    }

    #[test]
    fn defaults_are_valid() {
        DecisionConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_weight_out_of_bounds() {
        let mut config = DecisionConfig::default();
        config.handover_weights.signal = 1.2;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { ref field, .. }) if field == "decision.handover_weights.signal"
        ));
    }

    #[test]
    fn access_score_combines_terms() {
        let config = DecisionConfig::default();
        // 0.5 * 45/90 + 0.3 * 300/600 + 0.2 * (1 - 0.5)
        assert_relative_eq!(
            config.access_score(&candidate(1, 45.0, 300, 0.5)),
            0.25 + 0.15 + 0.1,
            epsilon = 1e-12
        );
    }

    #[test]
    fn signal_term_is_clamped() {
        let config = DecisionConfig::default();
        let c = candidate(1, 90.0, 600, 0.0);
        assert_relative_eq!(config.handover_score(&c, -20.0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(config.handover_score(&c, -200.0), 0.6, epsilon = 1e-12);
    }
}
