//! Non-singular mean element propagation.
//!
//! Used for near-circular or near-equatorial element sets where the classical
//! angles (argument of perigee, RAAN) are undefined. Works in equinoctial
//! elements `(a, h, k, p, q, lambda)` with two-body motion plus the secular
//! J2 drift of the node, perigee and mean anomaly.

use crate::orbit::{OrbitalElement, EARTH_EQUATORIAL_RADIUS_KM, EARTH_J2};

const KEPLER_TOLERANCE: f64 = 1e-12;
const KEPLER_MAX_ITERATIONS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquinoctialOrbit {
    a_km: f64,
    n_rad_s: f64,
    eccentricity: f64,
    tan_half_i: f64,
    raan0: f64,
    longitude_of_perigee0: f64,
    mean_longitude0: f64,
    raan_rate: f64,
    perigee_rate: f64,
    mean_anomaly_rate: f64,
}

impl EquinoctialOrbit {
    pub fn from_element(element: &OrbitalElement) -> Self {
        let n = element.mean_motion_rad_s();
        let a = element.semi_major_axis_km();
        let e = element.eccentricity;
        let i = element.inclination_rad;

        let p = a * (1.0 - e * e);
        let factor = 0.75 * n * EARTH_J2 * (EARTH_EQUATORIAL_RADIUS_KM / p).powi(2);
        let cos_i = i.cos();
        let raan_rate = -2.0 * factor * cos_i;
        let argp_rate = factor * (5.0 * cos_i * cos_i - 1.0);
        let mean_anomaly_rate =
            n + factor * (1.0 - e * e).sqrt() * (3.0 * cos_i * cos_i - 1.0);

        let raan0 = element.raan_rad;
        let longitude_of_perigee0 = element.arg_perigee_rad + raan0;

        Self {
            a_km: a,
            n_rad_s: n,
            eccentricity: e,
            tan_half_i: (i / 2.0).tan(),
            raan0,
            longitude_of_perigee0,
            mean_longitude0: element.mean_anomaly_rad + longitude_of_perigee0,
            raan_rate,
            perigee_rate: argp_rate + raan_rate,
            mean_anomaly_rate,
        }
    }

    /// Position (km) and velocity (km/s) `dt_s` seconds after the epoch.
    pub fn propagate(&self, dt_s: f64) -> ([f64; 3], [f64; 3]) {
        let raan = self.raan0 + self.raan_rate * dt_s;
        let varpi = self.longitude_of_perigee0 + self.perigee_rate * dt_s;
        let lambda = self.mean_longitude0 + (self.mean_anomaly_rate + self.perigee_rate) * dt_s;

        let h = self.eccentricity * varpi.sin();
        let k = self.eccentricity * varpi.cos();
        let p = self.tan_half_i * raan.sin();
        let q = self.tan_half_i * raan.cos();

        let f_anom = solve_kepler_equinoctial(lambda, h, k);
        let (sin_f, cos_f) = f_anom.sin_cos();

        let beta = 1.0 / (1.0 + (1.0 - h * h - k * k).sqrt());
        let a = self.a_km;
        let x1 = a * ((1.0 - h * h * beta) * cos_f + h * k * beta * sin_f - k);
        let y1 = a * ((1.0 - k * k * beta) * sin_f + h * k * beta * cos_f - h);
        let r = a * (1.0 - k * cos_f - h * sin_f);

        let scale = self.n_rad_s * a * a / r;
        let vx1 = scale * (h * k * beta * cos_f - (1.0 - h * h * beta) * sin_f);
        let vy1 = scale * ((1.0 - k * k * beta) * cos_f - h * k * beta * sin_f);

        let s2 = 1.0 + p * p + q * q;
        let f = [
            (1.0 - p * p + q * q) / s2,
            2.0 * p * q / s2,
            -2.0 * p / s2,
        ];
        let g = [
            2.0 * p * q / s2,
            (1.0 + p * p - q * q) / s2,
            2.0 * q / s2,
        ];

        let position = [
            x1 * f[0] + y1 * g[0],
            x1 * f[1] + y1 * g[1],
            x1 * f[2] + y1 * g[2],
        ];
        let velocity = [
            vx1 * f[0] + vy1 * g[0],
            vx1 * f[1] + vy1 * g[1],
            vx1 * f[2] + vy1 * g[2],
        ];
        (position, velocity)
    }
}

/// Solve `lambda = F + h cos F - k sin F` for the eccentric longitude `F`.
fn solve_kepler_equinoctial(lambda: f64, h: f64, k: f64) -> f64 {
    let mut f = lambda;
    for _ in 0..KEPLER_MAX_ITERATIONS {
        let (sin_f, cos_f) = f.sin_cos();
        let residual = f + h * cos_f - k * sin_f - lambda;
        let slope = 1.0 - h * sin_f - k * cos_f;
        let step = residual / slope;
        f -= step;
        if step.abs() < KEPLER_TOLERANCE {
            break;
        }
    }
    f
}
