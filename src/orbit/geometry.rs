use serde::{Deserialize, Serialize};

use crate::orbit::{StateVector, EARTH_EQUATORIAL_RADIUS_KM, EARTH_ROTATION_RAD_S};

// WGS-84 first eccentricity squared
const WGS84_E2: f64 = 0.006_694_379_990_14;

/// Geodetic position of a ground terminal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundStation {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    #[serde(default)]
    pub altitude_m: f64,
}

impl GroundStation {
    pub fn new(latitude_deg: f64, longitude_deg: f64, altitude_m: f64) -> Self {
        Self {
            latitude_deg,
            longitude_deg,
            altitude_m,
        }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude_deg)
            && (-180.0..=180.0).contains(&self.longitude_deg)
            && self.altitude_m.is_finite()
    }

    pub fn lat_rad(&self) -> f64 {
        self.latitude_deg.to_radians()
    }

    pub fn lon_rad(&self) -> f64 {
        self.longitude_deg.to_radians()
    }

    pub fn position_ecef_km(&self) -> [f64; 3] {
        let lat = self.lat_rad();
        let lon = self.lon_rad();
        let (sin_lat, cos_lat) = lat.sin_cos();
        let (sin_lon, cos_lon) = lon.sin_cos();
        let n = EARTH_EQUATORIAL_RADIUS_KM / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();
        let alt_km = self.altitude_m / 1000.0;
        [
            (n + alt_km) * cos_lat * cos_lon,
            (n + alt_km) * cos_lat * sin_lon,
            (n * (1.0 - WGS84_E2) + alt_km) * sin_lat,
        ]
    }
}

/// Topocentric view of a satellite from a ground station.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LookAngles {
    pub elevation_deg: f64,
    pub azimuth_deg: f64,
    pub range_km: f64,
    /// Positive when the satellite moves away from the station.
    pub range_rate_km_s: f64,
}

/// Look angles of an inertial (TEME) state vector from `station`.
pub fn look_angles(station: &GroundStation, state: &StateVector) -> LookAngles {
    let gmst = sgp4::iau_epoch_to_sidereal_time(sgp4::julian_years_since_j2000(
        &state.timestamp.naive_utc(),
    ));

    let sat_ecef = teme_to_ecef_position(state.position_km, gmst);
    let sat_vel_ecef = teme_to_ecef_velocity(state.position_km, state.velocity_km_s, gmst);
    let sta_ecef = station.position_ecef_km();

    let dr = sub(sat_ecef, sta_ecef);
    let range_km = norm(dr);

    let (east, north, up) = ecef_to_enu(dr, station.lat_rad(), station.lon_rad());
    let azimuth_deg = east.atan2(north).to_degrees().rem_euclid(360.0);
    let elevation_deg = if range_km > 0.0 {
        (up / range_km).clamp(-1.0, 1.0).asin().to_degrees()
    } else {
        90.0
    };

    // the station is fixed in ECEF, so the ECEF satellite velocity is already relative
    let range_rate_km_s = if range_km > 0.0 {
        dot(sat_vel_ecef, dr) / range_km
    } else {
        0.0
    };

    LookAngles {
        elevation_deg,
        azimuth_deg,
        range_km,
        range_rate_km_s,
    }
}

pub fn teme_to_ecef_position(pos_teme: [f64; 3], gmst: f64) -> [f64; 3] {
    let (sin_gmst, cos_gmst) = gmst.sin_cos();
    [
        pos_teme[0] * cos_gmst + pos_teme[1] * sin_gmst,
        -pos_teme[0] * sin_gmst + pos_teme[1] * cos_gmst,
        pos_teme[2],
    ]
}

pub fn teme_to_ecef_velocity(pos_teme: [f64; 3], vel_teme: [f64; 3], gmst: f64) -> [f64; 3] {
    let pos = teme_to_ecef_position(pos_teme, gmst);
    let rotated = teme_to_ecef_position(vel_teme, gmst);
    [
        rotated[0] + EARTH_ROTATION_RAD_S * pos[1],
        rotated[1] - EARTH_ROTATION_RAD_S * pos[0],
        rotated[2],
    ]
}

pub fn ecef_to_enu(dr: [f64; 3], lat_rad: f64, lon_rad: f64) -> (f64, f64, f64) {
    let (sin_lat, cos_lat) = lat_rad.sin_cos();
    let (sin_lon, cos_lon) = lon_rad.sin_cos();

    let east = -sin_lon * dr[0] + cos_lon * dr[1];
    let north = -sin_lat * cos_lon * dr[0] - sin_lat * sin_lon * dr[1] + cos_lat * dr[2];
    let up = cos_lat * cos_lon * dr[0] + cos_lat * sin_lon * dr[1] + sin_lat * dr[2];
    (east, north, up)
}

pub(crate) fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub(crate) fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub(crate) fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn equator_station_sits_on_x_axis() {
        let station = GroundStation::new(0.0, 0.0, 0.0);
        let [x, y, z] = station.position_ecef_km();
        assert_relative_eq!(x, EARTH_EQUATORIAL_RADIUS_KM, epsilon = 1e-9);
        assert_relative_eq!(y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(z, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn zenith_vector_is_pure_up() {
        let (e, n, u) = ecef_to_enu([100.0, 0.0, 0.0], 0.0, 0.0);
        assert_relative_eq!(e, 0.0, epsilon = 1e-12);
        assert_relative_eq!(n, 0.0, epsilon = 1e-12);
        assert_relative_eq!(u, 100.0, epsilon = 1e-12);
    }

    #[test]
    fn rejects_out_of_range_latitude() {
        assert!(!GroundStation::new(91.0, 0.0, 0.0).is_valid());
        assert!(GroundStation::new(25.0, 121.0, 50.0).is_valid());
    }
}
