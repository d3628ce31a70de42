// src/geodesy.rs
//
// Great-circle helpers on a spherical Earth. Precision is well inside the
// feed's GPS noise at the distances the guard cares about (metres to a few km).

use crate::error::{TrackingError, TrackingResult};
use serde::{Deserialize, Serialize};

/// Mean Earth radius (IUGG), metres.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Below this separation interpolation falls back to plain lerp.
const SLERP_MIN_ANGLE_RAD: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    pub fn is_valid(&self) -> bool {
        self.lon.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lon)
            && (-90.0..=90.0).contains(&self.lat)
    }

    pub fn validate(self) -> TrackingResult<Self> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(TrackingError::InvalidGeometry {
                lon: self.lon,
                lat: self.lat,
            })
        }
    }

    fn to_unit_vector(self) -> [f64; 3] {
        let (lat, lon) = (self.lat.to_radians(), self.lon.to_radians());
        [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
    }

    fn from_unit_vector(v: [f64; 3]) -> Self {
        let lat = v[2].atan2((v[0] * v[0] + v[1] * v[1]).sqrt());
        let lon = v[1].atan2(v[0]);
        Self::new(lon.to_degrees(), lat.to_degrees())
    }
}

/// Haversine distance in metres.
pub fn surface_distance(a: GeoPoint, b: GeoPoint) -> TrackingResult<f64> {
    let a = a.validate()?;
    let b = b.validate()?;
    Ok(EARTH_RADIUS_M * central_angle(a, b))
}

pub fn midpoint(a: GeoPoint, b: GeoPoint) -> TrackingResult<GeoPoint> {
    interpolate(a, b, 0.5)
}

/// Point at fraction `t` along the great circle from `a` to `b`.
pub fn interpolate(a: GeoPoint, b: GeoPoint, t: f64) -> TrackingResult<GeoPoint> {
    let a = a.validate()?;
    let b = b.validate()?;
    let t = t.clamp(0.0, 1.0);

    let omega = central_angle(a, b);
    if omega < SLERP_MIN_ANGLE_RAD {
        return Ok(GeoPoint::new(
            a.lon + (b.lon - a.lon) * t,
            a.lat + (b.lat - a.lat) * t,
        ));
    }

    let (va, vb) = (a.to_unit_vector(), b.to_unit_vector());
    let sin_omega = omega.sin();
    let wa = ((1.0 - t) * omega).sin() / sin_omega;
    let wb = (t * omega).sin() / sin_omega;
    Ok(GeoPoint::from_unit_vector([
        wa * va[0] + wb * vb[0],
        wa * va[1] + wb * vb[1],
        wa * va[2] + wb * vb[2],
    ]))
}

/// Initial bearing from `a` to `b`, degrees clockwise from north in [0, 360).
pub fn bearing_deg(a: GeoPoint, b: GeoPoint) -> TrackingResult<f64> {
    let a = a.validate()?;
    let b = b.validate()?;
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlon = (b.lon - a.lon).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    Ok(y.atan2(x).to_degrees().rem_euclid(360.0))
}

fn central_angle(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_degree_of_longitude_at_equator() {
        let d = surface_distance(GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 0.0)).unwrap();
        assert!((d - 111_195.0).abs() < 200.0);
    }

    #[test]
    fn test_distance_at_58_north() {
        // 0.01 deg of longitude at 58N is roughly 590 m
        let d = surface_distance(GeoPoint::new(12.0, 58.0), GeoPoint::new(12.01, 58.0)).unwrap();
        assert!(d > 580.0 && d < 600.0, "got {}", d);
    }

    #[test]
    fn test_non_finite_is_invalid_geometry() {
        let bad = GeoPoint::new(f64::NAN, 58.0);
        let err = surface_distance(bad, GeoPoint::new(12.0, 58.0)).unwrap_err();
        assert!(matches!(err, TrackingError::InvalidGeometry { .. }));
        assert!(midpoint(GeoPoint::new(12.0, 91.0), GeoPoint::new(12.0, 58.0)).is_err());
    }

    #[test]
    fn test_midpoint_is_equidistant() {
        let a = GeoPoint::new(11.9, 57.7);
        let b = GeoPoint::new(12.1, 57.8);
        let m = midpoint(a, b).unwrap();
        let da = surface_distance(a, m).unwrap();
        let db = surface_distance(m, b).unwrap();
        assert!((da - db).abs() < 0.01);
    }

    #[test]
    fn test_interpolate_endpoints() {
        let a = GeoPoint::new(11.9, 57.7);
        let b = GeoPoint::new(12.1, 57.8);
        let start = interpolate(a, b, 0.0).unwrap();
        let end = interpolate(a, b, 1.0).unwrap();
        assert!(surface_distance(a, start).unwrap() < 1e-6);
        assert!(surface_distance(b, end).unwrap() < 1e-6);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = GeoPoint::new(12.0, 58.0);
        let north = bearing_deg(origin, GeoPoint::new(12.0, 58.01)).unwrap();
        let east = bearing_deg(origin, GeoPoint::new(12.01, 58.0)).unwrap();
        let west = bearing_deg(origin, GeoPoint::new(11.99, 58.0)).unwrap();
        assert!(north.abs() < 1e-6);
        assert!((east - 90.0).abs() < 0.1);
        assert!((west - 270.0).abs() < 0.1);
    }
}
