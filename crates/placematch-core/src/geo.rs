//! Geodesic distance and the coarse bounding-box pre-filter.
//!
//! Distances are great-circle (haversine) over the IUGG mean Earth radius.
//! Department-scale accuracy matters for rural searches, so a planar
//! approximation is not acceptable here; all distance baselines in tests
//! assume this exact formula.

use serde::{Deserialize, Serialize};

/// IUGG mean Earth radius, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub lat: f64,
    pub lon: f64,
}

/// A search circle: center plus radius in kilometers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoParams {
    pub position: GeoPosition,
    pub distance_km: f64,
}

/// Coarse lat/lon window enclosing a [`GeoParams`] circle.
///
/// Strictly larger than the circle; exact membership must be re-checked with
/// [`distance_meters`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl GeoParams {
    #[must_use]
    pub fn radius_m(&self) -> f64 {
        self.distance_km * 1_000.0
    }

    /// Bounding box enclosing the circle, clamped to valid coordinates.
    ///
    /// Near the poles the longitude window degenerates; the box then spans
    /// the full longitude range rather than dividing by a vanishing cosine.
    #[must_use]
    pub fn bounding_box(&self) -> BoundingBox {
        let meters_per_degree = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        let delta_lat = self.radius_m() / meters_per_degree;

        let cos_lat = self.position.lat.to_radians().cos();
        let delta_lon = if cos_lat < 1e-6 {
            180.0
        } else {
            (self.radius_m() / (meters_per_degree * cos_lat)).min(180.0)
        };

        BoundingBox {
            min_lat: (self.position.lat - delta_lat).max(-90.0),
            max_lat: (self.position.lat + delta_lat).min(90.0),
            min_lon: (self.position.lon - delta_lon).max(-180.0),
            max_lon: (self.position.lon + delta_lon).min(180.0),
        }
    }
}

/// Great-circle distance between two positions, in meters.
#[must_use]
pub fn distance_meters(a: GeoPosition, b: GeoPosition) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lon = (b.lon - a.lon).to_radians();

    let half_chord = (delta_lat / 2.0).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * (delta_lon / 2.0).sin().powi(2);
    let central_angle = 2.0 * half_chord.sqrt().asin();

    EARTH_RADIUS_M * central_angle
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(lat: f64, lon: f64) -> GeoPosition {
        GeoPosition { lat, lon }
    }

    #[test]
    fn identical_points_are_zero_meters() {
        let p = pos(49.0, 6.0);
        assert_eq!(distance_meters(p, p), 0.0);
    }

    #[test]
    fn one_degree_of_latitude() {
        let d = distance_meters(pos(45.0, 3.0), pos(46.0, 3.0));
        assert!((d - 111_194.93).abs() < 0.01, "got {d}");
    }

    #[test]
    fn short_diagonal_near_metz() {
        // Baseline for the distance-ordering acceptance tests.
        let d = distance_meters(pos(49.0, 6.0), pos(49.001, 6.001));
        assert!((d - 132.99).abs() < 0.01, "got {d}");
    }

    #[test]
    fn paris_to_lyon_is_about_391_km() {
        let d = distance_meters(pos(48.8566, 2.3522), pos(45.7640, 4.8357));
        assert!((d - 391_500.0).abs() < 1_000.0, "got {d}");
    }

    #[test]
    fn distance_is_symmetric() {
        let a = pos(48.8566, 2.3522);
        let b = pos(45.7640, 4.8357);
        assert!((distance_meters(a, b) - distance_meters(b, a)).abs() < 1e-9);
    }

    #[test]
    fn bounding_box_encloses_the_circle() {
        let params = GeoParams {
            position: pos(49.0, 6.0),
            distance_km: 30.0,
        };
        let bb = params.bounding_box();
        // Points on the circle's cardinal extremes must fall inside the box.
        let north = pos(49.0 + 30.0 / 111.19, 6.0);
        assert!(north.lat <= bb.max_lat + 1e-6);
        assert!(bb.min_lat < 49.0 && 49.0 < bb.max_lat);
        assert!(bb.min_lon < 6.0 && 6.0 < bb.max_lon);
        // The longitude window is wider than the latitude one at 49°N.
        assert!((bb.max_lon - bb.min_lon) > (bb.max_lat - bb.min_lat));
    }

    #[test]
    fn bounding_box_clamps_at_the_pole() {
        let params = GeoParams {
            position: pos(89.9999, 0.0),
            distance_km: 50.0,
        };
        let bb = params.bounding_box();
        assert!(bb.max_lat <= 90.0);
        assert_eq!(bb.min_lon, -180.0);
        assert_eq!(bb.max_lon, 180.0);
    }
}
