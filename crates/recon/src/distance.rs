use geo::{Distance, Geodesic, HaversineMeasure, Point};

use crate::model::Coordinate;

/// Mean Earth radius used for every spherical computation.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Ellipsoidal (WGS-84) geodesic distance in meters.
///
/// Invalid input never fails: a non-finite or out-of-range coordinate, or a
/// NaN result, yields `f64::INFINITY`.
pub fn geodesic_distance(a: Coordinate, b: Coordinate) -> f64 {
    if !a.is_valid() || !b.is_valid() {
        return f64::INFINITY;
    }
    let meters = Geodesic.distance(Point::new(a.lon, a.lat), Point::new(b.lon, b.lat));
    if meters.is_nan() {
        f64::INFINITY
    } else {
        meters
    }
}

/// Great-circle distance on a sphere of radius `EARTH_RADIUS_M`.
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    if !a.is_valid() || !b.is_valid() {
        return f64::INFINITY;
    }
    HaversineMeasure::new(EARTH_RADIUS_M).distance(Point::new(a.lon, a.lat), Point::new(b.lon, b.lat))
}

/// Maximum pairwise geodesic distance. Zero for fewer than two coordinates.
pub fn diameter(coordinates: &[Coordinate]) -> f64 {
    let mut max = 0.0_f64;
    for (i, a) in coordinates.iter().enumerate() {
        for b in &coordinates[i + 1..] {
            let d = geodesic_distance(*a, *b);
            if d.is_infinite() {
                return f64::INFINITY;
            }
            max = max.max(d);
        }
    }
    max
}
