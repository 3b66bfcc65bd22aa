//! Length and area of drawn geometry.
//!
//! Areas use the spherical Mercator projection followed by the Shoelace formula. There is no
//! geodesic correction: away from the equator the result is inflated by the square of the
//! Mercator scale factor (`1 / cos²(lat)`), which is acceptable for the city-scale shapes this
//! is used for.

use itertools::Itertools;

use super::coordinates::{MercatorCoordinate, WGS84Coordinate, distance_in_meters};

/// Sum of the great-circle distances between consecutive points.
#[must_use]
pub fn polyline_length(points: &[WGS84Coordinate]) -> f64 {
  points
    .iter()
    .tuple_windows()
    .map(|(a, b)| distance_in_meters(*a, *b))
    .sum()
}

/// Area of the ring in square meters. The ring is implicitly closed.
#[must_use]
pub fn polygon_area(ring: &[WGS84Coordinate]) -> f64 {
  if ring.len() < 3 {
    return 0.;
  }

  let twice_area: f64 = ring
    .iter()
    .map(|c| MercatorCoordinate::from(*c))
    .circular_tuple_windows()
    .map(|(p1, p2)| p1.x * p2.y - p2.x * p1.y)
    .sum();

  (twice_area / 2.).abs()
}
