use super::coordinates::{MercatorCoordinate, WGS84Coordinate, distance_in_meters};
use super::geometry_collection::Shape;

/// Decides whether a click at `click_coord` hits `shape`.
///
/// Markers and polylines are hit within `tolerance_m` meters, polygons when the click lies inside
/// their bounding box.
#[must_use]
pub fn hits_shape(shape: &Shape, click_coord: WGS84Coordinate, tolerance_m: f64) -> bool {
  match shape {
    Shape::Marker(coord, _) => distance_in_meters(*coord, click_coord) < tolerance_m,
    Shape::Polyline(coords, _) => {
      distance_to_line_string(coords, click_coord).is_some_and(|d| d < tolerance_m)
    }
    Shape::Polygon(..) => shape.bounding_box().contains(click_coord),
  }
}

/// Calculate distance in meters from a point to a line string
fn distance_to_line_string(
  coords: &[WGS84Coordinate],
  click_coord: WGS84Coordinate,
) -> Option<f64> {
  if coords.is_empty() {
    return None;
  }

  if coords.len() == 1 {
    Some(distance_in_meters(coords[0], click_coord))
  } else {
    coords
      .windows(2)
      .map(|window| distance_to_segment_in_meters(click_coord, window[0], window[1]))
      .min_by(f64::total_cmp)
  }
}

/// Calculate the ground distance in meters from a point to a line segment.
///
/// The segment is measured in Mercator meters and scaled back to ground meters with the scale
/// factor at the latitude of `point`, which is exact enough for hit-testing tolerances.
#[must_use]
pub fn distance_to_segment_in_meters(
  point: WGS84Coordinate,
  line_start: WGS84Coordinate,
  line_end: WGS84Coordinate,
) -> f64 {
  let p = MercatorCoordinate::from(point);
  let a = MercatorCoordinate::from(line_start);
  let b = MercatorCoordinate::from(line_end);
  p.sq_distance_line_segment(&a, &b).sqrt() * point.lat.to_radians().cos()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::map::geometry_collection::Properties;
  use assert_approx_eq::assert_approx_eq;

  fn line() -> Shape {
    Shape::Polyline(
      vec![
        WGS84Coordinate::new(53.757, 87.134),
        WGS84Coordinate::new(53.757, 87.144),
      ],
      Properties::named("line"),
    )
  }

  #[test]
  fn segment_distance_matches_haversine_across_the_segment() {
    let a = WGS84Coordinate::new(53.757, 87.134);
    let b = WGS84Coordinate::new(53.757, 87.144);
    let p = WGS84Coordinate::new(53.7571, 87.139);
    let expected = distance_in_meters(p, WGS84Coordinate::new(53.757, 87.139));
    assert_approx_eq!(distance_to_segment_in_meters(p, a, b), expected, 0.05);
  }

  #[test]
  fn segment_distance_beyond_end_uses_end_point() {
    let a = WGS84Coordinate::new(0., 0.);
    let b = WGS84Coordinate::new(0., 0.001);
    let p = WGS84Coordinate::new(0., 0.002);
    assert_approx_eq!(
      distance_to_segment_in_meters(p, a, b),
      distance_in_meters(p, b),
      0.2
    );
  }

  #[test]
  fn polyline_hit_within_tolerance() {
    let shape = line();
    // roughly 11 m north of the middle of the line
    assert!(hits_shape(&shape, WGS84Coordinate::new(53.7571, 87.139), 15.));
    // roughly 33 m north
    assert!(!hits_shape(&shape, WGS84Coordinate::new(53.7573, 87.139), 15.));
  }

  #[test]
  fn marker_hit_within_tolerance() {
    let marker = Shape::Marker(WGS84Coordinate::new(0., 0.), Properties::named("m"));
    assert!(hits_shape(&marker, WGS84Coordinate::new(0., 0.0001), 15.));
    assert!(!hits_shape(&marker, WGS84Coordinate::new(0., 0.0002), 15.));
  }

  #[test]
  fn polygon_hit_uses_bounds() {
    let polygon = Shape::Polygon(
      vec![
        WGS84Coordinate::new(0., 0.),
        WGS84Coordinate::new(0.001, 0.),
        WGS84Coordinate::new(0., 0.001),
      ],
      Properties::named("p"),
    );
    // outside the triangle but inside its bounds
    assert!(hits_shape(&polygon, WGS84Coordinate::new(0.0009, 0.0009), 15.));
    assert!(!hits_shape(&polygon, WGS84Coordinate::new(0.002, 0.0005), 15.));
  }
}
