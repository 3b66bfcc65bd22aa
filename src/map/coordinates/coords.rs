use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Mean earth radius used for great-circle distances.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Equatorial radius of the spherical Mercator projection (EPSG:3857).
pub const MERCATOR_RADIUS_M: f64 = 6_378_137.0;

/// Haversine distance between two coordinates.
#[must_use]
pub fn distance_in_meters(coord1: WGS84Coordinate, coord2: WGS84Coordinate) -> f64 {
  let d_lat = (coord2.lat - coord1.lat).to_radians();
  let d_lon = (coord2.lon - coord1.lon).to_radians();
  let a = f64::sin(d_lat / 2.0) * f64::sin(d_lat / 2.0)
    + f64::cos(coord1.lat.to_radians())
      * f64::cos(coord2.lat.to_radians())
      * f64::sin(d_lon / 2.0)
      * f64::sin(d_lon / 2.0);
  let c = 2.0 * f64::atan2(a.sqrt(), (1.0 - a).sqrt());
  EARTH_RADIUS_M * c
}

/// The standard WGS84 coordinate system.
#[derive(Debug, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub struct WGS84Coordinate {
  #[serde(alias = "latitude")]
  pub lat: f64,
  #[serde(alias = "longitude", alias = "lng")]
  pub lon: f64,
}

impl WGS84Coordinate {
  #[must_use]
  pub fn new(lat: f64, lon: f64) -> Self {
    Self { lat, lon }
  }

  #[must_use]
  pub fn is_valid(&self) -> bool {
    self.lat.is_finite()
      && self.lon.is_finite()
      && (-90.0..=90.0).contains(&self.lat)
      && (-180.0..=180.0).contains(&self.lon)
  }

  /// Exact equality comparison using bit representation
  #[must_use]
  pub fn exact_eq(&self, other: &Self) -> bool {
    self.lat.to_bits() == other.lat.to_bits() && self.lon.to_bits() == other.lon.to_bits()
  }

  /// `[lng, lat]` as used by `GeoJSON` positions.
  #[must_use]
  pub fn to_position(self) -> [f64; 2] {
    [self.lon, self.lat]
  }

  #[must_use]
  pub fn from_position(position: [f64; 2]) -> Self {
    Self {
      lat: position[1],
      lon: position[0],
    }
  }
}

/// Planar meters in the spherical Mercator projection.
#[derive(Debug, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub struct MercatorCoordinate {
  pub x: f64,
  pub y: f64,
}

impl MercatorCoordinate {
  #[must_use]
  pub fn sq_dist(&self, p: &Self) -> f64 {
    let dx = p.x - self.x;
    let dy = p.y - self.y;
    dx * dx + dy * dy
  }

  /// Squared distance to the segment `l1`-`l2`, clamped to its end points.
  #[must_use]
  pub fn sq_distance_line_segment(&self, l1: &Self, l2: &Self) -> f64 {
    let dbx = l2.x - l1.x;
    let dby = l2.y - l1.y;
    let dpx = self.x - l1.x;
    let dpy = self.y - l1.y;
    let dot = dbx * dpx + dby * dpy;
    let len_sq = dbx * dbx + dby * dby;

    if len_sq < 1e-12 {
      return self.sq_dist(l1);
    }
    let param = (dot / len_sq).clamp(0., 1.);
    MercatorCoordinate {
      x: l1.x + param * dbx,
      y: l1.y + param * dby,
    }
    .sq_dist(self)
  }
}

impl From<WGS84Coordinate> for MercatorCoordinate {
  fn from(coord: WGS84Coordinate) -> Self {
    MercatorCoordinate {
      x: MERCATOR_RADIUS_M * coord.lon * PI / 180.,
      y: MERCATOR_RADIUS_M * (PI / 4. + coord.lat * PI / 360.).tan().ln(),
    }
  }
}
