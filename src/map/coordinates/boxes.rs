use serde::{Deserialize, Serialize};

use super::WGS84Coordinate;

/// An axis aligned box in WGS84 degrees.
///
/// The default box is empty (inverted bounds) and becomes valid once it has been extended by at
/// least one coordinate.
#[derive(Debug, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
  min_lat: f64,
  min_lon: f64,
  max_lat: f64,
  max_lon: f64,
}

impl Default for BoundingBox {
  fn default() -> Self {
    Self {
      min_lat: f64::INFINITY,
      min_lon: f64::INFINITY,
      max_lat: f64::NEG_INFINITY,
      max_lon: f64::NEG_INFINITY,
    }
  }
}

impl BoundingBox {
  #[must_use]
  pub fn from_iterator<I: IntoIterator<Item = WGS84Coordinate>>(coords: I) -> Self {
    coords
      .into_iter()
      .fold(BoundingBox::default(), |acc, c| acc.extend_coord(c))
  }

  #[must_use]
  pub fn is_valid(&self) -> bool {
    self.min_lat <= self.max_lat && self.min_lon <= self.max_lon
  }

  #[must_use]
  pub fn extend_coord(mut self, coord: WGS84Coordinate) -> Self {
    self.min_lat = self.min_lat.min(coord.lat);
    self.min_lon = self.min_lon.min(coord.lon);
    self.max_lat = self.max_lat.max(coord.lat);
    self.max_lon = self.max_lon.max(coord.lon);
    self
  }

  /// Inclusive containment, the way the map library tests polygon bounds.
  #[must_use]
  pub fn contains(&self, coord: WGS84Coordinate) -> bool {
    self.is_valid()
      && (self.min_lat..=self.max_lat).contains(&coord.lat)
      && (self.min_lon..=self.max_lon).contains(&coord.lon)
  }
}
