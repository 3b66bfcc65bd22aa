use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::coordinates::{BoundingBox, WGS84Coordinate};
use super::measure::{polygon_area, polyline_length};

/// Fewest points a committed line can have.
pub const MIN_LINE_POINTS: usize = 2;
/// Fewest points a committed polygon ring can have.
pub const MIN_POLYGON_POINTS: usize = 3;

/// Discriminator of the [`Shape`] variants.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeKind {
  Marker,
  Polyline,
  Polygon,
}

impl ShapeKind {
  /// The label a freshly drawn shape is given.
  #[must_use]
  pub fn default_name(self) -> &'static str {
    match self {
      ShapeKind::Marker => "Маркер",
      ShapeKind::Polyline => "Линия",
      ShapeKind::Polygon => "Полигон",
    }
  }

  /// The `GeoJSON` geometry type the shape is stored as.
  #[must_use]
  pub fn geojson_type(self) -> &'static str {
    match self {
      ShapeKind::Marker => "Point",
      ShapeKind::Polyline => "LineString",
      ShapeKind::Polygon => "Polygon",
    }
  }
}

/// A derived measurement, always in meters or square meters.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum Measurement {
  Length(f64),
  Area(f64),
}

impl Measurement {
  #[must_use]
  pub fn value(self) -> f64 {
    match self {
      Measurement::Length(v) | Measurement::Area(v) => v,
    }
  }
}

/// The properties carried by every shape.
///
/// `extra` keeps any keys this crate does not interpret so they survive a round trip.
#[derive(Clone, Default, PartialEq, Debug, Serialize, Deserialize)]
pub struct Properties {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub length: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub area: Option<f64>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl Properties {
  #[must_use]
  pub fn named(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Self::default()
    }
  }

  #[must_use]
  pub fn with_length(mut self, length: f64) -> Self {
    self.length = Some(length);
    self
  }

  #[must_use]
  pub fn with_area(mut self, area: f64) -> Self {
    self.area = Some(area);
    self
  }

}

/// Drops the last point of `ring` if it repeats the first one.
#[must_use]
pub fn open_ring(mut ring: Vec<WGS84Coordinate>) -> Vec<WGS84Coordinate> {
  let closed = ring.len() > 1
    && ring
      .first()
      .zip(ring.last())
      .is_some_and(|(first, last)| first.exact_eq(last));
  if closed {
    ring.pop();
  }
  ring
}

/// A committed shape on the map.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum Shape {
  Marker(WGS84Coordinate, Properties),
  Polyline(Vec<WGS84Coordinate>, Properties),
  Polygon(Vec<WGS84Coordinate>, Properties),
}

impl Shape {
  /// A marker with the default name.
  #[must_use]
  pub fn marker(coord: WGS84Coordinate) -> Self {
    Shape::Marker(coord, Properties::named(ShapeKind::Marker.default_name()))
  }

  /// A line with the default name and its length, `None` for fewer than two points.
  #[must_use]
  pub fn polyline(coords: Vec<WGS84Coordinate>) -> Option<Self> {
    if coords.len() < MIN_LINE_POINTS {
      return None;
    }
    let length = polyline_length(&coords);
    Some(Shape::Polyline(
      coords,
      Properties::named(ShapeKind::Polyline.default_name()).with_length(length),
    ))
  }

  /// A polygon with the default name and its area, `None` for fewer than three distinct points.
  ///
  /// A closing point equal to the first one is dropped, rings are stored open.
  #[must_use]
  pub fn polygon(ring: Vec<WGS84Coordinate>) -> Option<Self> {
    let ring = open_ring(ring);
    if ring.len() < MIN_POLYGON_POINTS {
      return None;
    }
    let area = polygon_area(&ring);
    Some(Shape::Polygon(
      ring,
      Properties::named(ShapeKind::Polygon.default_name()).with_area(area),
    ))
  }

  #[must_use]
  pub fn kind(&self) -> ShapeKind {
    match self {
      Shape::Marker(..) => ShapeKind::Marker,
      Shape::Polyline(..) => ShapeKind::Polyline,
      Shape::Polygon(..) => ShapeKind::Polygon,
    }
  }

  #[must_use]
  pub fn properties(&self) -> &Properties {
    match self {
      Shape::Marker(_, properties)
      | Shape::Polyline(_, properties)
      | Shape::Polygon(_, properties) => properties,
    }
  }

  pub fn properties_mut(&mut self) -> &mut Properties {
    match self {
      Shape::Marker(_, properties)
      | Shape::Polyline(_, properties)
      | Shape::Polygon(_, properties) => properties,
    }
  }

  #[must_use]
  pub fn name(&self) -> &str {
    &self.properties().name
  }

  #[must_use]
  pub fn with_properties(mut self, properties: Properties) -> Self {
    *self.properties_mut() = properties;
    self
  }

  /// The coordinates of the shape in drawing order.
  #[must_use]
  pub fn coordinates(&self) -> &[WGS84Coordinate] {
    match self {
      Shape::Marker(coord, _) => std::slice::from_ref(coord),
      Shape::Polyline(coords, _) | Shape::Polygon(coords, _) => coords,
    }
  }

  /// The measurement computed from the current geometry.
  #[must_use]
  pub fn computed_measurement(&self) -> Option<Measurement> {
    match self {
      Shape::Marker(..) => None,
      Shape::Polyline(coords, _) => Some(Measurement::Length(polyline_length(coords))),
      Shape::Polygon(ring, _) => Some(Measurement::Area(polygon_area(ring))),
    }
  }

  /// The stored measurement, falling back to computing it.
  #[must_use]
  pub fn measurement(&self) -> Option<Measurement> {
    match self {
      Shape::Marker(..) => None,
      Shape::Polyline(_, properties) => properties
        .length
        .map(Measurement::Length)
        .or_else(|| self.computed_measurement()),
      Shape::Polygon(_, properties) => properties
        .area
        .map(Measurement::Area)
        .or_else(|| self.computed_measurement()),
    }
  }

  /// Recomputes the stored measurement after a geometry change.
  pub fn refresh_measurement(&mut self) {
    match self.computed_measurement() {
      Some(Measurement::Length(length)) => self.properties_mut().length = Some(length),
      Some(Measurement::Area(area)) => self.properties_mut().area = Some(area),
      None => {}
    }
  }

  /// The box polygon hit tests use.
  #[must_use]
  pub fn bounding_box(&self) -> BoundingBox {
    BoundingBox::from_iterator(self.coordinates().iter().copied())
  }
}
