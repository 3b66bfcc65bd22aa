use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::map::{
  coordinates::WGS84Coordinate,
  geometry_collection::{
    MIN_LINE_POINTS, MIN_POLYGON_POINTS, Properties, Shape, ShapeKind, open_ring,
  },
  session::Session,
};

#[derive(Debug, Error)]
pub enum CodecError {
  #[error("GeoJSON must be an object with a features array")]
  MissingFeatures,
  #[error("features is not valid JSON: {0}")]
  InvalidFeatures(#[from] serde_json::Error),
}

/// Outcome of an import.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
  pub imported: usize,
  pub skipped: usize,
}

/// Exports every committed shape, in insertion order, as a `FeatureCollection`.
#[must_use]
pub fn export_geojson(session: &Session) -> Value {
  let features: Vec<Value> = session.shapes().shapes().map(shape_to_feature).collect();
  json!({
    "type": "FeatureCollection",
    "features": features,
  })
}

/// Converts one shape to a `Feature` with `[lng, lat]` positions.
#[must_use]
pub fn shape_to_feature(shape: &Shape) -> Value {
  let coordinates = match shape {
    Shape::Marker(coord, _) => json!(coord.to_position()),
    Shape::Polyline(coords, _) => json!(positions(coords)),
    Shape::Polygon(ring, _) => json!([positions(ring)]),
  };

  json!({
    "type": "Feature",
    "geometry": {
      "type": shape.kind().geojson_type(),
      "coordinates": coordinates,
    },
    "properties": export_properties(shape),
  })
}

fn positions(coords: &[WGS84Coordinate]) -> Vec<[f64; 2]> {
  coords.iter().map(|c| c.to_position()).collect()
}

/// The stored properties with the name and the measurement filled in if missing.
fn export_properties(shape: &Shape) -> Value {
  let properties = shape.properties();
  let mut map = properties.extra.clone();

  let name: &str = if properties.name.is_empty() {
    shape.kind().default_name()
  } else {
    &properties.name
  };
  map.insert("name".to_owned(), json!(name));

  match shape.kind() {
    ShapeKind::Marker => {}
    ShapeKind::Polyline => {
      if let Some(length) = shape.measurement().map(|m| m.value()) {
        map.insert("length".to_owned(), json!(length));
      }
    }
    ShapeKind::Polygon => {
      if let Some(area) = shape.measurement().map(|m| m.value()) {
        map.insert("area".to_owned(), json!(area));
      }
    }
  }
  Value::Object(map)
}

/// Replaces the content of `session` with the shapes of a `FeatureCollection`.
///
/// Features that cannot be turned into a shape are skipped with a warning. The session is left
/// untouched if `collection` has no features at all.
///
/// # Errors
/// Returns a [`CodecError`] if `collection` carries no `features` array.
pub fn import_geojson(
  session: &mut Session,
  collection: &Value,
) -> Result<ImportReport, CodecError> {
  let features = features_of(collection)?;

  session.clear_shapes();
  let mut report = ImportReport::default();
  for (index, feature) in features.iter().enumerate() {
    match parse_feature(feature) {
      Ok(shape) => {
        session.add_shape(shape, false);
        report.imported += 1;
      }
      Err(e) => {
        log::warn!("Skipping feature {index}: {e}");
        report.skipped += 1;
      }
    }
  }
  log::debug!(
    "Imported {} features, skipped {}",
    report.imported,
    report.skipped
  );
  Ok(report)
}

/// The features array, which older clients stored as an encoded JSON string.
fn features_of(collection: &Value) -> Result<Vec<Value>, CodecError> {
  match collection.get("features") {
    Some(Value::Array(features)) => Ok(features.clone()),
    Some(Value::String(encoded)) => match serde_json::from_str(encoded)? {
      Value::Array(features) => Ok(features),
      _ => Err(CodecError::MissingFeatures),
    },
    _ => Err(CodecError::MissingFeatures),
  }
}

/// Parse a `GeoJSON` Feature object into a shape.
fn parse_feature(feature: &Value) -> Result<Shape, String> {
  let obj = feature.as_object().ok_or("Feature must be an object")?;
  let geometry = obj
    .get("geometry")
    .and_then(Value::as_object)
    .ok_or("Feature has no geometry")?;
  let geom_type = geometry
    .get("type")
    .and_then(Value::as_str)
    .ok_or("Geometry has no type")?;
  let coordinates = geometry
    .get("coordinates")
    .ok_or("Geometry has no coordinates")?;
  let properties = obj.get("properties").and_then(Value::as_object);

  match geom_type {
    "Point" => {
      let coord = parse_coordinate(coordinates).ok_or("Invalid point coordinate")?;
      let properties = import_properties(ShapeKind::Marker, properties).0;
      Ok(Shape::Marker(coord, properties))
    }
    "LineString" => {
      let coords = parse_coordinate_array(coordinates).ok_or("Invalid line coordinates")?;
      if coords.len() < MIN_LINE_POINTS {
        return Err(format!("LineString with {} points", coords.len()));
      }
      let (properties, stored) = import_properties(ShapeKind::Polyline, properties);
      let mut shape = Shape::Polyline(coords, properties);
      if stored.is_none() {
        shape.refresh_measurement();
      }
      Ok(shape)
    }
    "Polygon" => {
      let exterior = coordinates
        .as_array()
        .and_then(|rings| rings.first())
        .ok_or("Polygon has no rings")?;
      let ring = parse_coordinate_array(exterior).ok_or("Invalid polygon coordinates")?;
      let ring = open_ring(ring);
      if ring.len() < MIN_POLYGON_POINTS {
        return Err(format!("Polygon with {} distinct points", ring.len()));
      }
      let (properties, stored) = import_properties(ShapeKind::Polygon, properties);
      let mut shape = Shape::Polygon(ring, properties);
      if stored.is_none() {
        shape.refresh_measurement();
      }
      Ok(shape)
    }
    other => Err(format!("Unsupported geometry type: {other}")),
  }
}

/// Splits `GeoJSON` properties into the shape properties and the stored measurement, if any.
fn import_properties(
  kind: ShapeKind,
  properties: Option<&Map<String, Value>>,
) -> (Properties, Option<f64>) {
  let mut extra = properties.cloned().unwrap_or_default();
  let name = extra
    .remove("name")
    .and_then(scalar_name)
    .filter(|name| !name.trim().is_empty())
    .unwrap_or_else(|| kind.default_name().to_owned());

  let measurement_key = match kind {
    ShapeKind::Marker => None,
    ShapeKind::Polyline => Some("length"),
    ShapeKind::Polygon => Some("area"),
  };
  let stored = measurement_key
    .and_then(|key| extra.remove(key))
    .and_then(|v| v.as_f64())
    .filter(|v| v.is_finite());

  let mut result = Properties {
    name,
    extra,
    ..Properties::default()
  };
  match kind {
    ShapeKind::Marker => {}
    ShapeKind::Polyline => result.length = stored,
    ShapeKind::Polygon => result.area = stored,
  }
  (result, stored)
}

/// A name stored as a string, or as a scalar some clients wrote instead. Falsy scalars count as
/// no name.
fn scalar_name(value: Value) -> Option<String> {
  match value {
    Value::String(name) => Some(name),
    Value::Number(n) if n.as_f64() != Some(0.) => Some(n.to_string()),
    Value::Bool(true) => Some("true".to_owned()),
    _ => None,
  }
}

/// Parse a `[lng, lat]` position. Further elements like elevation are ignored.
fn parse_coordinate(value: &Value) -> Option<WGS84Coordinate> {
  let position = value.as_array()?;
  let lon = position.first()?.as_f64()?;
  let lat = position.get(1)?.as_f64()?;
  let coord = WGS84Coordinate::from_position([lon, lat]);
  coord.is_valid().then_some(coord)
}

fn parse_coordinate_array(value: &Value) -> Option<Vec<WGS84Coordinate>> {
  value.as_array()?.iter().map(parse_coordinate).collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::map::geometry_collection::Measurement;
  use assert_approx_eq::assert_approx_eq;

  fn c(lat: f64, lon: f64) -> WGS84Coordinate {
    WGS84Coordinate::new(lat, lon)
  }

  #[test]
  fn export_uses_lng_lat_order() {
    let mut session = Session::new();
    session.add_shape(Shape::marker(c(53.757, 87.134)), false);
    let exported = export_geojson(&session);

    assert_eq!(exported["type"], "FeatureCollection");
    let feature = &exported["features"][0];
    assert_eq!(feature["geometry"]["type"], "Point");
    assert_eq!(feature["geometry"]["coordinates"], json!([87.134, 53.757]));
    assert_eq!(feature["properties"]["name"], "Маркер");
  }

  #[test]
  fn export_synthesizes_missing_fields() {
    let mut session = Session::new();
    let line = Shape::Polyline(vec![c(0., 0.), c(0., 1.)], Properties::default());
    session.add_shape(line, false);
    let exported = export_geojson(&session);

    let properties = &exported["features"][0]["properties"];
    assert_eq!(properties["name"], "Линия");
    assert_approx_eq!(properties["length"].as_f64().unwrap(), 111_194.93, 0.01);
  }

  #[test]
  fn export_wraps_polygon_ring() {
    let mut session = Session::new();
    let polygon = Shape::polygon(vec![c(0., 0.), c(0., 1.), c(1., 1.)]).unwrap();
    session.add_shape(polygon, true);
    let exported = export_geojson(&session);

    let geometry = &exported["features"][0]["geometry"];
    assert_eq!(geometry["type"], "Polygon");
    assert_eq!(geometry["coordinates"], json!([[[0., 0.], [1., 0.], [1., 1.]]]));
  }

  #[test]
  fn import_replaces_session_content() {
    let mut session = Session::new();
    session.add_shape(Shape::marker(c(1., 1.)), false);

    let collection = json!({
      "type": "FeatureCollection",
      "features": [
        {
          "type": "Feature",
          "geometry": {"type": "Point", "coordinates": [87.1, 53.7]},
          "properties": {"name": "X"}
        }
      ]
    });
    let report = import_geojson(&mut session, &collection).unwrap();

    assert_eq!(report, ImportReport { imported: 1, skipped: 0 });
    assert_eq!(session.shapes().len(), 1);
    let shape = session.shapes().shapes().next().unwrap();
    assert_eq!(shape.name(), "X");
    assert_eq!(shape.coordinates(), &[c(53.7, 87.1)]);
  }

  #[test]
  fn import_skips_malformed_features() {
    let mut session = Session::new();
    let collection = json!({
      "type": "FeatureCollection",
      "features": [
        {"type": "Feature", "geometry": {"type": "Circle", "coordinates": [0, 0]}},
        {"type": "Feature", "geometry": {"type": "Point"}},
        {"type": "Feature", "geometry": {"type": "LineString", "coordinates": [[0, 0]]}},
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": ["a", 0]}},
        "garbage",
        {"type": "Feature", "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 0]]}}
      ]
    });
    let report = import_geojson(&mut session, &collection).unwrap();

    assert_eq!(report, ImportReport { imported: 1, skipped: 5 });
    let line = session.shapes().shapes().next().unwrap();
    assert_eq!(line.name(), "Линия");
    assert!(matches!(line.measurement(), Some(Measurement::Length(l)) if l > 111_000.));
  }

  #[test]
  fn import_prefers_stored_measurement() {
    let mut session = Session::new();
    let collection = json!({
      "features": [
        {
          "type": "Feature",
          "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1]]]},
          "properties": {"name": "P", "area": 5.0, "note": "n"}
        },
        {
          "type": "Feature",
          "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1]]]},
          "properties": {"area": "big"}
        }
      ]
    });
    import_geojson(&mut session, &collection).unwrap();

    let shapes: Vec<&Shape> = session.shapes().shapes().collect();
    assert_eq!(shapes[0].properties().area, Some(5.0));
    assert_eq!(shapes[0].properties().extra.get("note"), Some(&json!("n")));
    assert_eq!(shapes[1].name(), "Полигон");
    assert!(shapes[1].properties().area.unwrap() > 1e9);
  }

  #[test]
  fn import_drops_closing_point() {
    let mut session = Session::new();
    let collection = json!({
      "features": [
        {
          "type": "Feature",
          "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]},
          "properties": {}
        }
      ]
    });
    import_geojson(&mut session, &collection).unwrap();
    let (id, polygon) = session.shapes().iter().next().unwrap();
    assert_eq!(polygon.coordinates().len(), 3);
    assert!(!session.shapes().has_vertex_handles(id));
  }

  #[test]
  fn import_keeps_scalar_names() {
    let point = |name: Value| {
      json!({
        "type": "Feature",
        "geometry": {"type": "Point", "coordinates": [1, 2]},
        "properties": {"name": name}
      })
    };
    let collection = json!({
      "features": [point(json!(5)), point(json!(true)), point(json!(0)), point(Value::Null)]
    });
    let mut session = Session::new();
    import_geojson(&mut session, &collection).unwrap();

    let names: Vec<&str> = session.shapes().shapes().map(Shape::name).collect();
    assert_eq!(names, vec!["5", "true", "Маркер", "Маркер"]);
  }

  #[test]
  fn import_leaves_drawing_in_progress() {
    let mut session = Session::new();
    session.attach_map(crate::map::session::MapView::default());
    session.on_tool_selected(crate::map::drawing::Tool::Line);
    session.on_map_click(c(0., 0.));
    session.on_map_click(c(0., 0.001));

    let collection = json!({
      "features": [{"type": "Feature", "geometry": {"type": "Point", "coordinates": [1, 2]}}]
    });
    import_geojson(&mut session, &collection).unwrap();

    assert_eq!(session.shapes().len(), 1);
    assert_eq!(session.pending_points(), &[c(0., 0.), c(0., 0.001)]);
    assert!(session.preview().is_some());
    assert!(session.finish_drawing().is_some());
    assert_eq!(session.shapes().len(), 2);
  }

  #[test]
  fn import_accepts_encoded_features() {
    let mut session = Session::new();
    let collection = json!({
      "type": "FeatureCollection",
      "features": r#"[{"type": "Feature", "geometry": {"type": "Point", "coordinates": [1, 2]}}]"#
    });
    let report = import_geojson(&mut session, &collection).unwrap();
    assert_eq!(report.imported, 1);
  }

  #[test]
  fn import_without_features_keeps_session() {
    let mut session = Session::new();
    session.add_shape(Shape::marker(c(1., 1.)), false);
    assert!(matches!(
      import_geojson(&mut session, &json!({"type": "Feature"})),
      Err(CodecError::MissingFeatures)
    ));
    assert!(matches!(
      import_geojson(&mut session, &json!({"features": "not json"})),
      Err(CodecError::InvalidFeatures(_))
    ));
    assert_eq!(session.shapes().len(), 1);
  }
}
