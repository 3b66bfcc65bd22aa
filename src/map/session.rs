//! The map session: every piece of mutable drawing state, owned explicitly by the application
//! and handed by reference into the drawing engine, the editor and the codec.

use serde::{Deserialize, Serialize};

use super::coordinates::WGS84Coordinate;
use super::drawing::Tool;
use super::editor::DisplayUnit;
use super::geometry_collection::Shape;
use super::map_event::MapEvent;
use crate::config::Config;

/// Hit-test radius in meters used when nothing else is configured.
pub const DEFAULT_HIT_TOLERANCE_M: f64 = 15.;

/// Identifies a committed shape for the lifetime of a session. Ids are never reused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShapeId(u64);

impl std::fmt::Display for ShapeId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// The rendered map surface the session draws on.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapView {
  pub center: WGS84Coordinate,
  pub zoom: u8,
}

impl Default for MapView {
  fn default() -> Self {
    Self {
      center: WGS84Coordinate::new(53.757, 87.134),
      zoom: 13,
    }
  }
}

/// Transient rendering of the points of an unfinished line or polygon, drawn dashed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Preview {
  Line(Vec<WGS84Coordinate>),
  Ring(Vec<WGS84Coordinate>),
}

impl Preview {
  #[must_use]
  pub fn points(&self) -> &[WGS84Coordinate] {
    match self {
      Preview::Line(points) | Preview::Ring(points) => points,
    }
  }
}

/// The shape whose editor popup is currently open.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct OpenEditor {
  pub id: ShapeId,
  pub unit: DisplayUnit,
}

#[derive(Debug, Clone)]
struct LayerEntry {
  id: ShapeId,
  shape: Shape,
  vertex_handles: bool,
}

/// The committed shapes in insertion order.
#[derive(Debug, Clone, Default)]
pub struct ShapeLayer {
  entries: Vec<LayerEntry>,
  next_id: u64,
}

impl ShapeLayer {
  fn insert(&mut self, shape: Shape, vertex_handles: bool) -> ShapeId {
    let id = ShapeId(self.next_id);
    self.next_id += 1;
    self.entries.push(LayerEntry {
      id,
      shape,
      vertex_handles,
    });
    id
  }

  fn remove(&mut self, id: ShapeId) -> Option<LayerEntry> {
    let index = self.entries.iter().position(|e| e.id == id)?;
    Some(self.entries.remove(index))
  }

  #[must_use]
  pub fn get(&self, id: ShapeId) -> Option<&Shape> {
    self.entries.iter().find(|e| e.id == id).map(|e| &e.shape)
  }

  fn get_mut(&mut self, id: ShapeId) -> Option<&mut Shape> {
    self
      .entries
      .iter_mut()
      .find(|e| e.id == id)
      .map(|e| &mut e.shape)
  }

  /// Whether the shape was committed with draggable vertex handles.
  #[must_use]
  pub fn has_vertex_handles(&self, id: ShapeId) -> bool {
    self.entries.iter().any(|e| e.id == id && e.vertex_handles)
  }

  pub fn iter(&self) -> impl Iterator<Item = (ShapeId, &Shape)> {
    self.entries.iter().map(|e| (e.id, &e.shape))
  }

  pub fn shapes(&self) -> impl Iterator<Item = &Shape> {
    self.entries.iter().map(|e| &e.shape)
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// All state of one map session.
#[derive(Debug)]
pub struct Session {
  pub(crate) map: Option<MapView>,
  pub(crate) shapes: ShapeLayer,
  pub(crate) tool: Tool,
  pub(crate) selection: Option<ShapeId>,
  pub(crate) pending: Vec<WGS84Coordinate>,
  pub(crate) preview: Option<Preview>,
  pub(crate) editor: Option<OpenEditor>,
  events: Vec<MapEvent>,
  hit_tolerance_m: f64,
}

impl Default for Session {
  fn default() -> Self {
    Self::new()
  }
}

impl Session {
  #[must_use]
  pub fn new() -> Self {
    Self {
      map: None,
      shapes: ShapeLayer::default(),
      tool: Tool::None,
      selection: None,
      pending: Vec::new(),
      preview: None,
      editor: None,
      events: Vec::new(),
      hit_tolerance_m: DEFAULT_HIT_TOLERANCE_M,
    }
  }

  /// A session configured from `config`. The map still has to be attached.
  #[must_use]
  pub fn from_config(config: &Config) -> Self {
    Self::new().with_hit_tolerance(config.hit_tolerance_m)
  }

  #[must_use]
  pub fn with_hit_tolerance(mut self, tolerance_m: f64) -> Self {
    self.hit_tolerance_m = tolerance_m;
    self
  }

  /// Binds the session to a rendered map. Clicks are ignored until this happened.
  pub fn attach_map(&mut self, view: MapView) {
    log::debug!("Map attached at {:?}, zoom {}", view.center, view.zoom);
    self.map = Some(view);
  }

  #[must_use]
  pub fn map(&self) -> Option<&MapView> {
    self.map.as_ref()
  }

  #[must_use]
  pub fn shapes(&self) -> &ShapeLayer {
    &self.shapes
  }

  #[must_use]
  pub fn shape(&self, id: ShapeId) -> Option<&Shape> {
    self.shapes.get(id)
  }

  #[must_use]
  pub fn tool(&self) -> Tool {
    self.tool
  }

  #[must_use]
  pub fn selection(&self) -> Option<ShapeId> {
    self.selection
  }

  #[must_use]
  pub fn pending_points(&self) -> &[WGS84Coordinate] {
    &self.pending
  }

  #[must_use]
  pub fn preview(&self) -> Option<&Preview> {
    self.preview.as_ref()
  }

  #[must_use]
  pub fn editor(&self) -> Option<&OpenEditor> {
    self.editor.as_ref()
  }

  #[must_use]
  pub fn hit_tolerance_m(&self) -> f64 {
    self.hit_tolerance_m
  }

  /// Hands the queued events to the rendering adapter.
  pub fn drain_events(&mut self) -> Vec<MapEvent> {
    std::mem::take(&mut self.events)
  }

  pub(crate) fn emit(&mut self, event: MapEvent) {
    self.events.push(event);
  }

  pub(crate) fn shape_mut(&mut self, id: ShapeId) -> Option<&mut Shape> {
    self.shapes.get_mut(id)
  }

  /// Commits a shape to the layer.
  pub(crate) fn add_shape(&mut self, shape: Shape, vertex_handles: bool) -> ShapeId {
    let handles = vertex_handles.then(|| shape.coordinates().to_vec());
    let id = self.shapes.insert(shape, vertex_handles);
    self.emit(MapEvent::ShapeAdded(id));
    if let Some(handles) = handles {
      self.emit(MapEvent::VertexHandlesAdded { id, handles });
    }
    id
  }

  /// Removes a shape and every reference the session holds to it.
  pub(crate) fn remove_shape(&mut self, id: ShapeId) -> Option<Shape> {
    let entry = self.shapes.remove(id)?;
    if self.editor.is_some_and(|e| e.id == id) {
      self.editor = None;
      self.emit(MapEvent::EditorClosed(id));
    }
    if self.selection == Some(id) {
      self.selection = None;
    }
    if entry.vertex_handles {
      self.emit(MapEvent::VertexHandlesRemoved(id));
    }
    self.emit(MapEvent::ShapeRemoved(id));
    Some(entry.shape)
  }

  /// Removes every committed shape.
  pub(crate) fn clear_shapes(&mut self) {
    if let Some(editor) = self.editor.take() {
      self.emit(MapEvent::EditorClosed(editor.id));
    }
    self.selection = None;
    self.shapes.entries.clear();
    self.emit(MapEvent::LayerCleared);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn marker(lat: f64, lon: f64) -> Shape {
    Shape::marker(WGS84Coordinate::new(lat, lon))
  }

  #[test]
  fn ids_are_unique_and_ordered() {
    let mut session = Session::new();
    let a = session.add_shape(marker(0., 0.), false);
    let b = session.add_shape(marker(1., 1.), false);
    assert_ne!(a, b);
    assert_eq!(
      session.shapes().iter().map(|(id, _)| id).collect::<Vec<_>>(),
      vec![a, b]
    );

    session.remove_shape(a);
    let c = session.add_shape(marker(2., 2.), false);
    assert_ne!(a, c);
  }

  #[test]
  fn removal_clears_selection_and_editor() {
    let mut session = Session::new();
    let id = session.add_shape(marker(0., 0.), true);
    session.selection = Some(id);
    session.editor = Some(OpenEditor {
      id,
      unit: DisplayUnit::Meters,
    });
    session.drain_events();

    assert!(session.remove_shape(id).is_some());
    assert_eq!(session.selection(), None);
    assert_eq!(session.editor(), None);
    assert_eq!(
      session.drain_events(),
      vec![
        MapEvent::EditorClosed(id),
        MapEvent::VertexHandlesRemoved(id),
        MapEvent::ShapeRemoved(id)
      ]
    );
    assert!(session.remove_shape(id).is_none());
  }

  #[test]
  fn clear_empties_layer() {
    let mut session = Session::new();
    let id = session.add_shape(marker(0., 0.), false);
    session.selection = Some(id);
    session.clear_shapes();
    assert!(session.shapes().is_empty());
    assert_eq!(session.selection(), None);
    assert_eq!(session.shape(id), None);
  }

  #[test]
  fn map_is_detached_until_attached() {
    let mut session = Session::new();
    assert!(session.map().is_none());
    session.attach_map(MapView::default());
    assert_eq!(session.map().map(|m| m.zoom), Some(13));
  }
}
