//! The drawing tool state machine.
//!
//! The rendering adapter translates pointer and keyboard input into [`Session::on_map_click`],
//! [`Session::on_tool_selected`] and [`Session::on_cancel`]. None of the drawing operations fail:
//! input that cannot produce a shape is dropped.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::coordinates::WGS84Coordinate;
use super::distance::hits_shape;
use super::geometry_collection::{MIN_LINE_POINTS, MIN_POLYGON_POINTS, Shape};
use super::map_event::MapEvent;
use super::session::{Preview, Session, ShapeId};

/// The interaction mode governing how map clicks are interpreted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Tool {
  /// Clicks open the editor of the shape under the cursor.
  #[default]
  None,
  Marker,
  Line,
  Polygon,
  Delete,
}

impl Tool {
  #[must_use]
  pub fn name(self) -> &'static str {
    match self {
      Tool::None => "none",
      Tool::Marker => "marker",
      Tool::Line => "line",
      Tool::Polygon => "polygon",
      Tool::Delete => "delete",
    }
  }
}

impl FromStr for Tool {
  type Err = ();
  fn from_str(input: &str) -> Result<Tool, Self::Err> {
    match input.to_lowercase().as_str() {
      "none" | "" => Ok(Tool::None),
      "marker" => Ok(Tool::Marker),
      "line" => Ok(Tool::Line),
      "polygon" => Ok(Tool::Polygon),
      "delete" => Ok(Tool::Delete),
      _ => Err(()),
    }
  }
}

impl Session {
  /// Switches the tool. Anything drawn with the previous tool is committed first.
  pub fn on_tool_selected(&mut self, tool: Tool) {
    self.finish_drawing();
    self.reset_drawing(false);
    self.set_tool(tool);
  }

  /// Interprets a click on the map according to the active tool.
  pub fn on_map_click(&mut self, coord: WGS84Coordinate) {
    if self.map.is_none() {
      log::warn!("Ignoring click at {coord:?}: no map attached");
      return;
    }
    if !coord.is_valid() {
      log::warn!("Ignoring click at invalid coordinate {coord:?}");
      return;
    }

    match self.tool {
      Tool::Marker => {
        let id = self.add_shape(Shape::marker(coord), false);
        log::debug!("Marker {id} added at {coord:?}");
        self.open_editor(id);
      }
      Tool::Line | Tool::Polygon => self.add_pending_point(coord),
      Tool::Delete => {
        if let Some(id) = self.hit_test(coord) {
          log::debug!("Deleting shape {id}");
          self.remove_shape(id);
        }
      }
      Tool::None => {
        if let Some(id) = self.hit_test(coord) {
          self.selection = Some(id);
          self.open_editor(id);
        }
      }
    }
  }

  /// Commits whatever is drawn and returns to [`Tool::None`].
  pub fn on_cancel(&mut self) {
    self.finish_drawing();
    self.reset_drawing(true);
  }

  /// Commits the pending line or polygon if it has enough points, otherwise drops it.
  ///
  /// Committed polygons get draggable vertex handles. The editor of the new shape is opened.
  pub fn finish_drawing(&mut self) -> Option<ShapeId> {
    if self.pending.is_empty() {
      return None;
    }

    let points = std::mem::take(&mut self.pending);
    let committed = match self.tool {
      Tool::Line => Shape::polyline(points).map(|line| self.add_shape(line, false)),
      Tool::Polygon => Shape::polygon(points).map(|polygon| self.add_shape(polygon, true)),
      Tool::None | Tool::Marker | Tool::Delete => None,
    };
    self.remove_preview();

    match committed {
      Some(id) => {
        log::debug!("Committed {} {id}", self.tool.name());
        self.open_editor(id);
      }
      None => log::debug!("Discarded unfinished {}", self.tool.name()),
    }
    committed
  }

  /// Removes every shape and resets drawing and tool.
  pub fn clear_all(&mut self) {
    self.clear_shapes();
    self.reset_drawing(true);
  }

  /// The first shape, in insertion order, hit by a click at `coord`.
  #[must_use]
  pub fn hit_test(&self, coord: WGS84Coordinate) -> Option<ShapeId> {
    let tolerance = self.hit_tolerance_m();
    self
      .shapes
      .iter()
      .find(|(_, shape)| hits_shape(shape, coord, tolerance))
      .map(|(id, _)| id)
  }

  /// Moves a marker. The change is local; nothing is saved.
  pub fn move_marker(&mut self, id: ShapeId, coord: WGS84Coordinate) -> bool {
    match self.shape_mut(id) {
      Some(Shape::Marker(position, _)) => *position = coord,
      _ => return false,
    }
    self.emit(MapEvent::ShapeChanged(id));
    true
  }

  /// Moves one vertex of a polygon that has vertex handles and recomputes its area.
  pub fn drag_vertex(&mut self, id: ShapeId, index: usize, coord: WGS84Coordinate) -> bool {
    if !self.shapes.has_vertex_handles(id) {
      return false;
    }
    let Some(shape) = self.shape_mut(id) else {
      return false;
    };
    match shape {
      Shape::Polygon(ring, _) => match ring.get_mut(index) {
        Some(vertex) => *vertex = coord,
        None => return false,
      },
      Shape::Marker(..) | Shape::Polyline(..) => return false,
    }
    shape.refresh_measurement();

    self.emit(MapEvent::ShapeChanged(id));
    if self.editor.is_some_and(|e| e.id == id) {
      self.emit(MapEvent::EditorChanged(id));
    }
    true
  }

  fn set_tool(&mut self, tool: Tool) {
    if self.tool != tool {
      self.tool = tool;
      self.emit(MapEvent::ToolChanged(tool));
    }
  }

  fn reset_drawing(&mut self, full_reset: bool) {
    self.remove_preview();
    self.pending.clear();
    if full_reset {
      self.set_tool(Tool::None);
    }
  }

  fn add_pending_point(&mut self, coord: WGS84Coordinate) {
    self.pending.push(coord);
    self.remove_preview();

    let preview = match self.tool {
      Tool::Line if self.pending.len() >= MIN_LINE_POINTS => {
        Some(Preview::Line(self.pending.clone()))
      }
      Tool::Polygon if self.pending.len() >= MIN_POLYGON_POINTS => {
        Some(Preview::Ring(self.pending.clone()))
      }
      _ => None,
    };
    if let Some(preview) = preview {
      self.emit(MapEvent::PreviewAdded(preview.clone()));
      self.preview = Some(preview);
    }
  }

  fn remove_preview(&mut self) {
    if self.preview.take().is_some() {
      self.emit(MapEvent::PreviewRemoved);
    }
  }
}
