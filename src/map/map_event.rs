use serde::{Deserialize, Serialize};

use super::coordinates::WGS84Coordinate;
use super::drawing::Tool;
use super::session::{Preview, ShapeId};

/// Changes the rendering surface has to apply, queued by the [`Session`](super::session::Session)
/// in the order they happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MapEvent {
  ToolChanged(Tool),
  ShapeAdded(ShapeId),
  /// The geometry or the properties of a shape changed.
  ShapeChanged(ShapeId),
  ShapeRemoved(ShapeId),
  LayerCleared,
  PreviewAdded(Preview),
  PreviewRemoved,
  VertexHandlesAdded {
    id: ShapeId,
    handles: Vec<WGS84Coordinate>,
  },
  VertexHandlesRemoved(ShapeId),
  EditorOpened(ShapeId),
  /// The editor content (display unit or measurement) changed while open.
  EditorChanged(ShapeId),
  EditorClosed(ShapeId),
}
