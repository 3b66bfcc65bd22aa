mod boxes;
mod coords;

/// Bounding boxes.
pub use boxes::*;
/// Coordinates.
pub use coords::*;
