/// Contains everything needed to handle coordinates.
pub mod coordinates;
/// Hit-testing clicks against shapes.
pub mod distance;
/// The drawing tool state machine.
pub mod drawing;
/// The per-shape editor.
pub mod editor;
/// Shapes and their properties.
pub mod geometry_collection;
/// Stuff to be send to the rendering surface.
pub mod map_event;
/// Lengths and areas.
pub mod measure;
/// The session state.
pub mod session;
