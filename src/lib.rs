pub mod config;
pub mod map;
pub mod parser;
pub mod persistence;
pub mod remote;

pub use map::map_event::MapEvent;
pub use map::session::Session;
