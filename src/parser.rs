//! Reading and writing shapes in external formats.

mod geojson;
pub use geojson::{CodecError, ImportReport, export_geojson, import_geojson, shape_to_feature};
