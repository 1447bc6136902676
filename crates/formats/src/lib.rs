pub mod geojson;
pub mod payload;
pub mod topology;

pub use geojson::*;
pub use payload::*;
pub use topology::*;
