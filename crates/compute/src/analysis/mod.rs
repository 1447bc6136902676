pub mod clip;
pub mod path;
pub mod spatial;

pub use clip::Clipping;
pub use path::{PathCommand, trace_rings};
pub use spatial::SpatialAnalysis;
