pub mod layer;
pub mod lod;
pub mod manager;
pub mod map;
pub mod metadata;
pub mod symbology;
pub mod tokens;

pub use layer::*;
pub use manager::{HeavyUpdatePlan, HeavyUpdateReport, LayerError, LayerManager};
pub use map::{HeadlessMap, LayerRef, MapWidget};
