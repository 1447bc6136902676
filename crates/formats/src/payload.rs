use once_cell::unsync::OnceCell;
use serde_json::Value;

use crate::geojson::{FeatureCollection, GeoJsonError};
use crate::topology::{TopoJsonDecoder, TopologyDecoder, TopologyError, is_topology};

#[derive(Debug)]
pub enum PayloadError {
    Json(String),
    GeoJson(GeoJsonError),
    Topology(TopologyError),
}

impl std::fmt::Display for PayloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadError::Json(msg) => write!(f, "payload is not valid JSON: {msg}"),
            PayloadError::GeoJson(e) => write!(f, "GeoJSON payload: {e}"),
            PayloadError::Topology(e) => write!(f, "topology payload: {e}"),
        }
    }
}

impl std::error::Error for PayloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PayloadError::Json(_) => None,
            PayloadError::GeoJson(e) => Some(e),
            PayloadError::Topology(e) => Some(e),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadKind {
    GeoJson,
    Topology,
}

pub fn sniff(value: &Value) -> PayloadKind {
    if is_topology(value) {
        PayloadKind::Topology
    } else {
        PayloadKind::GeoJson
    }
}

type DecoderFactory = fn() -> Box<dyn TopologyDecoder>;

/// Turns fetched bytes into a feature collection.
///
/// The topology decoder is only constructed the first time a topology payload
/// shows up; plain GeoJSON never pays for it.
pub struct PayloadDecoder {
    factory: DecoderFactory,
    topology: OnceCell<Box<dyn TopologyDecoder>>,
}

impl Default for PayloadDecoder {
    fn default() -> Self {
        Self::with_factory(|| Box::new(TopoJsonDecoder))
    }
}

impl std::fmt::Debug for PayloadDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadDecoder")
            .field("topology_loaded", &self.topology_loaded())
            .finish()
    }
}

impl PayloadDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_factory(factory: DecoderFactory) -> Self {
        Self {
            factory,
            topology: OnceCell::new(),
        }
    }

    pub fn topology_loaded(&self) -> bool {
        self.topology.get().is_some()
    }

    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<FeatureCollection, PayloadError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| PayloadError::Json(e.to_string()))?;
        self.decode_value(&value)
    }

    pub fn decode_value(&self, value: &Value) -> Result<FeatureCollection, PayloadError> {
        match sniff(value) {
            PayloadKind::GeoJson => {
                FeatureCollection::from_geojson_value(value).map_err(PayloadError::GeoJson)
            }
            PayloadKind::Topology => {
                let decoder = self.topology.get_or_init(self.factory);
                decoder
                    .decode_first(value)
                    .map_err(PayloadError::Topology)
            }
        }
    }
}
