//! Decoding of the compact topology encoding (TopoJSON) into GeoJSON features.
//!
//! Shared boundaries are stored once as "arcs"; geometries reference arcs by
//! index, with `!i` (bitwise not) meaning "arc `i` reversed". Quantized
//! topologies carry a `transform` and delta-encode every arc.

use serde_json::{Map, Value};

use crate::geojson::{Feature, FeatureCollection, GeoPoint, Geometry};

#[derive(Debug, Clone, PartialEq)]
pub enum TopologyError {
    NotATopology,
    NoObjects,
    InvalidArcs(String),
    InvalidTransform,
    InvalidGeometry { object: String, reason: String },
}

impl std::fmt::Display for TopologyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologyError::NotATopology => write!(f, "expected a Topology object"),
            TopologyError::NoObjects => write!(f, "topology has no named objects"),
            TopologyError::InvalidArcs(msg) => write!(f, "invalid topology arcs: {msg}"),
            TopologyError::InvalidTransform => write!(f, "invalid topology transform"),
            TopologyError::InvalidGeometry { object, reason } => {
                write!(f, "invalid geometry in object {object:?}: {reason}")
            }
        }
    }
}

impl std::error::Error for TopologyError {}

/// Decodes a topology payload into a feature collection.
///
/// Kept behind a trait so the fetch layer can construct the decoder lazily,
/// only once a topology payload is actually seen.
pub trait TopologyDecoder {
    /// Decode the first named object group of `topology`.
    fn decode_first(&self, topology: &Value) -> Result<FeatureCollection, TopologyError>;
}

/// Returns true when `value` looks like `{"type": "Topology", "objects": {...}}`.
pub fn is_topology(value: &Value) -> bool {
    value.get("type").and_then(Value::as_str) == Some("Topology")
        && value.get("objects").is_some_and(Value::is_object)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TopoJsonDecoder;

impl TopologyDecoder for TopoJsonDecoder {
    fn decode_first(&self, topology: &Value) -> Result<FeatureCollection, TopologyError> {
        if !is_topology(topology) {
            return Err(TopologyError::NotATopology);
        }
        let objects = topology
            .get("objects")
            .and_then(Value::as_object)
            .ok_or(TopologyError::NotATopology)?;
        let (name, object) = objects.iter().next().ok_or(TopologyError::NoObjects)?;

        let topo = Topology::from_value(topology)?;
        topo.object_to_collection(name, object)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Transform {
    scale: [f64; 2],
    translate: [f64; 2],
}

impl Transform {
    fn from_value(value: &Value) -> Result<Self, TopologyError> {
        let pair = |key: &str| -> Result<[f64; 2], TopologyError> {
            let arr = value
                .get(key)
                .and_then(Value::as_array)
                .ok_or(TopologyError::InvalidTransform)?;
            match (
                arr.first().and_then(Value::as_f64),
                arr.get(1).and_then(Value::as_f64),
            ) {
                (Some(a), Some(b)) => Ok([a, b]),
                _ => Err(TopologyError::InvalidTransform),
            }
        };
        Ok(Self {
            scale: pair("scale")?,
            translate: pair("translate")?,
        })
    }

    fn apply(&self, x: f64, y: f64) -> GeoPoint {
        GeoPoint::new(
            x * self.scale[0] + self.translate[0],
            y * self.scale[1] + self.translate[1],
        )
    }
}

struct Topology {
    transform: Option<Transform>,
    /// Arcs in absolute coordinates (delta decoding already applied).
    arcs: Vec<Vec<GeoPoint>>,
}

impl Topology {
    fn from_value(value: &Value) -> Result<Self, TopologyError> {
        let transform = match value.get("transform") {
            None | Some(Value::Null) => None,
            Some(t) => Some(Transform::from_value(t)?),
        };

        let raw_arcs = match value.get("arcs") {
            None => &[][..],
            Some(v) => v
                .as_array()
                .map(Vec::as_slice)
                .ok_or_else(|| TopologyError::InvalidArcs("arcs must be an array".to_string()))?,
        };

        let mut arcs = Vec::with_capacity(raw_arcs.len());
        for (i, raw) in raw_arcs.iter().enumerate() {
            let positions = raw
                .as_array()
                .ok_or_else(|| TopologyError::InvalidArcs(format!("arc {i} is not an array")))?;
            let mut out = Vec::with_capacity(positions.len());
            let (mut x, mut y) = (0.0, 0.0);
            for pos in positions {
                let (px, py) = read_pair(pos)
                    .ok_or_else(|| TopologyError::InvalidArcs(format!("arc {i} has a bad position")))?;
                match transform {
                    Some(t) => {
                        x += px;
                        y += py;
                        out.push(t.apply(x, y));
                    }
                    None => out.push(GeoPoint::new(px, py)),
                }
            }
            arcs.push(out);
        }

        Ok(Self { transform, arcs })
    }

    fn object_to_collection(
        &self,
        name: &str,
        object: &Value,
    ) -> Result<FeatureCollection, TopologyError> {
        let invalid = |reason: String| TopologyError::InvalidGeometry {
            object: name.to_string(),
            reason,
        };

        if object.get("type").and_then(Value::as_str) == Some("GeometryCollection") {
            let geometries = object
                .get("geometries")
                .and_then(Value::as_array)
                .ok_or_else(|| invalid("GeometryCollection without geometries".to_string()))?;
            let features = geometries
                .iter()
                .map(|g| self.feature(g))
                .collect::<Result<Vec<_>, String>>()
                .map_err(invalid)?;
            return Ok(FeatureCollection::new(features));
        }

        let feature = self.feature(object).map_err(invalid)?;
        Ok(FeatureCollection::new(vec![feature]))
    }

    fn feature(&self, object: &Value) -> Result<Feature, String> {
        let id = match object.get("id") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let properties: Map<String, Value> = object
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Ok(Feature {
            id,
            properties,
            geometry: self.geometry(object)?,
        })
    }

    fn geometry(&self, object: &Value) -> Result<Option<Geometry>, String> {
        let ty = match object.get("type") {
            None | Some(Value::Null) => return Ok(None),
            Some(t) => t.as_str().ok_or("geometry type must be a string")?,
        };

        let arcs = || object.get("arcs").ok_or(format!("{ty} without arcs"));
        let coords = || object.get("coordinates").ok_or(format!("{ty} without coordinates"));

        let geometry = match ty {
            "Point" => Geometry::Point(self.position(coords()?)?),
            "MultiPoint" => Geometry::MultiPoint(
                as_array(coords()?)?
                    .iter()
                    .map(|p| self.position(p))
                    .collect::<Result<_, _>>()?,
            ),
            "LineString" => Geometry::LineString(self.line(arcs()?)?),
            "MultiLineString" => Geometry::MultiLineString(
                as_array(arcs()?)?
                    .iter()
                    .map(|l| self.line(l))
                    .collect::<Result<_, _>>()?,
            ),
            "Polygon" => Geometry::Polygon(self.polygon(arcs()?)?),
            "MultiPolygon" => Geometry::MultiPolygon(
                as_array(arcs()?)?
                    .iter()
                    .map(|p| self.polygon(p))
                    .collect::<Result<_, _>>()?,
            ),
            other => return Err(format!("unsupported geometry type: {other}")),
        };
        Ok(Some(geometry))
    }

    fn position(&self, value: &Value) -> Result<GeoPoint, String> {
        let (x, y) = read_pair(value).ok_or("position must be [x, y]")?;
        Ok(match self.transform {
            Some(t) => t.apply(x, y),
            None => GeoPoint::new(x, y),
        })
    }

    /// Concatenates the referenced arcs, dropping the duplicated joint vertex.
    fn stitch(&self, arc_refs: &Value) -> Result<Vec<GeoPoint>, String> {
        let mut points: Vec<GeoPoint> = Vec::new();
        for r in as_array(arc_refs)? {
            let i = r.as_i64().ok_or("arc reference must be an integer")?;
            let (index, reversed) = if i < 0 { (!i, true) } else { (i, false) };
            let arc = usize::try_from(index)
                .ok()
                .and_then(|ix| self.arcs.get(ix))
                .ok_or(format!("arc index {i} out of range"))?;

            points.pop();
            if reversed {
                points.extend(arc.iter().rev().copied());
            } else {
                points.extend(arc.iter().copied());
            }
        }
        Ok(points)
    }

    fn line(&self, arc_refs: &Value) -> Result<Vec<GeoPoint>, String> {
        let mut points = self.stitch(arc_refs)?;
        if points.len() == 1 {
            points.push(points[0]);
        }
        Ok(points)
    }

    fn ring(&self, arc_refs: &Value) -> Result<Vec<GeoPoint>, String> {
        let mut points = self.stitch(arc_refs)?;
        if let Some(&first) = points.first() {
            while points.len() < 4 {
                points.push(first);
            }
        }
        Ok(points)
    }

    fn polygon(&self, rings: &Value) -> Result<Vec<Vec<GeoPoint>>, String> {
        as_array(rings)?.iter().map(|r| self.ring(r)).collect()
    }
}

fn as_array(value: &Value) -> Result<&Vec<Value>, String> {
    value.as_array().ok_or_else(|| "expected an array".to_string())
}

fn read_pair(value: &Value) -> Option<(f64, f64)> {
    let arr = value.as_array()?;
    Some((arr.first()?.as_f64()?, arr.get(1)?.as_f64()?))
}

#[cfg(test)]
mod tests {
    use super::{TopoJsonDecoder, TopologyDecoder, TopologyError, is_topology};
    use crate::geojson::{GeoPoint, Geometry};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn detects_topology_payloads() {
        assert!(is_topology(&json!({"type": "Topology", "objects": {}})));
        assert!(!is_topology(&json!({"type": "Topology"})));
        assert!(!is_topology(&json!({"type": "FeatureCollection", "features": []})));
    }

    #[test]
    fn decodes_shared_arcs_with_reversal() {
        // Two squares sharing the vertical edge x=1.
        let topo = json!({
            "type": "Topology",
            "objects": {
                "countries": {
                    "type": "GeometryCollection",
                    "geometries": [
                        {"type": "Polygon", "arcs": [[0, 1]], "properties": {"NAME": "West"}},
                        {"type": "Polygon", "arcs": [[2, -2]], "id": "E"}
                    ]
                }
            },
            "arcs": [
                [[1, 0], [0, 0], [0, 1], [1, 1]],
                [[1, 1], [1, 0]],
                [[1, 1], [2, 1], [2, 0], [1, 0]]
            ]
        });

        let fc = TopoJsonDecoder.decode_first(&topo).expect("decode");
        assert_eq!(fc.len(), 2);
        assert_eq!(
            fc.features[0].text_with_fallback(&["NAME"]).as_deref(),
            Some("West")
        );
        assert_eq!(fc.features[1].id.as_deref(), Some("E"));

        let Some(Geometry::Polygon(rings)) = &fc.features[1].geometry else {
            panic!("expected polygon");
        };
        let p = |x, y| GeoPoint::new(x, y);
        assert_eq!(
            rings[0],
            vec![p(1.0, 1.0), p(2.0, 1.0), p(2.0, 0.0), p(1.0, 0.0), p(1.0, 1.0)]
        );
    }

    #[test]
    fn applies_quantization_transform_with_delta_decoding() {
        let topo = json!({
            "type": "Topology",
            "transform": {"scale": [0.5, 2.0], "translate": [-10.0, 5.0]},
            "objects": {
                "coast": {"type": "LineString", "arcs": [0]},
                "ignored": {"type": "Point", "coordinates": [0, 0]}
            },
            "arcs": [[[0, 0], [2, 1], [2, -1]]]
        });

        let fc = TopoJsonDecoder.decode_first(&topo).expect("decode");
        assert_eq!(fc.len(), 1);
        assert_eq!(
            fc.features[0].geometry,
            Some(Geometry::LineString(vec![
                GeoPoint::new(-10.0, 5.0),
                GeoPoint::new(-9.0, 7.0),
                GeoPoint::new(-8.0, 5.0),
            ]))
        );
    }

    #[test]
    fn reports_bad_arc_references() {
        let topo = json!({
            "type": "Topology",
            "objects": {"x": {"type": "LineString", "arcs": [3]}},
            "arcs": []
        });
        let err = TopoJsonDecoder.decode_first(&topo).unwrap_err();
        assert!(matches!(err, TopologyError::InvalidGeometry { .. }), "{err}");

        let empty = json!({"type": "Topology", "objects": {}});
        assert_eq!(TopoJsonDecoder.decode_first(&empty), Err(TopologyError::NoObjects));
    }
}
