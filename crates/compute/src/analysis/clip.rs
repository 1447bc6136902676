use catalog::{ALL_CONTINENTS, ContinentTable};
use formats::geojson::{Feature, FeatureCollection, GeoPoint, Geometry};
use foundation::bounds::GeoBox;

pub struct Clipping;

impl Clipping {
    /// Splits `line` into maximal runs of consecutive points inside any box.
    ///
    /// Runs shorter than two points are dropped, so every returned run is a
    /// drawable segment.
    pub fn clip_line_to_boxes(line: &[GeoPoint], boxes: &[GeoBox]) -> Vec<Vec<GeoPoint>> {
        let inside = |p: &GeoPoint| boxes.iter().any(|b| b.contains(p.lat_deg, p.lon_deg));

        let mut parts = Vec::new();
        let mut current: Vec<GeoPoint> = Vec::new();
        for p in line {
            if inside(p) {
                current.push(*p);
            } else {
                if current.len() > 1 {
                    parts.push(std::mem::take(&mut current));
                }
                current.clear();
            }
        }
        if current.len() > 1 {
            parts.push(current);
        }
        parts
    }

    /// Restricts a coastline collection to one continent.
    ///
    /// `ALL` returns a copy of the input. Otherwise only line features survive,
    /// reassembled as `LineString` (one part) or `MultiLineString` (several).
    pub fn clip_coastline_to_continent(
        collection: &FeatureCollection,
        continent: &str,
        table: &ContinentTable,
    ) -> FeatureCollection {
        if continent == ALL_CONTINENTS {
            return collection.clone();
        }
        let boxes = table.boxes(continent);

        let features = collection
            .features
            .iter()
            .filter_map(|feature| {
                let parts = match feature.geometry.as_ref()? {
                    Geometry::LineString(line) => Self::clip_line_to_boxes(line, &boxes),
                    Geometry::MultiLineString(lines) => lines
                        .iter()
                        .flat_map(|line| Self::clip_line_to_boxes(line, &boxes))
                        .collect(),
                    _ => return None,
                };
                let geometry = match parts.len() {
                    0 => return None,
                    1 => Geometry::LineString(parts.into_iter().flatten().collect()),
                    _ => Geometry::MultiLineString(parts),
                };
                Some(Feature {
                    id: feature.id.clone(),
                    properties: feature.properties.clone(),
                    geometry: Some(geometry),
                })
            })
            .collect();

        FeatureCollection::new(features)
    }
}
