use formats::geojson::{Feature, FeatureCollection, GeoPoint, Geometry};
use foundation::math::to_mercator;

pub struct SpatialAnalysis;

impl SpatialAnalysis {
    /// Unsigned shoelace area of a ring projected to spherical Mercator (m²).
    ///
    /// Only meant to rank parts of one country against each other; it is not a
    /// cartographic area.
    pub fn polygon_area(ring: &[GeoPoint]) -> f64 {
        let projected: Vec<[f64; 2]> = ring
            .iter()
            .map(|p| to_mercator(p.lon_deg, p.lat_deg))
            .collect();
        let n = projected.len();
        let mut twice = 0.0;
        for i in 0..n {
            let [x0, y0] = projected[i];
            let [x1, y1] = projected[(i + 1) % n];
            twice += x0 * y1 - x1 * y0;
        }
        (twice / 2.0).abs()
    }

    /// Reduces a multi-polygon to its largest part (by outer ring area).
    ///
    /// Anything that is not a multi-polygon, or a multi-polygon without an
    /// outer ring of three points or more and non-zero area, comes back untouched.
    pub fn mainland_only(geometry: Geometry) -> Geometry {
        let Geometry::MultiPolygon(polys) = geometry else {
            return geometry;
        };

        let mut best: Option<usize> = None;
        let mut best_area = 0.0;
        for (i, poly) in polys.iter().enumerate() {
            let Some(outer) = poly.first().filter(|r| r.len() >= 3) else {
                continue;
            };
            let area = Self::polygon_area(outer);
            // NaN never compares greater, so a pole-touching ring cannot win.
            if area > best_area {
                best = Some(i);
                best_area = area;
            }
        }

        match best {
            Some(i) => {
                let mut polys = polys;
                Geometry::Polygon(polys.swap_remove(i))
            }
            None => Geometry::MultiPolygon(polys),
        }
    }

    /// Even-odd containment of `(lat, lng)` in a polygon with holes.
    pub fn polygon_contains(rings: &[Vec<GeoPoint>], lat: f64, lng: f64) -> bool {
        let mut inside = false;
        for ring in rings {
            let n = ring.len();
            if n < 3 {
                continue;
            }
            let mut j = n - 1;
            for i in 0..n {
                let (a, b) = (&ring[i], &ring[j]);
                if (a.lat_deg > lat) != (b.lat_deg > lat)
                    && lng
                        < (b.lon_deg - a.lon_deg) * (lat - a.lat_deg) / (b.lat_deg - a.lat_deg)
                            + a.lon_deg
                {
                    inside = !inside;
                }
                j = i;
            }
        }
        inside
    }

    /// Point hit test for areal geometries; lines and points never hit.
    pub fn geometry_contains(geometry: &Geometry, lat: f64, lng: f64) -> bool {
        match geometry {
            Geometry::Polygon(rings) => Self::polygon_contains(rings, lat, lng),
            Geometry::MultiPolygon(polys) => polys
                .iter()
                .any(|rings| Self::polygon_contains(rings, lat, lng)),
            _ => false,
        }
    }

    /// Applies [`SpatialAnalysis::mainland_only`] to every feature.
    pub fn mainland_collection(collection: &FeatureCollection) -> FeatureCollection {
        FeatureCollection::new(
            collection
                .features
                .iter()
                .map(|f| Feature {
                    id: f.id.clone(),
                    properties: f.properties.clone(),
                    geometry: f.geometry.clone().map(Self::mainland_only),
                })
                .collect(),
        )
    }
}
