use std::cell::Cell;
use std::rc::Rc;

use catalog::{Family, Lod};
use compute::SpatialAnalysis;
use formats::geojson::FeatureCollection;
use foundation::bounds::{GeoBox, bbox_intersects};

use crate::metadata::{CountryFeature, FeatureMeta, MetaResolver};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId(pub u64);

pub trait Layer {
    fn id(&self) -> LayerId;
    fn family(&self) -> Family;
    fn lod(&self) -> Lod;
    fn feature_count(&self) -> usize;
}

/// Coastlines at one LOD, clipped to one continent.
#[derive(Debug)]
pub struct CoastLayer {
    id: LayerId,
    lod: Lod,
    continent: String,
    data: Rc<FeatureCollection>,
    stroke_weight: Cell<f64>,
}

impl CoastLayer {
    pub fn new(
        id: LayerId,
        lod: Lod,
        continent: impl Into<String>,
        data: Rc<FeatureCollection>,
        stroke_weight: f64,
    ) -> Self {
        Self {
            id,
            lod,
            continent: continent.into(),
            data,
            stroke_weight: Cell::new(stroke_weight),
        }
    }

    pub fn continent(&self) -> &str {
        &self.continent
    }

    pub fn data(&self) -> &Rc<FeatureCollection> {
        &self.data
    }

    pub fn stroke_weight(&self) -> f64 {
        self.stroke_weight.get()
    }

    pub fn set_stroke_weight(&self, weight: f64) {
        self.stroke_weight.set(weight);
    }
}

impl Layer for CoastLayer {
    fn id(&self) -> LayerId {
        self.id
    }

    fn family(&self) -> Family {
        Family::Coastline
    }

    fn lod(&self) -> Lod {
        self.lod
    }

    fn feature_count(&self) -> usize {
        self.data.len()
    }
}

/// Country boundaries at one LOD, ingested with or without island parts.
#[derive(Debug)]
pub struct CountryLayer {
    id: LayerId,
    lod: Lod,
    mainland_only: bool,
    resolver: MetaResolver,
    features: Vec<CountryFeature>,
}

impl CountryLayer {
    /// Wraps features and derives their metadata up front.
    pub fn new(
        id: LayerId,
        lod: Lod,
        mainland_only: bool,
        resolver: MetaResolver,
        collection: &FeatureCollection,
    ) -> Self {
        let features: Vec<CountryFeature> = collection
            .features
            .iter()
            .cloned()
            .map(CountryFeature::new)
            .collect();
        for f in &features {
            f.meta(&resolver);
        }
        Self {
            id,
            lod,
            mainland_only,
            resolver,
            features,
        }
    }

    pub fn mainland_only(&self) -> bool {
        self.mainland_only
    }

    pub fn features(&self) -> &[CountryFeature] {
        &self.features
    }

    pub fn meta<'a>(&'a self, feature: &'a CountryFeature) -> &'a FeatureMeta {
        feature.meta(&self.resolver)
    }

    pub fn find_by_iso(&self, iso2: &str) -> Option<&CountryFeature> {
        self.features
            .iter()
            .find(|f| self.meta(f).iso2.as_deref() == Some(iso2))
    }

    pub fn find_by_id(&self, id: &str) -> Option<&CountryFeature> {
        self.features.iter().find(|f| f.id() == Some(id))
    }

    /// Topmost feature under `(lat, lng)`, tested on bbox first.
    pub fn hit_test(&self, lat: f64, lng: f64) -> Option<&CountryFeature> {
        self.features.iter().find(|f| {
            let Some(bbox) = self.meta(f).bbox else {
                return false;
            };
            bbox.contains(lat, lng)
                && f.feature()
                    .geometry
                    .as_ref()
                    .is_some_and(|g| SpatialAnalysis::geometry_contains(g, lat, lng))
        })
    }

    /// Features whose box overlaps `view`; all of them when the view is unknown.
    pub fn count_visible(&self, view: Option<&GeoBox>) -> usize {
        self.features
            .iter()
            .filter(|f| bbox_intersects(self.meta(f).bbox.as_ref(), view))
            .count()
    }
}

impl Layer for CountryLayer {
    fn id(&self) -> LayerId {
        self.id
    }

    fn family(&self) -> Family {
        Family::Country
    }

    fn lod(&self) -> Lod {
        self.lod
    }

    fn feature_count(&self) -> usize {
        self.features.len()
    }
}

#[cfg(test)]
mod tests {
    use super::{CountryLayer, Layer, LayerId};
    use catalog::Lod;
    use formats::geojson::FeatureCollection;
    use foundation::bounds::GeoBox;
    use pretty_assertions::assert_eq;

    const COUNTRIES: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","properties":{"ADM0_A3":"AAA","ISO_A2":"AA","NAME":"Alpha","CONTINENT":"Europe"},
         "geometry":{"type":"Polygon","coordinates":[[[0,0],[10,0],[10,10],[0,10],[0,0]]]}},
        {"type":"Feature","properties":{"ADM0_A3":"BBB","ISO_A2":"-99","NAME":"Beta","CONTINENT":"Asia"},
         "geometry":{"type":"Polygon","coordinates":[[[100,0],[110,0],[110,10],[100,10],[100,0]]]}}
    ]}"#;

    fn layer() -> CountryLayer {
        let fc = FeatureCollection::from_geojson_str(COUNTRIES).expect("parse");
        CountryLayer::new(LayerId(1), Lod::Coarse, false, Default::default(), &fc)
    }

    #[test]
    fn ingestion_derives_metadata_for_every_feature() {
        let layer = layer();
        assert_eq!(layer.feature_count(), 2);
        assert!(layer.features().iter().all(|f| f.cached_meta().is_some()));
        assert_eq!(layer.find_by_iso("AA").and_then(|f| f.id()), Some("AAA"));
        assert!(layer.find_by_iso("-99").is_none());
        assert_eq!(layer.find_by_id("BBB").map(|f| layer.meta(f).name.as_str()), Some("Beta"));
    }

    #[test]
    fn hit_test_and_visibility() {
        let layer = layer();
        assert_eq!(layer.hit_test(5.0, 5.0).and_then(|f| f.id()), Some("AAA"));
        assert!(layer.hit_test(5.0, 50.0).is_none());

        let europe_view = GeoBox::new(-5.0, -5.0, 20.0, 20.0);
        assert_eq!(layer.count_visible(Some(&europe_view)), 1);
        assert_eq!(layer.count_visible(None), 2);
    }
}
