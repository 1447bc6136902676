use std::collections::BTreeMap;

use formats::geojson::Feature;
use foundation::bounds::GeoBox;
use once_cell::unsync::OnceCell;

pub const NAME_KEYS: &[&str] = &["NAME", "ADMIN", "ADMIN_NAME", "SOVEREIGNT", "name"];
pub const ISO2_KEYS: &[&str] = &["ISO_A2", "iso_a2", "ISO 3166-1 Alpha-2", "ALPHA2", "ALPHA_2"];
pub const CONTINENT_KEYS: &[&str] = &["CONTINENT", "REGION_UN", "continent"];
/// Names consulted by the ISO fallback table.
const FALLBACK_NAME_KEYS: &[&str] = &["NAME", "ADMIN", "ADMIN_NAME"];

pub const UNKNOWN_NAME: &str = "Inconnu";
pub const UNKNOWN_CONTINENT: &str = "Unknown";

/// Property used as identity of country features.
pub const COUNTRY_ID_PROPERTY: &str = "ADM0_A3";
/// Property used as identity of coastline features.
pub const COAST_ID_PROPERTY: &str = "ne_id";

/// Derived per-feature attributes, computed once.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMeta {
    pub iso2: Option<String>,
    pub continent: String,
    pub name: String,
    pub bbox: Option<GeoBox>,
}

/// Turns raw properties into [`FeatureMeta`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaResolver {
    /// Lower-cased name to ISO-2.
    pub iso2_fallback: BTreeMap<String, String>,
}

impl MetaResolver {
    pub fn new(iso2_fallback: BTreeMap<String, String>) -> Self {
        Self { iso2_fallback }
    }

    pub fn name(&self, feature: &Feature) -> String {
        feature
            .text_with_fallback(NAME_KEYS)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN_NAME.to_string())
    }

    pub fn iso2(&self, feature: &Feature) -> Option<String> {
        if let Some(code) = feature.text_with_fallback(ISO2_KEYS).filter(|s| !s.is_empty()) {
            return Some(code);
        }
        let name = feature
            .text_with_fallback(FALLBACK_NAME_KEYS)
            .unwrap_or_default()
            .to_lowercase();
        self.iso2_fallback.get(&name).cloned()
    }

    pub fn continent(&self, feature: &Feature) -> String {
        feature
            .text_with_fallback(CONTINENT_KEYS)
            .unwrap_or_else(|| UNKNOWN_CONTINENT.to_string())
    }

    pub fn resolve(&self, feature: &Feature) -> FeatureMeta {
        FeatureMeta {
            iso2: self.iso2(feature),
            continent: self.continent(feature),
            name: self.name(feature),
            bbox: feature.bounds(),
        }
    }
}

/// A country feature plus its lazily derived metadata.
///
/// The wrapped feature is never mutated; metadata lives beside it.
#[derive(Debug, Clone)]
pub struct CountryFeature {
    id: Option<String>,
    feature: Feature,
    meta: OnceCell<FeatureMeta>,
}

impl CountryFeature {
    pub fn new(feature: Feature) -> Self {
        Self {
            id: feature.id_from_property(COUNTRY_ID_PROPERTY),
            feature,
            meta: OnceCell::new(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn feature(&self) -> &Feature {
        &self.feature
    }

    pub fn meta(&self, resolver: &MetaResolver) -> &FeatureMeta {
        self.meta.get_or_init(|| resolver.resolve(&self.feature))
    }

    /// Metadata if it was already derived.
    pub fn cached_meta(&self) -> Option<&FeatureMeta> {
        self.meta.get()
    }
}

#[cfg(test)]
mod tests {
    use super::{CountryFeature, MetaResolver, UNKNOWN_CONTINENT, UNKNOWN_NAME};
    use formats::geojson::{Feature, GeoPoint, Geometry};
    use pretty_assertions::assert_eq;
    use serde_json::{Map, Value, json};

    fn feature(props: Value) -> Feature {
        let Value::Object(map) = props else {
            return Feature::new(Map::new(), None);
        };
        Feature::new(
            map,
            Some(Geometry::Polygon(vec![vec![
                GeoPoint::new(-5.0, 42.0),
                GeoPoint::new(8.0, 42.0),
                GeoPoint::new(8.0, 51.0),
                GeoPoint::new(-5.0, 42.0),
            ]])),
        )
    }

    fn resolver() -> MetaResolver {
        MetaResolver::new(
            [("france", "FR"), ("norway", "NO")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn missing_codes_fall_back_to_name_table() {
        let r = resolver();
        let f = feature(json!({"ISO_A2": "-99", "NAME": "France", "CONTINENT": "Europe"}));
        assert_eq!(r.iso2(&f), Some("FR".to_string()));

        let f = feature(json!({"iso_a2": null, "ADMIN": "Norway"}));
        assert_eq!(r.iso2(&f), Some("NO".to_string()));

        let f = feature(json!({"NAME": "Somaliland"}));
        assert_eq!(r.iso2(&f), None);
    }

    #[test]
    fn placeholders_for_missing_name_and_continent() {
        let r = resolver();
        let f = feature(json!({"SOVEREIGNT": -99, "REGION_UN": "Africa"}));
        // Numeric -99 is not the string sentinel, so it is a name.
        assert_eq!(r.name(&f), "-99");
        assert_eq!(r.continent(&f), "Africa");

        let f = feature(json!({}));
        assert_eq!(r.name(&f), UNKNOWN_NAME);
        assert_eq!(r.continent(&f), UNKNOWN_CONTINENT);
    }

    #[test]
    fn metadata_is_derived_once_and_cached() {
        let r = resolver();
        let cf = CountryFeature::new(feature(
            json!({"ADM0_A3": "FRA", "ISO_A2": "FR", "NAME": "France", "CONTINENT": "Europe"}),
        ));
        assert_eq!(cf.id(), Some("FRA"));
        assert!(cf.cached_meta().is_none());

        let first = cf.meta(&r);
        assert_eq!(first.iso2.as_deref(), Some("FR"));
        let bbox = first.bbox.expect("bbox");
        assert_eq!(bbox.to_swne(), [42.0, -5.0, 51.0, 8.0]);

        // A different resolver cannot change what was memoized.
        let second = cf.meta(&MetaResolver::default());
        assert!(std::ptr::eq(first, second));
    }
}
