use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use foundation::bounds::GeoBox;
use serde::{Deserialize, Serialize};

/// Continent sentinel meaning "no clipping, whole world".
pub const ALL_CONTINENTS: &str = "ALL";

/// Precision tier of a Natural Earth dataset.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Lod {
    #[serde(rename = "110m")]
    Coarse,
    #[serde(rename = "50m")]
    Medium,
    #[serde(rename = "10m")]
    Fine,
}

impl Lod {
    pub const ALL: [Lod; 3] = [Lod::Coarse, Lod::Medium, Lod::Fine];

    pub fn as_str(&self) -> &'static str {
        match self {
            Lod::Coarse => "110m",
            Lod::Medium => "50m",
            Lod::Fine => "10m",
        }
    }
}

impl std::fmt::Display for Lod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dataset family. Each family is fetched and cached independently.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Coastline,
    Country,
    Land,
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Family::Coastline => "coastline",
            Family::Country => "country",
            Family::Land => "land",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    UnknownSource { family: Family, lod: Lod },
    Corrupt(String),
    Io(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::UnknownSource { family, lod } => {
                write!(f, "no {family} dataset configured at {lod}")
            }
            CatalogError::Corrupt(msg) => write!(f, "catalog file corrupt: {msg}"),
            CatalogError::Io(msg) => write!(f, "catalog file error: {msg}"),
        }
    }
}

impl std::error::Error for CatalogError {}

const NE_BASE: &str = "https://cdn.jsdelivr.net/gh/nvkelso/natural-earth-vector/geojson";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSources {
    pub coastline: BTreeMap<Lod, String>,
    pub country: BTreeMap<Lod, String>,
    pub land: BTreeMap<Lod, String>,
}

impl Default for DataSources {
    fn default() -> Self {
        let ne = |lod: Lod, name: &str| (lod, format!("{NE_BASE}/ne_{lod}_{name}.geojson"));
        Self {
            coastline: Lod::ALL.iter().map(|l| ne(*l, "coastline")).collect(),
            country: [Lod::Coarse, Lod::Medium]
                .iter()
                .map(|l| ne(*l, "admin_0_countries"))
                .collect(),
            land: [Lod::Coarse, Lod::Medium]
                .iter()
                .map(|l| ne(*l, "land"))
                .collect(),
        }
    }
}

impl DataSources {
    pub fn family(&self, family: Family) -> &BTreeMap<Lod, String> {
        match family {
            Family::Coastline => &self.coastline,
            Family::Country => &self.country,
            Family::Land => &self.land,
        }
    }

    pub fn url(&self, family: Family, lod: Lod) -> Result<&str, CatalogError> {
        self.family(family)
            .get(&lod)
            .map(String::as_str)
            .ok_or(CatalogError::UnknownSource { family, lod })
    }

    /// Every configured URL, in family then LOD order.
    pub fn all_urls(&self) -> Vec<(Family, Lod, &str)> {
        [Family::Coastline, Family::Country, Family::Land]
            .into_iter()
            .flat_map(|fam| {
                self.family(fam)
                    .iter()
                    .map(move |(lod, url)| (fam, *lod, url.as_str()))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub continent: String,
}

impl City {
    fn new(id: &str, name: &str, lat: f64, lon: f64, continent: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            lat,
            lon,
            continent: continent.to_string(),
        }
    }
}

/// Continent name to one or more `[south, west, north, east]` boxes.
///
/// Continents straddling the antimeridian map to several boxes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinentTable(pub BTreeMap<String, Vec<[f64; 4]>>);

impl Default for ContinentTable {
    fn default() -> Self {
        let entries: [(&str, &[[f64; 4]]); 8] = [
            (ALL_CONTINENTS, &[[-90.0, -180.0, 90.0, 180.0]]),
            ("Africa", &[[-35.0, -20.0, 38.0, 55.0]]),
            ("Europe", &[[35.0, -25.0, 72.0, 60.0]]),
            ("Asia", &[[5.0, 25.0, 80.0, 180.0], [5.0, -180.0, 80.0, -170.0]]),
            ("North America", &[[7.0, -170.0, 85.0, -50.0]]),
            ("South America", &[[-56.0, -82.0, 13.0, -34.0]]),
            ("Oceania", &[[-50.0, 110.0, 10.0, 180.0], [-50.0, -180.0, 10.0, -160.0]]),
            ("Antarctica", &[[-90.0, -180.0, -60.0, 180.0]]),
        ];
        Self(
            entries
                .into_iter()
                .map(|(name, boxes)| (name.to_string(), boxes.to_vec()))
                .collect(),
        )
    }
}

impl ContinentTable {
    /// Boxes for `continent`; unknown names fall back to the whole-world entry.
    pub fn boxes(&self, continent: &str) -> Vec<GeoBox> {
        self.0
            .get(continent)
            .or_else(|| self.0.get(ALL_CONTINENTS))
            .map(|v| v.iter().copied().map(GeoBox::from_swne).collect())
            .unwrap_or_else(|| vec![GeoBox::WORLD])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Delays (milliseconds) of the feedback pause before the next target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Delays {
    pub country_correct_ms: u64,
    pub country_failed_ms: u64,
    pub city_correct_ms: u64,
    pub city_failed_ms: u64,
    pub wrong_flash_ms: u64,
}

impl Default for Delays {
    fn default() -> Self {
        Self {
            country_correct_ms: 450,
            country_failed_ms: 1100,
            city_correct_ms: 600,
            city_failed_ms: 900,
            wrong_flash_ms: 180,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    pub lru_capacity: usize,
    pub lru_ttl_ms: u64,
    pub coast_stroke_scale: f64,
    pub pool_ttl_ms: u64,
    pub city_success_km: f64,
    pub max_attempts: u32,
    pub focus_zoom_min: f64,
    pub max_focus_zoom: f64,
    pub delays: Delays,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            lru_capacity: 12,
            lru_ttl_ms: 10 * 60 * 1000,
            coast_stroke_scale: 0.7,
            pool_ttl_ms: 30_000,
            city_success_km: 50.0,
            max_attempts: 3,
            focus_zoom_min: 3.0,
            max_focus_zoom: 5.0,
            delays: Delays::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StartView {
    pub lat: f64,
    pub lng: f64,
    pub zoom: f64,
}

impl Default for StartView {
    fn default() -> Self {
        Self {
            lat: 46.6,
            lng: 2.2,
            zoom: 5.0,
        }
    }
}

/// Static configuration of a quiz session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub sources: DataSources,
    pub continents: ContinentTable,
    pub cities: Vec<City>,
    /// ISO-2 codes of countries without a land border.
    pub island_iso2: BTreeSet<String>,
    /// Lower-cased display name to ISO-2, for features whose code is missing.
    pub iso2_name_fallback: BTreeMap<String, String>,
    pub flag_url_template: String,
    pub start: StartView,
    pub tunables: Tunables,
}

impl Default for Catalog {
    fn default() -> Self {
        let cities = vec![
            City::new("paris", "Paris", 48.8566, 2.3522, "Europe"),
            City::new("oslo", "Oslo", 59.9139, 10.7522, "Europe"),
            City::new("stockholm", "Stockholm", 59.3293, 18.0686, "Europe"),
            City::new("madrid", "Madrid", 40.4168, -3.7038, "Europe"),
            City::new("rome", "Rome", 41.9028, 12.4964, "Europe"),
            City::new("berlin", "Berlin", 52.52, 13.405, "Europe"),
            City::new("london", "Londres", 51.5074, -0.1278, "Europe"),
            City::new("lisbon", "Lisbonne", 38.7223, -9.1393, "Europe"),
            City::new("vienna", "Vienne", 48.2082, 16.3738, "Europe"),
            City::new("budapest", "Budapest", 47.4979, 19.0402, "Europe"),
            City::new("nyc", "New York", 40.7128, -74.0060, "North America"),
            City::new("la", "Los Angeles", 34.0522, -118.2437, "North America"),
            City::new("toronto", "Toronto", 43.6532, -79.3832, "North America"),
            City::new("mexico", "Mexico", 19.4326, -99.1332, "North America"),
            City::new("tokyo", "Tokyo", 35.6762, 139.6503, "Asia"),
            City::new("seoul", "Séoul", 37.5665, 126.9780, "Asia"),
            City::new("bangkok", "Bangkok", 13.7563, 100.5018, "Asia"),
            City::new("cairo", "Le Caire", 30.0444, 31.2357, "Africa"),
            City::new("lagos", "Lagos", 6.5244, 3.3792, "Africa"),
            City::new("sydney", "Sydney", -33.8688, 151.2093, "Oceania"),
            City::new("melbourne", "Melbourne", -37.8136, 144.9631, "Oceania"),
        ];

        let island_iso2 = [
            // Europe
            "IS", "MT", "CY", //
            // Oceania (PG shares a border with ID but is kept here)
            "AU", "NZ", "NR", "PW", "FM", "MH", "KI", "TV", "TO", "WS", "VU", "SB", "FJ", "PG", //
            // Asia
            "JP", "PH", "LK", "MV", "SG", "BH", "TW", //
            // Africa
            "MG", "MU", "SC", "KM", "CV", "ST", //
            // Caribbean
            "CU", "JM", "BS", "BB", "TT", "AG", "KN", "DM", "LC", "VC", "GD",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();

        let iso2_name_fallback = [
            ("france", "FR"),
            ("norway", "NO"),
            ("kingdom of norway", "NO"),
            ("norvège", "NO"),
            ("sweden", "SE"),
            ("suède", "SE"),
        ]
        .into_iter()
        .map(|(n, c)| (n.to_string(), c.to_string()))
        .collect();

        Self {
            sources: DataSources::default(),
            continents: ContinentTable::default(),
            cities,
            island_iso2,
            iso2_name_fallback,
            flag_url_template: "https://flagcdn.com/w320/{iso2}.png".to_string(),
            start: StartView::default(),
            tunables: Tunables::default(),
        }
    }
}

impl Catalog {
    /// Parses a JSON override; every table left out keeps its built-in value.
    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        serde_json::from_str(raw).map_err(|e| CatalogError::Corrupt(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::Io(format!("read {path:?}: {e}")))?;
        Self::from_json_str(&raw)
    }

    pub fn is_island(&self, iso2: &str) -> bool {
        self.island_iso2.contains(iso2)
    }

    pub fn flag_url(&self, iso2: &str) -> String {
        self.flag_url_template
            .replace("{iso2}", &iso2.to_lowercase())
    }

    /// Cities of `continent`, or all of them for [`ALL_CONTINENTS`].
    pub fn cities_in(&self, continent: &str) -> Vec<&City> {
        self.cities
            .iter()
            .filter(|c| continent == ALL_CONTINENTS || c.continent == continent)
            .collect()
    }

    pub fn city(&self, id: &str) -> Option<&City> {
        self.cities.iter().find(|c| c.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::{ALL_CONTINENTS, Catalog, CatalogError, Family, Lod};
    use pretty_assertions::assert_eq;

    #[test]
    fn default_sources_cover_expected_lods() {
        let cat = Catalog::default();
        assert!(cat.sources.url(Family::Coastline, Lod::Fine).is_ok());
        assert_eq!(
            cat.sources.url(Family::Country, Lod::Fine),
            Err(CatalogError::UnknownSource {
                family: Family::Country,
                lod: Lod::Fine
            })
        );
        assert!(
            cat.sources
                .url(Family::Land, Lod::Medium)
                .unwrap()
                .ends_with("ne_50m_land.geojson")
        );
        assert_eq!(cat.sources.all_urls().len(), 7);
    }

    #[test]
    fn continents_spanning_the_antimeridian_have_two_boxes() {
        let cat = Catalog::default();
        let asia = cat.continents.boxes("Asia");
        assert_eq!(asia.len(), 2);
        assert!(asia.iter().any(|b| b.contains(60.0, -172.0)));

        let unknown = cat.continents.boxes("Atlantis");
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].to_swne(), [-90.0, -180.0, 90.0, 180.0]);
    }

    #[test]
    fn city_scope_and_flags() {
        let cat = Catalog::default();
        assert_eq!(cat.cities_in(ALL_CONTINENTS).len(), 21);
        assert_eq!(cat.cities_in("Oceania").len(), 2);
        assert_eq!(cat.flag_url("FR"), "https://flagcdn.com/w320/fr.png");
        assert!(cat.is_island("JP"));
        assert!(!cat.is_island("FR"));
    }

    #[test]
    fn json_override_keeps_unlisted_defaults() {
        let cat = Catalog::from_json_str(
            r#"{"tunables": {"lru_capacity": 4}, "island_iso2": ["XX"]}"#,
        )
        .expect("parse");
        assert_eq!(cat.tunables.lru_capacity, 4);
        assert_eq!(cat.tunables.pool_ttl_ms, 30_000);
        assert!(cat.is_island("XX"));
        assert!(!cat.is_island("JP"));
        assert_eq!(cat.cities.len(), 21);

        assert!(matches!(
            Catalog::from_json_str("{"),
            Err(CatalogError::Corrupt(_))
        ));
    }
}
