use std::str::FromStr;

use catalog::City;
use foundation::bounds::GeoBox;
use layers::CountryLayer;
use layers::metadata::CountryFeature;

/// What the player is asked to find.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Mode {
    /// Country, prompted by name.
    #[default]
    Name,
    /// Country, prompted by flag image.
    Flag,
    /// City, guessed by clicking near it.
    City,
}

impl Mode {
    pub fn is_city(&self) -> bool {
        matches!(self, Mode::City)
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(Mode::Name),
            "flag" => Ok(Mode::Flag),
            "city" => Ok(Mode::City),
            other => Err(format!("unknown mode '{other}' (expected name, flag or city)")),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Mode::Name => "name",
            Mode::Flag => "flag",
            Mode::City => "city",
        })
    }
}

/// Snapshot of a country feature taken at pick time, so the target outlives
/// layer swaps.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryTarget {
    pub iso2: String,
    pub name: String,
    pub feature_id: Option<String>,
    pub bbox: Option<GeoBox>,
}

impl CountryTarget {
    /// `None` for features without an ISO code; those are never targets.
    pub fn from_feature(layer: &CountryLayer, feature: &CountryFeature) -> Option<Self> {
        let meta = layer.meta(feature);
        Some(Self {
            iso2: meta.iso2.clone()?,
            name: meta.name.clone(),
            feature_id: feature.id().map(str::to_string),
            bbox: meta.bbox,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Country(CountryTarget),
    City(City),
}

impl Target {
    pub fn name(&self) -> &str {
        match self {
            Target::Country(c) => &c.name,
            Target::City(c) => &c.name,
        }
    }

    pub fn country_iso(&self) -> Option<&str> {
        match self {
            Target::Country(c) => Some(&c.iso2),
            Target::City(_) => None,
        }
    }
}

/// How the current target is presented.
#[derive(Debug, Clone, PartialEq)]
pub enum Prompt {
    Name(String),
    /// Flag image; `name` is shown if the image fails to load.
    Flag { url: String, name: String },
    /// Pool exhausted.
    Done,
}
