/// Resolved drawing attributes for one feature, in map-widget terms.
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonStyle {
    pub fill_color: &'static str,
    pub fill_opacity: f64,
    pub stroke_color: &'static str,
    pub stroke_opacity: f64,
    pub stroke_weight: f64,
    pub clickable: bool,
    pub z_index: i32,
}

pub const COLOR_OK: &str = "#19c37d";
pub const COLOR_KO: &str = "#ff3b30";
pub const COAST_COLOR: &str = "#ff7f2a";
const HOVER_FILL: &str = "#ffd7b0";
const HOVER_STROKE: &str = "#ff8a2a";

pub fn coast_style(stroke_weight: f64) -> PolygonStyle {
    PolygonStyle {
        fill_color: COAST_COLOR,
        fill_opacity: 0.0,
        stroke_color: COAST_COLOR,
        stroke_opacity: 1.0,
        stroke_weight,
        clickable: false,
        z_index: 1000,
    }
}

/// Game facts the country style depends on.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct CountryStyleInput {
    pub zoom: f64,
    /// `Some(true)` found, `Some(false)` failed, `None` unresolved.
    pub resolved: Option<bool>,
    pub hovered: bool,
    pub hover_suspended: bool,
    pub in_scope: bool,
    pub city_mode: bool,
}

/// Picks one of four values by zoom tier (<3, <5, <8, rest).
fn by_zoom(zoom: f64, tiers: [f64; 4]) -> f64 {
    if zoom < 3.0 {
        tiers[0]
    } else if zoom < 5.0 {
        tiers[1]
    } else if zoom < 8.0 {
        tiers[2]
    } else {
        tiers[3]
    }
}

pub fn country_style(input: &CountryStyleInput) -> PolygonStyle {
    let clickable = !input.city_mode;
    let z = input.zoom;

    if let Some(found) = input.resolved {
        let color = if found { COLOR_OK } else { COLOR_KO };
        return PolygonStyle {
            fill_color: color,
            fill_opacity: by_zoom(z, [0.28, 0.36, 0.42, 0.5]),
            stroke_color: color,
            stroke_opacity: 0.9,
            stroke_weight: by_zoom(z, [0.8, 1.2, 1.6, 2.0]),
            clickable,
            z_index: 950,
        };
    }

    let highlight = input.hovered && !input.hover_suspended && input.in_scope && !input.city_mode;
    let (fill_color, fill_opacity, stroke_opacity) = if highlight {
        (HOVER_FILL, by_zoom(z, [0.06, 0.09, 0.12, 0.16]), 0.32)
    } else {
        ("#fff", 0.0, 0.0)
    };
    PolygonStyle {
        fill_color,
        fill_opacity,
        stroke_color: HOVER_STROKE,
        stroke_opacity,
        stroke_weight: by_zoom(z, [0.7, 1.1, 1.5, 1.9]),
        clickable,
        z_index: 900,
    }
}

/// Momentary override for a wrong click.
pub fn wrong_guess_style() -> PolygonStyle {
    PolygonStyle {
        fill_color: COLOR_KO,
        fill_opacity: 0.35,
        stroke_color: HOVER_STROKE,
        stroke_opacity: 0.0,
        stroke_weight: 0.0,
        clickable: true,
        z_index: 960,
    }
}

#[cfg(test)]
mod tests {
    use super::{COLOR_KO, COLOR_OK, CountryStyleInput, country_style};

    #[test]
    fn resolved_countries_are_coloured_by_outcome() {
        let mut input = CountryStyleInput {
            zoom: 4.0,
            resolved: Some(true),
            ..Default::default()
        };
        let ok = country_style(&input);
        assert_eq!(ok.fill_color, COLOR_OK);
        assert_eq!(ok.fill_opacity, 0.36);
        assert_eq!(ok.z_index, 950);

        input.resolved = Some(false);
        assert_eq!(country_style(&input).stroke_color, COLOR_KO);
    }

    #[test]
    fn hover_highlight_needs_scope_and_no_suspension() {
        let base = CountryStyleInput {
            zoom: 9.0,
            hovered: true,
            in_scope: true,
            ..Default::default()
        };
        assert_eq!(country_style(&base).fill_opacity, 0.16);

        let suspended = CountryStyleInput {
            hover_suspended: true,
            ..base
        };
        assert_eq!(country_style(&suspended).fill_opacity, 0.0);

        let city = CountryStyleInput {
            city_mode: true,
            ..base
        };
        let style = country_style(&city);
        assert_eq!(style.fill_opacity, 0.0);
        assert!(!style.clickable);
    }
}
