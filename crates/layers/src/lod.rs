use catalog::Lod;

/// Coastline detail by zoom: fine from 5, medium from 3, coarse below.
pub fn lod_for_zoom(zoom: f64) -> Lod {
    if zoom >= 5.0 {
        Lod::Fine
    } else if zoom >= 3.0 {
        Lod::Medium
    } else {
        Lod::Coarse
    }
}

/// Countries and land only ship at two tiers.
pub fn country_lod_for_zoom(zoom: f64) -> Lod {
    if zoom >= 3.0 { Lod::Medium } else { Lod::Coarse }
}

pub fn land_lod_for_zoom(zoom: f64) -> Lod {
    country_lod_for_zoom(zoom)
}

/// Minimum coastline stroke, whatever the scale factor.
pub const MIN_STROKE: f64 = 0.6;

/// Coastline stroke width: three coarse tiers so small zoom deltas never restyle.
pub fn stroke_width_for_zoom(zoom: f64, scale: f64) -> f64 {
    let base = if zoom < 3.0 {
        1.2
    } else if zoom < 6.0 {
        1.8
    } else {
        2.6
    };
    let scaled = (base * scale * 100.0).round() / 100.0;
    scaled.max(MIN_STROKE)
}
