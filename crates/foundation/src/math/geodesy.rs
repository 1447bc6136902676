/// WGS84 semi-major axis (meters). Also the sphere radius of the web Mercator projection.
pub const WGS84_A: f64 = 6_378_137.0;
/// Mean Earth radius used for great-circle distances (kilometers).
pub const EARTH_MEAN_RADIUS_KM: f64 = 6_371.0;

/// Spherical Mercator projection of a `[lng, lat]` pair in degrees.
///
/// Returns planar `[x, y]` in meters. Latitudes at the poles diverge; callers
/// ranking areas must tolerate non-finite results.
pub fn to_mercator(lng_deg: f64, lat_deg: f64) -> [f64; 2] {
    let x = WGS84_A * lng_deg.to_radians();
    let y = WGS84_A * (std::f64::consts::FRAC_PI_4 + lat_deg.to_radians() / 2.0).tan().ln();
    [x, y]
}

/// Great-circle distance in kilometers (haversine).
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_MEAN_RADIUS_KM * a.sqrt().asin()
}

/// Kilometers spanned by one degree of latitude on the mean sphere.
pub fn km_per_degree_lat() -> f64 {
    EARTH_MEAN_RADIUS_KM * std::f64::consts::PI / 180.0
}

#[cfg(test)]
mod tests {
    use super::{WGS84_A, haversine_km, km_per_degree_lat, to_mercator};

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn mercator_origin_and_antimeridian() {
        let [x, y] = to_mercator(0.0, 0.0);
        assert_close(x, 0.0, 1e-9);
        assert_close(y, 0.0, 1e-9);

        let [x, _] = to_mercator(180.0, 0.0);
        assert_close(x, WGS84_A * std::f64::consts::PI, 1e-6);
    }

    #[test]
    fn mercator_is_symmetric_in_latitude() {
        let [_, north] = to_mercator(10.0, 45.0);
        let [_, south] = to_mercator(10.0, -45.0);
        assert_close(north, -south, 1e-6);
        assert!(north > 0.0);
    }

    #[test]
    fn haversine_one_degree_of_latitude() {
        let d = haversine_km(0.0, 0.0, 1.0, 0.0);
        assert_close(d, km_per_degree_lat(), 1e-9);
    }

    #[test]
    fn haversine_paris_london() {
        let d = haversine_km(48.8566, 2.3522, 51.5074, -0.1278);
        assert!((340.0..350.0).contains(&d), "d={d}");
    }
}
