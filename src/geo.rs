//! Great-circle distance on a spherical earth.

/// Mean earth radius in miles.
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Haversine distance in miles between two coordinates in decimal degrees.
///
/// ```
/// use marker_narrator::geo::distance_between_in_miles;
///
/// assert_eq!(distance_between_in_miles(37.0, -122.0, 37.0, -122.0), 0.0);
/// ```
pub fn distance_between_in_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push `a` a hair outside [0, 1] for antipodal points.
    let c = 2.0 * a.clamp(0.0, 1.0).sqrt().asin();

    EARTH_RADIUS_MILES * c
}
