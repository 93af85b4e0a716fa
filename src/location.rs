//! Events delivered by the platform location provider.

use crate::markers::LatLong;

/// One update from the location provider, delivered on a
/// `tokio::sync::mpsc` channel in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    /// A new position fix.
    Fix(LatLong),
    /// The provider could not determine the position.  The message is shown
    /// to the user; the provider keeps polling on its own cadence.
    Error(String),
}

impl From<LatLong> for LocationEvent {
    fn from(location: LatLong) -> Self {
        Self::Fix(location)
    }
}

/// Parse a `"lat,lon"` line (whitespace tolerant) into a coordinate.
///
/// ```
/// use marker_narrator::location::parse_lat_long;
///
/// let p = parse_lat_long(" 37.33, -121.89 ").unwrap();
/// assert_eq!(p.latitude, 37.33);
/// assert!(parse_lat_long("north").is_none());
/// ```
pub fn parse_lat_long(line: &str) -> Option<LatLong> {
    let (lat, lon) = line.trim().split_once(',')?;
    let latitude: f64 = lat.trim().parse().ok()?;
    let longitude: f64 = lon.trim().parse().ok()?;
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return None;
    }
    Some(LatLong::new(latitude, longitude))
}
