//! Pure "seen" scan over a marker snapshot.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::markers::{LatLong, Marker, RecentlySeenMarker};

/// Result of one scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeenScan {
    /// Markers that just came inside the radius, copied with `is_seen = true`.
    pub newly_seen: Vec<Marker>,
    /// Entries for the recency queue: newly seen markers it does not hold yet.
    pub recently_seen: Vec<RecentlySeenMarker>,
}

impl SeenScan {
    /// `true` when nothing changed.
    pub fn is_empty(&self) -> bool {
        self.newly_seen.is_empty()
    }
}

/// Find the unseen markers strictly closer than `seen_radius_miles` to
/// `user_location`.
///
/// `is_queued` answers whether the recency queue already holds an id; those
/// markers are still flagged seen but not queued a second time.
pub fn scan_for_seen_markers<'a, I, Q>(
    markers: I,
    user_location: &LatLong,
    seen_radius_miles: f64,
    is_queued: Q,
    now_millis: i64,
) -> SeenScan
where
    I: IntoIterator<Item = &'a Marker>,
    Q: Fn(&str) -> bool,
{
    let mut scan = SeenScan::default();

    for marker in markers {
        if marker.is_seen {
            continue;
        }
        let distance = user_location.distance_to(&marker.position);
        if distance >= seen_radius_miles {
            continue;
        }

        log::debug!(
            "proximity: {} is {distance:.3} mi away (radius {seen_radius_miles} mi)",
            marker.id
        );
        scan.newly_seen.push(Marker {
            is_seen: true,
            ..marker.clone()
        });
        if !is_queued(&marker.id) {
            scan.recently_seen.push(RecentlySeenMarker::new(
                marker.id.clone(),
                marker.title.clone(),
                now_millis,
            ));
        }
    }

    scan
}

/// Milliseconds since the Unix epoch.
pub fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
