//! Marker entity and store.
//!
//! * [`Marker`]: one historical marker: basic info from the listing, detail
//!   fields from the per-marker page, and seen/announced/spoken flags.
//! * [`RecentlySeenMarker`]: entry of the recency queue.
//! * [`MarkerSetResult`]: the store's observable snapshot.
//! * [`MarkersRepo`]: the store itself; the only place markers are mutated.
//!
//! # Quick start
//!
//! ```rust
//! use marker_narrator::markers::{Marker, MarkersRepo};
//!
//! let repo = MarkersRepo::new();
//! repo.upsert_basic_info(&Marker { title: "Old Mill".into(), ..Marker::new("M1") });
//! repo.update_is_seen("M1", true);
//!
//! assert!(repo.get("M1").is_some_and(|m| m.is_seen));
//! ```

pub mod marker;
pub mod repo;

pub use marker::{LatLong, Marker, MarkerId, MarkerSetResult, RecentlySeenMarker};
pub use repo::MarkersRepo;
