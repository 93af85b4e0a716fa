//! Marker entity, recently-seen record and the store snapshot type.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::geo;

// ---------------------------------------------------------------------------
// LatLong
// ---------------------------------------------------------------------------

/// A WGS-84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatLong {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLong {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to `other` in miles.
    pub fn distance_to(&self, other: &LatLong) -> f64 {
        geo::distance_between_in_miles(
            self.latitude,
            self.longitude,
            other.latitude,
            other.longitude,
        )
    }
}

// ---------------------------------------------------------------------------
// Marker
// ---------------------------------------------------------------------------

/// One physical historical marker.
///
/// Basic info (`position`, `title`, `subtitle`, `alpha`) comes from the
/// marker listing.  Detail fields are only filled in once the per-marker
/// detail page has been loaded, which also sets `is_details_loaded`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Marker {
    pub id: String,
    pub position: LatLong,
    pub title: String,
    pub subtitle: String,
    /// Rendering hint only.
    pub alpha: f32,

    pub is_seen: bool,
    pub is_announced: bool,
    pub is_spoken: bool,
    pub is_details_loaded: bool,

    pub marker_details_page_url: String,
    pub main_photo_url: String,
    pub marker_photos: Vec<String>,
    pub photo_captions: Vec<String>,
    pub photo_attributions: Vec<String>,
    pub inscription: String,
    pub english_inscription: String,
    pub spanish_inscription: String,
    pub erected: String,
    pub credits: String,
    pub location: String,
}

impl Default for Marker {
    fn default() -> Self {
        Self {
            id: String::new(),
            position: LatLong::default(),
            title: String::new(),
            subtitle: String::new(),
            alpha: 1.0,
            is_seen: false,
            is_announced: false,
            is_spoken: false,
            is_details_loaded: false,
            marker_details_page_url: String::new(),
            main_photo_url: String::new(),
            marker_photos: Vec::new(),
            photo_captions: Vec::new(),
            photo_attributions: Vec::new(),
            inscription: String::new(),
            english_inscription: String::new(),
            spanish_inscription: String::new(),
            erected: String::new(),
            credits: String::new(),
            location: String::new(),
        }
    }
}

impl Marker {
    /// A marker with only `id` set; everything else is default.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// A fresh record carrying only the id and basic info of `other`.
    pub fn from_basic_info(other: &Marker) -> Self {
        let mut marker = Self::new(other.id.clone());
        marker.merge_basic_info(other);
        marker
    }

    /// Copy the basic-info fields of `other` into `self`.  Flags and detail
    /// fields are left alone.
    pub fn merge_basic_info(&mut self, other: &Marker) {
        self.position = other.position;
        self.title = other.title.clone();
        self.subtitle = other.subtitle.clone();
        self.alpha = other.alpha;
    }

    /// Copy the detail fields (and `is_details_loaded`) of `other` into
    /// `self`.  Basic info and the seen/announced/spoken flags are left alone.
    pub fn merge_details(&mut self, other: &Marker) {
        self.is_details_loaded = other.is_details_loaded;
        self.marker_details_page_url = other.marker_details_page_url.clone();
        self.main_photo_url = other.main_photo_url.clone();
        self.marker_photos = other.marker_photos.clone();
        self.photo_captions = other.photo_captions.clone();
        self.photo_attributions = other.photo_attributions.clone();
        self.inscription = other.inscription.clone();
        self.english_inscription = other.english_inscription.clone();
        self.spanish_inscription = other.spanish_inscription.clone();
        self.erected = other.erected.clone();
        self.credits = other.credits.clone();
        self.location = other.location.clone();
    }

    /// The inscription to read aloud: the English translation when the
    /// detail page had one, otherwise the original text.
    pub fn narration_inscription(&self) -> &str {
        if self.english_inscription.trim().is_empty() {
            &self.inscription
        } else {
            &self.english_inscription
        }
    }
}

// ---------------------------------------------------------------------------
// MarkerId
// ---------------------------------------------------------------------------

/// Anything that identifies a marker: a full [`Marker`], a
/// [`RecentlySeenMarker`] or a bare id.
pub trait MarkerId {
    fn marker_id(&self) -> &str;
}

impl MarkerId for str {
    fn marker_id(&self) -> &str {
        self
    }
}

impl MarkerId for String {
    fn marker_id(&self) -> &str {
        self
    }
}

impl MarkerId for Marker {
    fn marker_id(&self) -> &str {
        &self.id
    }
}

impl MarkerId for RecentlySeenMarker {
    fn marker_id(&self) -> &str {
        &self.id
    }
}

// ---------------------------------------------------------------------------
// RecentlySeenMarker
// ---------------------------------------------------------------------------

/// Lightweight entry of the recency queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecentlySeenMarker {
    pub id: String,
    pub title: String,
    pub inserted_at_epoch_millis: i64,
}

impl RecentlySeenMarker {
    pub fn new(id: impl Into<String>, title: impl Into<String>, inserted_at: i64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            inserted_at_epoch_millis: inserted_at,
        }
    }
}

// ---------------------------------------------------------------------------
// MarkerSetResult
// ---------------------------------------------------------------------------

/// Snapshot of the marker store.
///
/// Lookup is by id; iteration follows insertion order.  Re-inserting an
/// existing id keeps its original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerSetResult {
    marker_id_to_marker: HashMap<String, Marker>,
    order: Vec<String>,
    /// `true` once the bulk ingest of the marker listing has completed.
    pub is_parse_finished: bool,
}

impl MarkerSetResult {
    pub fn get(&self, id: &str) -> Option<&Marker> {
        self.marker_id_to_marker.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Marker> {
        self.marker_id_to_marker.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.marker_id_to_marker.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Markers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Marker> + '_ {
        self.order
            .iter()
            .filter_map(move |id| self.marker_id_to_marker.get(id))
    }

    /// Owned copy of all markers in insertion order.
    pub fn markers(&self) -> Vec<Marker> {
        self.iter().cloned().collect()
    }

    /// Insert or overwrite.  Returns the previous record, if any.
    pub fn insert(&mut self, marker: Marker) -> Option<Marker> {
        let id = marker.id.clone();
        let previous = self.marker_id_to_marker.insert(id.clone(), marker);
        if previous.is_none() {
            self.order.push(id);
        }
        previous
    }

    pub fn remove(&mut self, id: &str) -> Option<Marker> {
        let removed = self.marker_id_to_marker.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.marker_id_to_marker.clear();
        self.order.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
