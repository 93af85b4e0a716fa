//! The marker store.
//!
//! [`MarkersRepo`] is the single owner of the canonical [`Marker`] records.
//! The current [`MarkerSetResult`] lives inside a `tokio::sync::watch`
//! channel: every mutation is a read-modify-write under the channel's write
//! lock, so concurrent callers are serialized and subscribers see snapshots
//! in the order the mutations were applied.  Mutations that change nothing
//! (unknown id, identical flag) do not wake subscribers.

use tokio::sync::watch;

use super::marker::{Marker, MarkerId, MarkerSetResult};

pub struct MarkersRepo {
    tx: watch::Sender<MarkerSetResult>,
}

impl MarkersRepo {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(MarkerSetResult::default());
        Self { tx }
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    /// Subscribe to the snapshot stream.  The receiver starts at the current
    /// snapshot.
    pub fn subscribe(&self) -> watch::Receiver<MarkerSetResult> {
        self.tx.subscribe()
    }

    /// Point-in-time copy of the whole store.
    pub fn snapshot(&self) -> MarkerSetResult {
        self.tx.borrow().clone()
    }

    pub fn get(&self, id: &str) -> Option<Marker> {
        self.tx.borrow().get(id).cloned()
    }

    /// All markers in insertion order.
    pub fn get_all(&self) -> Vec<Marker> {
        self.tx.borrow().markers()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    pub fn is_parse_finished(&self) -> bool {
        self.tx.borrow().is_parse_finished
    }

    // -----------------------------------------------------------------------
    // Whole-record operations
    // -----------------------------------------------------------------------

    /// Insert a marker that is known to be new.
    pub fn add(&self, marker: Marker) {
        self.tx.send_modify(|set| {
            set.insert(marker);
        });
    }

    pub fn remove(&self, id: &str) {
        self.tx.send_if_modified(|set| set.remove(id).is_some());
    }

    /// Overwrite the record at `marker.id`, creating it if absent.
    pub fn replace(&self, marker: Marker) {
        self.tx.send_modify(|set| {
            set.insert(marker);
        });
    }

    pub fn clear_all(&self) {
        self.tx.send_if_modified(|set| {
            if set.is_empty() {
                return false;
            }
            set.clear();
            true
        });
        log::debug!("markers: cleared all markers");
    }

    /// Drop every record and close the parse gate in one update, so no
    /// subscriber sees an empty set flagged as a finished listing.
    pub fn reset(&self) {
        self.tx.send_if_modified(|set| {
            if set.is_empty() && !set.is_parse_finished {
                return false;
            }
            set.clear();
            set.is_parse_finished = false;
            true
        });
        log::debug!("markers: store reset");
    }

    /// Load a cached snapshot at cold start.  Existing records with the same
    /// id are overwritten.
    pub fn restore(&self, markers: Vec<Marker>) {
        let count = markers.len();
        self.tx.send_modify(|set| {
            for marker in markers {
                set.insert(marker);
            }
        });
        log::debug!("markers: restored {count} cached markers");
    }

    pub fn set_parse_finished(&self, is_finished: bool) {
        self.tx.send_if_modified(|set| {
            if set.is_parse_finished == is_finished {
                return false;
            }
            set.is_parse_finished = is_finished;
            true
        });
    }

    // -----------------------------------------------------------------------
    // Partial merges
    // -----------------------------------------------------------------------

    /// Merge detail fields into an existing record.  No-op when absent.
    pub fn update_details(&self, marker: &Marker) {
        self.tx.send_if_modified(|set| match set.get_mut(&marker.id) {
            Some(existing) => {
                existing.merge_details(marker);
                true
            }
            None => false,
        });
    }

    /// Merge detail fields, first creating the record from `marker`'s basic
    /// info when it is absent.
    pub fn upsert_details(&self, marker: &Marker) {
        self.tx.send_modify(|set| {
            if !set.contains(&marker.id) {
                set.insert(Marker::from_basic_info(marker));
            }
            if let Some(existing) = set.get_mut(&marker.id) {
                existing.merge_details(marker);
            }
        });
    }

    /// Merge basic-info fields into an existing record.  No-op when absent.
    pub fn update_basic_info(&self, marker: &Marker) {
        self.tx.send_if_modified(|set| match set.get_mut(&marker.id) {
            Some(existing) => {
                existing.merge_basic_info(marker);
                true
            }
            None => false,
        });
    }

    /// Insert `marker` as-is when absent, otherwise merge its basic info.
    pub fn upsert_basic_info(&self, marker: &Marker) {
        self.tx.send_modify(|set| match set.get_mut(&marker.id) {
            Some(existing) => existing.merge_basic_info(marker),
            None => {
                set.insert(marker.clone());
            }
        });
    }

    // -----------------------------------------------------------------------
    // Flag setters
    // -----------------------------------------------------------------------

    pub fn update_is_seen<K: MarkerId + ?Sized>(&self, key: &K, is_seen: bool) {
        self.update_flag(key.marker_id(), |m| &mut m.is_seen, is_seen);
    }

    pub fn update_is_announced<K: MarkerId + ?Sized>(&self, key: &K, is_announced: bool) {
        self.update_flag(key.marker_id(), |m| &mut m.is_announced, is_announced);
    }

    pub fn update_is_spoken<K: MarkerId + ?Sized>(&self, key: &K, is_spoken: bool) {
        self.update_flag(key.marker_id(), |m| &mut m.is_spoken, is_spoken);
    }

    fn update_flag(&self, id: &str, field: impl FnOnce(&mut Marker) -> &mut bool, value: bool) {
        self.tx.send_if_modified(|set| {
            let Some(marker) = set.get_mut(id) else {
                return false;
            };
            let flag = field(marker);
            if *flag == value {
                return false;
            }
            *flag = value;
            true
        });
    }
}

impl Default for MarkersRepo {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
