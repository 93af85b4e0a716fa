//! Bounded, time-ordered "recently seen" queue.
//!
//! [`RecencyQueue`] keeps two collections that always change together:
//!
//! * the full set of every marker queued this session (never capped, used
//!   only to answer "has this marker been queued already?"), and
//! * the display list, capped at `capacity` entries and ordered
//!   most-recent-first, which drives narration and the history panel.
//!
//! Entries are ranked by `(inserted_at_epoch_millis, insertion sequence)`.
//! Eviction removes the lowest rank, so among equal times the entry queued
//! earliest goes first.  The display list is kept in descending rank, so
//! among equal times the entry queued last comes first.

use std::cmp::Reverse;
use std::collections::HashMap;

use crate::markers::RecentlySeenMarker;

/// Display-list capacity used by the app.
pub const DEFAULT_DISPLAY_CAPACITY: usize = 5;

#[derive(Debug, Clone, PartialEq)]
struct Queued {
    seq: u64,
    marker: RecentlySeenMarker,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecencyQueue {
    all_seen: HashMap<String, Queued>,
    display: Vec<RecentlySeenMarker>,
    capacity: usize,
    next_seq: u64,
}

impl RecencyQueue {
    /// Create an empty queue.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RecencyQueue capacity must be > 0");
        Self {
            all_seen: HashMap::new(),
            display: Vec::with_capacity(capacity + 1),
            capacity,
            next_seq: 0,
        }
    }

    /// Rebuild a queue from persisted collections.
    ///
    /// `display` is expected newest first, as [`display`](Self::display)
    /// returns it; its order is kept for entries with equal times.  Display
    /// entries missing from `all_seen` are added to it so the two
    /// collections cannot disagree, and the display list is trimmed to
    /// capacity.
    pub fn from_parts(
        all_seen: Vec<RecentlySeenMarker>,
        display: Vec<RecentlySeenMarker>,
        capacity: usize,
    ) -> Self {
        let mut queue = Self::new(capacity);
        for entry in all_seen {
            queue.remember(entry);
        }
        for entry in display.into_iter().rev() {
            if queue.display.iter().any(|d| d.id == entry.id) {
                continue;
            }
            // Re-rank so restored display entries keep their relative order.
            queue.remember(entry.clone());
            queue.display.push(entry);
            queue.evict_overflow();
        }
        queue.sort_display();
        queue
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `true` when a marker with this id has ever been queued.
    pub fn contains(&self, id: &str) -> bool {
        self.all_seen.contains_key(id)
    }

    /// The display list, newest first.
    pub fn display(&self) -> &[RecentlySeenMarker] {
        &self.display
    }

    /// Every marker queued this session, in no particular order.
    pub fn all_seen(&self) -> Vec<RecentlySeenMarker> {
        self.all_seen.values().map(|q| q.marker.clone()).collect()
    }

    pub fn all_seen_len(&self) -> usize {
        self.all_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.display.is_empty()
    }

    /// Queue a single marker.  Returns `false` when it was already queued.
    pub fn add(&mut self, marker: RecentlySeenMarker) -> bool {
        let added = self.insert(marker);
        if added {
            self.sort_display();
        }
        added
    }

    /// Queue a batch of markers and re-sort once.  Returns how many were new.
    pub fn extend<I>(&mut self, markers: I) -> usize
    where
        I: IntoIterator<Item = RecentlySeenMarker>,
    {
        let mut added = 0;
        for marker in markers {
            if self.insert(marker) {
                added += 1;
            }
        }
        if added > 0 {
            self.sort_display();
        }
        added
    }

    pub fn clear(&mut self) {
        self.all_seen.clear();
        self.display.clear();
    }

    fn insert(&mut self, marker: RecentlySeenMarker) -> bool {
        if self.all_seen.contains_key(&marker.id) {
            return false;
        }
        self.remember(marker.clone());
        self.display.push(marker);
        self.evict_overflow();
        true
    }

    /// Record `marker` in the full set with the next sequence number.
    fn remember(&mut self, marker: RecentlySeenMarker) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.all_seen.insert(marker.id.clone(), Queued { seq, marker });
    }

    fn evict_overflow(&mut self) {
        while self.display.len() > self.capacity {
            let all_seen = &self.all_seen;
            let oldest = self
                .display
                .iter()
                .enumerate()
                .min_by_key(|(_, m)| rank(all_seen, m))
                .map(|(idx, _)| idx);
            match oldest {
                Some(idx) => {
                    let evicted = self.display.remove(idx);
                    log::debug!("recency: evicted {} from display list", evicted.id);
                }
                None => break,
            }
        }
    }

    fn sort_display(&mut self) {
        let all_seen = &self.all_seen;
        self.display.sort_by_key(|m| Reverse(rank(all_seen, m)));
    }
}

fn rank(all_seen: &HashMap<String, Queued>, marker: &RecentlySeenMarker) -> (i64, u64) {
    let seq = all_seen.get(&marker.id).map_or(0, |q| q.seq);
    (marker.inserted_at_epoch_millis, seq)
}

impl Default for RecencyQueue {
    fn default() -> Self {
        Self::new(DEFAULT_DISPLAY_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
