//! The session context shared by every core component.
//!
//! [`SessionContext`] is constructed once at startup and handed around as an
//! `Arc`.  It owns:
//!
//! * the static [`AppConfig`],
//! * the [`MarkersRepo`],
//! * the [`RecencyQueue`] behind a `std::sync::Mutex` (never held across an
//!   `.await`),
//! * the typed durable [`SessionSettings`],
//! * watch channels for the recently-seen display list, advisory messages
//!   and cache resets.
//!
//! Lock order is always recency queue first, marker store second.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;

use crate::config::AppConfig;
use crate::markers::{LatLong, Marker, MarkersRepo, RecentlySeenMarker};
use crate::recency::RecencyQueue;

use super::storage::{SessionSettings, StorageError};

pub struct SessionContext {
    config: AppConfig,
    markers: Arc<MarkersRepo>,
    recency: Mutex<RecencyQueue>,
    settings: SessionSettings,
    seen_radius_miles: Mutex<f64>,
    recently_seen_tx: watch::Sender<Vec<RecentlySeenMarker>>,
    message_tx: watch::Sender<Option<String>>,
    reset_tx: watch::Sender<u64>,
    reset_generation: AtomicU64,
}

impl SessionContext {
    /// Build a session, restoring the marker cache, the recency queue and the
    /// seen radius from `settings`.
    pub fn new(config: AppConfig, settings: SessionSettings) -> Arc<Self> {
        let markers = Arc::new(MarkersRepo::new());
        let cached = settings.cached_markers();
        if !cached.is_empty() {
            markers.restore(cached);
        }

        let (all_seen, display) = settings.recently_seen();
        let capacity = config.recency.display_capacity.max(1);
        let recency = RecencyQueue::from_parts(all_seen, display, capacity);

        let seen_radius_miles = settings
            .seen_radius_miles()
            .filter(|miles| *miles > 0.0)
            .unwrap_or(config.proximity.seen_radius_miles);

        log::info!(
            "session: restored {} markers, {} recently seen, seen radius {seen_radius_miles} mi",
            markers.len(),
            recency.all_seen_len()
        );

        let (recently_seen_tx, _) = watch::channel(recency.display().to_vec());
        let (message_tx, _) = watch::channel(None);
        let (reset_tx, _) = watch::channel(0);

        Arc::new(Self {
            config,
            markers,
            recency: Mutex::new(recency),
            settings,
            seen_radius_miles: Mutex::new(seen_radius_miles),
            recently_seen_tx,
            message_tx,
            reset_tx,
            reset_generation: AtomicU64::new(0),
        })
    }

    /// A session with default config and in-memory settings.
    pub fn in_memory() -> Arc<Self> {
        Self::new(AppConfig::default(), SessionSettings::in_memory())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn markers(&self) -> &Arc<MarkersRepo> {
        &self.markers
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    // -----------------------------------------------------------------------
    // Seen radius
    // -----------------------------------------------------------------------

    pub fn seen_radius_miles(&self) -> f64 {
        *lock(&self.seen_radius_miles)
    }

    /// Change the seen radius.  Non-positive or non-finite values are ignored.
    pub fn set_seen_radius(&self, miles: f64) {
        if !miles.is_finite() || miles <= 0.0 {
            log::warn!("session: ignoring invalid seen radius {miles}");
            return;
        }
        *lock(&self.seen_radius_miles) = miles;
        if let Err(e) = self.settings.set_seen_radius_miles(miles) {
            self.report_storage_error(e);
        }
    }

    // -----------------------------------------------------------------------
    // Recently seen
    // -----------------------------------------------------------------------

    /// The display list, newest first.
    pub fn recently_seen(&self) -> Vec<RecentlySeenMarker> {
        self.recently_seen_tx.borrow().clone()
    }

    pub fn subscribe_recently_seen(&self) -> watch::Receiver<Vec<RecentlySeenMarker>> {
        self.recently_seen_tx.subscribe()
    }

    pub fn recently_seen_contains(&self, id: &str) -> bool {
        lock(&self.recency).contains(id)
    }

    /// Every marker queued this session.
    pub fn all_recently_seen(&self) -> Vec<RecentlySeenMarker> {
        lock(&self.recency).all_seen()
    }

    pub(crate) fn lock_recency(&self) -> MutexGuard<'_, RecencyQueue> {
        lock(&self.recency)
    }

    /// Apply the result of a seen scan as one paired update: flag the markers
    /// seen, queue the new entries, persist both recency collections, publish
    /// the display list.
    ///
    /// Returns `false` (and changes nothing) when a cache reset happened
    /// after the scan started at `generation`.
    pub(crate) fn commit_seen(
        &self,
        generation: u64,
        newly_seen: &[Marker],
        recently_seen: Vec<RecentlySeenMarker>,
    ) -> bool {
        let mut recency = self.lock_recency();
        if self.reset_generation() != generation {
            log::debug!("session: dropping seen scan started before a cache reset");
            return false;
        }

        for marker in newly_seen {
            self.markers.update_is_seen(marker, true);
        }

        if recency.extend(recently_seen) > 0 {
            let all_seen = recency.all_seen();
            let display = recency.display().to_vec();
            if let Err(e) = self.settings.set_recently_seen(&all_seen, &display) {
                self.report_storage_error(e);
            }
            self.recently_seen_tx.send_replace(display);
        }
        true
    }

    // -----------------------------------------------------------------------
    // Reset
    // -----------------------------------------------------------------------

    /// Bumped by every [`reset_cache`](Self::reset_cache).
    pub fn reset_generation(&self) -> u64 {
        self.reset_generation.load(Ordering::SeqCst)
    }

    /// Fires with the new generation after every cache reset.
    pub fn subscribe_resets(&self) -> watch::Receiver<u64> {
        self.reset_tx.subscribe()
    }

    /// Forget every marker and every recently-seen entry.
    ///
    /// Runs under the recency lock, so a scan cannot commit half-way through
    /// and no reader sees one recency collection cleared without the other.
    /// The listing has to be loaded again before scanning resumes.
    pub fn reset_cache(&self) {
        let generation = {
            let mut recency = self.lock_recency();
            let generation = self.reset_generation.fetch_add(1, Ordering::SeqCst) + 1;

            self.markers.reset();
            recency.clear();
            self.recently_seen_tx.send_replace(Vec::new());

            let persisted = self
                .settings
                .set_recently_seen(&[], &[])
                .and_then(|_| self.settings.clear_cached_markers())
                .and_then(|_| self.settings.set_markers_last_updated_location(None));
            if let Err(e) = persisted {
                self.report_storage_error(e);
            }
            generation
        };

        log::info!("session: marker cache reset (generation {generation})");
        self.reset_tx.send_replace(generation);
    }

    // -----------------------------------------------------------------------
    // Marker listing bookkeeping
    // -----------------------------------------------------------------------

    /// Record the user's location.
    pub fn record_location(&self, location: LatLong) {
        if let Err(e) = self.settings.set_last_known_location(location) {
            self.report_storage_error(e);
        }
    }

    pub fn last_known_location(&self) -> Option<LatLong> {
        self.settings.last_known_location()
    }

    /// `true` when no listing was loaded yet, or the user moved further than
    /// `max_reload_radius_miles` from where it was loaded.
    pub fn needs_marker_reload(&self, location: &LatLong) -> bool {
        match self.settings.markers_last_updated_location() {
            None => true,
            Some(loaded_at) => {
                loaded_at.distance_to(location) > self.config.proximity.max_reload_radius_miles
            }
        }
    }

    /// Called by the listing loader once a full listing for `location` has
    /// been ingested: opens the scan gate and caches the snapshot.
    pub fn finish_marker_listing(&self, location: LatLong) {
        self.markers.set_parse_finished(true);
        let persisted = self
            .settings
            .set_markers_last_updated_location(Some(location))
            .and_then(|_| self.save_markers_cache());
        if let Err(e) = persisted {
            self.report_storage_error(e);
        }
    }

    /// Persist the current marker snapshot for the next cold start.
    pub fn save_markers_cache(&self) -> Result<(), StorageError> {
        self.settings.set_cached_markers(&self.markers.get_all())
    }

    // -----------------------------------------------------------------------
    // Narration preferences
    // -----------------------------------------------------------------------

    pub fn is_speak_when_found_enabled(&self) -> bool {
        self.settings
            .is_speak_when_found_enabled()
            .unwrap_or(self.config.narration.speak_when_marker_found)
    }

    pub fn set_speak_when_found_enabled(&self, enabled: bool) {
        if let Err(e) = self.settings.set_speak_when_found_enabled(enabled) {
            self.report_storage_error(e);
        }
    }

    pub fn is_speak_details_enabled(&self) -> bool {
        self.settings
            .is_speak_details_enabled()
            .unwrap_or(self.config.narration.speak_details)
    }

    pub fn set_speak_details_enabled(&self, enabled: bool) {
        if let Err(e) = self.settings.set_speak_details_enabled(enabled) {
            self.report_storage_error(e);
        }
    }

    // -----------------------------------------------------------------------
    // Advisory messages
    // -----------------------------------------------------------------------

    /// Current advisory message, if any.
    pub fn messages(&self) -> watch::Receiver<Option<String>> {
        self.message_tx.subscribe()
    }

    /// Show `message` to the user.  It is cleared after
    /// `ui.message_clear_secs` unless a newer message replaced it.
    pub fn report_message(&self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("session: {message}");
        self.message_tx.send_replace(Some(message.clone()));

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let tx = self.message_tx.clone();
        let delay = Duration::from_secs(self.config.ui.message_clear_secs);
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            tx.send_if_modified(|current| {
                if current.as_deref() == Some(message.as_str()) {
                    *current = None;
                    true
                } else {
                    false
                }
            });
        });
    }

    fn report_storage_error(&self, e: StorageError) {
        self.report_message(format!("Unable to save settings: {e}"));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding one of these locks leaves plain data behind,
    // still usable.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn seen(id: &str, at: i64) -> RecentlySeenMarker {
        RecentlySeenMarker::new(id, id, at)
    }

    #[test]
    fn cold_start_restores_persisted_state() {
        let settings = SessionSettings::in_memory();
        settings
            .set_cached_markers(&[Marker::new("M1"), Marker::new("M2")])
            .expect("save");
        settings
            .set_recently_seen(&[seen("M1", 1)], &[seen("M1", 1)])
            .expect("save");
        settings.set_seen_radius_miles(0.2).expect("save");

        let session = SessionContext::new(AppConfig::default(), settings);

        assert_eq!(session.markers().len(), 2);
        assert!(session.recently_seen_contains("M1"));
        assert_eq!(session.recently_seen(), vec![seen("M1", 1)]);
        assert_eq!(session.seen_radius_miles(), 0.2);
    }

    #[test]
    fn seen_radius_falls_back_to_config_and_rejects_invalid() {
        let session = SessionContext::in_memory();
        assert_eq!(session.seen_radius_miles(), 0.5);

        session.set_seen_radius(-1.0);
        session.set_seen_radius(f64::NAN);
        assert_eq!(session.seen_radius_miles(), 0.5);

        session.set_seen_radius(1.5);
        assert_eq!(session.seen_radius_miles(), 1.5);
        assert_eq!(session.settings().seen_radius_miles(), Some(1.5));
    }

    #[test]
    fn commit_applies_store_and_queue_together() {
        let session = SessionContext::in_memory();
        session.markers().add(Marker::new("M1"));
        let mut rx = session.subscribe_recently_seen();

        let committed = session.commit_seen(
            session.reset_generation(),
            &[Marker::new("M1")],
            vec![seen("M1", 10)],
        );

        assert!(committed);
        assert!(session.markers().get("M1").is_some_and(|m| m.is_seen));
        assert!(rx.has_changed().expect("open"));
        assert_eq!(rx.borrow_and_update().len(), 1);
        let (all, display) = session.settings().recently_seen();
        assert_eq!(all, vec![seen("M1", 10)]);
        assert_eq!(display, vec![seen("M1", 10)]);
    }

    #[test]
    fn commit_after_reset_is_dropped() {
        let session = SessionContext::in_memory();
        let generation = session.reset_generation();
        session.reset_cache();
        session.markers().add(Marker::new("M1"));

        let committed = session.commit_seen(generation, &[Marker::new("M1")], vec![seen("M1", 1)]);

        assert!(!committed);
        assert!(session.markers().get("M1").is_some_and(|m| !m.is_seen));
        assert!(session.recently_seen().is_empty());
    }

    #[test]
    fn reset_clears_store_and_both_collections() {
        let session = SessionContext::in_memory();
        session.markers().add(Marker::new("M1"));
        session.markers().add(Marker::new("M2"));
        session.markers().set_parse_finished(true);
        session.commit_seen(
            0,
            &[Marker::new("M1"), Marker::new("M2")],
            vec![seen("M1", 1), seen("M2", 2)],
        );
        session.finish_marker_listing(LatLong::new(0.0, 0.0));
        let mut resets = session.subscribe_resets();

        session.reset_cache();

        assert!(session.markers().get_all().is_empty());
        assert!(!session.markers().is_parse_finished());
        assert!(session.recently_seen().is_empty());
        assert!(session.all_recently_seen().is_empty());
        assert_eq!(session.settings().recently_seen(), (vec![], vec![]));
        assert!(session.settings().cached_markers().is_empty());
        assert!(session.needs_marker_reload(&LatLong::new(0.0, 0.0)));
        assert!(resets.has_changed().expect("open"));
        assert_eq!(*resets.borrow_and_update(), 1);
    }

    #[test]
    fn store_subscribers_never_see_half_reset_store() {
        use std::sync::atomic::{AtomicBool, AtomicUsize};

        let session = SessionContext::in_memory();
        let rx = session.markers().subscribe();
        let done = Arc::new(AtomicBool::new(false));
        let violations = Arc::new(AtomicUsize::new(0));

        let observer = {
            let done = Arc::clone(&done);
            let violations = Arc::clone(&violations);
            std::thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    let snapshot = rx.borrow();
                    if snapshot.is_empty() && snapshot.is_parse_finished {
                        violations.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        };

        for _ in 0..200 {
            session.markers().add(Marker::new("M1"));
            session.markers().set_parse_finished(true);
            session.reset_cache();
        }
        done.store(true, Ordering::SeqCst);
        observer.join().expect("observer thread");

        assert_eq!(violations.load(Ordering::SeqCst), 0);
        assert!(session.markers().is_empty());
        assert!(!session.markers().is_parse_finished());
    }

    #[test]
    fn reload_needed_only_outside_reload_radius() {
        let session = SessionContext::in_memory();
        let here = LatLong::new(37.0, -122.0);
        assert!(session.needs_marker_reload(&here));

        session.finish_marker_listing(here);
        assert!(session.markers().is_parse_finished());
        assert!(!session.needs_marker_reload(&LatLong::new(37.01, -122.0)));
        // ~3.5 miles north.
        assert!(session.needs_marker_reload(&LatLong::new(37.05, -122.0)));
    }

    #[test]
    fn narration_preferences_default_from_config() {
        let session = SessionContext::in_memory();
        assert!(session.is_speak_when_found_enabled());
        assert!(!session.is_speak_details_enabled());

        session.set_speak_when_found_enabled(false);
        session.set_speak_details_enabled(true);
        assert!(!session.is_speak_when_found_enabled());
        assert!(session.is_speak_details_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn message_clears_after_delay() {
        let session = SessionContext::in_memory();
        let rx = session.messages();

        session.report_message("Unable to get current location");
        assert_eq!(
            rx.borrow().as_deref(),
            Some("Unable to get current location")
        );

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(rx.borrow().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_message_is_not_cleared_by_older_timer() {
        let session = SessionContext::in_memory();
        let rx = session.messages();

        session.report_message("first");
        tokio::time::sleep(Duration::from_secs(3)).await;
        session.report_message("second");
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(rx.borrow().as_deref(), Some("second"));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(rx.borrow().is_none());
    }
}
