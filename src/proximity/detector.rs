//! Single-flight seen detector and the location loop that drives it.
//!
//! [`ProximityDetector::request_scan`] may be called from any number of
//! tasks.  The first caller becomes the scanner; callers arriving while a
//! scan is in flight only deposit their location and return
//! [`ScanOutcome::Coalesced`].  Before releasing the guard the scanner
//! re-scans with the latest deposited location, so the newest position
//! always wins and scans never overlap.
//!
//! ```text
//! LocationEvent::Fix ──▶ debounce ──▶ drain newer fixes ──▶ request_scan
//!                                                             │
//!                         store + recency (paired commit) ◀───┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::location::LocationEvent;
use crate::markers::LatLong;
use crate::session::SessionContext;

use super::scanner::{epoch_millis, scan_for_seen_markers};

/// Message raised when one scan marks many markers seen at once.
pub const DENSE_AREA_MESSAGE: &str = "Some recently seen markers are not listed.";

/// What a call to [`ProximityDetector::request_scan`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The marker listing has not finished loading; scanning a partial set
    /// would miss markers, so nothing was done.
    Deferred,
    /// Another scan was in flight and will pick up this location.
    Coalesced,
    /// Scan finished without changes (including an empty marker set).
    NoChanges,
    /// A cache reset happened mid-scan; the result was discarded.
    Cancelled,
    /// Markers were flagged seen.
    Updated {
        /// Markers flagged seen.
        newly_seen: usize,
        /// Of those, how many were new to the recency queue.
        queued: usize,
    },
}

pub struct ProximityDetector {
    session: Arc<SessionContext>,
    in_flight: AtomicBool,
    pending: Mutex<Option<LatLong>>,
}

impl ProximityDetector {
    pub fn new(session: Arc<SessionContext>) -> Self {
        Self {
            session,
            in_flight: AtomicBool::new(false),
            pending: Mutex::new(None),
        }
    }

    /// Scan for markers that are now inside the seen radius of `location`.
    pub fn request_scan(&self, location: LatLong) -> ScanOutcome {
        *self.lock_pending() = Some(location);
        self.run_pending()
    }

    fn run_pending(&self) -> ScanOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return ScanOutcome::Coalesced;
        }

        let mut outcome = ScanOutcome::NoChanges;
        loop {
            let next = self.lock_pending().take();
            if let Some(location) = next {
                outcome = self.scan_once(location);
                continue;
            }

            self.in_flight.store(false, Ordering::SeqCst);
            // A request may have deposited a location after `take` but
            // before the guard was released.
            let has_pending = self.lock_pending().is_some();
            if has_pending
                && self
                    .in_flight
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            {
                continue;
            }
            return outcome;
        }
    }

    fn scan_once(&self, location: LatLong) -> ScanOutcome {
        let session = &self.session;
        let markers = session.markers();

        if !markers.is_parse_finished() {
            log::debug!("proximity: marker listing still loading, scan deferred");
            return ScanOutcome::Deferred;
        }

        let generation = session.reset_generation();
        let snapshot = markers.snapshot();
        if snapshot.is_empty() {
            log::debug!("proximity: no markers, finished with no changes");
            return ScanOutcome::NoChanges;
        }

        let radius = session.seen_radius_miles();
        let scan = {
            let recency = session.lock_recency();
            scan_for_seen_markers(
                snapshot.iter(),
                &location,
                radius,
                |id| recency.contains(id),
                epoch_millis(),
            )
        };

        if scan.is_empty() {
            return ScanOutcome::NoChanges;
        }

        let newly_seen = scan.newly_seen.len();
        let queued = scan.recently_seen.len();
        if !session.commit_seen(generation, &scan.newly_seen, scan.recently_seen) {
            return ScanOutcome::Cancelled;
        }

        log::info!("proximity: {newly_seen} markers seen, {queued} queued");
        if newly_seen >= session.config().proximity.dense_area_threshold {
            session.report_message(DENSE_AREA_MESSAGE);
        }

        ScanOutcome::Updated { newly_seen, queued }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Option<LatLong>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // -----------------------------------------------------------------------
    // Location loop
    // -----------------------------------------------------------------------

    /// Consume location events until the channel closes.
    ///
    /// Each fix waits out the debounce window, then every fix that arrived
    /// meanwhile is folded into one scan at the newest position.  Errors are
    /// surfaced as advisory messages and the loop keeps going.
    pub async fn run(self: Arc<Self>, mut location_rx: mpsc::Receiver<LocationEvent>) {
        let debounce = Duration::from_millis(self.session.config().proximity.scan_debounce_ms);

        while let Some(event) = location_rx.recv().await {
            let mut location = match event {
                LocationEvent::Fix(location) => location,
                LocationEvent::Error(message) => {
                    self.session.report_message(message);
                    continue;
                }
            };

            tokio::time::sleep(debounce).await;
            loop {
                match location_rx.try_recv() {
                    Ok(LocationEvent::Fix(newer)) => location = newer,
                    Ok(LocationEvent::Error(message)) => self.session.report_message(message),
                    Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
                }
            }

            self.session.record_location(location);

            let detector = Arc::clone(&self);
            match tokio::task::spawn_blocking(move || detector.request_scan(location)).await {
                Ok(outcome) => log::debug!("proximity: scan at {location:?} → {outcome:?}"),
                Err(e) => log::warn!("proximity: scan task failed: {e}"),
            }
        }

        log::info!("proximity: location channel closed, detector shutting down");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::Marker;

    fn marker_at(id: &str, lat: f64, lon: f64) -> Marker {
        Marker {
            title: format!("title {id}"),
            position: LatLong::new(lat, lon),
            ..Marker::new(id)
        }
    }

    fn loaded_session(markers: Vec<Marker>, radius: f64) -> Arc<SessionContext> {
        let session = SessionContext::in_memory();
        for marker in markers {
            session.markers().add(marker);
        }
        session.markers().set_parse_finished(true);
        session.set_seen_radius(radius);
        session
    }

    #[test]
    fn proximity_scan_scenario() {
        let session = loaded_session(vec![marker_at("M1", 0.0, 0.001)], 1.0);
        let detector = ProximityDetector::new(Arc::clone(&session));

        let outcome = detector.request_scan(LatLong::new(0.0, 0.0));

        assert_eq!(
            outcome,
            ScanOutcome::Updated {
                newly_seen: 1,
                queued: 1
            }
        );
        assert!(session.markers().get("M1").is_some_and(|m| m.is_seen));
        let display = session.recently_seen();
        assert_eq!(display.len(), 1);
        assert_eq!(display[0].id, "M1");
    }

    #[test]
    fn second_scan_is_a_noop() {
        let session = loaded_session(vec![marker_at("M1", 0.0, 0.0)], 1.0);
        let detector = ProximityDetector::new(Arc::clone(&session));

        detector.request_scan(LatLong::new(0.0, 0.0));
        let again = detector.request_scan(LatLong::new(0.0, 0.0));

        assert_eq!(again, ScanOutcome::NoChanges);
        assert_eq!(session.recently_seen().len(), 1);
    }

    #[test]
    fn scan_deferred_until_listing_parsed() {
        let session = SessionContext::in_memory();
        session.markers().add(marker_at("M1", 0.0, 0.0));
        let detector = ProximityDetector::new(Arc::clone(&session));

        assert_eq!(
            detector.request_scan(LatLong::new(0.0, 0.0)),
            ScanOutcome::Deferred
        );
        assert!(session.markers().get("M1").is_some_and(|m| !m.is_seen));

        session.markers().set_parse_finished(true);
        assert!(matches!(
            detector.request_scan(LatLong::new(0.0, 0.0)),
            ScanOutcome::Updated { .. }
        ));
    }

    #[test]
    fn empty_marker_set_finishes_without_changes() {
        let session = loaded_session(Vec::new(), 1.0);
        let detector = ProximityDetector::new(session);

        assert_eq!(
            detector.request_scan(LatLong::new(0.0, 0.0)),
            ScanOutcome::NoChanges
        );
    }

    #[test]
    fn dense_area_raises_message() {
        let markers = (0..6).map(|i| marker_at(&format!("M{i}"), 0.0, 0.0)).collect();
        let session = loaded_session(markers, 1.0);
        let detector = ProximityDetector::new(Arc::clone(&session));
        let rx = session.messages();

        detector.request_scan(LatLong::new(0.0, 0.0));

        assert_eq!(rx.borrow().as_deref(), Some(DENSE_AREA_MESSAGE));
        assert_eq!(session.recently_seen().len(), 5);
        assert_eq!(session.all_recently_seen().len(), 6);
        assert!(session.markers().get_all().iter().all(|m| m.is_seen));
    }

    #[test]
    fn concurrent_request_is_coalesced_into_latest_location() {
        let session = loaded_session(vec![marker_at("M1", 0.0, 0.0)], 1.0);
        let detector = ProximityDetector::new(Arc::clone(&session));

        // Pretend a scan is in flight.
        detector.in_flight.store(true, Ordering::SeqCst);
        assert_eq!(
            detector.request_scan(LatLong::new(10.0, 10.0)),
            ScanOutcome::Coalesced
        );
        assert_eq!(
            detector.request_scan(LatLong::new(0.0, 0.0)),
            ScanOutcome::Coalesced
        );
        assert!(session.markers().get("M1").is_some_and(|m| !m.is_seen));

        // The in-flight scanner finishes and picks up the newest location.
        detector.in_flight.store(false, Ordering::SeqCst);
        let outcome = detector.run_pending();

        assert!(matches!(outcome, ScanOutcome::Updated { .. }));
        assert!(session.markers().get("M1").is_some_and(|m| m.is_seen));
        assert!(detector.lock_pending().is_none());
    }

    #[test]
    fn parallel_requests_do_not_corrupt_state() {
        let markers = (0..40)
            .map(|i| marker_at(&format!("M{i}"), 0.0, i as f64 * 0.0002))
            .collect();
        let session = loaded_session(markers, 1.0);
        let detector = Arc::new(ProximityDetector::new(Arc::clone(&session)));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let detector = Arc::clone(&detector);
                scope.spawn(move || {
                    for _ in 0..10 {
                        detector.request_scan(LatLong::new(0.0, 0.0));
                    }
                });
            }
        });
        // Any location deposited by a losing racer has been scanned.
        detector.request_scan(LatLong::new(0.0, 0.0));

        assert!(session.markers().get_all().iter().all(|m| m.is_seen));
        assert_eq!(session.all_recently_seen().len(), 40);
        assert_eq!(session.recently_seen().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn location_loop_coalesces_and_reports_errors() {
        let mut config = crate::config::AppConfig::default();
        config.ui.message_clear_secs = 3600;
        let session = SessionContext::new(config, crate::session::SessionSettings::in_memory());
        session.markers().add(marker_at("M1", 0.0, 0.0));
        session.markers().set_parse_finished(true);
        session.set_seen_radius(1.0);
        let detector = Arc::new(ProximityDetector::new(Arc::clone(&session)));
        let messages = session.messages();

        let (tx, rx) = mpsc::channel(8);
        tx.send(LocationEvent::Fix(LatLong::new(10.0, 10.0)))
            .await
            .unwrap();
        tx.send(LocationEvent::Error("Unable to get current location".into()))
            .await
            .unwrap();
        tx.send(LocationEvent::Fix(LatLong::new(0.0, 0.0)))
            .await
            .unwrap();
        drop(tx);

        detector.run(rx).await;

        assert!(session.markers().get("M1").is_some_and(|m| m.is_seen));
        assert_eq!(session.last_known_location(), Some(LatLong::new(0.0, 0.0)));
        assert_eq!(
            messages.borrow().as_deref(),
            Some("Unable to get current location")
        );
    }
}
