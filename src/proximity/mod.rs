//! Proximity ("seen") detection.
//!
//! * [`scan_for_seen_markers`]: pure function: which unseen markers are
//!   strictly inside the seen radius.
//! * [`ProximityDetector`]: applies scans to the session (single-flight,
//!   parse-gated, reset-aware) and runs the debounced location loop.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use marker_narrator::location::LocationEvent;
//! use marker_narrator::markers::LatLong;
//! use marker_narrator::proximity::ProximityDetector;
//! use marker_narrator::session::SessionContext;
//!
//! #[tokio::main]
//! async fn main() {
//!     let session = SessionContext::in_memory();
//!     let detector = Arc::new(ProximityDetector::new(Arc::clone(&session)));
//!
//!     let (location_tx, location_rx) = mpsc::channel(16);
//!     tokio::spawn(Arc::clone(&detector).run(location_rx));
//!
//!     location_tx
//!         .send(LocationEvent::Fix(LatLong::new(37.33, -121.89)))
//!         .await
//!         .unwrap();
//! }
//! ```

pub mod detector;
pub mod scanner;

pub use detector::{ProximityDetector, ScanOutcome, DENSE_AREA_MESSAGE};
pub use scanner::{epoch_millis, scan_for_seen_markers, SeenScan};
