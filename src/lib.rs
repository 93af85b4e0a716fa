//! Proximity-triggered narration of historical markers.
//!
//! Location fixes flow into the [`proximity`] detector, which flags markers
//! within the seen radius and queues them in the [`recency`] queue; the
//! [`narration`] engine reads the most recent unnarrated marker aloud through
//! a [`speech`] backend.  Everything shares one [`session::SessionContext`].

pub mod config;
pub mod details;
pub mod geo;
pub mod location;
pub mod markers;
pub mod narration;
pub mod proximity;
pub mod recency;
pub mod session;
pub mod speech;
