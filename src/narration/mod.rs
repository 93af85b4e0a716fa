//! Chunked, interruptible narration of recently seen markers.
//!
//! # Architecture
//!
//! ```text
//! NarrationCommand (mpsc) ──┐
//! SpeechEvent (mpsc) ───────┼─▶ NarrationRunner::run()  ← async tokio task
//! poll interval ────────────┤        │
//! cache reset (watch) ──────┘        ▼
//!                               Narrator (state machine)
//!                                    │ speak / stop
//!                                    ▼
//!                               TextToSpeech
//!
//! NarrationStatus (watch) ◀── published after every transition
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use marker_narrator::narration::{NarrationCommand, NarrationRunner};
//! use marker_narrator::session::SessionContext;
//! use marker_narrator::speech::LogSpeech;
//!
//! #[tokio::main]
//! async fn main() {
//!     let session = SessionContext::in_memory();
//!     let (speech_tx, speech_rx) = mpsc::unbounded_channel();
//!     let runner = NarrationRunner::new(session, Arc::new(LogSpeech::new(speech_tx)));
//!
//!     let (command_tx, command_rx) = mpsc::channel(16);
//!     tokio::spawn(runner.run(command_rx, speech_rx));
//!
//!     command_tx.send(NarrationCommand::Start).await.unwrap();
//! }
//! ```

pub mod narrator;
pub mod runner;
pub mod state;

pub use narrator::Narrator;
pub use runner::{NarrationCommand, NarrationRunner};
pub use state::{NarrationMode, NarrationState, NarrationStatus};
