//! Text-to-speech backend trait and implementations.
//!
//! # Overview
//!
//! [`TextToSpeech`] is the interface the narration engine drives.  It is
//! object-safe and `Send + Sync` so it can be held behind an
//! `Arc<dyn TextToSpeech>`.  Lifecycle callbacks from the platform arrive as
//! [`SpeechEvent`]s on an unbounded `tokio::sync::mpsc` channel, because
//! platform callbacks fire on threads that must not block.
//!
//! [`LogSpeech`] is a headless backend that writes every utterance to the log
//! and reports it as started and finished straight away.
//!
//! [`MockSpeech`] (available under `#[cfg(test)]`) records every call and
//! lets tests decide which lifecycle events to deliver.

use std::sync::Mutex;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::SpeechConfig;

// ---------------------------------------------------------------------------
// SpeechError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpeechError {
    /// The platform engine has not finished initialising.
    #[error("speech engine is not ready")]
    NotReady,

    /// The platform engine refused the utterance.
    #[error("speech engine rejected utterance {utterance_id}: {reason}")]
    Rejected { utterance_id: String, reason: String },

    /// The platform reported a failure while speaking.
    #[error("speech failed for utterance {0}")]
    Playback(String),
}

// ---------------------------------------------------------------------------
// SpeechEvent
// ---------------------------------------------------------------------------

/// Lifecycle callbacks reported by the platform engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    Started(String),
    Done(String),
    Error(String),
}

pub type SpeechEventSender = mpsc::UnboundedSender<SpeechEvent>;
pub type SpeechEventReceiver = mpsc::UnboundedReceiver<SpeechEvent>;

// ---------------------------------------------------------------------------
// TextToSpeech trait
// ---------------------------------------------------------------------------

/// Platform text-to-speech engine.
///
/// # Contract
///
/// - `speak` queues `text` behind anything already queued and returns
///   immediately; progress is reported through [`SpeechEvent`]s tagged with
///   `utterance_id`.
/// - `stop` drops everything queued and silences the current utterance.
pub trait TextToSpeech: Send + Sync {
    fn speak(&self, text: &str, utterance_id: &str) -> Result<(), SpeechError>;

    fn stop(&self);

    fn is_speaking(&self) -> bool;

    /// Apply rate, audio usage and language.  Backends without such knobs
    /// accept anything.
    fn configure(&self, _config: &SpeechConfig) -> Result<(), SpeechError> {
        Ok(())
    }
}

// Compile-time assertion: Box<dyn TextToSpeech> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn TextToSpeech>) {}
};

// ---------------------------------------------------------------------------
// LogSpeech
// ---------------------------------------------------------------------------

/// Headless backend: logs each utterance and reports it started and done.
pub struct LogSpeech {
    events: SpeechEventSender,
    config: Mutex<SpeechConfig>,
}

impl LogSpeech {
    pub fn new(events: SpeechEventSender) -> Self {
        Self {
            events,
            config: Mutex::new(SpeechConfig::default()),
        }
    }
}

impl TextToSpeech for LogSpeech {
    fn speak(&self, text: &str, utterance_id: &str) -> Result<(), SpeechError> {
        let rate = self.config.lock().map(|c| c.rate).unwrap_or(1.0);
        log::info!("speech [{utterance_id} @ {rate}x]: {text}");

        // The receiver only goes away at shutdown.
        let _ = self.events.send(SpeechEvent::Started(utterance_id.to_string()));
        let _ = self.events.send(SpeechEvent::Done(utterance_id.to_string()));
        Ok(())
    }

    fn stop(&self) {
        log::debug!("speech: stop");
    }

    fn is_speaking(&self) -> bool {
        false
    }

    fn configure(&self, config: &SpeechConfig) -> Result<(), SpeechError> {
        log::info!(
            "speech: rate {}x, usage {:?}, language {}",
            config.rate,
            config.usage,
            config.language
        );
        if let Ok(mut current) = self.config.lock() {
            *current = config.clone();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockSpeech  (test-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use mock::MockSpeech;


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
