//! Narration task: polls for markers to narrate and applies UI commands and
//! speech events to the [`Narrator`].
//!
//! # Loop
//!
//! ```text
//! interval tick ─────▶ poll: enabled, idle, engine silent, display non-empty?
//!                       └─▶ next candidate ─▶ (details mode) load details ─▶ start
//! NarrationCommand ──▶ start / stop / pause / resume / skip / toggles
//! SpeechEvent ───────▶ Narrator::handle_event
//! cache reset ───────▶ Narrator::cancel
//! ```
//!
//! The loop ends when the command channel closes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::details::MarkerDetailsLoader;
use crate::markers::Marker;
use crate::session::SessionContext;
use crate::speech::{SpeechEventReceiver, TextToSpeech};

use super::narrator::Narrator;
use super::state::{NarrationMode, NarrationStatus};

/// Requests from the user interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrationCommand {
    /// Narrate the next candidate now.
    Start,
    Stop,
    Pause,
    Resume,
    SkipToNext,
    /// Toggle automatic narration of newly seen markers.
    SetEnabled(bool),
    /// Toggle reading the inscription instead of only the title.
    SetDetailsEnabled(bool),
}

pub struct NarrationRunner {
    session: Arc<SessionContext>,
    narrator: Narrator,
    details: Option<Arc<dyn MarkerDetailsLoader>>,
}

impl NarrationRunner {
    /// Create a runner and apply the configured speech settings to `tts`.
    pub fn new(session: Arc<SessionContext>, tts: Arc<dyn TextToSpeech>) -> Self {
        if let Err(e) = tts.configure(&session.config().speech) {
            log::warn!("narration: speech settings not applied: {e}");
        }
        let narrator = Narrator::new(Arc::clone(&session), tts);
        Self {
            session,
            narrator,
            details: None,
        }
    }

    /// Load missing details through `loader` before a detailed narration.
    pub fn with_details_loader(mut self, loader: Arc<dyn MarkerDetailsLoader>) -> Self {
        self.details = Some(loader);
        self
    }

    pub fn status(&self) -> watch::Receiver<NarrationStatus> {
        self.narrator.subscribe()
    }

    pub fn narrator(&self) -> &Narrator {
        &self.narrator
    }

    /// Run until `commands` closes.  Should be spawned as a tokio task.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<NarrationCommand>,
        mut speech_events: SpeechEventReceiver,
    ) {
        let period = Duration::from_millis(self.session.config().narration.poll_interval_ms.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut resets = self.session.subscribe_resets();

        log::info!("narration: runner started (poll every {period:?})");
        loop {
            tokio::select! {
                _ = ticker.tick() => self.poll().await,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(event) = speech_events.recv() => self.narrator.handle_event(event),
                Ok(()) = resets.changed() => self.narrator.cancel(),
            }
        }

        self.narrator.cancel();
        log::info!("narration: command channel closed, runner shutting down");
    }

    /// Start automatic narration if it is enabled and nothing is playing.
    pub async fn poll(&mut self) {
        if !self.session.is_speak_when_found_enabled()
            || !self.narrator.state().is_idle()
            || self.narrator.is_engine_speaking()
            || self.session.recently_seen().is_empty()
        {
            return;
        }
        self.start_next().await;
    }

    pub async fn handle_command(&mut self, command: NarrationCommand) {
        log::debug!("narration: command {command:?}");
        match command {
            NarrationCommand::Start => {
                self.start_next().await;
            }
            NarrationCommand::Stop => {
                self.narrator.stop();
            }
            NarrationCommand::Pause => {
                self.narrator.pause();
            }
            NarrationCommand::Resume => {
                self.narrator.resume();
            }
            NarrationCommand::SkipToNext => {
                self.narrator.stop();
                self.start_next().await;
            }
            NarrationCommand::SetEnabled(enabled) => {
                self.session.set_speak_when_found_enabled(enabled);
                if !enabled {
                    self.narrator.stop();
                }
            }
            NarrationCommand::SetDetailsEnabled(enabled) => {
                self.session.set_speak_details_enabled(enabled);
            }
        }
    }

    fn mode(&self) -> NarrationMode {
        if self.session.is_speak_details_enabled() {
            NarrationMode::Details
        } else {
            NarrationMode::Announce
        }
    }

    /// Narrate the next candidate.  Returns `false` when there is none.
    async fn start_next(&mut self) -> bool {
        let mode = self.mode();
        let Some(marker) = self.narrator.next_candidate(mode) else {
            log::debug!("narration: nothing left to narrate");
            return false;
        };

        let marker = match mode {
            NarrationMode::Details => match self.with_details(marker).await {
                Some(marker) => marker,
                None => return false,
            },
            NarrationMode::Announce => marker,
        };

        self.narrator.start(&marker, mode);
        true
    }

    /// `marker` with its details loaded, or `None` when the cache was reset
    /// while loading.  A loader failure is reported and the marker is
    /// returned as-is, so only the title is read.
    async fn with_details(&self, marker: Marker) -> Option<Marker> {
        let Some(loader) = self.details.as_ref() else {
            return Some(marker);
        };
        if marker.is_details_loaded {
            return Some(marker);
        }

        let generation = self.session.reset_generation();
        let loaded = loader.load_details(&marker).await;
        if self.session.reset_generation() != generation {
            log::debug!("narration: dropping details of {} after cache reset", marker.id);
            return None;
        }

        match loaded {
            Ok(details) => {
                let markers = self.session.markers();
                markers.upsert_details(&details);
                Some(markers.get(&marker.id).unwrap_or(marker))
            }
            Err(e) => {
                self.session
                    .report_message(format!("Unable to load details for {}: {e}", marker.title));
                Some(marker)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
