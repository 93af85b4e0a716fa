//! The chunked, interruptible narration state machine.
//!
//! [`Narrator`] is synchronous: it reacts to calls from
//! [`NarrationRunner`](super::NarrationRunner) and to [`SpeechEvent`]s, drives
//! the [`TextToSpeech`] engine, and publishes a [`NarrationStatus`] after
//! every transition.
//!
//! Every narration gets a fresh utterance-id prefix (`<marker id>#<seq>.`),
//! renewed again on pause, so lifecycle events that arrive late for speech
//! that was already stopped are ignored.

use std::sync::Arc;

use tokio::sync::watch;

use crate::markers::{Marker, RecentlySeenMarker};
use crate::proximity::epoch_millis;
use crate::session::SessionContext;
use crate::speech::{SpeechChunker, SpeechError, SpeechEvent, TextToSpeech};

use super::state::{NarrationMode, NarrationState, NarrationStatus};

/// The text currently being narrated.
struct Utterance {
    marker: RecentlySeenMarker,
    mode: NarrationMode,
    chunker: SpeechChunker,
    id_prefix: String,
    /// Id of the chunk most recently handed to the engine.
    last_queued: Option<String>,
}

impl Utterance {
    fn owns(&self, utterance_id: &str) -> bool {
        utterance_id.starts_with(&self.id_prefix)
    }

    fn is_last_queued(&self, utterance_id: &str) -> bool {
        self.last_queued.as_deref() == Some(utterance_id)
    }
}

pub struct Narrator {
    session: Arc<SessionContext>,
    tts: Arc<dyn TextToSpeech>,
    state: NarrationState,
    current: Option<Utterance>,
    last_error: Option<String>,
    seq: u64,
    status_tx: watch::Sender<NarrationStatus>,
}

impl Narrator {
    pub fn new(session: Arc<SessionContext>, tts: Arc<dyn TextToSpeech>) -> Self {
        let (status_tx, _) = watch::channel(NarrationStatus::default());
        Self {
            session,
            tts,
            state: NarrationState::Idle,
            current: None,
            last_error: None,
            seq: 0,
            status_tx,
        }
    }

    pub fn state(&self) -> &NarrationState {
        &self.state
    }

    pub fn status(&self) -> NarrationStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<NarrationStatus> {
        self.status_tx.subscribe()
    }

    /// Whether the platform engine is still producing audio.
    pub fn is_engine_speaking(&self) -> bool {
        self.tts.is_speaking()
    }

    /// The first display-list entry (most recent first) that is still in the
    /// store and has not been narrated in `mode`.
    pub fn next_candidate(&self, mode: NarrationMode) -> Option<Marker> {
        let snapshot = self.session.markers().snapshot();
        self.session
            .recently_seen()
            .iter()
            .find_map(|entry| {
                snapshot
                    .get(&entry.id)
                    .filter(|marker| !mode.is_done(marker))
                    .cloned()
            })
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Narrate `marker`, stopping whatever is playing first.
    pub fn start(&mut self, marker: &Marker, mode: NarrationMode) {
        self.stop();
        self.last_error = None;

        let narration = &self.session.config().narration;
        let text = mode.text_for(marker);
        let chunker = SpeechChunker::new(
            &text,
            narration.words_per_chunk.max(1),
            narration.max_chunk_chars.max(1),
        );
        log::info!(
            "narration: {mode:?} {} ({} words)",
            marker.id,
            chunker.total_words()
        );

        self.current = Some(Utterance {
            marker: RecentlySeenMarker::new(marker.id.clone(), marker.title.clone(), epoch_millis()),
            mode,
            chunker,
            id_prefix: String::new(),
            last_queued: None,
        });
        self.renew_prefix();
        self.speak_or_finish();
    }

    /// Pause mid-text.  Returns `false` unless narration was speaking.
    pub fn pause(&mut self) -> bool {
        if !matches!(self.state, NarrationState::Speaking { .. }) {
            return false;
        }
        let Some(utterance) = self.current.as_mut() else {
            return false;
        };
        self.tts.stop();

        let resume_index = utterance.chunker.resume_index();
        let marker = utterance.marker.clone();
        utterance.last_queued = None;
        self.renew_prefix();

        log::debug!("narration: paused {} at word {resume_index}", marker.id);
        self.state = NarrationState::Paused {
            marker,
            resume_index,
        };
        self.publish();
        true
    }

    /// Continue a paused narration.  Returns `false` unless paused.
    pub fn resume(&mut self) -> bool {
        let NarrationState::Paused { resume_index, .. } = self.state else {
            return false;
        };
        let Some(utterance) = self.current.as_mut() else {
            return false;
        };
        utterance.chunker.seek(resume_index);
        log::debug!("narration: resuming {} at word {resume_index}", utterance.marker.id);
        self.speak_or_finish();
        true
    }

    /// Stop and mark the marker narrated.  Returns `false` when idle.
    pub fn stop(&mut self) -> bool {
        if self.current.is_none() {
            return false;
        }
        self.tts.stop();
        self.finish();
        true
    }

    /// Drop the current narration without touching any flag.  Used when the
    /// marker cache is reset underneath it.
    pub fn cancel(&mut self) {
        if self.current.take().is_some() {
            self.tts.stop();
            log::info!("narration: cancelled by cache reset");
        }
        self.state = NarrationState::Idle;
        self.publish();
    }

    /// Apply a lifecycle event from the speech engine.
    pub fn handle_event(&mut self, event: SpeechEvent) {
        if !matches!(self.state, NarrationState::Speaking { .. }) {
            log::debug!("narration: ignoring {event:?} while {}", self.state.label());
            return;
        }
        let Some(utterance) = self.current.as_ref() else {
            return;
        };

        match event {
            SpeechEvent::Started(id) if utterance.is_last_queued(&id) => {
                if let Err(e) = self.speak_next_chunk() {
                    self.fail(e);
                }
            }
            SpeechEvent::Done(id)
                if utterance.is_last_queued(&id) && !utterance.chunker.has_remaining() =>
            {
                self.finish();
            }
            SpeechEvent::Error(id) if utterance.owns(&id) => {
                self.fail(SpeechError::Playback(id));
            }
            other => log::trace!("narration: ignoring {other:?}"),
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn renew_prefix(&mut self) {
        self.seq += 1;
        if let Some(utterance) = self.current.as_mut() {
            utterance.id_prefix = format!("{}#{}.", utterance.marker.id, self.seq);
        }
    }

    fn speak_or_finish(&mut self) {
        match self.speak_next_chunk() {
            Ok(true) => {}
            Ok(false) => self.finish(),
            Err(e) => self.fail(e),
        }
    }

    /// Hand the next chunk to the engine.  `Ok(false)` when the text is
    /// exhausted.
    fn speak_next_chunk(&mut self) -> Result<bool, SpeechError> {
        let Some(utterance) = self.current.as_mut() else {
            return Ok(false);
        };
        let Some(chunk) = utterance.chunker.next_chunk() else {
            return Ok(false);
        };

        let id = format!("{}{}", utterance.id_prefix, utterance.chunker.last_chunk_start());
        self.tts.speak(&chunk, &id)?;
        log::debug!("narration: queued {id}");
        utterance.last_queued = Some(id);

        let marker = utterance.marker.clone();
        let remaining_text = utterance.chunker.remaining_text();
        self.state = NarrationState::Speaking {
            marker,
            remaining_text,
        };
        self.publish();
        Ok(true)
    }

    /// Set the mode's flags, remember the marker and go idle.
    fn finish(&mut self) {
        let Some(utterance) = self.current.take() else {
            return;
        };

        let markers = self.session.markers();
        match utterance.mode {
            NarrationMode::Announce => markers.update_is_announced(&utterance.marker, true),
            NarrationMode::Details => {
                markers.update_is_spoken(&utterance.marker, true);
                markers.update_is_announced(&utterance.marker, true);
            }
        }
        if let Err(e) = self.session.settings().set_last_spoken_marker(&utterance.marker) {
            self.session
                .report_message(format!("Unable to save settings: {e}"));
        }

        log::info!("narration: finished {}", utterance.marker.id);
        self.state = NarrationState::Idle;
        self.publish();
    }

    fn fail(&mut self, error: SpeechError) {
        log::warn!("narration: {error}");
        self.tts.stop();
        self.current = None;
        self.last_error = Some(error.to_string());
        self.state = NarrationState::Idle;
        self.publish();
    }

    fn publish(&self) {
        self.status_tx
            .send_replace(NarrationStatus::from_state(&self.state, self.last_error.clone()));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::MockSpeech;

    fn words(range: std::ops::RangeInclusive<usize>) -> String {
        range.map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    /// A session whose display list holds `markers`, the last one newest.
    fn session_with_seen(markers: Vec<Marker>) -> Arc<SessionContext> {
        let session = SessionContext::in_memory();
        for marker in &markers {
            session.markers().add(marker.clone());
        }
        let entries = markers
            .iter()
            .enumerate()
            .map(|(i, m)| RecentlySeenMarker::new(m.id.clone(), m.title.clone(), i as i64 + 1))
            .collect();
        assert!(session.commit_seen(session.reset_generation(), &markers, entries));
        session
    }

    fn titled(id: &str, title: &str) -> Marker {
        Marker {
            title: title.into(),
            ..Marker::new(id)
        }
    }

    fn with_inscription(id: &str, inscription: String) -> Marker {
        Marker {
            title: "Title".into(),
            inscription,
            is_details_loaded: true,
            ..Marker::new(id)
        }
    }

    fn narrator(session: &Arc<SessionContext>) -> (Narrator, Arc<MockSpeech>) {
        let tts = Arc::new(MockSpeech::new());
        let narrator = Narrator::new(Arc::clone(session), tts.clone());
        (narrator, tts)
    }

    /// Deliver `Started` for the last queued chunk until nothing new is
    /// queued, then `Done` for the final chunk.
    fn play_to_end(narrator: &mut Narrator, tts: &MockSpeech) {
        loop {
            let id = tts.last_utterance_id().expect("something queued");
            narrator.handle_event(SpeechEvent::Started(id.clone()));
            if tts.last_utterance_id().as_deref() == Some(id.as_str()) {
                narrator.handle_event(SpeechEvent::Done(id));
                break;
            }
        }
    }

    #[test]
    fn chunked_narration_marks_marker_spoken() {
        // "Title." plus 24 inscription words is 25 words: chunks of 10, 10, 5.
        let marker = with_inscription("M1", words(1..=24));
        let session = session_with_seen(vec![marker.clone()]);
        let (mut narrator, tts) = narrator(&session);

        narrator.start(&marker, NarrationMode::Details);
        assert_eq!(tts.texts().len(), 1);
        assert!(narrator.status().is_speaking);

        play_to_end(&mut narrator, &tts);

        let counts: Vec<usize> = tts.texts().iter().map(|t| t.split(' ').count()).collect();
        assert_eq!(counts, vec![10, 10, 5]);
        assert!(narrator.state().is_idle());

        let stored = session.markers().get("M1").expect("marker");
        assert!(stored.is_spoken);
        assert!(stored.is_announced);
        assert_eq!(
            session.settings().last_spoken_marker().map(|m| m.id),
            Some("M1".to_string())
        );
    }

    #[test]
    fn done_for_earlier_chunk_does_not_finish() {
        let marker = with_inscription("M1", words(1..=24));
        let session = session_with_seen(vec![marker.clone()]);
        let (mut narrator, tts) = narrator(&session);

        narrator.start(&marker, NarrationMode::Details);
        let first = tts.last_utterance_id().expect("queued");
        narrator.handle_event(SpeechEvent::Started(first.clone()));
        narrator.handle_event(SpeechEvent::Done(first));

        assert!(matches!(narrator.state(), NarrationState::Speaking { .. }));
        assert!(!session.markers().get("M1").expect("marker").is_spoken);
    }

    #[test]
    fn announce_sets_only_announced() {
        let marker = titled("M1", "Old Mill");
        let session = session_with_seen(vec![marker.clone()]);
        let (mut narrator, tts) = narrator(&session);

        narrator.start(&marker, NarrationMode::Announce);
        play_to_end(&mut narrator, &tts);

        assert_eq!(tts.texts(), vec!["Old Mill".to_string()]);
        let stored = session.markers().get("M1").expect("marker");
        assert!(stored.is_announced);
        assert!(!stored.is_spoken);
    }

    #[test]
    fn pause_steps_back_one_chunk_and_resume_continues() {
        // 40 words in total.
        let marker = with_inscription("M1", words(2..=40));
        let session = session_with_seen(vec![marker.clone()]);
        let (mut narrator, tts) = narrator(&session);

        narrator.start(&marker, NarrationMode::Details);
        for _ in 0..2 {
            let id = tts.last_utterance_id().expect("queued");
            narrator.handle_event(SpeechEvent::Started(id));
        }
        // Third chunk (words 20..30) is the last one queued.
        assert!(narrator.pause());
        assert_eq!(
            narrator.state(),
            &NarrationState::Paused {
                marker: narrator.status().active_marker.expect("active"),
                resume_index: 10,
            }
        );
        assert_eq!(tts.stop_count(), 1);

        assert!(narrator.resume());
        assert_eq!(tts.texts().last().map(String::as_str), Some(words(11..=20).as_str()));
        assert!(narrator.status().is_speaking);
    }

    #[test]
    fn events_for_paused_speech_are_ignored() {
        let marker = with_inscription("M1", words(1..=24));
        let session = session_with_seen(vec![marker.clone()]);
        let (mut narrator, tts) = narrator(&session);

        narrator.start(&marker, NarrationMode::Details);
        let stale = tts.last_utterance_id().expect("queued");
        narrator.pause();
        narrator.resume();

        let queued = tts.texts().len();
        narrator.handle_event(SpeechEvent::Started(stale.clone()));
        narrator.handle_event(SpeechEvent::Error(stale));

        assert_eq!(tts.texts().len(), queued);
        assert!(narrator.status().is_speaking);
    }

    #[test]
    fn stop_marks_narrated_and_goes_idle() {
        let marker = with_inscription("M1", words(1..=30));
        let session = session_with_seen(vec![marker.clone()]);
        let (mut narrator, tts) = narrator(&session);

        narrator.start(&marker, NarrationMode::Details);
        assert!(narrator.stop());

        assert!(narrator.state().is_idle());
        assert!(session.markers().get("M1").expect("marker").is_spoken);
        assert_eq!(tts.stop_count(), 1);
        assert!(!narrator.stop());
    }

    #[test]
    fn starting_another_marker_stops_the_current_one() {
        let first = titled("M1", "First");
        let second = titled("M2", "Second");
        let session = session_with_seen(vec![first.clone(), second.clone()]);
        let (mut narrator, tts) = narrator(&session);

        narrator.start(&first, NarrationMode::Announce);
        narrator.start(&second, NarrationMode::Announce);

        assert_eq!(tts.stop_count(), 1);
        assert_eq!(narrator.status().active_marker.map(|m| m.id), Some("M2".into()));
    }

    #[test]
    fn candidate_is_most_recent_unnarrated_marker() {
        let session = session_with_seen(vec![titled("M1", "First"), titled("M2", "Second")]);
        let (mut narrator, tts) = narrator(&session);

        let first = narrator.next_candidate(NarrationMode::Announce).expect("candidate");
        assert_eq!(first.id, "M2");

        // Skip: stop the current marker, then pick the next one.
        narrator.start(&first, NarrationMode::Announce);
        narrator.stop();
        let next = narrator.next_candidate(NarrationMode::Announce).expect("candidate");
        assert_eq!(next.id, "M1");

        narrator.start(&next, NarrationMode::Announce);
        play_to_end(&mut narrator, &tts);
        assert_eq!(narrator.next_candidate(NarrationMode::Announce), None);
        assert!(narrator.next_candidate(NarrationMode::Details).is_some());
    }

    #[test]
    fn candidates_missing_from_store_are_skipped() {
        let session = session_with_seen(vec![titled("M1", "First"), titled("M2", "Second")]);
        session.markers().remove("M2");
        let (narrator, _tts) = narrator(&session);

        let candidate = narrator.next_candidate(NarrationMode::Announce).expect("candidate");
        assert_eq!(candidate.id, "M1");
    }

    #[test]
    fn speak_failure_reports_error_without_flags() {
        let marker = titled("M1", "Old Mill");
        let session = session_with_seen(vec![marker.clone()]);
        let (mut narrator, tts) = narrator(&session);
        tts.fail_speak(true);

        narrator.start(&marker, NarrationMode::Announce);

        let status = narrator.status();
        assert!(status.state.is_idle());
        assert!(status.last_error.is_some());
        assert!(!session.markers().get("M1").expect("marker").is_announced);

        // Still unnarrated, so it stays the candidate for the next attempt.
        let candidate = narrator.next_candidate(NarrationMode::Announce).expect("candidate");
        assert_eq!(candidate.id, "M1");
    }

    #[test]
    fn playback_error_event_goes_idle() {
        let marker = titled("M1", "Old Mill");
        let session = session_with_seen(vec![marker.clone()]);
        let (mut narrator, tts) = narrator(&session);

        narrator.start(&marker, NarrationMode::Announce);
        let id = tts.last_utterance_id().expect("queued");
        narrator.handle_event(SpeechEvent::Error(id));

        assert!(narrator.state().is_idle());
        assert!(narrator.status().last_error.is_some());
        assert!(!session.markers().get("M1").expect("marker").is_announced);
    }

    #[test]
    fn empty_text_finishes_immediately() {
        let marker = Marker::new("M1");
        let session = session_with_seen(vec![marker.clone()]);
        let (mut narrator, tts) = narrator(&session);

        narrator.start(&marker, NarrationMode::Announce);

        assert!(tts.texts().is_empty());
        assert!(narrator.state().is_idle());
        assert!(session.markers().get("M1").expect("marker").is_announced);
    }

    #[test]
    fn cancel_leaves_flags_alone() {
        let marker = titled("M1", "Old Mill");
        let session = session_with_seen(vec![marker.clone()]);
        let (mut narrator, tts) = narrator(&session);

        narrator.start(&marker, NarrationMode::Announce);
        narrator.cancel();

        assert!(narrator.state().is_idle());
        assert_eq!(tts.stop_count(), 1);
        assert!(!session.markers().get("M1").expect("marker").is_announced);
    }
}
