//! Narration state machine types and the published status snapshot.

use crate::markers::{Marker, RecentlySeenMarker};

// ---------------------------------------------------------------------------
// NarrationMode
// ---------------------------------------------------------------------------

/// What gets read aloud for a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NarrationMode {
    /// Title only; marks the marker announced.
    #[default]
    Announce,
    /// Title and inscription; marks the marker spoken and announced.
    Details,
}

impl NarrationMode {
    /// `true` once `marker` has been narrated in this mode.
    pub fn is_done(&self, marker: &Marker) -> bool {
        match self {
            NarrationMode::Announce => marker.is_announced,
            NarrationMode::Details => marker.is_spoken,
        }
    }

    /// The text to read aloud for `marker`.
    ///
    /// ```
    /// use marker_narrator::markers::Marker;
    /// use marker_narrator::narration::NarrationMode;
    ///
    /// let marker = Marker {
    ///     title: "Old Mill".into(),
    ///     inscription: "Built in 1852.".into(),
    ///     ..Marker::new("M1")
    /// };
    /// assert_eq!(NarrationMode::Announce.text_for(&marker), "Old Mill");
    /// assert_eq!(NarrationMode::Details.text_for(&marker), "Old Mill. Built in 1852.");
    /// ```
    pub fn text_for(&self, marker: &Marker) -> String {
        let title = marker.title.trim();
        let inscription = marker.narration_inscription().trim();
        match self {
            NarrationMode::Details if !inscription.is_empty() => {
                format!("{title}. {inscription}")
            }
            _ => title.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// NarrationState
// ---------------------------------------------------------------------------

/// States of the narration engine.
///
/// ```text
/// Idle ──start──▶ Speaking ──pause──▶ Paused ──resume──▶ Speaking
///                  │  ▲                  │
///                  │  └─ Started(chunk) queues the next chunk
///                  └──── final Done / stop / error ──▶ Idle ◀── stop
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub enum NarrationState {
    #[default]
    Idle,

    /// Chunks are queued on the speech engine; `remaining_text` has not been
    /// handed over yet.
    Speaking {
        marker: RecentlySeenMarker,
        remaining_text: String,
    },

    /// Speech stopped mid-text; resumes at word `resume_index`.
    Paused {
        marker: RecentlySeenMarker,
        resume_index: usize,
    },
}

impl NarrationState {
    pub fn is_idle(&self) -> bool {
        matches!(self, NarrationState::Idle)
    }

    pub fn marker(&self) -> Option<&RecentlySeenMarker> {
        match self {
            NarrationState::Idle => None,
            NarrationState::Speaking { marker, .. } | NarrationState::Paused { marker, .. } => {
                Some(marker)
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NarrationState::Idle => "Idle",
            NarrationState::Speaking { .. } => "Speaking",
            NarrationState::Paused { .. } => "Paused",
        }
    }
}

// ---------------------------------------------------------------------------
// NarrationStatus
// ---------------------------------------------------------------------------

/// Snapshot published to observers after every transition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NarrationStatus {
    pub state: NarrationState,
    pub is_speaking: bool,
    pub active_marker: Option<RecentlySeenMarker>,
    /// Most recent speech failure; cleared when narration starts again.
    pub last_error: Option<String>,
}

impl NarrationStatus {
    pub(crate) fn from_state(state: &NarrationState, last_error: Option<String>) -> Self {
        Self {
            state: state.clone(),
            is_speaking: matches!(state, NarrationState::Speaking { .. }),
            active_marker: state.marker().cloned(),
            last_error,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> RecentlySeenMarker {
        RecentlySeenMarker::new("M1", "Old Mill", 0)
    }

    #[test]
    fn mode_flags() {
        let mut marker = Marker::new("M1");
        marker.is_announced = true;

        assert!(NarrationMode::Announce.is_done(&marker));
        assert!(!NarrationMode::Details.is_done(&marker));

        marker.is_spoken = true;
        assert!(NarrationMode::Details.is_done(&marker));
    }

    #[test]
    fn details_text_falls_back_to_title() {
        let marker = Marker {
            title: "Old Mill".into(),
            ..Marker::new("M1")
        };
        assert_eq!(NarrationMode::Details.text_for(&marker), "Old Mill");
    }

    #[test]
    fn details_text_prefers_english_inscription() {
        let marker = Marker {
            title: "Molino".into(),
            inscription: "Construido en 1852.".into(),
            english_inscription: "Built in 1852.".into(),
            ..Marker::new("M1")
        };
        assert_eq!(NarrationMode::Details.text_for(&marker), "Molino. Built in 1852.");
    }

    #[test]
    fn state_marker_and_label() {
        assert_eq!(NarrationState::Idle.marker(), None);
        assert_eq!(NarrationState::Idle.label(), "Idle");

        let paused = NarrationState::Paused {
            marker: entry(),
            resume_index: 10,
        };
        assert_eq!(paused.marker(), Some(&entry()));
        assert_eq!(paused.label(), "Paused");
        assert!(!paused.is_idle());
    }

    #[test]
    fn status_reports_speaking_only_while_speaking() {
        let speaking = NarrationState::Speaking {
            marker: entry(),
            remaining_text: String::new(),
        };
        let status = NarrationStatus::from_state(&speaking, None);
        assert!(status.is_speaking);
        assert_eq!(status.active_marker, Some(entry()));

        let paused = NarrationState::Paused {
            marker: entry(),
            resume_index: 0,
        };
        assert!(!NarrationStatus::from_state(&paused, None).is_speaking);
    }

    #[test]
    fn default_status_is_idle() {
        let status = NarrationStatus::default();
        assert!(status.state.is_idle());
        assert!(!status.is_speaking);
        assert!(status.last_error.is_none());
    }
}
