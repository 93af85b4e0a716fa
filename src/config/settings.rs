//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.
//!
//! These are the static tunables of the app.  Values the user changes while
//! the app runs (seen radius, narration toggles, recently-seen lists) live in
//! the session settings store instead, see [`crate::session::SessionSettings`].

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// ProximityConfig
// ---------------------------------------------------------------------------

/// Settings for the "seen" scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProximityConfig {
    /// Radius in miles inside which a marker counts as seen.  Used until the
    /// user picks a different radius (persisted in the session settings).
    pub seen_radius_miles: f64,
    /// Quiet window after a location fix before a scan runs, so bursts of GPS
    /// updates collapse into one scan.
    pub scan_debounce_ms: u64,
    /// Distance the user may travel from the location the marker listing was
    /// last loaded for before a reload is due.
    pub max_reload_radius_miles: f64,
    /// A single scan that marks at least this many markers as seen raises the
    /// "dense marker area" message.
    pub dense_area_threshold: usize,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            seen_radius_miles: 0.5,
            scan_debounce_ms: 150,
            max_reload_radius_miles: 2.0,
            dense_area_threshold: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// RecencyConfig
// ---------------------------------------------------------------------------

/// Settings for the recently-seen display list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecencyConfig {
    /// Maximum number of entries kept in the display list.
    pub display_capacity: usize,
}

impl Default for RecencyConfig {
    fn default() -> Self {
        Self {
            display_capacity: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// NarrationConfig
// ---------------------------------------------------------------------------

/// Settings for the narration engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrationConfig {
    /// Maximum words handed to the speech engine per utterance.
    pub words_per_chunk: usize,
    /// Maximum characters handed to the speech engine per utterance.
    pub max_chunk_chars: usize,
    /// Interval of the "next unspoken marker" poll.
    pub poll_interval_ms: u64,
    /// Default for "speak when an unseen marker is found" on first run.
    pub speak_when_marker_found: bool,
    /// Default for "speak the full details" (instead of just announcing the
    /// title) on first run.
    pub speak_details: bool,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            words_per_chunk: 10,
            max_chunk_chars: 4000,
            poll_interval_ms: 1000,
            speak_when_marker_found: true,
            speak_details: false,
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechConfig
// ---------------------------------------------------------------------------

/// Audio usage category requested from the platform speech engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AudioUsage {
    /// Accessibility / assistive audio, ducks other media.
    AssistanceAccessibility,
    /// Navigation guidance stream.
    NavigationGuidance,
    /// Plain media playback.
    Media,
}

impl Default for AudioUsage {
    fn default() -> Self {
        Self::AssistanceAccessibility
    }
}

/// Settings passed to the platform text-to-speech backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Speech rate multiplier relative to the platform baseline.
    pub rate: f32,
    /// Audio usage category.
    pub usage: AudioUsage,
    /// Language tag, e.g. `"en-US"`.
    pub language: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            rate: 1.25,
            usage: AudioUsage::default(),
            language: "en-US".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// UiConfig
// ---------------------------------------------------------------------------

/// Settings that affect what the UI layer is shown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    /// Seconds an advisory message stays up before it is cleared.
    pub message_clear_secs: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            message_clear_secs: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use marker_narrator::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Seen-scanner settings.
    #[serde(default)]
    pub proximity: ProximityConfig,
    /// Recently-seen list settings.
    #[serde(default)]
    pub recency: RecencyConfig,
    /// Narration engine settings.
    #[serde(default)]
    pub narration: NarrationConfig,
    /// Text-to-speech backend settings.
    #[serde(default)]
    pub speech: SpeechConfig,
    /// UI settings.
    #[serde(default)]
    pub ui: UiConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario).
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the narration and recency code cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.narration.words_per_chunk == 0 {
            bail!("narration.words_per_chunk must be at least 1");
        }
        if self.narration.max_chunk_chars == 0 {
            bail!("narration.max_chunk_chars must be at least 1");
        }
        if self.recency.display_capacity == 0 {
            bail!("recency.display_capacity must be at least 1");
        }
        Ok(())
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
