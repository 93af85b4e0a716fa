//! Durable key-value settings.
//!
//! [`SettingsStore`] is the string key-value interface the platform layer
//! provides (shared preferences, user defaults, ...).  Two implementations
//! ship with the crate:
//!
//! * [`MemorySettings`]: in-process map, for tests and ephemeral sessions.
//! * [`JsonFileSettings`]: one JSON object on disk, written through on
//!   every change.
//!
//! [`SessionSettings`] layers typed accessors over any store.  Values are
//! stored as JSON text, so a value that fails to parse (older format, manual
//! edit) reads back as absent instead of failing the session.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::markers::{LatLong, Marker, RecentlySeenMarker};

// ---------------------------------------------------------------------------
// StorageError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("settings I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings could not be encoded or decoded: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("settings lock poisoned")]
    Poisoned,
}

// ---------------------------------------------------------------------------
// SettingsStore trait
// ---------------------------------------------------------------------------

/// String key-value persistence.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Write several entries as one update.
    fn put_many(&self, entries: Vec<(&str, String)>) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;

    fn put(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.put_many(vec![(key, value)])
    }
}

// ---------------------------------------------------------------------------
// MemorySettings
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemorySettings {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn put_many(&self, entries: Vec<(&str, String)>) -> Result<(), StorageError> {
        let mut values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        for (key, value) in entries {
            values.insert(key.to_string(), value);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        values.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JsonFileSettings
// ---------------------------------------------------------------------------

/// Settings kept in a single JSON object file.
///
/// The file is rewritten (temp file + rename) after every change.
#[derive(Debug)]
pub struct JsonFileSettings {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonFileSettings {
    /// Open `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(values)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SettingsStore for JsonFileSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn put_many(&self, entries: Vec<(&str, String)>) -> Result<(), StorageError> {
        let mut values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        for (key, value) in entries {
            values.insert(key.to_string(), value);
        }
        self.flush(&values)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().map_err(|_| StorageError::Poisoned)?;
        if values.remove(key).is_some() {
            self.flush(&values)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SessionSettings
// ---------------------------------------------------------------------------

const KEY_LAST_KNOWN_LOCATION: &str = "last_known_location";
const KEY_SEEN_RADIUS_MILES: &str = "seen_radius_miles";
const KEY_RECENTLY_SEEN_SET: &str = "recently_seen_markers_set";
const KEY_RECENTLY_SEEN_DISPLAY: &str = "ui_recently_seen_markers_list";
const KEY_SPEAK_WHEN_FOUND: &str = "is_speak_when_unseen_marker_found_enabled";
const KEY_SPEAK_DETAILS: &str = "is_speak_details_when_unseen_marker_found_enabled";
const KEY_LAST_SPOKEN_MARKER: &str = "last_spoken_marker";
const KEY_MARKERS_LAST_UPDATED_LOCATION: &str = "markers_last_updated_location";
const KEY_CACHED_MARKERS: &str = "cached_markers";

/// Typed view over a [`SettingsStore`].
#[derive(Clone)]
pub struct SessionSettings {
    store: Arc<dyn SettingsStore>,
}

impl SessionSettings {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySettings::new()))
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.store.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("settings: ignoring unreadable value for {key}: {e}");
                None
            }
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        self.store.put(key, serde_json::to_string(value)?)
    }

    // ---- location ---------------------------------------------------------

    pub fn last_known_location(&self) -> Option<LatLong> {
        self.read(KEY_LAST_KNOWN_LOCATION)
    }

    pub fn set_last_known_location(&self, location: LatLong) -> Result<(), StorageError> {
        self.write(KEY_LAST_KNOWN_LOCATION, &location)
    }

    pub fn markers_last_updated_location(&self) -> Option<LatLong> {
        self.read(KEY_MARKERS_LAST_UPDATED_LOCATION)
    }

    pub fn set_markers_last_updated_location(
        &self,
        location: Option<LatLong>,
    ) -> Result<(), StorageError> {
        match location {
            Some(location) => self.write(KEY_MARKERS_LAST_UPDATED_LOCATION, &location),
            None => self.store.remove(KEY_MARKERS_LAST_UPDATED_LOCATION),
        }
    }

    // ---- proximity --------------------------------------------------------

    pub fn seen_radius_miles(&self) -> Option<f64> {
        self.read(KEY_SEEN_RADIUS_MILES)
    }

    pub fn set_seen_radius_miles(&self, miles: f64) -> Result<(), StorageError> {
        self.write(KEY_SEEN_RADIUS_MILES, &miles)
    }

    // ---- recency ----------------------------------------------------------

    /// Returns `(full set, display list)`.
    pub fn recently_seen(&self) -> (Vec<RecentlySeenMarker>, Vec<RecentlySeenMarker>) {
        (
            self.read(KEY_RECENTLY_SEEN_SET).unwrap_or_default(),
            self.read(KEY_RECENTLY_SEEN_DISPLAY).unwrap_or_default(),
        )
    }

    /// Persist both recency collections in one write.
    pub fn set_recently_seen(
        &self,
        all_seen: &[RecentlySeenMarker],
        display: &[RecentlySeenMarker],
    ) -> Result<(), StorageError> {
        self.store.put_many(vec![
            (KEY_RECENTLY_SEEN_SET, serde_json::to_string(all_seen)?),
            (KEY_RECENTLY_SEEN_DISPLAY, serde_json::to_string(display)?),
        ])
    }

    // ---- narration --------------------------------------------------------

    pub fn is_speak_when_found_enabled(&self) -> Option<bool> {
        self.read(KEY_SPEAK_WHEN_FOUND)
    }

    pub fn set_speak_when_found_enabled(&self, enabled: bool) -> Result<(), StorageError> {
        self.write(KEY_SPEAK_WHEN_FOUND, &enabled)
    }

    pub fn is_speak_details_enabled(&self) -> Option<bool> {
        self.read(KEY_SPEAK_DETAILS)
    }

    pub fn set_speak_details_enabled(&self, enabled: bool) -> Result<(), StorageError> {
        self.write(KEY_SPEAK_DETAILS, &enabled)
    }

    pub fn last_spoken_marker(&self) -> Option<RecentlySeenMarker> {
        self.read(KEY_LAST_SPOKEN_MARKER)
    }

    pub fn set_last_spoken_marker(&self, marker: &RecentlySeenMarker) -> Result<(), StorageError> {
        self.write(KEY_LAST_SPOKEN_MARKER, marker)
    }

    // ---- marker cache -----------------------------------------------------

    pub fn cached_markers(&self) -> Vec<Marker> {
        self.read(KEY_CACHED_MARKERS).unwrap_or_default()
    }

    pub fn set_cached_markers(&self, markers: &[Marker]) -> Result<(), StorageError> {
        self.write(KEY_CACHED_MARKERS, markers)
    }

    pub fn clear_cached_markers(&self) -> Result<(), StorageError> {
        self.store.remove(KEY_CACHED_MARKERS)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
