//! Where marker-narrator keeps its files.
//!
//! Two roots, both named after the app:
//!
//! - the config root holds `settings.toml`, the tunables a user edits by
//!   hand and the app only reads at startup;
//! - the data root holds `session.json`, written continuously while the app
//!   runs (seen radius, recently-seen lists, cached markers), and an
//!   optional `details/` directory of per-marker detail files.
//!
//! On Linux these are `~/.config/marker-narrator` and
//! `~/.local/share/marker-narrator`; on macOS both sit under
//! `~/Library/Application Support`; on Windows under `%APPDATA%` and
//! `%LOCALAPPDATA%`.  A platform without a known location gets the current
//! directory.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    /// Static tunables, see [`crate::config::AppConfig`].
    pub settings_file: PathBuf,
    pub data_dir: PathBuf,
    /// Durable session store, see [`crate::session::JsonFileSettings`].
    pub session_file: PathBuf,
    /// `<marker id>.json` detail files used when no directory is given.
    pub details_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "marker-narrator";

    /// Resolve both roots from the platform directories.
    pub fn new() -> Self {
        let here = || PathBuf::from(".");
        Self::under(
            &dirs::config_dir().unwrap_or_else(here),
            &dirs::data_local_dir().unwrap_or_else(here),
        )
    }

    /// Lay the app's files out below explicit base directories.
    pub fn under(config_base: &Path, data_base: &Path) -> Self {
        let config_dir = config_base.join(Self::APP_NAME);
        let data_dir = data_base.join(Self::APP_NAME);
        Self {
            settings_file: config_dir.join("settings.toml"),
            session_file: data_dir.join("session.json"),
            details_dir: data_dir.join("details"),
            config_dir,
            data_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
