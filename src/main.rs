//! Application entry point: a headless marker narrator.
//!
//! # Usage
//!
//! ```text
//! marker-narrator [LISTING.json] [DETAILS_DIR]
//! ```
//!
//! `LISTING.json` is a JSON array of markers (basic info); `DETAILS_DIR`
//! holds `<marker id>.json` detail files and defaults to the `details/`
//! directory in the data root when that exists.  Standard input takes one
//! `lat,lon` fix per line, or one of the commands `start`, `stop`, `pause`,
//! `resume`, `skip`, `on`, `off`, `details on`, `details off` and `reset`.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Open the session file and restore the [`SessionContext`].
//! 4. Ingest the marker listing, if one was given.
//! 5. Create the tokio runtime (multi-thread, 2 workers).
//! 6. Spawn the proximity detector and the narration runner.
//! 7. Feed stdin lines to them until EOF.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use marker_narrator::{
    config::{AppConfig, AppPaths},
    details::DirectoryDetailsLoader,
    location::{parse_lat_long, LocationEvent},
    markers::Marker,
    narration::{NarrationCommand, NarrationRunner},
    proximity::ProximityDetector,
    session::{JsonFileSettings, SessionContext, SessionSettings},
    speech::LogSpeech,
};

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("marker-narrator starting up");

    // 2. Config
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Session
    let paths = AppPaths::new();
    let store = JsonFileSettings::open(&paths.session_file)
        .with_context(|| format!("opening session file {}", paths.session_file.display()))?;
    let session = SessionContext::new(config, SessionSettings::new(Arc::new(store)));

    // 4. Listing
    let mut args = std::env::args().skip(1);
    if let Some(listing) = args.next() {
        load_listing(&session, Path::new(&listing))?;
    }
    let details_dir = args
        .next()
        .map(PathBuf::from)
        .or_else(|| paths.details_dir.is_dir().then(|| paths.details_dir.clone()));

    // 5. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(run(session, details_dir))
}

/// Ingest a JSON marker listing and open the scan gate.
fn load_listing(session: &SessionContext, path: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading marker listing {}", path.display()))?;
    let listing: Vec<Marker> = serde_json::from_str(&text)
        .with_context(|| format!("parsing marker listing {}", path.display()))?;

    for marker in &listing {
        session.markers().upsert_basic_info(marker);
    }

    let loaded_at = session
        .last_known_location()
        .or_else(|| listing.first().map(|m| m.position))
        .unwrap_or_default();
    session.finish_marker_listing(loaded_at);
    log::info!("Loaded {} markers from {}", listing.len(), path.display());
    Ok(())
}

async fn run(session: Arc<SessionContext>, details_dir: Option<PathBuf>) -> anyhow::Result<()> {
    // 6. Detector and narration
    let (location_tx, location_rx) = mpsc::channel::<LocationEvent>(16);
    let detector = Arc::new(ProximityDetector::new(Arc::clone(&session)));
    let detector_task = tokio::spawn(Arc::clone(&detector).run(location_rx));

    let (speech_tx, speech_rx) = mpsc::unbounded_channel();
    let mut runner = NarrationRunner::new(Arc::clone(&session), Arc::new(LogSpeech::new(speech_tx)));
    if let Some(dir) = details_dir {
        runner = runner.with_details_loader(Arc::new(DirectoryDetailsLoader::new(dir)));
    }
    let (command_tx, command_rx) = mpsc::channel::<NarrationCommand>(16);
    let narration_task = tokio::spawn(runner.run(command_rx, speech_rx));

    let mut recently_seen = session.subscribe_recently_seen();
    tokio::spawn(async move {
        while recently_seen.changed().await.is_ok() {
            let titles: Vec<String> = recently_seen
                .borrow_and_update()
                .iter()
                .map(|m| m.title.clone())
                .collect();
            log::info!("Recently seen: {}", titles.join(" | "));
        }
    });

    // 7. Input
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(command) = parse_command(line) {
            command_tx.send(command).await.context("narration runner stopped")?;
            continue;
        }
        if line == "reset" {
            session.reset_cache();
            continue;
        }

        let event = match parse_lat_long(line) {
            Some(location) => {
                if session.needs_marker_reload(&location) {
                    log::info!("Marker listing is stale for {location:?}");
                }
                LocationEvent::Fix(location)
            }
            None => LocationEvent::Error(format!("Unrecognised input: {line}")),
        };
        location_tx.send(event).await.context("detector stopped")?;
    }

    drop(location_tx);
    drop(command_tx);
    detector_task.await.context("detector task")?;
    narration_task.await.context("narration task")?;

    if let Err(e) = session.save_markers_cache() {
        log::warn!("Failed to save marker cache: {e}");
    }
    let position = session.last_known_location().unwrap_or_default();
    log::info!("marker-narrator shutting down at {position:?}");
    Ok(())
}

fn parse_command(line: &str) -> Option<NarrationCommand> {
    let command = match line.to_ascii_lowercase().as_str() {
        "start" => NarrationCommand::Start,
        "stop" => NarrationCommand::Stop,
        "pause" => NarrationCommand::Pause,
        "resume" => NarrationCommand::Resume,
        "skip" => NarrationCommand::SkipToNext,
        "on" => NarrationCommand::SetEnabled(true),
        "off" => NarrationCommand::SetEnabled(false),
        "details on" => NarrationCommand::SetDetailsEnabled(true),
        "details off" => NarrationCommand::SetDetailsEnabled(false),
        _ => return None,
    };
    Some(command)
}
