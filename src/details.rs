//! Marker detail loading.
//!
//! The listing only carries basic info.  Before a marker is read aloud in
//! detail mode its inscription and the rest of the detail page must be
//! fetched; [`MarkerDetailsLoader`] is that collaborator.
//!
//! [`DirectoryDetailsLoader`] serves details from `<dir>/<marker id>.json`
//! files, each holding a serialized [`Marker`].  Ids that would resolve
//! outside `<dir>` are refused.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::markers::Marker;

#[derive(Debug, Error)]
pub enum DetailsError {
    #[error("no details available for marker {0}")]
    NotFound(String),

    #[error("marker id {0:?} cannot name a details file")]
    InvalidId(String),

    #[error("failed to read details for marker {id}: {reason}")]
    Io { id: String, reason: String },

    #[error("failed to parse details for marker {id}: {reason}")]
    Parse { id: String, reason: String },
}

/// Fetches the detail fields of a marker.
///
/// The returned marker has `is_details_loaded == true`; only its detail
/// fields are merged into the store.
#[async_trait]
pub trait MarkerDetailsLoader: Send + Sync {
    async fn load_details(&self, marker: &Marker) -> Result<Marker, DetailsError>;
}

pub struct DirectoryDetailsLoader {
    dir: PathBuf,
}

impl DirectoryDetailsLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl MarkerDetailsLoader for DirectoryDetailsLoader {
    async fn load_details(&self, marker: &Marker) -> Result<Marker, DetailsError> {
        if !is_plain_file_stem(&marker.id) {
            return Err(DetailsError::InvalidId(marker.id.clone()));
        }
        let path = self.dir.join(format!("{}.json", marker.id));
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DetailsError::NotFound(marker.id.clone()))
            }
            Err(e) => {
                return Err(DetailsError::Io {
                    id: marker.id.clone(),
                    reason: e.to_string(),
                })
            }
        };

        let mut details: Marker = serde_json::from_str(&text).map_err(|e| DetailsError::Parse {
            id: marker.id.clone(),
            reason: e.to_string(),
        })?;
        details.id = marker.id.clone();
        details.is_details_loaded = true;

        log::debug!("details: loaded {} from {}", marker.id, path.display());
        Ok(details)
    }
}

/// A single, non-empty path component with no separators and no `..`.
fn is_plain_file_stem(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && !id.contains("..")
        && !id.contains(&['/', '\\', '\0'][..])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loads_details_from_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stored = Marker {
            inscription: "Built in 1852.".into(),
            erected: "1990".into(),
            ..Marker::new("ignored")
        };
        std::fs::write(
            dir.path().join("M1.json"),
            serde_json::to_string(&stored).expect("encode"),
        )
        .expect("write");

        let loader = DirectoryDetailsLoader::new(dir.path());
        let details = loader.load_details(&Marker::new("M1")).await.expect("load");

        assert_eq!(details.id, "M1");
        assert!(details.is_details_loaded);
        assert_eq!(details.inscription, "Built in 1852.");
        assert_eq!(details.erected, "1990");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loader = DirectoryDetailsLoader::new(dir.path());

        let err = loader.load_details(&Marker::new("M9")).await.unwrap_err();
        assert!(matches!(err, DetailsError::NotFound(id) if id == "M9"));
    }

    #[tokio::test]
    async fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("M1.json"), "{ not json").expect("write");
        let loader = DirectoryDetailsLoader::new(dir.path());

        let err = loader.load_details(&Marker::new("M1")).await.unwrap_err();
        assert!(matches!(err, DetailsError::Parse { .. }));
    }

    #[tokio::test]
    async fn ids_outside_the_directory_are_refused() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = root.path().join("details");
        std::fs::create_dir(&dir).expect("mkdir");
        let outside = serde_json::to_string(&Marker {
            inscription: "secret".into(),
            ..Marker::new("x")
        })
        .expect("encode");
        std::fs::write(root.path().join("x.json"), outside).expect("write");

        let loader = DirectoryDetailsLoader::new(&dir);
        for id in ["../x", "..", "a/b", "a\\b", "", "."] {
            let err = loader.load_details(&Marker::new(id)).await.unwrap_err();
            assert!(matches!(err, DetailsError::InvalidId(ref got) if got == id), "{id:?}: {err}");
        }
    }

    #[test]
    fn ordinary_ids_are_plain_stems() {
        assert!(is_plain_file_stem("M1"));
        assert!(is_plain_file_stem("HM1ABC"));
        assert!(is_plain_file_stem("marker.v2"));
        assert!(!is_plain_file_stem("x/.."));
    }
}
