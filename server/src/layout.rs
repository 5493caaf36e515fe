//! Directory convention shared with the external clustering engine.
//!
//! The engine is not part of this service; it locates photos and writes its
//! clusters using exactly these paths relative to its working directory, so
//! none of the names below may change.

use std::path::{Path, PathBuf};

const UPLOADS_DIR: &str = "uploads";
const INTAKE_DIR: &str = "all_photos";
const SEARCH_DIR: &str = "search_photo";
const STAGING_DIR: &str = ".staging";
const CLUSTERS_DIR: &str = "clusters";

#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Photos waiting to be clustered. The engine empties it after a run.
    #[must_use]
    pub fn intake_dir(&self) -> PathBuf {
        self.root.join(UPLOADS_DIR).join(INTAKE_DIR)
    }

    /// Single reference photo read by the engine in search mode.
    #[must_use]
    pub fn search_dir(&self) -> PathBuf {
        self.root.join(UPLOADS_DIR).join(SEARCH_DIR)
    }

    /// Partially received files. The engine never looks here.
    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(UPLOADS_DIR).join(STAGING_DIR)
    }

    #[must_use]
    pub fn clusters_dir(&self) -> PathBuf {
        self.root.join(CLUSTERS_DIR)
    }

    /// `clusters/<room>/<cluster>` or `None` when either name cannot be used
    /// as a single path segment.
    #[must_use]
    pub fn cluster_dir(&self, room_id: &str, cluster: &str) -> Option<PathBuf> {
        if is_path_segment(room_id) && is_path_segment(cluster) {
            Some(self.clusters_dir().join(room_id).join(cluster))
        } else {
            None
        }
    }

    pub async fn create_dirs(&self) -> std::io::Result<()> {
        for dir in [
            self.intake_dir(),
            self.search_dir(),
            self.staging_dir(),
            self.clusters_dir(),
        ] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }
}

/// Whether the value can be joined to a directory as one literal component.
#[must_use]
pub fn is_path_segment(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\', '\0'])
}
