//! Sequences registry, photo store, engine and archive for each operation.

use std::io;

use axum::body::Bytes;
use futures::Stream;

use crate::archive;
use crate::config::Config;
use crate::error::AppError;
use crate::jobs::{JobRunner, SearchOutcome};
use crate::layout::{is_path_segment, Layout};
use crate::registry::RoomRegistry;
use crate::store::{PhotoStore, StagedPhoto};

pub const MAX_UPLOAD_PHOTOS: usize = 100;

/// A photo received with a search request, not yet written anywhere.
pub struct ReferencePhoto {
    pub name: String,
    pub data: Bytes,
}

pub struct Orchestrator {
    registry: RoomRegistry,
    store: PhotoStore,
    jobs: JobRunner,
    reference_slot: tokio::sync::Mutex<()>,
    max_reference_bytes: usize,
}

impl Orchestrator {
    pub fn new(config: &Config) -> Self {
        let layout = Layout::new(&config.data_dir);
        Self {
            registry: RoomRegistry::with_rooms(config.seed_rooms.iter().cloned()),
            jobs: JobRunner::new(
                config.engine.clone(),
                layout.root().to_path_buf(),
                config.job_timeout,
                config.spawn_retries,
            ),
            store: PhotoStore::new(layout),
            reference_slot: tokio::sync::Mutex::new(()),
            max_reference_bytes: config.max_reference_bytes,
        }
    }

    #[must_use]
    pub fn store(&self) -> &PhotoStore {
        &self.store
    }

    #[must_use]
    pub fn layout(&self) -> &Layout {
        self.store.layout()
    }

    /// Largest reference photo a search may carry.
    #[must_use]
    pub fn max_reference_bytes(&self) -> usize {
        self.max_reference_bytes
    }

    /// Registers the room, commits the staged photos and clusters the room.
    ///
    /// Returns the engine's raw output.
    pub async fn upload(
        &self,
        room_id: Option<String>,
        photos: Vec<StagedPhoto>,
    ) -> Result<String, AppError> {
        let room_id = require_room(room_id, "Room ID is required!")?;
        if photos.is_empty() {
            return Err(AppError::Validation("No files uploaded!".into()));
        }
        if photos.len() > MAX_UPLOAD_PHOTOS {
            return Err(AppError::Validation(format!(
                "Too many files, at most {MAX_UPLOAD_PHOTOS} photos per upload"
            )));
        }

        let mut stored = Vec::with_capacity(photos.len());
        for photo in photos {
            let original = photo.original_name().to_owned();
            match self.store.commit(photo, &room_id).await {
                Ok(name) => stored.push(name),
                Err(e) => {
                    tracing::error!("file '{original}' not stored: {e}");
                    return Err(e.into());
                }
            }
        }

        if self.registry.register(&room_id) {
            tracing::info!(room = %room_id, "room registered");
        }
        tracing::info!(room = %room_id, files = stored.len(), "upload stored");

        Ok(self.jobs.cluster(&room_id).await?)
    }

    /// Finds the cluster that best matches a reference photo.
    pub async fn search(
        &self,
        room_id: Option<String>,
        photo: Option<ReferencePhoto>,
    ) -> Result<(String, SearchOutcome), AppError> {
        let room_id = require_room(room_id, "Room ID is required for search!")?;
        if !self.registry.exists(&room_id) {
            return Err(AppError::NotFound("Invalid Room ID!".into()));
        }
        let Some(photo) = photo else {
            return Err(AppError::Validation("No photo uploaded for search!".into()));
        };

        // the engine reads one shared slot, so a search owns it until the engine exits
        let _slot = self.reference_slot.lock().await;
        self.store.replace_reference(&photo.name, photo.data).await?;
        let outcome = self.jobs.search(&room_id).await?;

        if let SearchOutcome::Match { cluster, images } = &outcome {
            let images = images.len();
            tracing::info!(room = %room_id, %cluster, images, "search matched");
        } else {
            tracing::info!(room = %room_id, "search found no cluster");
        }
        Ok((room_id, outcome))
    }

    pub fn check_room(&self, room_id: Option<&str>) -> bool {
        room_id.is_some_and(|r| self.registry.exists(r))
    }

    pub fn rooms(&self) -> Vec<String> {
        self.registry.list_all()
    }

    /// Archive stream of a cluster; fails with `NotFound` before any byte is produced.
    pub async fn archive(
        &self,
        room_id: &str,
        cluster: &str,
    ) -> Result<impl Stream<Item = io::Result<Bytes>>, AppError> {
        let files = self.store.list_cluster_files(room_id, cluster).await?;
        tracing::info!(room = %room_id, %cluster, files = files.len(), "archive requested");
        Ok(archive::stream(files))
    }
}

fn require_room(room_id: Option<String>, missing: &str) -> Result<String, AppError> {
    match room_id {
        Some(r) if is_path_segment(&r) => Ok(r),
        Some(r) if !r.is_empty() => {
            let reason = format!("Room ID '{r}' cannot contain path separators");
            Err(AppError::Validation(reason))
        }
        _ => Err(AppError::Validation(missing.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn orchestrator(root: &TempDir) -> Orchestrator {
        Orchestrator::new(&Config::with_data_dir(root.path()))
    }

    #[tokio::test]
    async fn upload_without_files_is_rejected() {
        // Arrange
        let root = TempDir::new().unwrap();
        let genie = orchestrator(&root);

        // Act
        let result = genie.upload(Some("R1".into()), Vec::new()).await;

        // Assert
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(!genie.check_room(Some("R1")));
    }

    #[tokio::test]
    async fn upload_without_room_is_rejected() {
        // Arrange
        let root = TempDir::new().unwrap();
        let genie = orchestrator(&root);
        let stream = futures::stream::iter([Ok::<_, io::Error>(Bytes::from_static(b"x"))]);
        let staged = genie.store().stage("p1.jpg", stream).await.unwrap();

        // Act
        let result = genie.upload(None, vec![staged]).await;

        // Assert
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(!genie.layout().intake_dir().exists());
    }

    #[tokio::test]
    async fn search_unknown_room_writes_nothing() {
        // Arrange
        let root = TempDir::new().unwrap();
        let genie = orchestrator(&root);
        let photo = ReferencePhoto {
            name: "q.jpg".into(),
            data: Bytes::from_static(b"q"),
        };

        // Act
        let result = genie.search(Some("R9".into()), Some(photo)).await;

        // Assert
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn archive_of_missing_cluster_is_not_found() {
        // Arrange
        let root = TempDir::new().unwrap();
        let genie = orchestrator(&root);

        // Act
        let result = genie.archive("R1", "C3").await;

        // Assert
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn room_requirements() {
        assert!(require_room(Some("514409".into()), "missing").is_ok());
        let missing = require_room(None, "missing");
        assert!(matches!(missing, Err(AppError::Validation(m)) if m == "missing"));
        let empty = require_room(Some(String::new()), "missing");
        assert!(matches!(empty, Err(AppError::Validation(m)) if m == "missing"));
        assert!(require_room(Some("../etc".into()), "missing").is_err());
    }

    #[test]
    fn seeded_rooms_exist() {
        // Arrange
        let root = TempDir::new().unwrap();
        let mut config = Config::with_data_dir(root.path());
        config.seed_rooms = vec!["514409".into()];

        // Act
        let genie = Orchestrator::new(&config);

        // Assert
        assert!(genie.check_room(Some("514409")));
        assert!(!genie.check_room(None));
        assert_eq!(genie.rooms(), vec!["514409".to_owned()]);
    }
}
