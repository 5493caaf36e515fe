//! Filesystem backed photo storage.
//!
//! Incoming bytes are always written to a temporary file under the staging
//! directory first and then renamed into place, so the engine never sees a
//! partially written photo.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use futures::{Stream, TryStreamExt};
use tempfile::{NamedTempFile, TempPath};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

use crate::layout::Layout;

const DEFAULT_PHOTO_NAME: &str = "photo";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cluster folder not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Io(#[from] io::Error),
}

/// A fully received photo that the engine cannot see yet.
///
/// Dropping it deletes the temporary file.
#[derive(Debug)]
pub struct StagedPhoto {
    original_name: String,
    path: TempPath,
    size: u64,
}

impl StagedPhoto {
    #[must_use]
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }
}

pub struct PhotoStore {
    layout: Layout,
    last_token: AtomicU64,
}

impl PhotoStore {
    #[must_use]
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            last_token: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Streams one uploaded file into the staging directory.
    pub async fn stage<S, E>(
        &self,
        original_name: &str,
        stream: S,
    ) -> Result<StagedPhoto, StoreError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Sync + std::error::Error + Send + 'static,
    {
        let staging = self.layout.staging_dir();
        tokio::fs::create_dir_all(&staging).await?;

        let (file, path) = tokio::task::spawn_blocking(move || NamedTempFile::new_in(staging))
            .await
            .map_err(io::Error::other)??
            .into_parts();

        let body_with_io_error = stream.map_err(io::Error::other);
        let body_reader = StreamReader::new(body_with_io_error);
        futures::pin_mut!(body_reader);

        let mut file = tokio::fs::File::from_std(file);
        let size = tokio::io::copy(&mut body_reader, &mut file).await?;
        file.flush().await?;

        Ok(StagedPhoto {
            original_name: photo_name(original_name).to_owned(),
            path,
            size,
        })
    }

    /// Moves a staged photo into the intake directory under a unique name.
    pub async fn commit(&self, staged: StagedPhoto, room_id: &str) -> Result<String, StoreError> {
        let intake = self.layout.intake_dir();
        tokio::fs::create_dir_all(&intake).await?;

        let mut path = staged.path;
        loop {
            let stored_name = format!("{}-{}", self.next_token(), staged.original_name);
            let target = intake.join(&stored_name);
            let persisted = tokio::task::spawn_blocking(move || path.persist_noclobber(target))
                .await
                .map_err(io::Error::other)?;
            match persisted {
                Ok(()) => {
                    tracing::info!(
                        room = room_id,
                        file = %stored_name,
                        bytes = staged.size,
                        "photo stored"
                    );
                    return Ok(stored_name);
                }
                Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                    tracing::warn!("stored name {stored_name} already taken, retrying");
                    path = e.path;
                }
                Err(e) => return Err(StoreError::Io(e.error)),
            }
        }
    }

    /// Stores one photo for a room in a single step.
    pub async fn save<S, E>(
        &self,
        room_id: &str,
        stream: S,
        original_name: &str,
    ) -> Result<String, StoreError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Sync + std::error::Error + Send + 'static,
    {
        let staged = self.stage(original_name, stream).await?;
        self.commit(staged, room_id).await
    }

    /// Replaces whatever is in the search slot with a new reference photo.
    pub async fn replace_reference(
        &self,
        original_name: &str,
        data: Bytes,
    ) -> Result<String, StoreError> {
        let stream = futures::stream::iter([Ok::<_, io::Error>(data)]);
        let staged = self.stage(original_name, stream).await?;

        let slot = self.layout.search_dir();
        clear_dir(&slot).await?;

        let stored_name = format!("{}-{}", self.next_token(), staged.original_name);
        let target = slot.join(&stored_name);
        let path = staged.path;
        tokio::task::spawn_blocking(move || path.persist(target))
            .await
            .map_err(io::Error::other)?
            .map_err(|e| StoreError::Io(e.error))?;
        tracing::debug!(file = %stored_name, bytes = staged.size, "reference photo stored");
        Ok(stored_name)
    }

    /// Paths of the regular files directly inside a cluster directory, sorted
    /// by file name. Names are taken as the filesystem reports them, whatever
    /// their encoding.
    pub async fn list_cluster_files(
        &self,
        room_id: &str,
        cluster: &str,
    ) -> Result<Vec<PathBuf>, StoreError> {
        let dir = self.existing_cluster_dir(room_id, cluster).await?;
        let mut entries = tokio::fs::read_dir(&dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    pub async fn cluster_directory_exists(&self, room_id: &str, cluster: &str) -> bool {
        self.existing_cluster_dir(room_id, cluster).await.is_ok()
    }

    /// Absolute path of a cluster directory that is known to exist.
    pub async fn existing_cluster_dir(
        &self,
        room_id: &str,
        cluster: &str,
    ) -> Result<PathBuf, StoreError> {
        let not_found = || StoreError::NotFound(format!("{room_id}/{cluster}"));
        let dir = self.layout.cluster_dir(room_id, cluster).ok_or_else(not_found)?;
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(dir),
            Ok(_) => Err(not_found()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(not_found()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Strictly increasing millisecond timestamp.
    fn next_token(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default();
        let mut last = self.last_token.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self.last_token.compare_exchange_weak(
                last,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}

async fn clear_dir(dir: &Path) -> io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(entry.path()).await?;
        } else {
            tokio::fs::remove_file(entry.path()).await?;
        }
    }
    Ok(())
}

/// Last path component of a client supplied file name.
fn photo_name(original: &str) -> &str {
    let name = match original.rfind(['\\', '/']) {
        Some(ix) => &original[ix + 1..],
        None => original,
    };
    match name {
        "" | "." | ".." => DEFAULT_PHOTO_NAME,
        name => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn bytes_stream(data: &'static [u8]) -> impl Stream<Item = Result<Bytes, io::Error>> {
        futures::stream::iter([Ok(Bytes::from_static(data))])
    }

    fn dir_names(dir: &Path) -> HashSet<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect()
    }

    #[rstest]
    #[case("", "photo")]
    #[case("file.jpg", "file.jpg")]
    #[case("dir/file.jpg", "file.jpg")]
    #[case("dir\\file.jpg", "file.jpg")]
    #[case("dir1/dir2/file.jpg", "file.jpg")]
    #[case("../..", "photo")]
    #[case("dir/", "photo")]
    #[trace]
    fn photo_name_tests(#[case] original: &str, #[case] expected: &str) {
        // Act
        let name = photo_name(original);

        // Assert
        assert_eq!(name, expected);
    }

    #[tokio::test]
    async fn save_same_name_twice_keeps_both() {
        // Arrange
        let root = TempDir::new().unwrap();
        let store = PhotoStore::new(Layout::new(root.path()));

        // Act
        let first = store.save("R1", bytes_stream(b"first"), "p1.jpg");
        let first = first.await.unwrap();
        let second = store.save("R1", bytes_stream(b"second"), "p1.jpg");
        let second = second.await.unwrap();

        // Assert
        assert_ne!(first, second);
        assert!(first.ends_with("-p1.jpg"));
        let intake = store.layout().intake_dir();
        assert_eq!(std::fs::read(intake.join(&first)).unwrap(), b"first");
        assert_eq!(std::fs::read(intake.join(&second)).unwrap(), b"second");
        assert!(dir_names(&store.layout().staging_dir()).is_empty());
    }

    #[tokio::test]
    async fn dropped_staged_photo_leaves_nothing_behind() {
        // Arrange
        let root = TempDir::new().unwrap();
        let store = PhotoStore::new(Layout::new(root.path()));

        // Act
        let staged = store.stage("p1.jpg", bytes_stream(b"data")).await.unwrap();
        assert_eq!(staged.size(), 4);
        drop(staged);

        // Assert
        assert!(dir_names(&store.layout().staging_dir()).is_empty());
        assert!(!store.layout().intake_dir().exists());
    }

    #[tokio::test]
    async fn failed_stream_is_not_committed() {
        // Arrange
        let root = TempDir::new().unwrap();
        let store = PhotoStore::new(Layout::new(root.path()));
        let stream = futures::stream::iter([
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::other("connection reset")),
        ]);

        // Act
        let result = store.save("R1", stream, "p1.jpg").await;

        // Assert
        assert!(matches!(result, Err(StoreError::Io(_))));
        assert!(dir_names(&store.layout().staging_dir()).is_empty());
        assert!(!store.layout().intake_dir().exists());
    }

    #[tokio::test]
    async fn replace_reference_keeps_single_photo() {
        // Arrange
        let root = TempDir::new().unwrap();
        let store = PhotoStore::new(Layout::new(root.path()));

        // Act
        store
            .replace_reference("old.jpg", Bytes::from_static(b"old"))
            .await
            .unwrap();
        let current = store
            .replace_reference("q.jpg", Bytes::from_static(b"new"))
            .await
            .unwrap();

        // Assert
        let slot = store.layout().search_dir();
        assert_eq!(dir_names(&slot), HashSet::from([current.clone()]));
        assert_eq!(std::fs::read(slot.join(current)).unwrap(), b"new");
    }

    #[tokio::test]
    async fn list_cluster_files_skips_subdirectories() {
        // Arrange
        let root = TempDir::new().unwrap();
        let store = PhotoStore::new(Layout::new(root.path()));
        let dir = store.layout().cluster_dir("R1", "C3").unwrap();
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("b.jpg"), b"b").unwrap();
        std::fs::write(dir.join("a.jpg"), b"a").unwrap();

        // Act
        let files = store.list_cluster_files("R1", "C3").await.unwrap();

        // Assert
        assert_eq!(files, vec![dir.join("a.jpg"), dir.join("b.jpg")]);
        assert!(store.cluster_directory_exists("R1", "C3").await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn list_cluster_files_keeps_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        // Arrange
        let root = TempDir::new().unwrap();
        let store = PhotoStore::new(Layout::new(root.path()));
        let dir = store.layout().cluster_dir("R1", "C9").unwrap();
        std::fs::create_dir_all(&dir).unwrap();
        let odd = dir.join(OsStr::from_bytes(b"b\xff.jpg"));
        std::fs::write(dir.join("a.jpg"), b"a").unwrap();
        std::fs::write(&odd, b"b").unwrap();

        // Act
        let files = store.list_cluster_files("R1", "C9").await.unwrap();

        // Assert
        assert_eq!(files, vec![dir.join("a.jpg"), odd]);
    }

    #[rstest]
    #[case("R1", "missing")]
    #[case("missing", "C3")]
    #[case("R1", "..")]
    #[trace]
    #[tokio::test]
    async fn list_cluster_files_not_found(#[case] room: &str, #[case] cluster: &str) {
        // Arrange
        let root = TempDir::new().unwrap();
        let store = PhotoStore::new(Layout::new(root.path()));
        let existing = store.layout().clusters_dir().join("R1").join("C3");
        std::fs::create_dir_all(existing).unwrap();

        // Act
        let result = store.list_cluster_files(room, cluster).await;

        // Assert
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert!(!store.cluster_directory_exists(room, cluster).await);
    }

    #[test]
    fn tokens_strictly_increase() {
        // Arrange
        let store = PhotoStore::new(Layout::new("unused"));

        // Act
        let tokens: Vec<u64> = (0..1000).map(|_| store.next_token()).collect();

        // Assert
        assert!(tokens.windows(2).all(|w| w[0] < w[1]));
    }
}
