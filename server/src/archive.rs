//! Streams a cluster directory as a zip archive.
//!
//! The archive is written on the blocking pool into a bounded channel and the
//! response body is read from the other end, so only a few chunks are held in
//! memory whatever the cluster size.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use futures::Stream;
use thiserror::Error;
use tokio::sync::mpsc;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const CHANNEL_CAPACITY: usize = 16;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No file name in {0}")]
    Name(PathBuf),

    #[error("Archive write failed: {0}")]
    Write(#[from] io::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl ArchiveError {
    /// The receiving side went away before the archive was complete.
    fn is_cancelled(&self) -> bool {
        match self {
            ArchiveError::Write(e) | ArchiveError::Zip(zip::result::ZipError::Io(e)) => {
                e.kind() == io::ErrorKind::BrokenPipe
            }
            _ => false,
        }
    }
}

/// Sends everything written to it down a channel.
///
/// Once stopped, writes are dropped instead of sent. A closed receiver
/// surfaces as a broken pipe and stops the writer.
struct ChannelWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
    stopped: Arc<AtomicBool>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() || self.stopped.load(Ordering::Acquire) {
            return Ok(buf.len());
        }
        let sent = self.tx.blocking_send(Ok(Bytes::copy_from_slice(buf)));
        if sent.is_err() {
            self.stopped.store(true, Ordering::Release);
            let closed = io::Error::new(io::ErrorKind::BrokenPipe, "archive receiver closed");
            return Err(closed);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Zip of `files`, each stored under its bare file name.
///
/// Ends with an `Err` item if the archive could not be completed. A failed
/// archive never carries an end of archive record.
pub fn stream(files: Vec<PathBuf>) -> impl Stream<Item = io::Result<Bytes>> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    let errors = tx.clone();
    tokio::task::spawn_blocking(move || {
        let count = files.len();
        let sink = ChannelWriter {
            tx,
            stopped: Arc::new(AtomicBool::new(false)),
        };
        match write_archive(&files, sink) {
            Ok(()) => tracing::debug!("archive with {count} files sent"),
            Err(e) if e.is_cancelled() => {
                tracing::info!("archive download cancelled by client");
            }
            Err(e) => {
                tracing::error!("{e}");
                let _ = errors.blocking_send(Err(io::Error::other(e.to_string())));
            }
        }
    });

    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
}

fn write_archive(files: &[PathBuf], sink: ChannelWriter) -> Result<(), ArchiveError> {
    let stopped = Arc::clone(&sink.stopped);
    let mut zip = ZipWriter::new_stream(sink);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let mut write_entries = || -> Result<(), ArchiveError> {
        for path in files {
            let mut file = File::open(path).map_err(|source| ArchiveError::Read {
                path: path.clone(),
                source,
            })?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| ArchiveError::Name(path.clone()))?;
            zip.start_file(name, options)?;
            io::copy(&mut file, &mut zip).map_err(|source| match source.kind() {
                io::ErrorKind::BrokenPipe => ArchiveError::Write(source),
                _ => ArchiveError::Read {
                    path: path.clone(),
                    source,
                },
            })?;
        }
        Ok(())
    };

    if let Err(e) = write_entries() {
        // the writer finishes the archive when dropped, nothing of that may be sent
        stopped.store(true, Ordering::Release);
        return Err(e);
    }
    zip.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{StreamExt, TryStreamExt};
    use std::collections::HashMap;
    use std::io::{Cursor, Read};
    use tempfile::TempDir;

    async fn collect(files: Vec<PathBuf>) -> io::Result<Vec<u8>> {
        stream(files)
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
    }

    fn unzip(data: Vec<u8>) -> HashMap<String, Vec<u8>> {
        let mut archive = zip::ZipArchive::new(Cursor::new(data)).unwrap();
        let mut entries = HashMap::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).unwrap();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            entries.insert(entry.name().to_owned(), content);
        }
        entries
    }

    #[tokio::test]
    async fn archive_is_flat_and_byte_exact() {
        // Arrange
        let dir = TempDir::new().unwrap();
        let cluster = dir.path().join("clusters").join("R1").join("C3");
        std::fs::create_dir_all(&cluster).unwrap();
        let a: Vec<u8> = (0..=255u8).cycle().take(200_000).collect();
        let b = b"second photo".to_vec();
        std::fs::write(cluster.join("a.jpg"), &a).unwrap();
        std::fs::write(cluster.join("b.jpg"), &b).unwrap();

        // Act
        let data = collect(vec![cluster.join("a.jpg"), cluster.join("b.jpg")])
            .await
            .unwrap();

        // Assert
        let entries = unzip(data);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["a.jpg"], a);
        assert_eq!(entries["b.jpg"], b);
    }

    #[tokio::test]
    async fn empty_cluster_is_valid_archive() {
        // Act
        let data = collect(Vec::new()).await.unwrap();

        // Assert
        assert!(unzip(data).is_empty());
    }

    #[tokio::test]
    async fn missing_file_ends_stream_without_trailer() {
        // Arrange
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("a.jpg");
        std::fs::write(&present, b"a").unwrap();
        let mut archive = Box::pin(stream(vec![present, dir.path().join("gone.jpg")]));

        // Act
        let mut sent = Vec::new();
        let mut failed = false;
        while let Some(item) = archive.next().await {
            match item {
                Ok(chunk) => sent.extend_from_slice(&chunk),
                Err(_) => failed = true,
            }
        }

        // Assert
        assert!(failed);
        let end_of_archive = b"PK\x05\x06";
        assert!(!sent.windows(4).any(|w| w == end_of_archive));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_utf8_names_are_archived() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        // Arrange
        let dir = TempDir::new().unwrap();
        let odd = dir.path().join(OsStr::from_bytes(b"b\xff.jpg"));
        std::fs::write(dir.path().join("a.jpg"), b"a").unwrap();
        std::fs::write(&odd, b"b").unwrap();

        // Act
        let data = collect(vec![dir.path().join("a.jpg"), odd]).await.unwrap();

        // Assert
        let entries = unzip(data);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["a.jpg"], b"a");
        assert_eq!(entries["b\u{FFFD}.jpg"], b"b");
    }

    #[tokio::test]
    async fn dropped_receiver_stops_writer() {
        // Arrange
        let dir = TempDir::new().unwrap();
        let data: Vec<u8> = (0..4_000_000u32).map(|i| (i * 7 % 251) as u8).collect();
        let files: Vec<PathBuf> = (0..8)
            .map(|i| {
                let path = dir.path().join(format!("big{i}.jpg"));
                std::fs::write(&path, &data).unwrap();
                path
            })
            .collect();

        // Act
        let mut archive = Box::pin(stream(files));
        let first = archive.try_next().await.unwrap();
        drop(archive);

        // Assert
        assert!(first.is_some());
    }
}
