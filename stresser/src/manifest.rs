//! Manifest files: newline-separated lists of object keys.
//!
//! Read workloads load their keys from a manifest, and write workloads can record the keys they
//! create into one so that a later read run can replay them.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

/// Errors reading or writing manifest files.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file could not be opened or read.
    #[error("failed to read manifest file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The manifest file does not contain a single usable key.
    #[error("manifest file {0} is empty or contains no valid keys")]
    Empty(PathBuf),

    /// The manifest file could not be created for writing.
    #[error("failed to create manifest file {path}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing, flushing or syncing the manifest failed.
    #[error("failed to write manifest file {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The writer was already closed.
    #[error("manifest writer for {0} is closed")]
    Closed(PathBuf),
}

/// Parses manifest contents into keys.
///
/// Every line is trimmed; blank lines are skipped. Interior whitespace is part of the key.
pub fn parse_manifest(reader: impl BufRead) -> io::Result<Vec<String>> {
    let mut keys = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let key = line.trim();
        if !key.is_empty() {
            keys.push(key.to_owned());
        }
    }

    Ok(keys)
}

/// Loads the keys of the manifest at `path`.
///
/// Fails if the file cannot be read or yields no keys.
pub async fn load_manifest(path: &Path) -> Result<Vec<String>, ManifestError> {
    let read_error = |source| ManifestError::Read {
        path: path.to_owned(),
        source,
    };

    let contents = tokio::fs::read(path).await.map_err(read_error)?;
    let keys = parse_manifest(contents.as_slice()).map_err(read_error)?;
    if keys.is_empty() {
        return Err(ManifestError::Empty(path.to_owned()));
    }

    tracing::info!(path = %path.display(), keys = keys.len(), "loaded manifest");
    Ok(keys)
}

/// Appends keys to a manifest file from many tasks at once.
///
/// Appends are serialized internally and every key is flushed to the file before
/// [`append_key`](Self::append_key) returns.
#[derive(Debug)]
pub struct ManifestWriter {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl ManifestWriter {
    /// Creates the manifest at `path`, truncating any existing file.
    pub async fn create(path: &Path) -> Result<Self, ManifestError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await
            .map_err(|source| ManifestError::Create {
                path: path.to_owned(),
                source,
            })?;

        Ok(Self {
            path: path.to_owned(),
            writer: Mutex::new(Some(BufWriter::new(file))),
        })
    }

    /// The path of the manifest file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `key` as a new line.
    pub async fn append_key(&self, key: &str) -> Result<(), ManifestError> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| ManifestError::Closed(self.path.clone()))?;

        write_line(writer, key)
            .await
            .map_err(|source| self.write_error(source))
    }

    /// Flushes and syncs the manifest to disk.
    ///
    /// Later appends fail with [`ManifestError::Closed`]. Closing twice is a no-op.
    pub async fn close(&self) -> Result<(), ManifestError> {
        let Some(mut writer) = self.writer.lock().await.take() else {
            return Ok(());
        };

        writer.flush().await.map_err(|e| self.write_error(e))?;
        writer
            .get_ref()
            .sync_all()
            .await
            .map_err(|e| self.write_error(e))?;

        Ok(())
    }

    fn write_error(&self, source: io::Error) -> ManifestError {
        ManifestError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

async fn write_line(writer: &mut BufWriter<File>, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
