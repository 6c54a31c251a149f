//! Output artifact writer
//!
//! Serializes a [`RecordSet`] into one JSON document and replaces the
//! destination atomically: the bytes go to a temporary file in the same
//! directory, which is synced and then renamed over the destination.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::info;

use crate::domain::{ItemReference, Record, RecordSet, render_url_list};

/// Order of records in the artifact, stated in the artifact itself
pub const RECORD_ORDERING: &str = "sequence_index";

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to serialize records: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OutputError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Serialize)]
struct RecordCollection<'a> {
    record: &'a [Record],
}

#[derive(Serialize)]
struct Artifact<'a> {
    ordering: &'static str,
    records: RecordCollection<'a>,
}

/// Render the artifact bytes for a record set
pub fn render_records(records: &RecordSet) -> Result<Vec<u8>, OutputError> {
    let artifact = Artifact {
        ordering: RECORD_ORDERING,
        records: RecordCollection {
            record: records.records(),
        },
    };
    let mut bytes = serde_json::to_vec_pretty(&artifact)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Write a record set to `destination`, replacing any previous artifact
pub fn write_records(records: &RecordSet, destination: &Path) -> Result<(), OutputError> {
    let bytes = render_records(records)?;
    atomic_write(destination, &bytes)?;
    info!(
        path = %destination.display(),
        records = records.len(),
        failures = records.failures().len(),
        "Saved record set"
    );
    Ok(())
}

/// Write the discovered URL list, one URL per line
pub fn write_url_list(items: &[ItemReference], destination: &Path) -> Result<(), OutputError> {
    atomic_write(destination, render_url_list(items).as_bytes())?;
    info!(path = %destination.display(), urls = items.len(), "Saved URL list");
    Ok(())
}

/// Replace `path` with `contents` without ever exposing a partial file
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), OutputError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| OutputError::io(dir, e))?;

    let mut temp = NamedTempFile::new_in(dir).map_err(|e| OutputError::io(dir, e))?;
    temp.write_all(contents)
        .and_then(|()| temp.flush())
        .and_then(|()| temp.as_file_mut().sync_all())
        .map_err(|e| OutputError::io(temp.path(), e))?;

    temp.persist(path)
        .map_err(|e| OutputError::io(path, e.error))?;
    Ok(())
}
