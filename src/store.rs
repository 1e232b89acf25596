//! Line-oriented and whole-file JSON storage.
//!
//! Batch output is JSON Lines (one record per line, in planned order);
//! manifests and reports are pretty-printed JSON documents. Whole-file
//! rewrites go through a temp file and a rename so a crash never leaves a
//! half-written file behind.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path} at line {line}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize record for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Write `bytes` to a sibling temp file, then rename it over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    fs::write(&temp_path, bytes)?;
    fs::rename(&temp_path, path).inspect_err(|_| {
        let _ = fs::remove_file(&temp_path);
    })
}

/// One record per line, every line newline-terminated.
fn to_line<T: Serialize>(path: &Path, record: &T) -> Result<String, StoreError> {
    let mut line = serde_json::to_string(record).map_err(|source| StoreError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    line.push('\n');
    Ok(line)
}

/// Replace the file with exactly `records`.
pub fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<(), StoreError> {
    let body = records
        .iter()
        .map(|record| to_line(path, record))
        .collect::<Result<String, _>>()?;
    write_atomic(path, body.as_bytes()).map_err(|e| StoreError::io(path, e))
}

/// Append one record to the end of the file.
pub fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> Result<(), StoreError> {
    let line = to_line(path, record)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(path, e))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| StoreError::io(path, e))?;
    file.write_all(line.as_bytes()).map_err(|e| StoreError::io(path, e))
}

/// Read every record. A missing file reads as empty; blank lines are skipped.
///
/// A final line without a newline that fails to parse is an interrupted
/// append: it is skipped with a warning instead of failing the read.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    let terminated = content.is_empty() || content.ends_with('\n');
    let last_line = content.lines().count();

    let mut records = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(source) if !terminated && index + 1 == last_line => {
                warn!(path = %path.display(), line = index + 1, error = %source, "skipping truncated final line");
            }
            Err(source) => {
                return Err(StoreError::Parse {
                    path: path.to_path_buf(),
                    line: index + 1,
                    source,
                });
            }
        }
    }
    Ok(records)
}

/// Write `value` as pretty-printed JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let body = serde_json::to_string_pretty(value).map_err(|source| StoreError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, body.as_bytes()).map_err(|e| StoreError::io(path, e))
}

/// Read a JSON document, or `None` if the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| StoreError::Parse {
            path: path.to_path_buf(),
            line: source.line(),
            source,
        })
}
