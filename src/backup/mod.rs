//! Backup snapshots, history, and diffs
//!
//! Every mutation transaction snapshots the document before touching it.
//! Snapshots are plain files under the backup root; the ordered history
//! lives in a sqlite index keyed by document path. Records are append-only
//! and never deleted by the engine; retention is an external policy.

mod diff;
mod store;

pub use diff::{ChangeTag, LineChange, changes_only, diff_lines, render_diff};
pub use store::{BackupRecord, BackupStore};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Errors from snapshot storage and the history index.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup storage error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("backup index error: {0}")]
    Index(#[from] rusqlite::Error),

    #[error("backup record not found: {id}")]
    RecordNotFound { id: Uuid },

    #[error("snapshot {id} failed its checksum (expected {expected}, got {actual})")]
    ChecksumMismatch {
        id: Uuid,
        expected: String,
        actual: String,
    },

    #[error("backup {id} belongs to {recorded}, not {requested}")]
    DocumentMismatch {
        id: Uuid,
        recorded: PathBuf,
        requested: PathBuf,
    },

    #[error("invalid backup record: {message}")]
    InvalidRecord { message: String },
}

/// Write bytes to a sibling temp file, then rename over the destination so
/// readers never observe a partial write.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    let tmp_name = format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple());
    let tmp = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(tmp_name),
        _ => PathBuf::from(tmp_name),
    };

    if let Err(e) = fs::write(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}
