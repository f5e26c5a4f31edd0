//! Snapshot files plus a sqlite history index

use super::{BackupError, write_atomic};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS backups (
    id            TEXT PRIMARY KEY,
    document_path TEXT NOT NULL,
    snapshot_path TEXT NOT NULL,
    checksum      TEXT NOT NULL,
    size          INTEGER NOT NULL,
    created_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_backups_document
    ON backups(document_path, created_at);
";

/// One immutable snapshot of a document.
#[derive(Debug, Clone, Serialize)]
pub struct BackupRecord {
    pub id: Uuid,
    pub document_path: PathBuf,
    pub snapshot_path: PathBuf,
    /// sha256 of the snapshot bytes, hex-encoded
    pub checksum: String,
    pub size: u64,
    /// RFC 3339 creation timestamp
    pub created_at: String,
}

/// Snapshot storage for mutation transactions.
pub struct BackupStore {
    root: PathBuf,
    conn: Mutex<Connection>,
}

impl BackupStore {
    /// Open or create the store under `root`.
    pub fn open(root: &Path) -> Result<Self, BackupError> {
        fs::create_dir_all(root).map_err(|e| BackupError::Io {
            path: root.to_path_buf(),
            source: e,
        })?;
        let conn = Connection::open(root.join("index.db"))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            root: root.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    /// Snapshot a document's current bytes and append it to the history.
    pub fn snapshot(&self, document: &Path) -> Result<BackupRecord, BackupError> {
        let bytes = fs::read(document).map_err(|e| BackupError::Io {
            path: document.to_path_buf(),
            source: e,
        })?;
        let checksum = hex::encode(Sha256::digest(&bytes));
        let id = Uuid::new_v4();

        let file_name = document
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());
        let id_hex = id.simple().to_string();
        let snapshot_path = self.root.join(format!("{}.{}.bak", file_name, &id_hex[..8]));

        fs::write(&snapshot_path, &bytes).map_err(|e| BackupError::Io {
            path: snapshot_path.clone(),
            source: e,
        })?;

        let record = BackupRecord {
            id,
            document_path: document.to_path_buf(),
            snapshot_path,
            checksum,
            size: bytes.len() as u64,
            created_at: Utc::now().to_rfc3339(),
        };

        let conn = self.conn.lock().expect("backup index lock poisoned");
        conn.execute(
            "INSERT INTO backups (id, document_path, snapshot_path, checksum, size, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            (
                record.id.to_string(),
                record.document_path.to_string_lossy(),
                record.snapshot_path.to_string_lossy(),
                &record.checksum,
                record.size as i64,
                &record.created_at,
            ),
        )?;

        Ok(record)
    }

    /// All records for a document, most recent first.
    pub fn history(&self, document: &Path) -> Result<Vec<BackupRecord>, BackupError> {
        let conn = self.conn.lock().expect("backup index lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, document_path, snapshot_path, checksum, size, created_at
             FROM backups
             WHERE document_path = ?1
             ORDER BY created_at DESC, rowid DESC",
        )?;

        let rows = stmt
            .query_map([document.to_string_lossy()], row_to_parts)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(parts_to_record).collect()
    }

    /// The newest record for a document, if any.
    pub fn latest(&self, document: &Path) -> Result<Option<BackupRecord>, BackupError> {
        Ok(self.history(document)?.into_iter().next())
    }

    /// Fetch a record by id.
    pub fn record(&self, id: Uuid) -> Result<BackupRecord, BackupError> {
        let conn = self.conn.lock().expect("backup index lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, document_path, snapshot_path, checksum, size, created_at
             FROM backups WHERE id = ?1",
        )?;
        let parts = stmt
            .query_row([id.to_string()], row_to_parts)
            .optional()?
            .ok_or(BackupError::RecordNotFound { id })?;
        parts_to_record(parts)
    }

    /// Read a snapshot's bytes, verifying them against the recorded checksum.
    pub fn read_snapshot(&self, record: &BackupRecord) -> Result<Vec<u8>, BackupError> {
        let bytes = fs::read(&record.snapshot_path).map_err(|e| BackupError::Io {
            path: record.snapshot_path.clone(),
            source: e,
        })?;
        let actual = hex::encode(Sha256::digest(&bytes));
        if actual != record.checksum {
            return Err(BackupError::ChecksumMismatch {
                id: record.id,
                expected: record.checksum.clone(),
                actual,
            });
        }
        Ok(bytes)
    }

    /// Re-hash a snapshot and report whether it still matches its record.
    pub fn verify(&self, record: &BackupRecord) -> Result<bool, BackupError> {
        match self.read_snapshot(record) {
            Ok(_) => Ok(true),
            Err(BackupError::ChecksumMismatch { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Overwrite the live document with a snapshot's bytes.
    ///
    /// Refuses a record taken for a different document, and fails loudly if
    /// the snapshot no longer matches its checksum.
    pub fn restore(&self, document: &Path, id: Uuid) -> Result<BackupRecord, BackupError> {
        let record = self.record(id)?;
        if record.document_path != document {
            return Err(BackupError::DocumentMismatch {
                id,
                recorded: record.document_path.clone(),
                requested: document.to_path_buf(),
            });
        }
        let bytes = self.read_snapshot(&record)?;
        write_atomic(document, &bytes).map_err(|e| BackupError::Io {
            path: document.to_path_buf(),
            source: e,
        })?;
        Ok(record)
    }
}

type RowParts = (String, String, String, String, i64, String);

fn row_to_parts(row: &rusqlite::Row<'_>) -> rusqlite::Result<RowParts> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn parts_to_record(parts: RowParts) -> Result<BackupRecord, BackupError> {
    let (id, document_path, snapshot_path, checksum, size, created_at) = parts;
    let id = Uuid::parse_str(&id).map_err(|e| BackupError::InvalidRecord {
        message: format!("bad id '{}': {}", id, e),
    })?;
    Ok(BackupRecord {
        id,
        document_path: PathBuf::from(document_path),
        snapshot_path: PathBuf::from(snapshot_path),
        checksum,
        size: size as u64,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, BackupStore, PathBuf) {
        let dir = TempDir::new().unwrap();
        let store = BackupStore::open(&dir.path().join("backups")).unwrap();
        let doc = dir.path().join("page.html");
        fs::write(&doc, "<p>original</p>").unwrap();
        (dir, store, doc)
    }

    #[test]
    fn test_snapshot_copies_bytes() {
        let (_dir, store, doc) = setup();
        let record = store.snapshot(&doc).unwrap();

        assert!(record.snapshot_path.exists());
        assert_eq!(
            fs::read_to_string(&record.snapshot_path).unwrap(),
            "<p>original</p>"
        );
        assert_eq!(record.size, 15);
        assert_eq!(record.document_path, doc);
    }

    #[test]
    fn test_history_is_most_recent_first() {
        let (_dir, store, doc) = setup();
        let first = store.snapshot(&doc).unwrap();
        fs::write(&doc, "<p>second</p>").unwrap();
        let second = store.snapshot(&doc).unwrap();

        let history = store.history(&doc).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
        assert_eq!(history[1].id, first.id);

        assert_eq!(store.latest(&doc).unwrap().unwrap().id, second.id);
    }

    #[test]
    fn test_history_is_per_document() {
        let (dir, store, doc) = setup();
        let other = dir.path().join("other.html");
        fs::write(&other, "x").unwrap();

        store.snapshot(&doc).unwrap();
        store.snapshot(&other).unwrap();

        assert_eq!(store.history(&doc).unwrap().len(), 1);
        assert_eq!(store.history(&other).unwrap().len(), 1);
    }

    #[test]
    fn test_restore_round_trip() {
        let (_dir, store, doc) = setup();
        let record = store.snapshot(&doc).unwrap();

        fs::write(&doc, "<p>mutated</p>").unwrap();
        store.restore(&doc, record.id).unwrap();

        assert_eq!(fs::read_to_string(&doc).unwrap(), "<p>original</p>");
    }

    #[test]
    fn test_restore_unknown_id() {
        let (_dir, store, doc) = setup();
        let result = store.restore(&doc, Uuid::new_v4());
        assert!(matches!(result, Err(BackupError::RecordNotFound { .. })));
    }

    #[test]
    fn test_restore_rejects_wrong_document() {
        let (dir, store, doc) = setup();
        let record = store.snapshot(&doc).unwrap();

        let other = dir.path().join("other.html");
        fs::write(&other, "x").unwrap();
        let result = store.restore(&other, record.id);
        assert!(matches!(result, Err(BackupError::DocumentMismatch { .. })));
    }

    #[test]
    fn test_tampered_snapshot_fails_checksum() {
        let (_dir, store, doc) = setup();
        let record = store.snapshot(&doc).unwrap();

        fs::write(&record.snapshot_path, "tampered").unwrap();

        let result = store.read_snapshot(&record);
        assert!(matches!(result, Err(BackupError::ChecksumMismatch { .. })));
        assert!(!store.verify(&record).unwrap());

        let result = store.restore(&doc, record.id);
        assert!(matches!(result, Err(BackupError::ChecksumMismatch { .. })));
        // The live document must be untouched after the failed restore
        assert_eq!(fs::read_to_string(&doc).unwrap(), "<p>original</p>");
    }

    #[test]
    fn test_record_lookup() {
        let (_dir, store, doc) = setup();
        let record = store.snapshot(&doc).unwrap();
        let fetched = store.record(record.id).unwrap();
        assert_eq!(fetched.checksum, record.checksum);
        assert_eq!(fetched.snapshot_path, record.snapshot_path);
    }

    #[test]
    fn test_reopen_preserves_index() {
        let (dir, store, doc) = setup();
        store.snapshot(&doc).unwrap();
        drop(store);

        let reopened = BackupStore::open(&dir.path().join("backups")).unwrap();
        assert_eq!(reopened.history(&doc).unwrap().len(), 1);
    }
}
