//! Path -> upload status store using sled

use crate::record::{FileRecord, StatusCounts, StoredRecord};
use crate::Result;
use shutter_core::{now_ms, FileStatus};
use sled::{Db, IVec, Tree};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Current on-disk layout version
const SCHEMA_VERSION: u32 = 1;
const SCHEMA_KEY: &[u8] = b"schema_version";
const FILES_TREE: &str = "files";

/// Errors reported by the status store
///
/// The store never retries on its own; callers decide what a failure means.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("status database error: {0}")]
    Db(#[from] sled::Error),

    #[error("corrupt status record: {0}")]
    Codec(#[from] bincode::Error),

    #[error("status database schema v{found} is newer than supported v{supported}")]
    UnsupportedSchema { found: u32, supported: u32 },
}

/// Durable mapping from absolute file path to upload status
///
/// Every operation is safe to call from many tasks at once: single-key
/// read-modify-write cycles go through sled compare-and-swap.
pub struct StatusStore {
    /// Sled database (holds the schema version in its default tree)
    db: Db,
    /// path bytes -> bincode(StoredRecord)
    files: Tree,
}

impl StatusStore {
    /// Open or create the status database under `dir`
    ///
    /// There is no background flusher; terminal statuses are made durable
    /// through [`StatusStore::flush_async`] and the final [`StatusStore::flush`].
    pub fn open(dir: &Path) -> Result<Self> {
        let db = sled::Config::new()
            .path(dir.join("status.db"))
            .flush_every_ms(None)
            .open()?;
        let store = Self::from_db(db)?;
        info!("Opened status store at {} ({} records)", dir.display(), store.count());
        Ok(store)
    }

    /// Open a throwaway store that is removed when dropped
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    /// Build a store on an already opened sled database
    ///
    /// Records live in the `files` tree; the default tree holds the schema version.
    pub fn from_db(db: Db) -> Result<Self> {
        match db.get(SCHEMA_KEY)? {
            Some(raw) => {
                let found = decode_version(&raw);
                if found > SCHEMA_VERSION {
                    return Err(StoreError::UnsupportedSchema {
                        found,
                        supported: SCHEMA_VERSION,
                    });
                }
            }
            None => {
                db.insert(SCHEMA_KEY, SCHEMA_VERSION.to_le_bytes().to_vec())?;
            }
        }

        let files = db.open_tree(FILES_TREE)?;
        Ok(Self { db, files })
    }

    /// Create a Pending record if the path is untracked
    ///
    /// An existing record keeps its status, so a Success is never downgraded.
    /// Returns the status the path holds afterwards.
    pub fn upsert_pending(&self, path: &Path) -> Result<FileStatus> {
        let now = now_ms();
        let record = self.update(path, |current| match current {
            Some(_) => None,
            None => Some(StoredRecord::new(FileStatus::Pending, now)),
        })?;
        Ok(record.map(|r| r.status).unwrap_or(FileStatus::Pending))
    }

    /// Set the status for a path unconditionally
    pub fn record_outcome(&self, path: &Path, status: FileStatus) -> Result<()> {
        let now = now_ms();
        self.update(path, |current| {
            let mut record = current.unwrap_or_else(|| StoredRecord::new(status, now));
            record.status = status;
            record.updated_at_ms = now;
            Some(record)
        })?;
        debug!("Recorded {} for {}", status, path.display());
        Ok(())
    }

    /// Remove the record for a path
    ///
    /// Returns whether a record existed. Deleting an untracked path is a no-op.
    pub fn delete(&self, path: &Path) -> Result<bool> {
        let removed = self.files.remove(path_key(path))?;
        Ok(removed.is_some())
    }

    /// Every tracked path whose status is not Success
    pub fn list_not_success(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for item in self.files.iter() {
            let (key, value) = item?;
            let record = StoredRecord::decode(&value)?;
            if record.status.needs_retry() {
                paths.push(key_path(&key));
            }
        }
        Ok(paths)
    }

    /// Every tracked record with the given status
    pub fn list_with_status(&self, status: FileStatus) -> Result<Vec<FileRecord>> {
        let mut records = Vec::new();
        for item in self.files.iter() {
            let (key, value) = item?;
            let record = StoredRecord::decode(&value)?;
            if record.status == status {
                records.push(record.into_file_record(key_path(&key)));
            }
        }
        Ok(records)
    }

    /// Full record for a path, if tracked
    pub fn get(&self, path: &Path) -> Result<Option<FileRecord>> {
        match self.files.get(path_key(path))? {
            Some(raw) => {
                let record = StoredRecord::decode(&raw)?;
                Ok(Some(record.into_file_record(path.to_path_buf())))
            }
            None => Ok(None),
        }
    }

    /// Status for a path, if tracked
    pub fn status(&self, path: &Path) -> Result<Option<FileStatus>> {
        Ok(self.get(path)?.map(|record| record.status))
    }

    /// Number of tracked paths
    pub fn count(&self) -> usize {
        self.files.len()
    }

    pub fn counts_by_status(&self) -> Result<StatusCounts> {
        let mut counts = StatusCounts::default();
        for item in self.files.iter() {
            let (_, value) = item?;
            counts.add(StoredRecord::decode(&value)?.status);
        }
        Ok(counts)
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Flush pending writes without blocking the calling task
    pub async fn flush_async(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    /// Compare-and-swap loop over a single record
    ///
    /// `f` sees the current record and returns the replacement, or `None` to
    /// leave it untouched. Returns the record stored afterwards.
    fn update<F>(&self, path: &Path, mut f: F) -> Result<Option<StoredRecord>>
    where
        F: FnMut(Option<StoredRecord>) -> Option<StoredRecord>,
    {
        let key = path_key(path);
        loop {
            let current: Option<IVec> = self.files.get(&key)?;
            let previous = current
                .as_deref()
                .map(StoredRecord::decode)
                .transpose()?;

            let next = match f(previous) {
                Some(next) => next,
                None => return Ok(previous),
            };

            let encoded = next.encode()?;
            match self.files.compare_and_swap(&key, current, Some(encoded))? {
                Ok(()) => return Ok(Some(next)),
                // Lost a race with another writer, re-read and retry
                Err(_) => continue,
            }
        }
    }
}

fn decode_version(raw: &[u8]) -> u32 {
    raw.try_into().map(u32::from_le_bytes).unwrap_or(0)
}

#[cfg(unix)]
fn path_key(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(unix)]
fn key_path(key: &[u8]) -> PathBuf {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(OsStr::from_bytes(key))
}

#[cfg(not(unix))]
fn path_key(path: &Path) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}

#[cfg(not(unix))]
fn key_path(key: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(key).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_upsert_creates_pending() {
        let store = StatusStore::temporary().unwrap();
        let path = Path::new("/photos/a.jpg");

        assert_eq!(store.status(path).unwrap(), None);
        assert_eq!(store.upsert_pending(path).unwrap(), FileStatus::Pending);
        assert_eq!(store.status(path).unwrap(), Some(FileStatus::Pending));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_upsert_never_downgrades_success() {
        let store = StatusStore::temporary().unwrap();
        let path = Path::new("/photos/a.jpg");

        store.record_outcome(path, FileStatus::Success).unwrap();
        let before = store.get(path).unwrap().unwrap();

        assert_eq!(store.upsert_pending(path).unwrap(), FileStatus::Success);
        let after = store.get(path).unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_record_outcome_overwrites_and_keeps_created_at() {
        let store = StatusStore::temporary().unwrap();
        let path = Path::new("/photos/a.jpg");

        store.upsert_pending(path).unwrap();
        let created = store.get(path).unwrap().unwrap().created_at_ms;

        store.record_outcome(path, FileStatus::Failed).unwrap();
        store.record_outcome(path, FileStatus::Success).unwrap();

        let record = store.get(path).unwrap().unwrap();
        assert_eq!(record.status, FileStatus::Success);
        assert_eq!(record.created_at_ms, created);
        assert!(record.updated_at_ms >= created);
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = StatusStore::temporary().unwrap();
        let path = Path::new("/photos/a.jpg");

        store.record_outcome(path, FileStatus::Success).unwrap();
        assert!(store.delete(path).unwrap());
        assert!(!store.delete(path).unwrap());
        assert_eq!(store.status(path).unwrap(), None);

        // Next occurrence is treated as new
        assert_eq!(store.upsert_pending(path).unwrap(), FileStatus::Pending);
    }

    #[test]
    fn test_list_not_success() {
        let store = StatusStore::temporary().unwrap();
        store.record_outcome(Path::new("/a.jpg"), FileStatus::Success).unwrap();
        store.record_outcome(Path::new("/b.jpg"), FileStatus::Failed).unwrap();
        store.upsert_pending(Path::new("/c.jpg")).unwrap();
        store.record_outcome(Path::new("/d.jpg"), FileStatus::Ignored).unwrap();

        let found: HashSet<PathBuf> = store.list_not_success().unwrap().into_iter().collect();
        let expected: HashSet<PathBuf> = ["/b.jpg", "/c.jpg", "/d.jpg"]
            .iter()
            .map(PathBuf::from)
            .collect();
        assert_eq!(found, expected);

        let counts = store.counts_by_status().unwrap();
        assert_eq!(counts.success, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.ignored, 1);
        assert_eq!(counts.total(), 4);

        let failed = store.list_with_status(FileStatus::Failed).unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].path, PathBuf::from("/b.jpg"));
    }

    /// Reopen `dir`, waiting out sled's io threads releasing the file lock
    fn reopen(dir: &Path) -> StatusStore {
        let mut attempts = 0;
        loop {
            match StatusStore::open(dir) {
                Ok(store) => return store,
                Err(StoreError::Db(sled::Error::Io(_))) if attempts < 100 => {
                    attempts += 1;
                    std::thread::sleep(std::time::Duration::from_millis(20));
                }
                Err(e) => panic!("reopen failed: {}", e),
            }
        }
    }

    #[test]
    fn test_records_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();

        {
            let store = StatusStore::open(temp_dir.path()).unwrap();
            store.record_outcome(Path::new("/a.jpg"), FileStatus::Success).unwrap();
            store.record_outcome(Path::new("/b.jpg"), FileStatus::Failed).unwrap();
            store.flush().unwrap();
        }

        let store = reopen(temp_dir.path());
        assert_eq!(store.count(), 2);
        assert_eq!(store.status(Path::new("/a.jpg")).unwrap(), Some(FileStatus::Success));
        assert_eq!(store.status(Path::new("/b.jpg")).unwrap(), Some(FileStatus::Failed));
    }

    #[test]
    fn test_rejects_newer_schema() {
        let temp_dir = TempDir::new().unwrap();

        {
            let db = sled::Config::new()
                .path(temp_dir.path().join("status.db"))
                .flush_every_ms(None)
                .open()
                .unwrap();
            db.insert(SCHEMA_KEY, (SCHEMA_VERSION + 1).to_le_bytes().to_vec()).unwrap();
            db.flush().unwrap();
        }

        let mut result = StatusStore::open(temp_dir.path());
        let mut attempts = 0;
        while matches!(result, Err(StoreError::Db(sled::Error::Io(_)))) && attempts < 100 {
            attempts += 1;
            std::thread::sleep(std::time::Duration::from_millis(20));
            result = StatusStore::open(temp_dir.path());
        }

        match result {
            Err(StoreError::UnsupportedSchema { found, supported }) => {
                assert_eq!(found, SCHEMA_VERSION + 1);
                assert_eq!(supported, SCHEMA_VERSION);
            }
            other => panic!("expected schema error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_concurrent_writers_keep_one_record() {
        let store = Arc::new(StatusStore::temporary().unwrap());
        let path = PathBuf::from("/photos/shared.jpg");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let path = path.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        store.upsert_pending(&path).unwrap();
                        let status = if i % 2 == 0 {
                            FileStatus::Failed
                        } else {
                            FileStatus::Success
                        };
                        store.record_outcome(&path, status).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.count(), 1);
        assert!(store.status(&path).unwrap().is_some());
    }
}
