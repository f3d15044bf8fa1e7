//! Common utilities for integration tests

use async_trait::async_trait;
use cli_lib::Settings;
use journal::StatusStore;
use parking_lot::Mutex;
use pipeline::{UploadError, UploadOperation};
use shutter_core::AlbumTarget;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use watcher::IgnoreConfig;

/// Uploader that records calls instead of talking to a server
#[derive(Default)]
pub struct MockUploader {
    pub uploaded: Mutex<Vec<PathBuf>>,
    pub failing: Mutex<HashSet<PathBuf>>,
    pub delay: Option<Duration>,
}

impl MockUploader {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn fail_on(&self, path: &Path) {
        self.failing.lock().insert(path.to_path_buf());
    }

    pub fn uploaded(&self) -> Vec<PathBuf> {
        self.uploaded.lock().clone()
    }

    pub fn upload_count(&self, path: &Path) -> usize {
        self.uploaded.lock().iter().filter(|p| *p == path).count()
    }
}

#[async_trait]
impl UploadOperation for MockUploader {
    async fn upload(&self, path: &Path, _album: &AlbumTarget) -> Result<(), UploadError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(path) {
            return Err(UploadError::Rejected {
                status: 500,
                body: "server error".into(),
            });
        }
        self.uploaded.lock().push(path.to_path_buf());
        Ok(())
    }
}

/// A photo library directory and a status database, both temporary
pub struct TestLibrary {
    _dir: TempDir,
    pub root: PathBuf,
    pub db_dir: PathBuf,
}

impl TestLibrary {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        // Canonical so paths match what the orchestrator stores
        let base = dir.path().canonicalize().unwrap();
        let root = base.join("photos");
        let db_dir = base.join("db");
        std::fs::create_dir_all(&root).unwrap();

        Self {
            _dir: dir,
            root,
            db_dir,
        }
    }

    pub fn write(&self, relative: &str, contents: &[u8]) -> PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    pub fn open_store(&self) -> Arc<StatusStore> {
        Arc::new(StatusStore::open(&self.db_dir).unwrap())
    }

    pub fn settings(&self) -> Settings {
        Settings {
            auth_file: PathBuf::from("auth.json"),
            uploads: vec![],
            album: AlbumTarget::None,
            max_concurrent: 1,
            watch: vec![],
            watch_recursively: true,
            event_delay: Duration::from_millis(300),
            ignore: IgnoreConfig::default(),
            reupload: false,
            media_only: true,
            db_dir: self.db_dir.clone(),
            log_file: None,
        }
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    condition()
}
