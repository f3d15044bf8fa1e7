//! notify-backed filesystem notification source

use crate::event::FsEvent;
use crate::ignore::IgnoreRules;
use crate::Result;
use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// File system watcher
///
/// Every directory is registered non-recursively. In recursive mode a watch
/// root is walked and each non-ignored subdirectory gets its own watch; new
/// directories are added later as the coalescer reports them.
pub struct FsWatcher {
    watcher: Mutex<RecommendedWatcher>,
    rules: Arc<IgnoreRules>,
    recursive: bool,
    /// Directories currently registered with the backend
    watched: Mutex<BTreeSet<PathBuf>>,
}

impl FsWatcher {
    /// Create a watcher that forwards normalized events to `events`
    pub fn new(
        rules: Arc<IgnoreRules>,
        recursive: bool,
        events: mpsc::UnboundedSender<FsEvent>,
    ) -> Result<Self> {
        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    for fs_event in FsEvent::from_notify(event) {
                        if events.send(fs_event).is_err() {
                            // Receiver gone, the pipeline is shutting down
                            return;
                        }
                    }
                }
                Err(e) => warn!("Filesystem watcher error: {}", e),
            }
        })?;

        Ok(Self {
            watcher: Mutex::new(watcher),
            rules,
            recursive,
            watched: Mutex::new(BTreeSet::new()),
        })
    }

    /// Start watching `root`
    ///
    /// Returns the number of directories newly registered.
    pub fn watch(&self, root: &Path) -> Result<usize> {
        if !self.recursive {
            return Ok(usize::from(self.add(root)?));
        }

        let mut added = 0;
        let rules = &self.rules;
        for entry in WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !e.file_type().is_dir() || !rules.should_ignore(e.path()))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() > 0 => {
                    warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if entry.file_type().is_dir() && self.add(entry.path())? {
                added += 1;
            }
        }

        Ok(added)
    }

    /// Stop watching `root` and every registered directory below it
    pub fn unwatch(&self, root: &Path) -> Result<usize> {
        let targets: Vec<PathBuf> = self
            .watched
            .lock()
            .iter()
            .filter(|dir| dir.starts_with(root))
            .cloned()
            .collect();

        let mut watcher = self.watcher.lock();
        let mut watched = self.watched.lock();
        for dir in &targets {
            if let Err(e) = watcher.unwatch(dir) {
                debug!("Failed to unwatch {}: {}", dir.display(), e);
            }
            watched.remove(dir);
        }
        Ok(targets.len())
    }

    /// Directories currently registered
    pub fn watched(&self) -> Vec<PathBuf> {
        self.watched.lock().iter().cloned().collect()
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    fn add(&self, dir: &Path) -> Result<bool> {
        if !self.watched.lock().insert(dir.to_path_buf()) {
            return Ok(false);
        }

        if let Err(e) = self.watcher.lock().watch(dir, RecursiveMode::NonRecursive) {
            self.watched.lock().remove(dir);
            return Err(e.into());
        }

        debug!("Watching {}", dir.display());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ignore::IgnoreConfig;
    use std::fs;
    use tempfile::TempDir;

    fn rules() -> Arc<IgnoreRules> {
        Arc::new(IgnoreRules::new(IgnoreConfig::default()).unwrap())
    }

    #[test]
    fn test_recursive_watch_registers_subdirectories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("2024/june")).unwrap();
        fs::create_dir_all(root.join("2024/july")).unwrap();
        fs::create_dir_all(root.join("@eaDir/thumbs")).unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let watcher = FsWatcher::new(rules(), true, tx).unwrap();

        assert_eq!(watcher.watch(root).unwrap(), 4);
        let watched = watcher.watched();
        assert!(watched.contains(&root.join("2024/june")));
        assert!(!watched.iter().any(|dir| dir.ends_with("thumbs")));

        // Registering again adds nothing
        assert_eq!(watcher.watch(root).unwrap(), 0);

        assert_eq!(watcher.unwatch(&root.join("2024")).unwrap(), 3);
        assert_eq!(watcher.watched(), vec![root.to_path_buf()]);
    }

    #[test]
    fn test_flat_watch_registers_root_only() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("nested")).unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let watcher = FsWatcher::new(rules(), false, tx).unwrap();

        assert_eq!(watcher.watch(temp_dir.path()).unwrap(), 1);
        assert_eq!(watcher.watched(), vec![temp_dir.path().to_path_buf()]);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let watcher = FsWatcher::new(rules(), true, tx).unwrap();

        assert!(watcher.watch(&temp_dir.path().join("missing")).is_err());
        assert!(watcher.watched().is_empty());
    }

    #[tokio::test]
    async fn test_forwards_created_file_events() {
        let temp_dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher = FsWatcher::new(rules(), true, tx).unwrap();
        watcher.watch(temp_dir.path()).unwrap();

        let file = temp_dir.path().join("IMG_0001.JPG");
        fs::write(&file, b"jpeg").unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                match rx.recv().await {
                    Some(event) if event.path.ends_with("IMG_0001.JPG") => return event,
                    Some(_) => continue,
                    None => panic!("watcher channel closed"),
                }
            }
        })
        .await
        .unwrap();

        assert!(!event.kind.is_removal());
    }
}
