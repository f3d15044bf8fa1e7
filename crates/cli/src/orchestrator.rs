//! Wires the status store, worker pool, reporter and watchers into one run
//!
//! A run goes through these phases:
//! 1. Uploading: every `--upload` path (and the retry scan with `--reupload`)
//!    is enqueued and drained.
//! 2. Watching: only when watch roots are configured. Settled files are
//!    enqueued until the shutdown future resolves.
//! 3. Draining: uploads already in flight finish, the reporter is stopped
//!    and the status database is flushed.

use crate::config::Settings;
use anyhow::{Context, Result};
use journal::StatusStore;
use pipeline::{retry_failed, OutcomeReporter, PoolConfig, UploadOperation, UploadPool, UploadSummary};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::{pin, Pin};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use watcher::{
    upload_candidates, CoalescerConfig, EventCoalescer, FsWatcher, IgnoreRules, WatchAction,
};

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Uploading,
    Watching,
    Draining,
    Stopped,
}

pub struct Orchestrator {
    settings: Settings,
    store: Arc<StatusStore>,
    uploader: Arc<dyn UploadOperation>,
    rules: Arc<IgnoreRules>,
    phase: watch::Sender<Phase>,
}

impl Orchestrator {
    pub fn new(
        settings: Settings,
        store: Arc<StatusStore>,
        uploader: Arc<dyn UploadOperation>,
    ) -> Result<Self> {
        let rules = IgnoreRules::new(settings.ignore.clone()).context("Invalid ignore pattern")?;
        let (phase, _) = watch::channel(Phase::Starting);

        Ok(Self {
            settings,
            store,
            uploader,
            rules: Arc::new(rules),
            phase,
        })
    }

    /// Follow the run's progress
    pub fn phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Upload, then watch until `shutdown` resolves
    ///
    /// Without watch roots the run ends once the startup uploads drained.
    /// In-flight uploads always finish before this returns.
    pub async fn run<F>(self, shutdown: F) -> Result<UploadSummary>
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = pin!(shutdown);

        let (pool, outcomes) = UploadPool::start(
            PoolConfig {
                max_concurrent: self.settings.max_concurrent,
                album: self.settings.album.clone(),
                media_only: self.settings.media_only,
            },
            Arc::clone(&self.store),
            Arc::clone(&self.uploader),
            Arc::clone(&self.rules),
        );
        let reporter_cancel = CancellationToken::new();
        let reporter = OutcomeReporter::new(outcomes).spawn(reporter_cancel.clone());

        self.phase.send_replace(Phase::Uploading);
        let result = self.upload_and_watch(&pool, shutdown.as_mut()).await;

        self.phase.send_replace(Phase::Draining);
        if pool.outstanding() > 0 {
            info!("Waiting for {} uploads to finish", pool.outstanding());
        }
        pool.wait_completed().await;
        pool.shutdown().await;

        reporter_cancel.cancel();
        let summary = reporter.await.context("Outcome reporter failed")?;
        self.store
            .flush()
            .context("Failed to flush status database")?;
        self.phase.send_replace(Phase::Stopped);

        result?;
        Ok(summary)
    }

    async fn upload_and_watch<F>(&self, pool: &UploadPool, mut shutdown: Pin<&mut F>) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        for root in &self.settings.uploads {
            let root = match root.canonicalize() {
                Ok(root) => root,
                Err(e) => {
                    warn!("Can't upload {}: {}", root.display(), e);
                    continue;
                }
            };
            let files = self.scan(root.clone()).await;
            enqueue_files(pool, &root, files);
        }

        if self.settings.reupload {
            retry_failed(&self.store, pool).context("Failed to read status database")?;
        }

        tokio::select! {
            _ = pool.wait_completed() => {}
            _ = shutdown.as_mut() => {
                info!("Shutdown requested during startup uploads");
                return Ok(());
            }
        }

        if !self.settings.is_watching() {
            return Ok(());
        }
        self.watch(pool, shutdown).await
    }

    async fn watch<F>(&self, pool: &UploadPool, mut shutdown: Pin<&mut F>) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (action_tx, mut action_rx) = mpsc::unbounded_channel();

        let fs_watcher = Arc::new(
            FsWatcher::new(
                Arc::clone(&self.rules),
                self.settings.watch_recursively,
                event_tx,
            )
            .context("Failed to create filesystem watcher")?,
        );

        for root in &self.settings.watch {
            let root = root
                .canonicalize()
                .with_context(|| format!("Can't watch {}", root.display()))?;
            let registering = Arc::clone(&fs_watcher);
            let watched = root.clone();
            let added = tokio::task::spawn_blocking(move || registering.watch(&watched))
                .await
                .context("Watch registration panicked")?
                .with_context(|| format!("Failed to watch {}", root.display()))?;
            info!("Watching {} ({} directories)", root.display(), added);
        }

        let cancel = CancellationToken::new();
        let coalescer = EventCoalescer::new(
            CoalescerConfig {
                event_delay: self.settings.event_delay,
                recursive: self.settings.watch_recursively,
            },
            Arc::clone(&self.rules),
            action_tx,
        );
        let coalescer = tokio::spawn(coalescer.run(event_rx, cancel.clone()));

        self.phase.send_replace(Phase::Watching);
        info!("Watching for new files, press Ctrl-C to stop");

        // Directories that appeared while watching, registered and walked off the runtime
        let mut scans: JoinSet<Option<(PathBuf, Vec<PathBuf>)>> = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.as_mut() => {
                    info!("Shutdown requested");
                    break;
                }
                action = action_rx.recv() => match action {
                    Some(action) => self.apply(action, pool, &fs_watcher, &mut scans),
                    None => break,
                },
                Some(joined) = scans.join_next(), if !scans.is_empty() => match joined {
                    Ok(Some((root, files))) => enqueue_files(pool, &root, files),
                    Ok(None) => {}
                    Err(e) => warn!("Directory scan failed: {}", e),
                },
            }
        }

        if !scans.is_empty() {
            debug!("Abandoning {} directory scans after shutdown", scans.len());
        }
        scans.shutdown().await;
        cancel.cancel();
        drop(fs_watcher);
        match coalescer.await {
            Ok(stats) => debug!("Event coalescer stopped: {:?}", stats),
            Err(e) => warn!("Event coalescer failed: {}", e),
        }

        let mut dropped = 0;
        while action_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Dropped {} watch actions after shutdown", dropped);
        }
        Ok(())
    }

    fn apply(
        &self,
        action: WatchAction,
        pool: &UploadPool,
        fs_watcher: &Arc<FsWatcher>,
        scans: &mut JoinSet<Option<(PathBuf, Vec<PathBuf>)>>,
    ) {
        match action {
            WatchAction::Upload(path) => pool.enqueue(path),

            WatchAction::Forget(path) => {
                if let Err(e) = fs_watcher.unwatch(&path) {
                    debug!("Failed to unwatch {}: {}", path.display(), e);
                }
                match self.store.delete(&path) {
                    Ok(true) => info!("Removed {} from status database", path.display()),
                    Ok(false) => {}
                    Err(e) => warn!("Failed to remove {} from status database: {}", path.display(), e),
                }
            }

            WatchAction::WatchDirectory(path) => {
                let fs_watcher = Arc::clone(fs_watcher);
                let rules = Arc::clone(&self.rules);
                scans.spawn_blocking(move || {
                    match fs_watcher.watch(&path) {
                        Ok(0) => return None,
                        Ok(added) => {
                            info!("Watching new directory {} ({} directories)", path.display(), added)
                        }
                        Err(e) => {
                            warn!("Failed to watch {}: {}", path.display(), e);
                            return None;
                        }
                    }
                    // Files moved in together with the directory produce no events of their own
                    let files = upload_candidates(&path, &rules);
                    Some((path, files))
                });
            }
        }
    }

    /// Walk `root` for upload candidates on the blocking pool
    async fn scan(&self, root: PathBuf) -> Vec<PathBuf> {
        let rules = Arc::clone(&self.rules);
        let walked = root.clone();
        match tokio::task::spawn_blocking(move || upload_candidates(&walked, &rules)).await {
            Ok(files) => files,
            Err(e) => {
                warn!("Scan of {} failed: {}", root.display(), e);
                Vec::new()
            }
        }
    }
}

fn enqueue_files(pool: &UploadPool, root: &Path, files: Vec<PathBuf>) {
    info!("Queueing {} files from {}", files.len(), root.display());
    for file in files {
        pool.enqueue(file);
    }
}
