//! Bounded-concurrency upload worker pool

use crate::upload::UploadOperation;
use journal::StatusStore;
use shutter_core::{is_media_file, AlbumTarget, FileStatus, IgnoreReason, UploadOutcome};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use watcher::IgnoreRules;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Uploads allowed in flight at once (at least 1)
    pub max_concurrent: usize,
    /// Passed through to every upload
    pub album: AlbumTarget,
    /// Skip files that are not images or videos
    pub media_only: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            album: AlbumTarget::None,
            media_only: true,
        }
    }
}

/// State shared by the dispatcher and every per-path task
struct Shared {
    config: PoolConfig,
    store: Arc<StatusStore>,
    uploader: Arc<dyn UploadOperation>,
    rules: Arc<IgnoreRules>,
    /// Bounds the upload call only; checks and status writes run outside it
    permits: Semaphore,
    /// Enqueued paths without a terminal outcome yet
    outstanding: watch::Sender<usize>,
    outcomes: mpsc::UnboundedSender<UploadOutcome>,
}

/// Worker pool consuming a queue of paths
///
/// `enqueue` never blocks. Each dequeued path gets its own task; at most
/// `max_concurrent` of them are inside the upload call at any moment.
pub struct UploadPool {
    shared: Arc<Shared>,
    queue: mpsc::UnboundedSender<PathBuf>,
    dispatcher: JoinHandle<()>,
    enqueued: AtomicU64,
}

impl UploadPool {
    /// Start the dispatcher task
    ///
    /// Returns the pool and the stream of per-path outcomes. Must be called
    /// from within a tokio runtime.
    pub fn start(
        config: PoolConfig,
        store: Arc<StatusStore>,
        uploader: Arc<dyn UploadOperation>,
        rules: Arc<IgnoreRules>,
    ) -> (Self, mpsc::UnboundedReceiver<UploadOutcome>) {
        let max_concurrent = config.max_concurrent.max(1);
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (outstanding, _) = watch::channel(0usize);

        let shared = Arc::new(Shared {
            config: PoolConfig {
                max_concurrent,
                ..config
            },
            store,
            uploader,
            rules,
            permits: Semaphore::new(max_concurrent),
            outstanding,
            outcomes: outcome_tx,
        });

        info!(
            "Upload pool started ({} concurrent, target: {})",
            max_concurrent, shared.config.album
        );
        let dispatcher = tokio::spawn(dispatch(Arc::clone(&shared), queue_rx));

        let pool = Self {
            shared,
            queue: queue_tx,
            dispatcher,
            enqueued: AtomicU64::new(0),
        };
        (pool, outcome_rx)
    }

    /// Queue a path for upload
    pub fn enqueue(&self, path: PathBuf) {
        self.shared.outstanding.send_modify(|n| *n += 1);
        self.enqueued.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = self.queue.send(path) {
            warn!("Upload pool is shut down, dropping {}", e.0.display());
            self.shared.outstanding.send_modify(|n| *n -= 1);
        }
    }

    /// Wait until every enqueued path has produced its outcome
    pub async fn wait_completed(&self) {
        let mut outstanding = self.shared.outstanding.subscribe();
        // The sender lives in `shared`, so this cannot observe a closed channel
        let _ = outstanding.wait_for(|n| *n == 0).await;
    }

    /// Paths enqueued and not finished yet
    pub fn outstanding(&self) -> usize {
        *self.shared.outstanding.borrow()
    }

    /// Total paths ever enqueued
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Upload calls running right now
    pub fn uploads_in_flight(&self) -> usize {
        self.shared.config.max_concurrent - self.shared.permits.available_permits()
    }

    /// Stop accepting paths and wait for every dispatched task
    pub async fn shutdown(self) {
        let UploadPool {
            queue, dispatcher, ..
        } = self;
        drop(queue);
        if let Err(e) = dispatcher.await {
            error!("Upload dispatcher failed: {}", e);
        }
    }
}

async fn dispatch(shared: Arc<Shared>, mut queue: mpsc::UnboundedReceiver<PathBuf>) {
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            path = queue.recv() => match path {
                Some(path) => {
                    tasks.spawn(process(Arc::clone(&shared), path));
                }
                None => break,
            },

            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    error!("Upload task failed: {}", e);
                }
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!("Upload task failed: {}", e);
        }
    }
    debug!("Upload dispatcher stopped");
}

async fn process(shared: Arc<Shared>, path: PathBuf) {
    let _outstanding = OutstandingGuard(&shared.outstanding);

    let outcome = shared.handle(path).await;
    // Sent before the guard drops, so a drained pool has reported everything
    if shared.outcomes.send(outcome).is_err() {
        debug!("Outcome receiver closed");
    }
}

impl Shared {
    async fn handle(&self, path: PathBuf) -> UploadOutcome {
        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!("{} is gone: {}", path.display(), e);
                self.record_failure(&path).await;
                return UploadOutcome::Failed(path, "file disappeared".to_string());
            }
        };
        if let Some(reason) = self.exclusion(&path, &metadata) {
            return UploadOutcome::Ignored(path, reason);
        }

        match self.store.status(&path) {
            Ok(Some(FileStatus::Success)) => {
                return UploadOutcome::Ignored(path, IgnoreReason::AlreadyUploaded);
            }
            Ok(_) => {}
            Err(e) => return UploadOutcome::Failed(path, format!("status store: {}", e)),
        }

        if let Err(e) = self.store.upsert_pending(&path) {
            return UploadOutcome::Failed(path, format!("status store: {}", e));
        }

        let result = {
            let _permit = match self.permits.acquire().await {
                Ok(permit) => permit,
                Err(e) => return UploadOutcome::Failed(path, e.to_string()),
            };
            debug!("Uploading {}", path.display());
            self.uploader.upload(&path, &self.config.album).await
        };

        match result {
            Ok(()) => match self.store.record_outcome(&path, FileStatus::Success) {
                Ok(()) => {
                    self.flush().await;
                    UploadOutcome::Completed(path)
                }
                Err(e) => UploadOutcome::Failed(
                    path,
                    format!("uploaded, but failed to record status: {}", e),
                ),
            },
            Err(cause) => {
                self.record_failure(&path).await;
                UploadOutcome::Failed(path, cause.to_string())
            }
        }
    }

    /// Store a Failed status; the outcome is reported either way
    async fn record_failure(&self, path: &Path) {
        match self.store.record_outcome(path, FileStatus::Failed) {
            Ok(()) => self.flush().await,
            Err(e) => warn!("Failed to record failure for {}: {}", path.display(), e),
        }
    }

    async fn flush(&self) {
        if let Err(e) = self.store.flush_async().await {
            warn!("Failed to flush status database: {}", e);
        }
    }

    /// Reasons an existing path is not eligible, checked before touching the store
    fn exclusion(&self, path: &Path, metadata: &Metadata) -> Option<IgnoreReason> {
        if !metadata.is_file() {
            return Some(IgnoreReason::NotAFile);
        }

        if self.rules.should_ignore(path) {
            return Some(IgnoreReason::Excluded);
        }

        if self.config.media_only && !is_media_file(path) {
            return Some(IgnoreReason::NotMedia);
        }

        None
    }
}

/// Decrements the outstanding counter when a task finishes, even on panic
struct OutstandingGuard<'a>(&'a watch::Sender<usize>);

impl Drop for OutstandingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}
