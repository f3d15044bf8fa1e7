//! Per-path debouncing of filesystem notifications
//!
//! Operating systems often report a single logical write several times
//! (temp-file swaps, multiple flushes). The coalescer keeps one timer per path
//! and only acts once the path has been quiet for the configured delay.
//!
//! The timer map is owned by the coalescer task alone; notifications arrive
//! over a channel, so no lock guards it.

use crate::event::{FsEvent, FsEventKind, WatchAction};
use crate::ignore::IgnoreRules;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::time::delay_queue::{DelayQueue, Key};
use tracing::{debug, info, trace};

pub const DEFAULT_EVENT_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy)]
pub struct CoalescerConfig {
    /// Quiet period after the last event before a path settles
    pub event_delay: Duration,
    /// Register settled directories as new watch roots
    pub recursive: bool,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            event_delay: DEFAULT_EVENT_DELAY,
            recursive: true,
        }
    }
}

/// Counters reported when the coalescer stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoalescerStats {
    pub events_received: u64,
    /// Timers pushed back by a newer event for the same path
    pub timers_reset: u64,
    /// Timers dropped by a remove/rename
    pub timers_cancelled: u64,
    pub uploads: u64,
    pub forgets: u64,
    pub directories: u64,
    /// Settled paths that were missing or ignored
    pub dropped: u64,
}

/// Debounces raw notifications into [`WatchAction`]s
pub struct EventCoalescer {
    config: CoalescerConfig,
    rules: Arc<IgnoreRules>,
    /// path -> pending timer
    timers: HashMap<PathBuf, Key>,
    queue: DelayQueue<PathBuf>,
    actions: mpsc::UnboundedSender<WatchAction>,
    stats: CoalescerStats,
}

impl EventCoalescer {
    pub fn new(
        config: CoalescerConfig,
        rules: Arc<IgnoreRules>,
        actions: mpsc::UnboundedSender<WatchAction>,
    ) -> Self {
        Self {
            config,
            rules,
            timers: HashMap::new(),
            queue: DelayQueue::new(),
            actions,
            stats: CoalescerStats::default(),
        }
    }

    /// Run until the event stream closes or `cancel` fires
    ///
    /// Timers still pending on exit are dropped without acting.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<FsEvent>,
        cancel: CancellationToken,
    ) -> CoalescerStats {
        info!(
            "Coalescing filesystem events (delay: {:?}, recursive: {})",
            self.config.event_delay, self.config.recursive
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },

                Some(expired) = self.queue.next(), if !self.queue.is_empty() => {
                    self.settle(expired.into_inner());
                }
            }
        }

        if !self.timers.is_empty() {
            debug!("Dropping {} pending timers on shutdown", self.timers.len());
        }
        self.stats
    }

    /// Number of paths waiting to settle
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    pub fn stats(&self) -> CoalescerStats {
        self.stats
    }

    /// Apply one raw notification to the timer map
    pub fn handle_event(&mut self, event: FsEvent) {
        self.stats.events_received += 1;
        trace!("{:?} {}", event.kind, event.path.display());

        match event.kind {
            FsEventKind::Create | FsEventKind::Write => {
                if let Some(key) = self.timers.get(&event.path) {
                    self.queue.reset(key, self.config.event_delay);
                    self.stats.timers_reset += 1;
                } else {
                    let key = self.queue.insert(event.path.clone(), self.config.event_delay);
                    self.timers.insert(event.path, key);
                }
            }
            FsEventKind::Remove | FsEventKind::Rename => {
                if let Some(key) = self.timers.remove(&event.path) {
                    self.queue.remove(&key);
                    self.stats.timers_cancelled += 1;
                }

                if self.rules.should_ignore(&event.path) {
                    return;
                }

                self.stats.forgets += 1;
                self.emit(WatchAction::Forget(event.path));
            }
        }
    }

    /// A timer fired without being superseded
    fn settle(&mut self, path: PathBuf) {
        self.timers.remove(&path);
        debug!("Consuming settled events for {}", path.display());

        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!("Settled path {} is gone: {}", path.display(), e);
                self.stats.dropped += 1;
                return;
            }
        };

        if self.rules.should_ignore(&path) {
            debug!("Ignored {}", path.display());
            self.stats.dropped += 1;
            return;
        }

        if metadata.is_dir() {
            if self.config.recursive {
                self.stats.directories += 1;
                self.emit(WatchAction::WatchDirectory(path));
            } else {
                self.stats.dropped += 1;
            }
            return;
        }

        self.stats.uploads += 1;
        self.emit(WatchAction::Upload(path));
    }

    fn emit(&self, action: WatchAction) {
        if let Err(e) = self.actions.send(action) {
            debug!("Watch action receiver closed, dropping {:?}", e.0);
        }
    }
}
