//! File system watching for shutter
//!
//! This crate provides:
//! - notify-backed notification source with watch-root registration
//! - Per-path debouncing of change bursts into settle signals
//! - Ignore rules (built-in temp-file patterns plus user regexes)
//! - Directory walking for one-shot uploads

pub mod coalesce;
pub mod event;
pub mod ignore;
pub mod source;
pub mod walk;

pub use coalesce::{CoalescerConfig, CoalescerStats, EventCoalescer, DEFAULT_EVENT_DELAY};
pub use event::{FsEvent, FsEventKind, WatchAction};
pub use ignore::{IgnoreConfig, IgnoreRules};
pub use source::FsWatcher;
pub use walk::upload_candidates;

/// Errors raised while setting up or running file watching
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("filesystem watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("invalid ignore pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),
}

pub type Result<T> = std::result::Result<T, WatchError>;
