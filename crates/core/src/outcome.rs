//! Terminal outcomes of processing one enqueued path

use std::fmt;
use std::path::{Path, PathBuf};

/// Why a path was not uploaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Path is a directory or special file
    NotAFile,
    /// Matched an ignore pattern
    Excluded,
    /// Not an image or video
    NotMedia,
    /// Status store already records a successful upload
    AlreadyUploaded,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            IgnoreReason::NotAFile => "not a regular file",
            IgnoreReason::Excluded => "matches an ignore pattern",
            IgnoreReason::NotMedia => "not an image or video",
            IgnoreReason::AlreadyUploaded => "already uploaded",
        };
        f.write_str(text)
    }
}

/// Result of processing one path through the worker pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Completed(PathBuf),
    Ignored(PathBuf, IgnoreReason),
    Failed(PathBuf, String),
}

impl UploadOutcome {
    pub fn path(&self) -> &Path {
        match self {
            UploadOutcome::Completed(path)
            | UploadOutcome::Ignored(path, _)
            | UploadOutcome::Failed(path, _) => path,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, UploadOutcome::Completed(_))
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, UploadOutcome::Ignored(..))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, UploadOutcome::Failed(..))
    }
}
