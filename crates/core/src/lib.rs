//! Shared vocabulary for the shutter upload pipeline
//!
//! This crate provides:
//! - File status values persisted by the status store
//! - Album targets passed through to the upload operation
//! - Upload outcomes emitted by the worker pool
//! - Media eligibility checks

pub mod album;
pub mod media;
pub mod outcome;
pub mod status;

// Re-exports
pub use album::AlbumTarget;
pub use media::{is_media_file, MediaKind};
pub use outcome::{IgnoreReason, UploadOutcome};
pub use status::{FileStatus, ParseStatusError};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in Unix milliseconds
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
