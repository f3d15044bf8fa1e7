//! The remote upload seam

use async_trait::async_trait;
use shutter_core::AlbumTarget;
use std::path::{Path, PathBuf};

/// Why a single upload attempt failed
///
/// The pool records every variant as Failed; the distinction only shows up
/// in log lines.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("upload rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("{0}")]
    Other(String),
}

/// Uploads one file to the remote service
///
/// Implementations own their credentials. Latency is unbounded; the pool
/// never cancels a call once dispatched.
#[async_trait]
pub trait UploadOperation: Send + Sync {
    async fn upload(&self, path: &Path, album: &AlbumTarget) -> Result<(), UploadError>;
}
