//! Upload status of a tracked file

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Last known upload outcome for a path
///
/// The status is a local cache, not proof that the remote side holds the
/// file. It only drives dedup and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileStatus {
    /// Enqueued, upload not finished yet
    Pending,
    /// Uploaded successfully
    Success,
    /// Last upload attempt failed
    Failed,
    /// Excluded from upload
    Ignored,
}

impl FileStatus {
    pub const ALL: [FileStatus; 4] = [
        FileStatus::Pending,
        FileStatus::Success,
        FileStatus::Failed,
        FileStatus::Ignored,
    ];

    pub fn is_success(self) -> bool {
        matches!(self, FileStatus::Success)
    }

    /// Whether a retry scan should pick this file up again
    pub fn needs_retry(self) -> bool {
        !self.is_success()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Success => "success",
            FileStatus::Failed => "failed",
            FileStatus::Ignored => "ignored",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown file status: {0}")]
pub struct ParseStatusError(String);

impl FromStr for FileStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FileStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}
