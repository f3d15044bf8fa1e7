//! Record types stored per path

use serde::{Deserialize, Serialize};
use shutter_core::FileStatus;
use std::path::PathBuf;

/// On-disk value stored under a path key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredRecord {
    pub status: FileStatus,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl StoredRecord {
    pub fn new(status: FileStatus, now_ms: u64) -> Self {
        Self {
            status,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    pub fn encode(&self) -> bincode::Result<Vec<u8>> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> bincode::Result<Self> {
        bincode::deserialize(bytes)
    }

    pub fn into_file_record(self, path: PathBuf) -> FileRecord {
        FileRecord {
            path,
            status: self.status,
            created_at_ms: self.created_at_ms,
            updated_at_ms: self.updated_at_ms,
        }
    }
}

/// A tracked file and its last known upload status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub status: FileStatus,
    /// Unix milliseconds, diagnostics only
    pub created_at_ms: u64,
    /// Unix milliseconds, diagnostics only
    pub updated_at_ms: u64,
}

/// Number of records per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub success: usize,
    pub failed: usize,
    pub ignored: usize,
}

impl StatusCounts {
    pub(crate) fn add(&mut self, status: FileStatus) {
        match status {
            FileStatus::Pending => self.pending += 1,
            FileStatus::Success => self.success += 1,
            FileStatus::Failed => self.failed += 1,
            FileStatus::Ignored => self.ignored += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.success + self.failed + self.ignored
    }
}
