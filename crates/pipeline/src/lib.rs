//! Upload pipeline
//!
//! This crate provides:
//! - The upload operation seam implemented by remote adapters
//! - A bounded-concurrency worker pool with dedup and a drain barrier
//! - The startup retry scan over previously failed files
//! - The outcome reporter that turns results into counters and log lines

pub mod pool;
pub mod reporter;
pub mod retry;
pub mod upload;

// Re-exports
pub use pool::{PoolConfig, UploadPool};
pub use reporter::{OutcomeReporter, UploadSummary};
pub use retry::retry_failed;
pub use upload::{UploadError, UploadOperation};
