//! Durable upload status tracking
//!
//! This crate provides:
//! - One record per absolute file path (sled embedded DB)
//! - Dedup and retry queries over the recorded statuses
//! - Schema versioning, created on first open

pub mod record;
pub mod store;

// Re-exports
pub use record::{FileRecord, StatusCounts};
pub use store::{StatusStore, StoreError};

/// Result type for status store operations
pub type Result<T> = std::result::Result<T, StoreError>;
