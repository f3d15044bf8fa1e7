//! Startup retry of files whose last upload did not succeed

use crate::pool::UploadPool;
use journal::StatusStore;
use tracing::info;

/// Enqueue every tracked path whose status is not Success
///
/// Paths go through the same dedup and ignore checks as any other upload.
/// Returns the number of paths enqueued.
pub fn retry_failed(store: &StatusStore, pool: &UploadPool) -> journal::Result<usize> {
    let paths = store.list_not_success()?;
    let count = paths.len();

    for path in paths {
        pool.enqueue(path);
    }

    info!("Re-uploading {} previously failed files", count);
    Ok(count)
}
