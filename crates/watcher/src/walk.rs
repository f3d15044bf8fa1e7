//! Expansion of upload arguments into candidate files

use crate::ignore::IgnoreRules;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Every non-ignored regular file at or below `root`
///
/// Ignored directories are pruned rather than descended into. Symlinks are
/// kept when they point at a regular file and never followed into
/// directories. Unreadable entries are logged and skipped.
pub fn upload_candidates(root: &Path, rules: &IgnoreRules) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !rules.should_ignore(e.path()))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping {}: {}", root.display(), e);
                continue;
            }
        };

        if entry.file_type().is_file() {
            files.push(entry.into_path());
        } else if entry.path_is_symlink() {
            match std::fs::metadata(entry.path()) {
                Ok(target) if target.is_file() => files.push(entry.into_path()),
                Ok(_) => debug!("Skipping symlink {}: not a regular file", entry.path().display()),
                Err(e) => debug!("Skipping dangling symlink {}: {}", entry.path().display(), e),
            }
        }
    }

    debug!("Found {} candidate files under {}", files.len(), root.display());
    files
}
