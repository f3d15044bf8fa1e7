//! Shared helpers for CLI output

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Format timestamp as relative time ("2 hours ago")
pub fn format_relative_time(ts_ms: u64) -> String {
    let datetime = UNIX_EPOCH + Duration::from_millis(ts_ms);

    match SystemTime::now().duration_since(datetime) {
        Ok(elapsed) => format_elapsed(elapsed.as_secs()),
        Err(_) => "in the future".to_string(),
    }
}

fn format_elapsed(seconds: u64) -> String {
    if seconds < 60 {
        format!("{} seconds ago", seconds)
    } else if seconds < 3600 {
        format!("{} minutes ago", seconds / 60)
    } else if seconds < 86400 {
        format!("{} hours ago", seconds / 3600)
    } else if seconds < 604800 {
        format!("{} days ago", seconds / 86400)
    } else {
        format!("{} weeks ago", seconds / 604800)
    }
}

/// Show `path` relative to the current directory when it lies below it
pub fn display_path(path: &Path) -> PathBuf {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(cwd).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(5), "5 seconds ago");
        assert_eq!(format_elapsed(120), "2 minutes ago");
        assert_eq!(format_elapsed(7200), "2 hours ago");
        assert_eq!(format_elapsed(172800), "2 days ago");
        assert_eq!(format_elapsed(1209600), "2 weeks ago");
    }

    #[test]
    fn test_future_timestamp() {
        let future = shutter_core::now_ms() + 60_000;
        assert_eq!(format_relative_time(future), "in the future");
    }
}
