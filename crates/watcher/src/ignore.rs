//! Ignore pattern management for shutter
//!
//! Two sources of ignore patterns:
//! 1. Built-in patterns (system metadata, editor and partial-download temp
//!    files, thumbnail caches) - on unless disabled
//! 2. User patterns from the command line or config file: regular
//!    expressions, matched anywhere in the full path

use crate::Result;
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Directory names that never hold uploadable originals
const BUILTIN_DIRS: &[&str] = &[
    ".git",
    ".Trash",
    ".Trashes",
    ".thumbnails",
    ".Spotlight-V100",
    ".fseventsd",
    "@eaDir",
    "$RECYCLE.BIN",
];

/// Ignore rule set
///
/// Built-in patterns are checked first, then user patterns. A user pattern
/// ignores a path when it matches anywhere in the path's full text, so
/// `/screenshots/` excludes everything below such a directory.
#[derive(Debug)]
pub struct IgnoreRules {
    /// Compiled user patterns (None when no patterns were given)
    user: Option<RegexSet>,

    /// Configuration
    config: IgnoreConfig,
}

impl IgnoreRules {
    /// Compile the rule set
    pub fn new(config: IgnoreConfig) -> Result<Self> {
        let user = if config.patterns.is_empty() {
            None
        } else {
            Some(RegexSet::new(&config.patterns)?)
        };

        Ok(Self { user, config })
    }

    /// Rules that ignore nothing
    pub fn none() -> Self {
        Self {
            user: None,
            config: IgnoreConfig {
                use_builtin: false,
                patterns: Vec::new(),
            },
        }
    }

    /// Check if path should be ignored
    ///
    /// Returns true if the path matches any ignore pattern
    pub fn should_ignore(&self, path: &Path) -> bool {
        // 1. Built-in patterns
        if self.config.use_builtin && self.is_builtin_ignored(path) {
            return true;
        }

        // 2. User patterns, against the full path
        match self.user {
            Some(ref user) => user.is_match(&path.to_string_lossy()),
            None => false,
        }
    }

    /// Check if path matches built-in ignore patterns
    fn is_builtin_ignored(&self, path: &Path) -> bool {
        let in_builtin_dir = path.components().any(|component| {
            component
                .as_os_str()
                .to_str()
                .map(|name| BUILTIN_DIRS.contains(&name))
                .unwrap_or(false)
        });
        if in_builtin_dir {
            return true;
        }

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("");

        self.matches_temp_file(filename)
    }

    /// Check if filename is a system, editor or partial-download temp file
    fn matches_temp_file(&self, filename: &str) -> bool {
        // Vim swap files
        if filename.ends_with(".swp") || filename.ends_with(".swo") {
            return true;
        }

        // Backup files (~)
        if filename.ends_with('~') {
            return true;
        }

        // Emacs auto-save and lock files
        if (filename.len() > 1 && filename.starts_with('#') && filename.ends_with('#'))
            || filename.starts_with(".#")
        {
            return true;
        }

        // MacOS system files
        if filename == ".DS_Store" || filename.starts_with("._") {
            return true;
        }

        // Windows system files
        if filename == "Thumbs.db" || filename == "desktop.ini" {
            return true;
        }

        // Files still being written by a browser, sync client or camera import
        let lower = filename.to_ascii_lowercase();
        lower.ends_with(".part")
            || lower.ends_with(".partial")
            || lower.ends_with(".crdownload")
            || lower.ends_with(".download")
            || lower.ends_with(".tmp")
    }

    /// Get number of active ignore sources
    pub fn active_sources(&self) -> usize {
        let mut count = 0;
        if self.config.use_builtin {
            count += 1;
        }
        if self.user.is_some() {
            count += 1;
        }
        count
    }

    pub fn patterns(&self) -> &[String] {
        &self.config.patterns
    }
}

/// Ignore configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreConfig {
    /// Apply built-in temp-file patterns (default: true)
    #[serde(default = "default_true")]
    pub use_builtin: bool,

    /// Regular expressions matched against the full path
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            use_builtin: true,
            patterns: vec![],
        }
    }
}

fn default_true() -> bool {
    true
}
