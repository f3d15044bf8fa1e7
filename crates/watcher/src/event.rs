//! Normalized filesystem notifications and the actions derived from them

use notify::event::{EventKind, ModifyKind, RenameMode};
use std::path::PathBuf;

/// One filesystem change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    /// Path that changed
    pub path: PathBuf,
    /// Type of change
    pub kind: FsEventKind,
}

impl FsEvent {
    pub fn new(path: impl Into<PathBuf>, kind: FsEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Translate a notify event into zero or more normalized events
    ///
    /// A rename with both ends known becomes a `Rename` for the old path and a
    /// `Create` for the new one. Access events are dropped.
    pub fn from_notify(event: notify::Event) -> Vec<FsEvent> {
        let notify::Event { kind, paths, .. } = event;

        match kind {
            EventKind::Create(_) => tag(paths, FsEventKind::Create),
            EventKind::Modify(ModifyKind::Name(mode)) => match mode {
                RenameMode::From => tag(paths, FsEventKind::Rename),
                RenameMode::To => tag(paths, FsEventKind::Create),
                RenameMode::Both => paths
                    .into_iter()
                    .enumerate()
                    .map(|(i, path)| {
                        let kind = if i == 0 {
                            FsEventKind::Rename
                        } else {
                            FsEventKind::Create
                        };
                        FsEvent::new(path, kind)
                    })
                    .collect(),
                // Backend could not tell which side of the rename this is
                _ => paths
                    .into_iter()
                    .map(|path| {
                        let kind = if path.exists() {
                            FsEventKind::Create
                        } else {
                            FsEventKind::Rename
                        };
                        FsEvent::new(path, kind)
                    })
                    .collect(),
            },
            EventKind::Modify(_) => tag(paths, FsEventKind::Write),
            EventKind::Remove(_) => tag(paths, FsEventKind::Remove),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
        }
    }
}

fn tag(paths: Vec<PathBuf>, kind: FsEventKind) -> Vec<FsEvent> {
    paths.into_iter().map(|path| FsEvent::new(path, kind)).collect()
}

/// Type of filesystem change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    /// File or directory created
    Create,
    /// Contents or metadata modified
    Write,
    /// Deleted
    Remove,
    /// Moved away from this path
    Rename,
}

impl FsEventKind {
    /// Whether the path is gone after this event
    pub fn is_removal(self) -> bool {
        matches!(self, FsEventKind::Remove | FsEventKind::Rename)
    }
}

/// What the pipeline should do once a path settles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchAction {
    /// File is stable, enqueue it for upload
    Upload(PathBuf),
    /// File was removed or renamed, drop its status record
    Forget(PathBuf),
    /// New directory appeared under a recursive watch root
    WatchDirectory(PathBuf),
}
