//! Watch task
//!
//! Attaches a recursive file watcher to the library directory. Raw events
//! are forwarded to the workspace event channel as [`FileEvent`]s; they are
//! turned into package-change notifications on the receiving side.

use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;

use notify::event::{CreateKind, RemoveKind};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::domain::{LibraryId, TaskStatus};
use crate::scope::{Scope, TaskContext};

/// Kind of filesystem change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Add,
    AddDir,
    Change,
    Unlink,
    UnlinkDir,
}

/// Metadata captured for additions and changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStats {
    pub len: u64,
    pub is_dir: bool,
}

/// A filesystem change inside a watched library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub library: LibraryId,
    pub kind: FileEventKind,
    pub path: PathBuf,
    pub stats: Option<FileStats>,
}

impl FileEvent {
    pub fn new(library: LibraryId, kind: FileEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            library,
            kind,
            path: path.into(),
            stats: None,
        }
    }
}

pub(crate) fn exec(cx: &mut TaskContext<'_>, library: LibraryId, name: &str) -> TaskStatus {
    if cx.registry[library].is_watching() {
        return TaskStatus::Success;
    }
    let dir = cx.registry[library].base_dir().to_path_buf();

    match attach(library, &dir, cx.events.clone()) {
        Ok(watcher) => {
            cx.registry[library].watcher = Some(watcher);
            debug!(library = name, dir = %dir.display(), "watching");
            TaskStatus::Success
        }
        Err(e) => {
            cx.reporter
                .error(name, &format!("Failed to watch {}: {}", dir.display(), e));
            TaskStatus::Failure
        }
    }
}

fn attach(library: LibraryId, dir: &Path, events: Sender<FileEvent>) -> notify::Result<notify::RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            for file_event in convert(library, &event) {
                if events.send(file_event).is_err() {
                    debug!("event channel closed");
                    return;
                }
            }
        }
        Err(e) => warn!(error = %e, "watch error"),
    })?;
    watcher.watch(dir, RecursiveMode::Recursive)?;
    Ok(watcher)
}

/// Converts a raw notify event, one [`FileEvent`] per path
pub(crate) fn convert(library: LibraryId, event: &Event) -> Vec<FileEvent> {
    let kind = match event.kind {
        EventKind::Create(CreateKind::Folder) => FileEventKind::AddDir,
        EventKind::Create(_) => FileEventKind::Add,
        EventKind::Modify(_) => FileEventKind::Change,
        EventKind::Remove(RemoveKind::Folder) => FileEventKind::UnlinkDir,
        EventKind::Remove(_) => FileEventKind::Unlink,
        EventKind::Any | EventKind::Access(_) | EventKind::Other => return Vec::new(),
    };

    event
        .paths
        .iter()
        .map(|path| {
            let stats = match kind {
                FileEventKind::Unlink | FileEventKind::UnlinkDir => None,
                _ => std::fs::metadata(path).ok().map(|m| FileStats {
                    len: m.len(),
                    is_dir: m.is_dir(),
                }),
            };
            FileEvent {
                library,
                kind,
                path: path.clone(),
                stats,
            }
        })
        .collect()
}
