//! # Scope Engine
//!
//! Scopes form a tree: the [`Workspace`] at the root, [`PackageScope`]s
//! beneath it and [`LibraryScope`]s beneath packages. Every scope owns a
//! fixed set of tasks and remembers the status of their last run.
//!
//! ## Status lattice
//!
//! `Skipped < Success < Pending < Failure`. Composite tasks report the
//! worst status of their children, so a failure anywhere surfaces at the
//! top and work that never ran is never mistaken for success.
//!
//! ## Key Types
//!
//! - [`Workspace`] - Loads the tree, owns tools and reporter, runs requests
//! - [`Registry`] - Arena of packages and libraries plus the dependency graph
//! - [`TaskContext`] - Borrowed view a running task works through
//! - [`WatcherScope`] - Debounced rebuild loop

mod context;
mod library;
pub mod library_tasks;
mod package;
mod package_tasks;
mod registry;
mod reporter;
mod task;
mod watcher;
mod workspace;

#[cfg(test)]
mod fakes;

use std::fmt;
use std::path::Path;

use crate::domain::{LibraryId, PackageId, TaskStatus};

pub use context::TaskContext;
pub use library::{CompileState, LibraryScope, LintSummary};
pub use library_tasks::{FileEvent, FileEventKind, FileStats, BUILD_INFO_OVERWRITE_CODE};
pub use package::PackageScope;
pub use registry::Registry;
pub use reporter::{LogReporter, MemoryReporter, MessageLevel, ReportEvent, Reporter};
pub use task::{LibraryTask, PackageTask, TaskKind, TaskOptions, TaskRequest, UnknownTask};
pub use watcher::{drive, invalidated_packages, RebuildLoop, RebuildTarget, WatchState, WatcherScope};
pub use workspace::{Workspace, WorkspaceError};

/// Address of a package or library scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeId {
    Package(PackageId),
    Library(LibraryId),
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeId::Package(id) => write!(f, "{}", id),
            ScopeId::Library(id) => write!(f, "{}", id),
        }
    }
}

/// A node in the scope tree
pub trait Scope {
    /// Display name; the directory name for libraries
    fn name(&self) -> &str;

    /// Directory tasks of this scope run in
    fn base_dir(&self) -> &Path;

    /// Enclosing scope, `None` at the root of the tree
    fn parent(&self) -> Option<ScopeId>;

    /// Status of one of this scope's tasks, `None` if it has no such task
    fn task_status(&self, task: TaskKind) -> Option<TaskStatus>;
}
