//! Task kinds, options and requests
//!
//! The set of tasks is closed: six library-level tasks that form the build
//! pipeline, and seven package-level tasks that mostly wrap external
//! processes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("Unknown task '{0}'")]
pub struct UnknownTask(pub String);

/// Tasks every library owns one instance of
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryTask {
    Compile,
    Lint,
    Api,
    Bundle,
    Build,
    Watch,
}

impl LibraryTask {
    pub const ALL: [LibraryTask; 6] = [
        LibraryTask::Compile,
        LibraryTask::Lint,
        LibraryTask::Api,
        LibraryTask::Bundle,
        LibraryTask::Build,
        LibraryTask::Watch,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            LibraryTask::Compile => "compile",
            LibraryTask::Lint => "lint",
            LibraryTask::Api => "api",
            LibraryTask::Bundle => "bundle",
            LibraryTask::Build => "build",
            LibraryTask::Watch => "watch",
        }
    }
}

/// Tasks a package may own one instance of
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageTask {
    Deps,
    Libs,
    Test,
    Doc,
    Version,
    Publish,
    Clean,
}

impl PackageTask {
    pub const ALL: [PackageTask; 7] = [
        PackageTask::Deps,
        PackageTask::Libs,
        PackageTask::Test,
        PackageTask::Doc,
        PackageTask::Version,
        PackageTask::Publish,
        PackageTask::Clean,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PackageTask::Deps => "deps",
            PackageTask::Libs => "libs",
            PackageTask::Test => "test",
            PackageTask::Doc => "doc",
            PackageTask::Version => "version",
            PackageTask::Publish => "publish",
            PackageTask::Clean => "clean",
        }
    }
}

/// Any task
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskKind {
    Library(LibraryTask),
    Package(PackageTask),
}

impl TaskKind {
    pub fn label(&self) -> &'static str {
        match self {
            TaskKind::Library(task) => task.label(),
            TaskKind::Package(task) => task.label(),
        }
    }
}

impl From<LibraryTask> for TaskKind {
    fn from(task: LibraryTask) -> Self {
        TaskKind::Library(task)
    }
}

impl From<PackageTask> for TaskKind {
    fn from(task: PackageTask) -> Self {
        TaskKind::Package(task)
    }
}

impl fmt::Display for LibraryTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for PackageTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TaskKind {
    type Err = UnknownTask;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if let Some(task) = LibraryTask::ALL.iter().find(|t| t.label() == s) {
            return Ok(TaskKind::Library(*task));
        }
        if let Some(task) = PackageTask::ALL.iter().find(|t| t.label() == s) {
            return Ok(TaskKind::Package(*task));
        }
        Err(UnknownTask(s))
    }
}

/// Options bag shared by all tasks; each task reads the fields it knows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskOptions {
    /// Run api/bundle even when the compiler reports nothing changed
    pub force: bool,

    /// Report what would happen without writing or publishing
    pub dry_run: bool,

    /// Package name -> new version, for the version task
    pub versions: BTreeMap<String, String>,

    /// Distribution tag for publishing
    pub tag: Option<String>,
}

impl TaskOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            ..Default::default()
        }
    }
}

/// A request to run tasks across part of the workspace
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskRequest {
    /// Tasks to run, in order, on every selected package
    pub tasks: Vec<TaskKind>,

    /// Package names (full or unscoped); `None` selects every package
    pub packages: Option<Vec<String>>,

    /// Library names to restrict library-level tasks to
    pub libraries: Option<Vec<String>>,

    /// Also run on the transitive dependencies of the selection, dependencies first
    pub with_dependencies: bool,

    pub options: TaskOptions,
}

impl TaskRequest {
    pub fn new(task: impl Into<TaskKind>) -> Self {
        Self {
            tasks: vec![task.into()],
            ..Default::default()
        }
    }

    pub fn packages(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.packages = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn libraries(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.libraries = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_dependencies(mut self) -> Self {
        self.with_dependencies = true;
        self
    }

    pub fn options(mut self, options: TaskOptions) -> Self {
        self.options = options;
        self
    }
}
