//! Task execution context
//!
//! A [`TaskContext`] holds disjoint borrows of everything a task touches:
//! the registry (which doubles as the compiler's config host), the
//! toolchain and the reporter. Composite tasks run their children through
//! the same context.

use std::sync::mpsc::Sender;
use std::time::Instant;

use tracing::debug;

use super::library_tasks::{self, FileEvent};
use super::package_tasks;
use super::registry::Registry;
use super::reporter::Reporter;
use super::task::{LibraryTask, PackageTask, TaskOptions};
use super::ScopeId;
use crate::domain::{LibraryId, PackageId, TaskStatus};
use crate::storage::WorkspaceConfig;
use crate::tools::Toolchain;

pub struct TaskContext<'a> {
    pub(crate) registry: &'a mut Registry,
    pub(crate) toolchain: &'a mut Toolchain,
    pub(crate) reporter: &'a mut dyn Reporter,
    pub(crate) config: &'a WorkspaceConfig,
    pub(crate) events: &'a Sender<FileEvent>,
}

impl TaskContext<'_> {
    /// Runs one library task: reset, report, execute, store, report
    ///
    /// Returns `Skipped` when the library is gone or does not own the task.
    pub fn run_library_task(&mut self, library: LibraryId, task: LibraryTask, options: &TaskOptions) -> TaskStatus {
        match self.registry.get_library_mut(library) {
            Some(scope) if scope.has_task(task) => scope.set_status(task, TaskStatus::Pending),
            _ => return TaskStatus::Skipped,
        }

        let name = self.registry.qualified_name(ScopeId::Library(library));
        self.reporter.task_began(&name, task.into());
        let started = Instant::now();

        let status = match task {
            LibraryTask::Compile => library_tasks::compile::exec(self, library, &name),
            LibraryTask::Lint => library_tasks::lint::exec(self, library, &name),
            LibraryTask::Api => library_tasks::api::exec(self, library, &name),
            LibraryTask::Bundle => library_tasks::bundle::exec(self, library, &name),
            LibraryTask::Build => library_tasks::build::exec(self, library, &name, options),
            LibraryTask::Watch => library_tasks::watch::exec(self, library, &name),
        };

        if let Some(scope) = self.registry.get_library_mut(library) {
            scope.set_status(task, status);
        }
        debug!(scope = %name, %task, %status, "task complete");
        self.reporter.task_finished(&name, task.into(), status, started.elapsed());
        status
    }

    /// Runs one package task with the same lifecycle as library tasks
    pub fn run_package_task(&mut self, package: PackageId, task: PackageTask, options: &TaskOptions) -> TaskStatus {
        match self.registry.get_package_mut(package) {
            Some(scope) if scope.has_task(task) => scope.set_status(task, TaskStatus::Pending),
            _ => return TaskStatus::Skipped,
        }

        let name = self.registry.qualified_name(ScopeId::Package(package));
        self.reporter.task_began(&name, task.into());
        let started = Instant::now();

        let status = match task {
            PackageTask::Deps => package_tasks::deps(self, package, &name),
            PackageTask::Libs => package_tasks::libs(self, package, options),
            PackageTask::Test => package_tasks::script(self, package, &name, "test"),
            PackageTask::Doc => package_tasks::script(self, package, &name, "doc"),
            PackageTask::Version => package_tasks::version(self, package, &name, options),
            PackageTask::Publish => package_tasks::publish(self, package, &name, options),
            PackageTask::Clean => package_tasks::clean(self, package, &name),
        };

        if let Some(scope) = self.registry.get_package_mut(package) {
            scope.set_status(task, status);
        }
        debug!(scope = %name, %task, %status, "task complete");
        self.reporter.task_finished(&name, task.into(), status, started.elapsed());
        status
    }
}
