//! Build task: the composite pipeline
//!
//! Compile, then lint what was emitted, then api and bundle when there is
//! something new (or when forced). Nothing runs while a dependency's build
//! is failing.

use crate::domain::{LibraryId, TaskStatus};
use crate::scope::task::{LibraryTask, TaskOptions};
use crate::scope::TaskContext;

pub(crate) fn exec(cx: &mut TaskContext<'_>, library: LibraryId, name: &str, options: &TaskOptions) -> TaskStatus {
    if let Some(package) = cx.registry[library].package() {
        let dependencies = cx
            .registry
            .dependencies_status(package, LibraryTask::Build, TaskStatus::Success);
        if dependencies.is_failure() {
            cx.reporter
                .warning(name, "Skipping build because a dependency failed to build");
            return TaskStatus::Pending;
        }
    }

    let (mut status, emitted, invalidated) = if has(cx, library, LibraryTask::Compile) {
        let status = cx.run_library_task(library, LibraryTask::Compile, options);
        let state = cx.registry[library].compile_state();
        (status, state.emit_count > 0, state.invalidated)
    } else {
        // Without a compile step every output is treated as fresh
        (TaskStatus::Success, true, true)
    };

    if emitted && has(cx, library, LibraryTask::Lint) {
        status = status.escalate(cx.run_library_task(library, LibraryTask::Lint, options));
    }
    if (emitted || options.force) && has(cx, library, LibraryTask::Api) {
        status = status.escalate(cx.run_library_task(library, LibraryTask::Api, options));
    }
    if (emitted || invalidated || options.force) && has(cx, library, LibraryTask::Bundle) {
        status = status.escalate(cx.run_library_task(library, LibraryTask::Bundle, options));
    }
    status
}

fn has(cx: &TaskContext<'_>, library: LibraryId, task: LibraryTask) -> bool {
    cx.registry[library].has_task(task)
}
