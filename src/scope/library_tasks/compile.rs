//! Compile task
//!
//! Drives the shared incremental compiler through every invalidated project
//! reachable from the library, collecting emitted files and forwarding
//! diagnostics.

use crate::domain::{LibraryId, TaskStatus};
use crate::scope::library::CompileState;
use crate::scope::{Scope, TaskContext};
use crate::storage::CompilerConfig;

/// "Cannot write file because it will overwrite the build-info file of a
/// referenced project". Expected when referenced projects share a build.
pub const BUILD_INFO_OVERWRITE_CODE: u32 = 6377;

pub(crate) fn exec(cx: &mut TaskContext<'_>, library: LibraryId, name: &str) -> TaskStatus {
    let scope = &cx.registry[library];
    let dir = scope.base_dir().to_path_buf();
    let config_path = scope.config_path().to_path_buf();

    // Nothing from an earlier run may gate this run's stages
    cx.registry[library].compile = CompileState::default();
    if !config_path.is_file() {
        return TaskStatus::Pending;
    }

    match CompilerConfig::load(&config_path) {
        Ok(config) => cx.registry[library].set_config(config),
        Err(e) => {
            cx.reporter.error(name, &format!("{:#}", e));
            return TaskStatus::Failure;
        }
    }

    let mut state = CompileState::default();
    let mut status = TaskStatus::Success;
    cx.toolchain.compiler.begin(&dir);

    loop {
        let next = cx.toolchain.compiler.build_next(&dir, &*cx.registry);
        let project = match next {
            Ok(Some(project)) => project,
            Ok(None) => break,
            Err(e) => {
                cx.reporter.error(name, &e.to_string());
                status = TaskStatus::Failure;
                break;
            }
        };

        state.invalidated = true;
        for file in project.emitted {
            if !state.emitted.contains_key(&file.path) {
                state.emit_count += 1;
                state.emitted.insert(file.path.clone(), file);
            }
        }
        for diagnostic in &project.diagnostics {
            if diagnostic.code == BUILD_INFO_OVERWRITE_CODE {
                continue;
            }
            cx.reporter.diagnostic(name, &diagnostic.diagnostic);
        }
        if !project.success {
            status = TaskStatus::Failure;
            break;
        }
    }

    cx.registry[library].compile = state;
    status
}
