//! Package-level tasks
//!
//! Thin wrappers: manifest scripts, manifest rewrites, publishing and
//! cleanup. `libs` is the only one that runs other tasks.

use std::fs;
use std::path::Path;

use tracing::debug;

use super::task::{LibraryTask, TaskOptions};
use super::{Scope, ScopeId, TaskContext};
use crate::domain::{PackageId, TaskStatus};
use crate::storage::Manifest;
use crate::tools::shell_argv;

/// Prints the direct and transitive dependencies
pub(crate) fn deps(cx: &mut TaskContext<'_>, package: PackageId, name: &str) -> TaskStatus {
    let names = |ids: Vec<PackageId>| -> Vec<String> {
        ids.into_iter()
            .map(|id| cx.registry.qualified_name(ScopeId::Package(id)))
            .collect()
    };
    let direct = names(cx.registry.dependencies(package));
    let transitive = names(cx.registry.transitive_dependencies(package));
    let dependents = names(cx.registry.dependents(package));

    cx.reporter.info(name, &format!("dependencies: {}", list(&direct)));
    cx.reporter
        .info(name, &format!("transitive dependencies: {}", list(&transitive)));
    cx.reporter.info(name, &format!("dependents: {}", list(&dependents)));
    TaskStatus::Success
}

fn list(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}

/// Builds every library of the package
pub(crate) fn libs(cx: &mut TaskContext<'_>, package: PackageId, options: &TaskOptions) -> TaskStatus {
    let libraries = cx.registry[package].libraries().to_vec();
    libraries.into_iter().fold(TaskStatus::Skipped, |status, library| {
        status.escalate(cx.run_library_task(library, LibraryTask::Build, options))
    })
}

/// Runs a manifest script through the platform shell
pub(crate) fn script(cx: &mut TaskContext<'_>, package: PackageId, name: &str, script_name: &str) -> TaskStatus {
    let Some(manifest) = reload_manifest(cx, package, name) else {
        return TaskStatus::Failure;
    };
    let Some(script) = manifest.script(script_name) else {
        debug!(package = name, script = script_name, "no script");
        return TaskStatus::Pending;
    };

    let argv = shell_argv(script);
    let dir = cx.registry[package].base_dir().to_path_buf();
    run_command(cx, name, &dir, &argv, script_name)
}

/// Rewrites the manifest version and dependency ranges
pub(crate) fn version(cx: &mut TaskContext<'_>, package: PackageId, name: &str, options: &TaskOptions) -> TaskStatus {
    if options.versions.is_empty() {
        return TaskStatus::Pending;
    }
    let Some(mut manifest) = reload_manifest(cx, package, name) else {
        return TaskStatus::Failure;
    };

    let previous = manifest.version().map(str::to_string);
    if !manifest.apply_versions(&options.versions) {
        debug!(package = name, "versions unchanged");
        return TaskStatus::Success;
    }

    let new_version = manifest.version().unwrap_or_default().to_string();
    let summary = match previous {
        Some(previous) if previous != new_version => format!("{} -> {}", previous, new_version),
        _ => "dependency ranges updated".to_string(),
    };

    if options.dry_run {
        cx.reporter.info(name, &format!("would update version: {}", summary));
        return TaskStatus::Success;
    }

    if let Err(e) = manifest.save() {
        cx.reporter.error(name, &format!("{:#}", e));
        return TaskStatus::Failure;
    }
    cx.reporter.info(name, &format!("updated version: {}", summary));
    cx.registry[package].set_manifest(manifest);
    TaskStatus::Success
}

/// Publishes the package with the configured command
pub(crate) fn publish(cx: &mut TaskContext<'_>, package: PackageId, name: &str, options: &TaskOptions) -> TaskStatus {
    let Some(manifest) = reload_manifest(cx, package, name) else {
        return TaskStatus::Failure;
    };
    if manifest.is_private() {
        debug!(package = name, "private package is not published");
        return TaskStatus::Pending;
    }
    if cx.config.publish.command.is_empty() {
        cx.reporter.error(name, "No publish command configured");
        return TaskStatus::Failure;
    }

    let mut argv = cx.config.publish.command.clone();
    if let Some(tag) = options.tag.as_ref().or(cx.config.publish.tag.as_ref()) {
        argv.push("--tag".to_string());
        argv.push(tag.clone());
    }
    if options.dry_run {
        argv.push("--dry-run".to_string());
    }

    let dir = cx.registry[package].base_dir().to_path_buf();
    run_command(cx, name, &dir, &argv, "publish")
}

/// Removes each library's output directory and build-info file
pub(crate) fn clean(cx: &mut TaskContext<'_>, package: PackageId, name: &str) -> TaskStatus {
    let mut targets = Vec::new();
    for library in cx.registry[package].libraries() {
        let Some(library) = cx.registry.get_library(*library) else {
            continue;
        };
        let config = library.config();
        targets.extend(config.out_dir(library.base_dir()));
        targets.extend(config.build_info_file(library.base_dir()));
    }

    let mut status = TaskStatus::Success;
    for target in targets {
        let result = if target.is_dir() {
            fs::remove_dir_all(&target)
        } else if target.is_file() {
            fs::remove_file(&target)
        } else {
            continue;
        };
        match result {
            Ok(()) => cx.reporter.info(name, &format!("removed {}", target.display())),
            Err(e) => {
                cx.reporter
                    .error(name, &format!("Failed to remove {}: {}", target.display(), e));
                status = TaskStatus::Failure;
            }
        }
    }
    status
}

fn reload_manifest(cx: &mut TaskContext<'_>, package: PackageId, name: &str) -> Option<Manifest> {
    let path = cx.registry[package].manifest_path(&cx.config.files.manifest);
    match Manifest::load(&path) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            cx.reporter.error(name, &format!("{:#}", e));
            None
        }
    }
}

fn run_command(
    cx: &mut TaskContext<'_>,
    name: &str,
    dir: &Path,
    argv: &[String],
    label: &str,
) -> TaskStatus {
    match cx.toolchain.scripts.run(dir, argv) {
        Ok(0) => TaskStatus::Success,
        Ok(code) => {
            cx.reporter
                .error(name, &format!("`{}` exited with code {}", label, code));
            TaskStatus::Failure
        }
        Err(e) => {
            cx.reporter.error(name, &e.to_string());
            TaskStatus::Failure
        }
    }
}
