//! Workspace: the root scope
//!
//! Loading a workspace mounts every package listed in the root manifest's
//! `workspaces` globs (or the root itself when it has none), discovers the
//! libraries in each package, follows compiler project references to pull
//! in packages outside the workspace, and finally links packages that
//! declare each other as dependencies.
//!
//! The workspace owns the toolchain and the reporter, and fans task
//! requests out over a selection of packages.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::context::TaskContext;
use super::library::LibraryScope;
use super::library_tasks::FileEvent;
use super::package::PackageScope;
use super::registry::Registry;
use super::reporter::Reporter;
use super::task::{LibraryTask, PackageTask, TaskKind, TaskOptions, TaskRequest};
use super::Scope;
use crate::domain::{LibraryId, PackageId, TaskStatus, Version};
use crate::storage::{normalize, Manifest, WorkspaceConfig};
use crate::tools::Toolchain;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("No {manifest} found in {}", .root.display())]
    NoManifest { root: PathBuf, manifest: String },

    #[error("Workspace pattern '{0}' is not a valid glob")]
    InvalidPattern(String),
}

/// The root scope: registry, toolchain and reporter
pub struct Workspace {
    root: PathBuf,
    config: WorkspaceConfig,
    registry: Registry,
    toolchain: Toolchain,
    reporter: Box<dyn Reporter>,
    events: Sender<FileEvent>,
    receiver: Option<Receiver<FileEvent>>,
}

impl Workspace {
    /// Creates an empty workspace
    pub fn new(
        root: impl Into<PathBuf>,
        config: WorkspaceConfig,
        toolchain: Toolchain,
        reporter: Box<dyn Reporter>,
    ) -> Self {
        let (events, receiver) = mpsc::channel();
        Self {
            root: normalize(&root.into()),
            registry: Registry::new(config.files.compiler_config.clone()),
            config,
            toolchain,
            reporter,
            events,
            receiver: Some(receiver),
        }
    }

    /// Creates a workspace and mounts everything reachable from `root`
    pub fn load(
        root: impl Into<PathBuf>,
        config: WorkspaceConfig,
        toolchain: Toolchain,
        reporter: Box<dyn Reporter>,
    ) -> Result<Self> {
        let mut workspace = Self::new(root, config, toolchain, reporter);
        workspace.mount_root()?;
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn reporter_mut(&mut self) -> &mut dyn Reporter {
        self.reporter.as_mut()
    }

    // -- Loading --

    fn mount_root(&mut self) -> Result<()> {
        let manifest_path = self.root.join(&self.config.files.manifest);
        if !manifest_path.is_file() {
            return Err(WorkspaceError::NoManifest {
                root: self.root.clone(),
                manifest: self.config.files.manifest.clone(),
            }
            .into());
        }

        let manifest = Manifest::load(&manifest_path)?;
        let patterns = manifest.workspaces();
        if patterns.is_empty() {
            let root = self.root.clone();
            self.mount_package(&root)?;
        } else {
            for dir in self.expand_workspaces(&patterns)? {
                self.mount_package(&dir)?;
            }
        }

        self.attach_dependencies();
        info!(
            root = %self.root.display(),
            packages = self.registry.packages().count(),
            libraries = self.registry.libraries().count(),
            "workspace loaded"
        );
        Ok(())
    }

    /// Expands `workspaces` globs into package directories
    fn expand_workspaces(&self, patterns: &[String]) -> Result<Vec<PathBuf>> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        for pattern in patterns {
            if pattern.starts_with('!') {
                debug!(pattern = %pattern, "ignoring negated workspace pattern");
                continue;
            }
            let full = self.root.join(pattern);
            let full = full.to_string_lossy();
            let paths = glob::glob(&full).map_err(|_| WorkspaceError::InvalidPattern(pattern.clone()))?;
            for path in paths.flatten() {
                let dir = normalize(&path);
                if dir.join(&self.config.files.manifest).is_file() && !dirs.contains(&dir) {
                    dirs.push(dir);
                }
            }
        }
        Ok(dirs)
    }

    /// Mounts the package in `dir` with its libraries
    ///
    /// Mounting the same directory twice returns the existing package.
    pub fn mount_package(&mut self, dir: &Path) -> Result<PackageId> {
        let dir = normalize(dir);
        if let Some(id) = self.registry.package_in(&dir) {
            return Ok(id);
        }

        let manifest = Manifest::load(dir.join(&self.config.files.manifest))?;
        let id = self.registry.add_package(PackageScope::new(&dir));
        let name = match manifest.name() {
            Some(name) => name.to_string(),
            None => {
                let fallback = dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| id.to_string());
                warn!(dir = %dir.display(), name = %fallback, "manifest has no name");
                fallback
            }
        };
        self.registry.rename_package(id, &name);
        self.registry[id].set_manifest(manifest);
        debug!(package = %name, dir = %dir.display(), "mounted package");

        for library in self.discover_libraries(&dir)? {
            self.mount_library(library, Some(id))?;
        }
        Ok(id)
    }

    /// The package directory itself when it is a library, otherwise its
    /// immediate subdirectories that are
    fn discover_libraries(&self, dir: &Path) -> Result<Vec<LibraryScope>> {
        if let Some(library) = LibraryScope::load(dir, &self.config.files)? {
            return Ok(vec![library]);
        }

        let mut subdirs: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory: {}", dir.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        subdirs.sort();

        let mut libraries = Vec::new();
        for subdir in subdirs {
            if let Some(library) = LibraryScope::load(&subdir, &self.config.files)? {
                libraries.push(library);
            }
        }
        Ok(libraries)
    }

    /// Mounts a library and everything its project references reach
    pub fn mount_library(&mut self, library: LibraryScope, package: Option<PackageId>) -> Result<LibraryId> {
        if let Some(id) = self.registry.library_in(library.base_dir()) {
            return Ok(id);
        }
        let references = library.config().reference_dirs(library.base_dir());
        let id = self.registry.add_library(library, package);

        for reference in references {
            if let Err(e) = self.mount_reference(&reference) {
                let error = format!("{:#}", e);
                warn!(reference = %reference.display(), %error, "failed to load project reference");
            }
        }
        Ok(id)
    }

    fn mount_reference(&mut self, dir: &Path) -> Result<()> {
        if self.registry.library_in(dir).is_some() {
            return Ok(());
        }

        let package = match self.owning_package_dir(dir) {
            Some(package_dir) => Some(self.mount_package(&package_dir)?),
            None => None,
        };
        if self.registry.library_in(dir).is_some() {
            return Ok(());
        }

        match LibraryScope::load(dir, &self.config.files)? {
            Some(library) => {
                self.mount_library(library, package)?;
            }
            None => debug!(dir = %dir.display(), "referenced project is not a library"),
        }
        Ok(())
    }

    /// Nearest ancestor with a manifest, except an unmounted workspace root
    fn owning_package_dir(&self, dir: &Path) -> Option<PathBuf> {
        let found = dir
            .ancestors()
            .find(|ancestor| ancestor.join(&self.config.files.manifest).is_file())?;
        if found == self.root && self.registry.package_in(&self.root).is_none() {
            return None;
        }
        Some(found.to_path_buf())
    }

    /// Links packages whose manifests name each other as dependencies
    pub fn attach_dependencies(&mut self) {
        for id in self.registry.package_ids() {
            let names = self.registry[id]
                .manifest()
                .map(Manifest::dependency_names)
                .unwrap_or_default();
            for name in names {
                if let Some(dependency) = self.registry.package_named(&name) {
                    if dependency != id && self.registry.attach_dependency(id, dependency) {
                        debug!(package = %self.registry[id].name(), dependency = %name, "attached dependency");
                    }
                }
            }
        }
    }

    /// Unmounts a package, its libraries and their watchers
    pub fn unmount_package(&mut self, id: PackageId) -> bool {
        match self.registry.remove_package(id) {
            Some(package) => {
                debug!(package = %package.name(), "unmounted package");
                true
            }
            None => false,
        }
    }

    // -- Lookup --

    /// Finds a package by full or unscoped name
    pub fn find_package(&self, name: &str) -> Option<PackageId> {
        self.registry.find_package(name)
    }

    /// Resolves package names, reporting the ones that do not exist
    ///
    /// `None` selects every package, dependencies first.
    pub fn select_packages(&mut self, names: Option<&[String]>) -> Vec<PackageId> {
        let Some(names) = names else {
            let all = self.registry.package_ids();
            return self.registry.dependency_closure(&all);
        };

        let mut selection = Vec::new();
        for name in names {
            match self.registry.find_package(name) {
                Some(id) if !selection.contains(&id) => selection.push(id),
                Some(_) => {}
                None => self
                    .reporter
                    .error(name, &format!("Unknown package '{}'", name)),
            }
        }
        selection
    }

    // -- Running --

    pub(crate) fn context(&mut self) -> TaskContext<'_> {
        TaskContext {
            registry: &mut self.registry,
            toolchain: &mut self.toolchain,
            reporter: self.reporter.as_mut(),
            config: &self.config,
            events: &self.events,
        }
    }

    pub fn run_library_task(&mut self, library: LibraryId, task: LibraryTask, options: &TaskOptions) -> TaskStatus {
        self.context().run_library_task(library, task, options)
    }

    pub fn run_package_task(&mut self, package: PackageId, task: PackageTask, options: &TaskOptions) -> TaskStatus {
        self.context().run_package_task(package, task, options)
    }

    /// Runs a request over its package selection
    ///
    /// Returns `Skipped` when nothing ran, otherwise the worst status.
    pub fn run(&mut self, request: &TaskRequest) -> TaskStatus {
        let selection = self.select_packages(request.packages.as_deref());
        let targets = if request.with_dependencies {
            self.registry.dependency_closure(&selection)
        } else {
            selection
        };
        self.run_on(
            &targets,
            &request.tasks,
            request.libraries.as_deref(),
            &request.options,
        )
    }

    /// Runs each task, in order, on each package
    ///
    /// Library tasks run on every library of the package whose name is in
    /// `libraries` (all of them when `None`).
    pub fn run_on(
        &mut self,
        packages: &[PackageId],
        tasks: &[TaskKind],
        libraries: Option<&[String]>,
        options: &TaskOptions,
    ) -> TaskStatus {
        let mut cx = self.context();
        let mut status = TaskStatus::Skipped;

        for package in packages {
            for task in tasks {
                match task {
                    TaskKind::Package(task) => {
                        status = status.escalate(cx.run_package_task(*package, *task, options));
                    }
                    TaskKind::Library(task) => {
                        let members = cx
                            .registry
                            .get_package(*package)
                            .map(|p| p.libraries().to_vec())
                            .unwrap_or_default();
                        for library in members {
                            if !library_selected(&cx.registry[library], libraries) {
                                continue;
                            }
                            status = status.escalate(cx.run_library_task(library, *task, options));
                        }
                    }
                }
            }
        }
        status
    }

    /// Rewrites manifests so each named package gets its new version
    ///
    /// Every package is visited so dependents update their ranges too.
    pub fn set_versions(&mut self, versions: BTreeMap<String, String>, dry_run: bool) -> TaskStatus {
        let options = TaskOptions {
            versions,
            dry_run,
            ..Default::default()
        };
        let all = self.registry.package_ids();
        self.run_on(&all, &[PackageTask::Version.into()], None, &options)
    }

    /// Moves the selection and its dependencies to their next snapshot
    pub fn bump_snapshot(
        &mut self,
        names: Option<&[String]>,
        tag: &str,
        today: NaiveDate,
        dry_run: bool,
    ) -> TaskStatus {
        let selection = self.select_packages(names);
        let closure = self.registry.dependency_closure(&selection);

        let mut versions = BTreeMap::new();
        for id in closure {
            let package = &self.registry[id];
            let Some(current) = package.manifest().and_then(Manifest::version) else {
                continue;
            };
            match current.parse::<Version>() {
                Ok(version) => {
                    let next = version.next_snapshot(tag, today);
                    versions.insert(package.name().to_string(), next.to_string());
                }
                Err(e) => {
                    let name = package.name().to_string();
                    self.reporter.warning(&name, &e.to_string());
                }
            }
        }

        if versions.is_empty() {
            return TaskStatus::Pending;
        }
        self.set_versions(versions, dry_run)
    }

    // -- Events --

    /// Takes the receiving end of the file-event channel
    pub fn take_events(&mut self) -> Option<Receiver<FileEvent>> {
        self.receiver.take()
    }

    pub fn event_sender(&self) -> Sender<FileEvent> {
        self.events.clone()
    }

    /// Maps a file event to the name of the package that changed
    ///
    /// Events for unmounted or parentless libraries, for files the library
    /// writes itself (compiler outputs and generated files) and for dot
    /// files map to nothing.
    pub fn changed_package(&self, event: &FileEvent) -> Option<String> {
        let library = self.registry.get_library(event.library)?;
        if library.is_ignored(&event.path, &self.config.files) {
            return None;
        }
        let package = self.registry.get_package(library.package()?)?;
        Some(package.name().to_string())
    }
}

fn library_selected(library: &LibraryScope, filter: Option<&[String]>) -> bool {
    filter.map_or(true, |names| names.iter().any(|n| n == library.name()))
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("root", &self.root)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::fakes::{cwd_lock, emitting, failing, Fakes};
    use crate::scope::{FileEventKind, MemoryReporter, MessageLevel, BUILD_INFO_OVERWRITE_CODE};
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn library(dir: &Path, references: &[&str]) {
        let references: Vec<String> = references
            .iter()
            .map(|r| format!(r#"{{"path": "{}"}}"#, r))
            .collect();
        write(
            &dir.join("tsconfig.json"),
            &format!(
                r#"{{"compilerOptions": {{"composite": true, "outDir": "lib"}},
                    "include": ["src/**/*.ts"], "references": [{}]}}"#,
                references.join(", ")
            ),
        );
        write(&dir.join("src/index.ts"), "export const x = 1;\n");
    }

    /// core <- http <- app, with app referencing an external util project
    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(
            &root.join("package.json"),
            r#"{"name": "root", "private": true, "workspaces": ["packages/*"]}"#,
        );

        let core = root.join("packages/core");
        write(&core.join("package.json"), r#"{"name": "@acme/core", "version": "1.0.0"}"#);
        library(&core, &[]);
        write(&core.join("api-extractor.json"), r#"{"apiReport": {"enabled": true}}"#);
        write(
            &core.join("bundle.config.json"),
            r#"{"input": "lib/index.js", "output": {"file": "dist/core.js"}}"#,
        );

        let http = root.join("packages/http");
        write(
            &http.join("package.json"),
            r#"{"name": "@acme/http", "version": "1.0.0", "dependencies": {"@acme/core": "^1.0.0"}}"#,
        );
        library(&http.join("main"), &[]);
        library(&http.join("node"), &[]);
        fs::create_dir_all(http.join("docs")).unwrap();

        let app = root.join("packages/app");
        write(
            &app.join("package.json"),
            r#"{"name": "app", "private": true, "version": "0.1.0",
                "dependencies": {"@acme/http": "^1.0.0", "left-pad": "1.0.0"},
                "scripts": {"test": "run-tests"}}"#,
        );
        library(&app, &["../../external/util"]);

        let util = root.join("external/util");
        write(&util.join("package.json"), r#"{"name": "util", "version": "3.0.0"}"#);
        library(&util, &[]);

        dir
    }

    fn load(dir: &TempDir) -> (Workspace, Fakes, MemoryReporter) {
        let fakes = Fakes::new();
        let reporter = MemoryReporter::new();
        let workspace = Workspace::load(
            dir.path(),
            WorkspaceConfig::default(),
            fakes.toolchain(),
            Box::new(reporter.clone()),
        )
        .unwrap();
        (workspace, fakes, reporter)
    }

    fn package(workspace: &Workspace, name: &str) -> PackageId {
        workspace.find_package(name).unwrap()
    }

    fn only_library(workspace: &Workspace, name: &str) -> LibraryId {
        workspace.registry()[package(workspace, name)].libraries()[0]
    }

    fn build(name: &str) -> TaskRequest {
        TaskRequest::new(LibraryTask::Build).packages([name])
    }

    #[test]
    fn load_discovers_packages_and_libraries() {
        let dir = fixture();
        let (workspace, _, _) = load(&dir);
        let registry = workspace.registry();

        let packages: Vec<_> = registry.packages().map(|p| p.name().to_string()).collect();
        // Glob order, with the referenced external package mounted right after app
        assert_eq!(packages, vec!["app", "util", "@acme/core", "@acme/http"]);

        let http = &registry[package(&workspace, "http")];
        let libraries: Vec<_> = http
            .libraries()
            .iter()
            .map(|l| registry[*l].name().to_string())
            .collect();
        assert_eq!(libraries, vec!["main", "node"]);
        assert_eq!(registry.libraries().count(), 5);
    }

    #[test]
    fn load_links_workspace_dependencies() {
        let dir = fixture();
        let (workspace, _, _) = load(&dir);
        let registry = workspace.registry();
        let (core, http, app) = (
            package(&workspace, "@acme/core"),
            package(&workspace, "@acme/http"),
            package(&workspace, "app"),
        );

        assert_eq!(registry.dependencies(http), vec![core]);
        assert_eq!(registry.dependencies(app), vec![http]);
        assert_eq!(registry.transitive_dependents(core), vec![http, app]);
        assert!(registry.dependencies(package(&workspace, "util")).is_empty());
    }

    #[test]
    fn load_requires_root_manifest() {
        let dir = TempDir::new().unwrap();
        let err = Workspace::load(
            dir.path(),
            WorkspaceConfig::default(),
            Fakes::new().toolchain(),
            Box::new(MemoryReporter::new()),
        )
        .unwrap_err();
        assert!(err.to_string().contains("No package.json found"));
    }

    #[test]
    fn single_package_root() {
        let dir = TempDir::new().unwrap();
        write(&dir.path().join("package.json"), r#"{"name": "solo"}"#);
        library(&dir.path().join("lib"), &[]);

        let (workspace, _, _) = load(&dir);
        let solo = package(&workspace, "solo");
        assert_eq!(workspace.registry()[solo].libraries().len(), 1);
    }

    #[test]
    fn unknown_packages_are_reported_and_skipped() {
        let dir = fixture();
        let (mut workspace, fakes, reporter) = load(&dir);

        let status = workspace.run(&build("nope"));

        assert_eq!(status, TaskStatus::Skipped);
        assert_eq!(reporter.messages(MessageLevel::Error), vec!["Unknown package 'nope'"]);
        assert!(fakes.log.calls().is_empty());
    }

    #[test]
    fn build_skips_lint_when_nothing_emitted() {
        let dir = fixture();
        let (mut workspace, fakes, _) = load(&dir);

        let status = workspace.run(&build("core"));

        assert_eq!(status, TaskStatus::Success);
        assert_eq!(fakes.log.calls(), vec!["compile:core"]);
    }

    #[test]
    fn forced_build_runs_api_and_bundle() {
        let _cwd = cwd_lock();
        let dir = fixture();
        let (mut workspace, fakes, reporter) = load(&dir);

        let request = build("core").options(TaskOptions::forced());
        let status = workspace.run(&request);

        assert_eq!(status, TaskStatus::Success);
        assert_eq!(fakes.log.count("lint"), 0);
        assert_eq!(fakes.log.count("api"), 1);
        assert_eq!(fakes.log.count("bundle"), 1);
        assert!(dir.path().join("packages/core/etc").is_dir());
        assert!(dir.path().join("packages/core/dist/core.js").is_file());
        assert_eq!(
            reporter.started(),
            vec![
                "@acme/core/core:build",
                "@acme/core/core:compile",
                "@acme/core/core:api",
                "@acme/core/core:bundle"
            ]
        );
    }

    #[test]
    fn emitted_files_drive_the_pipeline() {
        let _cwd = cwd_lock();
        let dir = fixture();
        let (mut workspace, fakes, reporter) = load(&dir);
        let core_dir = dir.path().join("packages/core");
        fakes.queue_build(&core_dir, emitting(&core_dir, &["src/index.ts", "src/util.ts"]));
        fakes.queue_build(&core_dir, emitting(&core_dir, &["src/index.ts"]));

        let status = workspace.run(&build("core"));

        assert_eq!(status, TaskStatus::Success);
        assert_eq!(
            fakes.log.calls(),
            vec![
                "compile:core",
                "compile:core",
                "compile:core",
                "lint:index.ts",
                "lint:util.ts",
                "api:core:local=true",
                "bundle:core:lib/index.js",
            ]
        );

        let state = workspace.registry()[only_library(&workspace, "core")].compile_state();
        assert!(state.invalidated);
        assert_eq!(state.emit_count, 2);
        assert_eq!(workspace.registry()[only_library(&workspace, "core")].lint_summary().files, 2);

        // Extractor warnings are reported as diagnostics
        assert_eq!(reporter.diagnostics()[0].message, "Missing release tag");
    }

    #[test]
    fn build_info_overwrite_is_suppressed() {
        let _cwd = cwd_lock();
        let dir = fixture();
        let (mut workspace, fakes, reporter) = load(&dir);
        let core_dir = dir.path().join("packages/core");
        fakes.queue_build(&core_dir, failing(&core_dir, &[BUILD_INFO_OVERWRITE_CODE, 2304]));

        let status = workspace.run(&build("core"));

        assert_eq!(status, TaskStatus::Failure);
        let messages: Vec<_> = reporter.diagnostics().into_iter().map(|d| d.message).collect();
        assert_eq!(messages, vec!["TS2304"]);
    }

    #[test]
    fn fatal_lint_errors_fail_the_build() {
        let _cwd = cwd_lock();
        let dir = fixture();
        let (mut workspace, fakes, _) = load(&dir);
        let core_dir = dir.path().join("packages/core");
        fakes.queue_build(&core_dir, emitting(&core_dir, &["src/index.ts"]));
        fakes.lint_fatal.set(1);

        let status = workspace.run(&build("core"));

        assert_eq!(status, TaskStatus::Failure);
        let core_lib = only_library(&workspace, "core");
        let library = &workspace.registry()[core_lib];
        assert_eq!(library.status(LibraryTask::Compile), Some(TaskStatus::Success));
        assert_eq!(library.status(LibraryTask::Lint), Some(TaskStatus::Failure));
        assert_eq!(library.status(LibraryTask::Build), Some(TaskStatus::Failure));
        assert_eq!(library.lint_summary().fatal_error_count, 1);
    }

    #[test]
    fn failed_extraction_fails_the_build() {
        let _cwd = cwd_lock();
        let dir = fixture();
        let (mut workspace, fakes, _) = load(&dir);
        fakes.extract_succeeds.set(false);

        let status = workspace.run(&build("core").options(TaskOptions::forced()));

        assert_eq!(status, TaskStatus::Failure);
        let library = &workspace.registry()[only_library(&workspace, "core")];
        assert_eq!(library.status(LibraryTask::Api), Some(TaskStatus::Failure));
        // Later stages still run
        assert_eq!(library.status(LibraryTask::Bundle), Some(TaskStatus::Success));
        assert_eq!(fakes.log.count("bundle"), 1);
    }

    #[test]
    fn bundler_errors_fail_the_build() {
        let _cwd = cwd_lock();
        let dir = fixture();
        let (mut workspace, fakes, reporter) = load(&dir);
        fakes.bundle_fails.set(true);
        let cwd = std::env::current_dir().unwrap();

        let status = workspace.run(&build("core").options(TaskOptions::forced()));

        assert_eq!(status, TaskStatus::Failure);
        let library = &workspace.registry()[only_library(&workspace, "core")];
        assert_eq!(library.status(LibraryTask::Bundle), Some(TaskStatus::Failure));
        assert!(!dir.path().join("packages/core/dist/core.js").exists());
        assert!(!reporter.messages(MessageLevel::Error).is_empty());
        assert_eq!(std::env::current_dir().unwrap(), cwd);
    }

    #[test]
    fn unreadable_compiler_config_discards_previous_emits() {
        let _cwd = cwd_lock();
        let dir = fixture();
        let (mut workspace, fakes, _) = load(&dir);
        let core_dir = dir.path().join("packages/core");
        fakes.queue_build(&core_dir, emitting(&core_dir, &["src/index.ts"]));

        assert_eq!(workspace.run(&build("core")), TaskStatus::Success);
        let calls = fakes.log.calls();
        assert_eq!(fakes.log.count("lint"), 1);

        fs::write(core_dir.join("tsconfig.json"), "{ not json").unwrap();
        let status = workspace.run(&build("core"));

        assert_eq!(status, TaskStatus::Failure);
        // No stage reran on the previous run's output
        assert_eq!(fakes.log.calls(), calls);
        let state = workspace.registry()[only_library(&workspace, "core")].compile_state();
        assert_eq!(state.emit_count, 0);
        assert!(!state.invalidated);
    }

    #[test]
    fn failed_dependency_blocks_dependents() {
        let _cwd = cwd_lock();
        let dir = fixture();
        let (mut workspace, fakes, reporter) = load(&dir);
        let core_dir = dir.path().join("packages/core");
        fakes.queue_build(&core_dir, failing(&core_dir, &[2304]));

        let request = TaskRequest::new(LibraryTask::Build).packages(["app"]).with_dependencies();
        let status = workspace.run(&request);

        assert_eq!(status, TaskStatus::Failure);
        assert_eq!(fakes.log.calls(), vec!["compile:core", "bundle:core:lib/index.js"]);

        let registry = workspace.registry();
        let http = &registry[package(&workspace, "http")];
        for library in http.libraries() {
            assert_eq!(registry[*library].status(LibraryTask::Build), Some(TaskStatus::Pending));
            assert_eq!(registry[*library].status(LibraryTask::Compile), Some(TaskStatus::Pending));
        }
        assert_eq!(reporter.messages(MessageLevel::Warning).len(), 3);
    }

    #[test]
    fn host_injects_references_from_dependencies() {
        let dir = fixture();
        let (mut workspace, fakes, _) = load(&dir);

        let main = workspace.registry()[package(&workspace, "http")].libraries()[0];
        workspace.run_library_task(main, LibraryTask::Compile, &TaskOptions::default());

        assert_eq!(*fakes.host_references.borrow(), vec![1]);
    }

    #[test]
    fn libs_escalates_over_libraries() {
        let dir = fixture();
        let (mut workspace, fakes, _) = load(&dir);
        let node_dir = dir.path().join("packages/http/node");
        fakes.queue_build(&node_dir, failing(&node_dir, &[2322]));

        let http = package(&workspace, "http");
        let status = workspace.run_package_task(http, PackageTask::Libs, &TaskOptions::default());

        assert_eq!(status, TaskStatus::Failure);
        assert_eq!(fakes.log.calls(), vec!["compile:main", "compile:node"]);
        assert_eq!(
            workspace.registry().libraries_status(http, LibraryTask::Build, TaskStatus::Skipped),
            TaskStatus::Failure
        );
    }

    #[test]
    fn library_filter_limits_library_tasks() {
        let dir = fixture();
        let (mut workspace, fakes, _) = load(&dir);

        let request = TaskRequest::new(LibraryTask::Compile).packages(["http"]).libraries(["node"]);
        workspace.run(&request);

        assert_eq!(fakes.log.calls(), vec!["compile:node"]);
    }

    #[test]
    fn scripts_run_through_the_shell() {
        let dir = fixture();
        let (mut workspace, fakes, reporter) = load(&dir);
        let (app, core) = (package(&workspace, "app"), package(&workspace, "core"));
        let options = TaskOptions::default();

        assert_eq!(workspace.run_package_task(app, PackageTask::Test, &options), TaskStatus::Success);
        let argv = fakes.script_argv.borrow()[0].clone();
        assert_eq!(argv.last().map(String::as_str), Some("run-tests"));

        fakes.script_code.set(3);
        assert_eq!(workspace.run_package_task(app, PackageTask::Test, &options), TaskStatus::Failure);
        assert!(reporter.messages(MessageLevel::Error)[0].contains("exited with code 3"));

        assert_eq!(workspace.run_package_task(core, PackageTask::Doc, &options), TaskStatus::Pending);
    }

    #[test]
    fn publish_skips_private_packages() {
        let dir = fixture();
        let (mut workspace, fakes, _) = load(&dir);
        let options = TaskOptions {
            dry_run: true,
            tag: Some("next".to_string()),
            ..Default::default()
        };

        let app = package(&workspace, "app");
        assert_eq!(workspace.run_package_task(app, PackageTask::Publish, &options), TaskStatus::Pending);

        let core = package(&workspace, "core");
        assert_eq!(workspace.run_package_task(core, PackageTask::Publish, &options), TaskStatus::Success);
        assert_eq!(
            fakes.script_argv.borrow()[0],
            vec!["npm", "publish", "--tag", "next", "--dry-run"]
        );
    }

    #[test]
    fn set_versions_updates_dependents() {
        let dir = fixture();
        let (mut workspace, _, _) = load(&dir);
        let versions = BTreeMap::from([("@acme/core".to_string(), "2.0.0".to_string())]);

        assert_eq!(workspace.set_versions(versions.clone(), true), TaskStatus::Success);
        let http_manifest = dir.path().join("packages/http/package.json");
        assert!(fs::read_to_string(&http_manifest).unwrap().contains("^1.0.0"));

        assert_eq!(workspace.set_versions(versions, false), TaskStatus::Success);
        let core = Manifest::load(dir.path().join("packages/core/package.json")).unwrap();
        assert_eq!(core.version(), Some("2.0.0"));
        let http = Manifest::load(&http_manifest).unwrap();
        assert_eq!(http.dependency_range("@acme/core"), Some("^2.0.0"));
    }

    #[test]
    fn snapshot_bumps_the_dependency_chain() {
        let dir = fixture();
        let (mut workspace, _, _) = load(&dir);
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();

        let status = workspace.bump_snapshot(Some(&["http".to_string()]), "dev", today, false);
        assert_eq!(status, TaskStatus::Success);

        let read = |path: &str| Manifest::load(dir.path().join(path)).unwrap();
        assert_eq!(read("packages/core/package.json").version(), Some("1.0.1-dev.20261019.0"));
        assert_eq!(read("packages/http/package.json").version(), Some("1.0.1-dev.20261019.0"));
        assert_eq!(read("packages/app/package.json").version(), Some("0.1.0"));
        assert_eq!(
            read("packages/app/package.json").dependency_range("@acme/http"),
            Some("^1.0.1-dev.20261019.0")
        );
    }

    #[test]
    fn clean_removes_outputs() {
        let dir = fixture();
        let (mut workspace, _, _) = load(&dir);
        let out = dir.path().join("packages/core/lib/index.js");
        write(&out, "exports.x = 1;");

        let core = package(&workspace, "core");
        assert_eq!(workspace.run_package_task(core, PackageTask::Clean, &TaskOptions::default()), TaskStatus::Success);
        assert!(!out.exists());
    }

    #[test]
    fn deps_lists_dependencies() {
        let dir = fixture();
        let (mut workspace, _, reporter) = load(&dir);

        let app = package(&workspace, "app");
        workspace.run_package_task(app, PackageTask::Deps, &TaskOptions::default());

        let messages = reporter.messages(MessageLevel::Info);
        assert_eq!(messages[0], "dependencies: @acme/http");
        assert_eq!(messages[1], "transitive dependencies: @acme/core, @acme/http");
        assert_eq!(messages[2], "dependents: (none)");
    }

    #[test]
    fn unmount_removes_package_and_edges() {
        let dir = fixture();
        let (mut workspace, _, _) = load(&dir);
        let (core, http, app) = (
            package(&workspace, "core"),
            package(&workspace, "http"),
            package(&workspace, "app"),
        );

        assert!(workspace.unmount_package(http));
        assert!(!workspace.unmount_package(http));

        let registry = workspace.registry();
        assert!(registry.dependencies(app).is_empty());
        assert!(registry.dependents(core).is_empty());
        assert_eq!(workspace.find_package("@acme/http"), None);
        assert_eq!(registry.libraries().count(), 3);
    }

    #[test]
    fn file_events_map_to_owning_package() {
        let dir = fixture();
        let (workspace, _, _) = load(&dir);
        let core_lib = only_library(&workspace, "core");
        let util_lib = only_library(&workspace, "util");
        let core_dir = dir.path().join("packages/core");

        let source = FileEvent::new(core_lib, FileEventKind::Change, core_dir.join("src/index.ts"));
        assert_eq!(workspace.changed_package(&source).as_deref(), Some("@acme/core"));

        let output = FileEvent::new(core_lib, FileEventKind::Add, core_dir.join("lib/index.js"));
        assert_eq!(workspace.changed_package(&output), None);

        let external = FileEvent::new(util_lib, FileEventKind::Unlink, dir.path().join("external/util/src/a.ts"));
        assert_eq!(workspace.changed_package(&external).as_deref(), Some("util"));
    }

    #[test]
    fn generated_files_do_not_trigger_rebuilds() {
        let dir = fixture();
        let (workspace, _, _) = load(&dir);
        let core_lib = only_library(&workspace, "core");
        let core_dir = dir.path().join("packages/core");

        let bundle = FileEvent::new(core_lib, FileEventKind::Add, core_dir.join("dist/core.js"));
        assert_eq!(workspace.changed_package(&bundle), None);

        let report = FileEvent::new(core_lib, FileEventKind::Change, core_dir.join("etc/core.api.md"));
        assert_eq!(workspace.changed_package(&report), None);

        let source = FileEvent::new(core_lib, FileEventKind::Change, core_dir.join("src/index.ts"));
        assert_eq!(workspace.changed_package(&source).as_deref(), Some("@acme/core"));
    }

    #[test]
    fn statuses_reset_to_pending_before_running() {
        let dir = fixture();
        let (mut workspace, _, _) = load(&dir);
        let core_lib = only_library(&workspace, "core");
        workspace.registry_mut()[core_lib].set_status(LibraryTask::Api, TaskStatus::Failure);

        fs::remove_file(dir.path().join("packages/core/api-extractor.json")).unwrap();
        let status = workspace.run_library_task(core_lib, LibraryTask::Api, &TaskOptions::default());

        assert_eq!(status, TaskStatus::Pending);
        assert_eq!(workspace.registry()[core_lib].status(LibraryTask::Api), Some(TaskStatus::Pending));
    }
}
