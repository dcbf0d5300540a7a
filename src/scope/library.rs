//! Library scope: one compiler project and its pipeline state

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use super::task::{LibraryTask, TaskKind};
use super::{Scope, ScopeId};
use crate::domain::{LibraryId, PackageId, TaskStatus};
use crate::storage::{normalize, ApiExtractorConfig, BundleConfig, CompilerConfig, FilesConfig};
use crate::tools::{LintReport, SourceFile};

/// What the last compile run produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompileState {
    /// The compiler rebuilt at least one project
    pub invalidated: bool,

    /// Number of distinct source files emitted
    pub emit_count: usize,

    /// Emitted source files, keyed by path
    pub emitted: BTreeMap<PathBuf, SourceFile>,
}

/// Aggregated lint counts over one lint run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LintSummary {
    pub files: u32,
    pub warning_count: u32,
    pub fixable_warning_count: u32,
    pub error_count: u32,
    pub fixable_error_count: u32,
    pub fatal_error_count: u32,
}

impl LintSummary {
    pub fn add(&mut self, report: &LintReport) {
        self.files += 1;
        self.warning_count += report.warning_count;
        self.fixable_warning_count += report.fixable_warning_count;
        self.error_count += report.error_count;
        self.fixable_error_count += report.fixable_error_count;
        self.fatal_error_count += report.fatal_error_count;
    }
}

/// A compilable unit inside a package (or standalone)
pub struct LibraryScope {
    pub(crate) id: LibraryId,
    name: String,
    base_dir: PathBuf,
    config_path: PathBuf,
    config: CompilerConfig,
    package: Option<PackageId>,
    tasks: Vec<LibraryTask>,
    statuses: HashMap<LibraryTask, TaskStatus>,
    pub(crate) compile: CompileState,
    pub(crate) lint: LintSummary,
    pub(crate) watcher: Option<notify::RecommendedWatcher>,
}

impl LibraryScope {
    /// Creates a library for `base_dir` with all six tasks
    pub fn new(base_dir: impl Into<PathBuf>, config_path: impl Into<PathBuf>, config: CompilerConfig) -> Self {
        let base_dir = normalize(&base_dir.into());
        let name = base_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id: LibraryId(usize::MAX),
            name,
            base_dir,
            config_path: config_path.into(),
            config,
            package: None,
            tasks: LibraryTask::ALL.to_vec(),
            statuses: HashMap::new(),
            compile: CompileState::default(),
            lint: LintSummary::default(),
            watcher: None,
        }
    }

    /// Loads the library in `dir`, if it is one
    ///
    /// A directory is a library when it holds a compiler config that
    /// matches at least one input file.
    pub fn load(dir: &Path, files: &FilesConfig) -> Result<Option<Self>> {
        let config_path = dir.join(&files.compiler_config);
        if !config_path.is_file() {
            return Ok(None);
        }
        let config = CompilerConfig::load(&config_path)?;
        if !config.has_inputs(dir) {
            return Ok(None);
        }
        Ok(Some(Self::new(dir, config_path, config)))
    }

    /// Replaces the task set
    pub fn with_tasks(mut self, tasks: impl IntoIterator<Item = LibraryTask>) -> Self {
        self.tasks = tasks.into_iter().collect();
        self
    }

    pub fn id(&self) -> LibraryId {
        self.id
    }

    pub fn package(&self) -> Option<PackageId> {
        self.package
    }

    pub(crate) fn set_package(&mut self, package: Option<PackageId>) {
        self.package = package;
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub(crate) fn set_config(&mut self, config: CompilerConfig) {
        self.config = config;
    }

    pub fn tasks(&self) -> &[LibraryTask] {
        &self.tasks
    }

    pub fn has_task(&self, task: LibraryTask) -> bool {
        self.tasks.contains(&task)
    }

    pub fn status(&self, task: LibraryTask) -> Option<TaskStatus> {
        if !self.has_task(task) {
            return None;
        }
        Some(self.statuses.get(&task).copied().unwrap_or_default())
    }

    pub fn set_status(&mut self, task: LibraryTask, status: TaskStatus) {
        self.statuses.insert(task, status);
    }

    pub fn compile_state(&self) -> &CompileState {
        &self.compile
    }

    pub fn lint_summary(&self) -> LintSummary {
        self.lint
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// Returns true for paths the library writes itself
    ///
    /// Changes under the output directory or to the build-info file must
    /// not trigger rebuilds.
    pub fn is_output(&self, path: &Path) -> bool {
        let path = normalize(path);
        if let Some(out_dir) = self.config.out_dir(&self.base_dir) {
            if path.starts_with(&out_dir) {
                return true;
            }
        }
        self.config
            .build_info_file(&self.base_dir)
            .is_some_and(|info| info == path)
    }

    /// Returns the paths the bundle and API tasks write into the library
    ///
    /// Every declared bundle output plus the API report folder. Missing or
    /// unreadable configs contribute nothing.
    pub fn generated_paths(&self, files: &FilesConfig) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        let bundle_config = self.base_dir.join(&files.bundle_config);
        if bundle_config.is_file() {
            match BundleConfig::load_all(&bundle_config) {
                Ok(configs) => paths.extend(
                    configs
                        .iter()
                        .flat_map(|config| &config.output)
                        .map(|output| normalize(&self.base_dir.join(&output.file))),
                ),
                Err(e) => debug!(library = %self.name, error = %e, "unreadable bundle config"),
            }
        }

        let api_config = self.base_dir.join(&files.api_config);
        if api_config.is_file() {
            match ApiExtractorConfig::load(&api_config) {
                Ok(config) => paths.push(config.report_dir(&self.base_dir)),
                Err(e) => debug!(library = %self.name, error = %e, "unreadable API config"),
            }
        }
        paths
    }

    /// Returns true for changes that must not trigger a rebuild: compiler
    /// outputs, generated files and anything under a dot-named entry of the
    /// library directory
    pub fn is_ignored(&self, path: &Path, files: &FilesConfig) -> bool {
        if self.is_output(path) {
            return true;
        }
        let path = normalize(path);
        if self
            .generated_paths(files)
            .iter()
            .any(|generated| path.starts_with(generated) || is_companion(&path, generated))
        {
            return true;
        }
        path.strip_prefix(&self.base_dir).is_ok_and(|relative| {
            relative
                .components()
                .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
        })
    }
}

/// `dist/core.js.map` next to `dist/core.js`
fn is_companion(path: &Path, file: &Path) -> bool {
    let (path_text, file_text) = (path.to_string_lossy(), file.to_string_lossy());
    path.parent() == file.parent()
        && path_text
            .strip_prefix(&*file_text)
            .is_some_and(|rest| rest.starts_with('.'))
}

impl Scope for LibraryScope {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn parent(&self) -> Option<ScopeId> {
        self.package.map(ScopeId::Package)
    }

    fn task_status(&self, task: TaskKind) -> Option<TaskStatus> {
        match task {
            TaskKind::Library(task) => self.status(task),
            TaskKind::Package(_) => None,
        }
    }
}

impl std::fmt::Debug for LibraryScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryScope")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("base_dir", &self.base_dir)
            .field("package", &self.package)
            .field("tasks", &self.tasks)
            .field("watching", &self.watcher.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::CompilerOptions;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn name_is_directory_basename() {
        let library = LibraryScope::new("/ws/core/main", "/ws/core/main/tsconfig.json", CompilerConfig::default());
        assert_eq!(library.name(), "main");
        assert_eq!(library.base_dir(), Path::new("/ws/core/main"));
        assert_eq!(library.parent(), None);
    }

    #[test]
    fn statuses_default_to_pending() {
        let mut library =
            LibraryScope::new("/ws/core", "/ws/core/tsconfig.json", CompilerConfig::default())
                .with_tasks([LibraryTask::Lint, LibraryTask::Build]);

        assert_eq!(library.status(LibraryTask::Build), Some(TaskStatus::Pending));
        assert_eq!(library.status(LibraryTask::Compile), None);

        library.set_status(LibraryTask::Build, TaskStatus::Failure);
        assert_eq!(
            library.task_status(TaskKind::Library(LibraryTask::Build)),
            Some(TaskStatus::Failure)
        );
    }

    #[test]
    fn load_requires_config_with_inputs() {
        let dir = TempDir::new().unwrap();
        let files = FilesConfig::default();

        assert!(LibraryScope::load(dir.path(), &files).unwrap().is_none());

        fs::write(dir.path().join("tsconfig.json"), r#"{"include": ["src/**/*.ts"]}"#).unwrap();
        assert!(LibraryScope::load(dir.path(), &files).unwrap().is_none());

        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/index.ts"), "export {};").unwrap();
        let library = LibraryScope::load(dir.path(), &files).unwrap().unwrap();
        assert_eq!(library.tasks().len(), 6);
    }

    #[test]
    fn output_paths_are_recognized() {
        let config = CompilerConfig {
            compiler_options: CompilerOptions {
                out_dir: Some("lib".to_string()),
                ts_build_info_file: Some("build/.tsbuildinfo".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let library = LibraryScope::new("/ws/core", "/ws/core/tsconfig.json", config);

        assert!(library.is_output(Path::new("/ws/core/lib/index.js")));
        assert!(library.is_output(Path::new("/ws/core/build/.tsbuildinfo")));
        assert!(!library.is_output(Path::new("/ws/core/src/index.ts")));

        let files = FilesConfig::default();
        assert!(library.is_ignored(Path::new("/ws/core/.git/index"), &files));
        assert!(library.is_ignored(Path::new("/ws/core/src/.index.ts.swp"), &files));
        assert!(library.is_ignored(Path::new("/ws/core/lib/index.js"), &files));
        assert!(!library.is_ignored(Path::new("/ws/core/src/index.ts"), &files));
    }

    #[test]
    fn bundle_outputs_and_api_reports_are_ignored() {
        let dir = TempDir::new().unwrap();
        let files = FilesConfig::default();
        fs::write(
            dir.path().join("bundle.config.json"),
            r#"[{"input": "lib/index.js", "output": [{"file": "dist/core.js"}, {"file": "./dist/core.mjs"}]}]"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("api-extractor.json"),
            r#"{"apiReport": {"enabled": true, "reportFolder": "reports/"}}"#,
        )
        .unwrap();
        let library = LibraryScope::new(dir.path(), dir.path().join("tsconfig.json"), CompilerConfig::default());

        let generated = library.generated_paths(&files);
        assert_eq!(generated.len(), 3);
        assert!(library.is_ignored(&dir.path().join("dist/core.js"), &files));
        assert!(library.is_ignored(&dir.path().join("dist/core.mjs"), &files));
        assert!(library.is_ignored(&dir.path().join("dist/core.js.map"), &files));
        assert!(library.is_ignored(&dir.path().join("reports/core.api.md"), &files));
        assert!(!library.is_ignored(&dir.path().join("dist/other.js"), &files));
        assert!(!library.is_ignored(&dir.path().join("src/index.ts"), &files));
    }

    #[test]
    fn unreadable_generated_configs_are_skipped() {
        let dir = TempDir::new().unwrap();
        let files = FilesConfig::default();
        fs::write(dir.path().join("bundle.config.json"), "{ not json").unwrap();
        let library = LibraryScope::new(dir.path(), dir.path().join("tsconfig.json"), CompilerConfig::default());

        assert!(library.generated_paths(&files).is_empty());
        assert!(!library.is_ignored(&dir.path().join("dist/core.js"), &files));
    }
}
