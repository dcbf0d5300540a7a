//! In-memory tools for exercising the engine

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Mutex, MutexGuard};

use crate::domain::Diagnostic;
use crate::storage::{ApiExtractorConfig, BundleConfig, BundleOutput, LintConfig};
use crate::tools::{
    ApiExtractor, Bundle, Bundler, CompilerDiagnostic, CompilerService, ConfigHost, ExtractorLogLevel,
    ExtractorMessage, ExtractorOptions, ExtractorResult, LintReport, Linter, OutputChunk, ProjectBuild,
    ScriptRunner, SourceFile, ToolError, Toolchain,
};

static CWD: Mutex<()> = Mutex::new(());

/// Serializes tests whose tasks change the process working directory
pub(crate) fn cwd_lock() -> MutexGuard<'static, ()> {
    CWD.lock().unwrap_or_else(|e| e.into_inner())
}

/// Shared record of every tool call, as `tool:detail`
#[derive(Debug, Default, Clone)]
pub(crate) struct CallLog(Rc<RefCell<Vec<String>>>);

impl CallLog {
    fn push(&self, call: String) {
        self.0.borrow_mut().push(call);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub(crate) fn count(&self, tool: &str) -> usize {
        let prefix = format!("{}:", tool);
        self.0.borrow().iter().filter(|c| c.starts_with(&prefix)).count()
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Handles for scripting and inspecting a fake toolchain
#[derive(Debug, Default, Clone)]
pub(crate) struct Fakes {
    pub log: CallLog,
    builds: Rc<RefCell<HashMap<PathBuf, VecDeque<ProjectBuild>>>>,
    /// Number of references the host resolved on each compile call
    pub host_references: Rc<RefCell<Vec<usize>>>,
    pub lint_fatal: Rc<Cell<u32>>,
    pub extract_succeeds: Rc<Cell<bool>>,
    pub bundle_fails: Rc<Cell<bool>>,
    pub script_code: Rc<Cell<i32>>,
    pub script_argv: Rc<RefCell<Vec<Vec<String>>>>,
}

impl Fakes {
    pub(crate) fn new() -> Self {
        let fakes = Self::default();
        fakes.extract_succeeds.set(true);
        fakes
    }

    /// Queues the result of the next invalidated project under `root`
    pub(crate) fn queue_build(&self, root: &Path, build: ProjectBuild) {
        self.builds
            .borrow_mut()
            .entry(root.to_path_buf())
            .or_default()
            .push_back(build);
    }

    pub(crate) fn toolchain(&self) -> Toolchain {
        Toolchain {
            compiler: Box::new(FakeCompiler(self.clone())),
            linter: Box::new(FakeLinter(self.clone())),
            api_extractor: Box::new(FakeExtractor(self.clone())),
            bundler: Box::new(FakeBundler(self.clone())),
            scripts: Box::new(FakeRunner(self.clone())),
        }
    }
}

/// A successful build of `dir` emitting the given source files
pub(crate) fn emitting(dir: &Path, files: &[&str]) -> ProjectBuild {
    ProjectBuild {
        project: dir.to_path_buf(),
        emitted: files
            .iter()
            .map(|f| SourceFile {
                path: dir.join(f),
                text: format!("// {}", f),
            })
            .collect(),
        diagnostics: Vec::new(),
        success: true,
    }
}

/// A failed build of `dir` with one diagnostic per code
pub(crate) fn failing(dir: &Path, codes: &[u32]) -> ProjectBuild {
    ProjectBuild {
        project: dir.to_path_buf(),
        emitted: Vec::new(),
        diagnostics: codes
            .iter()
            .map(|code| CompilerDiagnostic {
                code: *code,
                diagnostic: Diagnostic::error(format!("TS{}", code)),
            })
            .collect(),
        success: false,
    }
}

struct FakeCompiler(Fakes);

impl CompilerService for FakeCompiler {
    fn build_next(&mut self, root: &Path, host: &dyn ConfigHost) -> Result<Option<ProjectBuild>, ToolError> {
        self.0.log.push(format!("compile:{}", dir_name(root)));
        let references = host.project_config(root).map_or(0, |c| c.references.len());
        self.0.host_references.borrow_mut().push(references);
        Ok(self
            .0
            .builds
            .borrow_mut()
            .get_mut(root)
            .and_then(VecDeque::pop_front))
    }
}

struct FakeLinter(Fakes);

impl Linter for FakeLinter {
    fn lint_text(&mut self, _text: &str, path: &Path, _config: Option<&LintConfig>) -> Result<LintReport, ToolError> {
        self.0.log.push(format!("lint:{}", dir_name(path)));
        Ok(LintReport {
            fatal_error_count: self.0.lint_fatal.get(),
            ..Default::default()
        })
    }
}

struct FakeExtractor(Fakes);

impl ApiExtractor for FakeExtractor {
    fn extract(
        &mut self,
        config_path: &Path,
        _config: &ApiExtractorConfig,
        options: ExtractorOptions,
        on_message: &mut dyn FnMut(&mut ExtractorMessage),
    ) -> Result<ExtractorResult, ToolError> {
        let dir = config_path.parent().map(dir_name).unwrap_or_default();
        self.0.log.push(format!("api:{}:local={}", dir, options.local_build));
        let mut message = ExtractorMessage {
            log_level: ExtractorLogLevel::Warning,
            text: "Missing release tag".to_string(),
            message_id: None,
            source_file_path: None,
            source_file_line: None,
            source_file_column: None,
            handled: false,
        };
        on_message(&mut message);
        assert!(message.handled);
        Ok(ExtractorResult {
            succeeded: self.0.extract_succeeds.get(),
            ..Default::default()
        })
    }
}

struct FakeBundler(Fakes);

impl Bundler for FakeBundler {
    fn bundle(&mut self, config: &BundleConfig) -> Result<Box<dyn Bundle>, ToolError> {
        let cwd = std::env::current_dir().map(|d| dir_name(&d)).unwrap_or_default();
        self.0.log.push(format!("bundle:{}:{}", cwd, config.input));
        Ok(Box::new(FakeBundle(self.0.clone())))
    }
}

struct FakeBundle(Fakes);

impl Bundle for FakeBundle {
    fn generate(&mut self, output: &BundleOutput) -> Result<Vec<OutputChunk>, ToolError> {
        if self.0.bundle_fails.get() {
            return Err(ToolError::Failed {
                tool: "bundler".to_string(),
                message: format!("cannot resolve entry for {}", output.file),
            });
        }
        Ok(vec![OutputChunk {
            file: output.file.clone().into(),
            contents: "bundled".to_string(),
        }])
    }

    fn close(self: Box<Self>) -> Result<(), ToolError> {
        Ok(())
    }
}

struct FakeRunner(Fakes);

impl ScriptRunner for FakeRunner {
    fn run(&mut self, dir: &Path, argv: &[String]) -> Result<i32, ToolError> {
        self.0.log.push(format!("run:{}", dir_name(dir)));
        self.0.script_argv.borrow_mut().push(argv.to_vec());
        Ok(self.0.script_code.get())
    }
}
