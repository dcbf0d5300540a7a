//! # External Tools
//!
//! The compiler, linter, bundler and API extractor are opaque services.
//! Keystone only knows them through the traits in this module; the
//! orchestration engine never calls a concrete tool directly.
//!
//! ## Bridges
//!
//! The default implementations are bridge processes configured in
//! `keystone.toml` under `[tools]`. They speak JSON over stdin/stdout:
//!
//! ```text
//! Keystone                      Bridge process
//!  │                               │
//!  ├── Spawn: node compile.js      │
//!  │                               │
//!  ├── Stdin: {"operation": "build", "params": {...}}
//!  │                               │
//!  └── Stdout: {"success": true, "data": {...}}
//! ```
//!
//! ## Key Types
//!
//! - [`Toolchain`] - One of each tool, owned by the workspace
//! - [`CompilerService`] / [`ConfigHost`] - Incremental compilation
//! - [`Linter`], [`ApiExtractor`], [`Bundler`], [`ScriptRunner`]

mod process;
mod protocol;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Diagnostic;
use crate::storage::{ApiExtractorConfig, BundleConfig, BundleOutput, CompilerConfig, LintConfig, ToolsConfig};

pub use process::{
    ProcessApiExtractor, ProcessBundler, ProcessCompiler, ProcessLinter, ProcessRunner, ToolCommand,
};
pub use protocol::{ToolRequest, ToolResponse};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("No {0} configured; set tools.{0} in keystone.toml")]
    NotConfigured(&'static str),

    #[error("Failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} sent an invalid response: {message}")]
    Protocol { tool: String, message: String },

    #[error("{tool} failed: {message}")]
    Failed { tool: String, message: String },
}

/// A source file the compiler emitted output for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: PathBuf,
    pub text: String,
}

/// A compiler diagnostic with its numeric code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerDiagnostic {
    pub code: u32,
    #[serde(flatten)]
    pub diagnostic: Diagnostic,
}

/// Result of building and finalizing one invalidated project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectBuild {
    /// Directory of the project that was rebuilt
    pub project: PathBuf,

    #[serde(default)]
    pub emitted: Vec<SourceFile>,

    #[serde(default)]
    pub diagnostics: Vec<CompilerDiagnostic>,

    pub success: bool,
}

/// Resolves compiler configs on behalf of the compiler service
pub trait ConfigHost {
    /// Returns the config the compiler should use for the project in `dir`
    fn project_config(&self, dir: &Path) -> Option<CompilerConfig>;
}

/// An incremental solution builder shared by the whole workspace
pub trait CompilerService {
    /// Starts a fresh compile of the project in `root`, discarding work
    /// left over from an earlier run that stopped early
    fn begin(&mut self, _root: &Path) {}

    /// Builds and finalizes the next invalidated project reachable from
    /// the project in `root`, or returns `None` once all are up to date
    fn build_next(
        &mut self,
        root: &Path,
        host: &dyn ConfigHost,
    ) -> Result<Option<ProjectBuild>, ToolError>;
}

/// Severity of a lint message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LintSeverity {
    Off,
    Warning,
    Error,
}

/// A text replacement proposed by the linter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintFix {
    /// Byte range the replacement applies to
    pub range: (usize, usize),
    pub text: String,
}

/// An optional suggestion attached to a lint message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintSuggestion {
    pub desc: String,
    pub fix: LintFix,
}

/// One lint finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LintMessage {
    #[serde(default)]
    pub rule_id: Option<String>,
    pub severity: LintSeverity,
    #[serde(default)]
    pub fatal: bool,
    pub message: String,
    pub line: u32,
    pub column: u32,
    #[serde(default)]
    pub end_line: Option<u32>,
    #[serde(default)]
    pub end_column: Option<u32>,
    #[serde(default)]
    pub fix: Option<LintFix>,
    #[serde(default)]
    pub suggestions: Vec<LintSuggestion>,
}

/// Lint results for one file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LintReport {
    pub messages: Vec<LintMessage>,
    pub warning_count: u32,
    pub fixable_warning_count: u32,
    pub error_count: u32,
    pub fixable_error_count: u32,
    pub fatal_error_count: u32,
}

/// A lint engine: text in, findings out
pub trait Linter {
    fn lint_text(
        &mut self,
        text: &str,
        path: &Path,
        config: Option<&LintConfig>,
    ) -> Result<LintReport, ToolError>;
}

/// Log level of an API-extractor message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorLogLevel {
    None,
    Error,
    Warning,
    Info,
    Verbose,
}

/// A message reported by the API extractor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractorMessage {
    pub log_level: ExtractorLogLevel,
    pub text: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub source_file_path: Option<PathBuf>,
    #[serde(default)]
    pub source_file_line: Option<u32>,
    #[serde(default)]
    pub source_file_column: Option<u32>,
    /// Set by the receiver when it has reported the message itself
    #[serde(default)]
    pub handled: bool,
}

/// Overall result of an extraction run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractorResult {
    pub succeeded: bool,
    pub error_count: u32,
    pub warning_count: u32,
}

/// Options for an extraction run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractorOptions {
    /// Local builds update the API report instead of failing on differences
    pub local_build: bool,
}

/// An API-documentation extractor
pub trait ApiExtractor {
    fn extract(
        &mut self,
        config_path: &Path,
        config: &ApiExtractorConfig,
        options: ExtractorOptions,
        on_message: &mut dyn FnMut(&mut ExtractorMessage),
    ) -> Result<ExtractorResult, ToolError>;
}

/// One generated output file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputChunk {
    /// Path relative to the library directory
    pub file: PathBuf,
    pub contents: String,
}

/// An in-progress bundle produced from one configuration
pub trait Bundle {
    /// Generates the files for one declared output
    fn generate(&mut self, output: &BundleOutput) -> Result<Vec<OutputChunk>, ToolError>;

    /// Releases the bundle's resources
    fn close(self: Box<Self>) -> Result<(), ToolError>;
}

/// A bundler: build plan in, bundles out
pub trait Bundler {
    fn bundle(&mut self, config: &BundleConfig) -> Result<Box<dyn Bundle>, ToolError>;
}

/// Runs external commands such as manifest scripts and publishing
pub trait ScriptRunner {
    /// Runs `argv` in `dir` and returns its exit code
    fn run(&mut self, dir: &Path, argv: &[String]) -> Result<i32, ToolError>;
}

/// Returns the argv that runs a manifest script through the platform shell
pub fn shell_argv(script: &str) -> Vec<String> {
    if cfg!(windows) {
        vec!["cmd".into(), "/C".into(), script.into()]
    } else {
        vec!["sh".into(), "-c".into(), script.into()]
    }
}

/// One of each external tool
pub struct Toolchain {
    pub compiler: Box<dyn CompilerService>,
    pub linter: Box<dyn Linter>,
    pub api_extractor: Box<dyn ApiExtractor>,
    pub bundler: Box<dyn Bundler>,
    pub scripts: Box<dyn ScriptRunner>,
}

impl Toolchain {
    /// Builds the bridge-backed toolchain described by `[tools]`
    pub fn from_config(config: &ToolsConfig) -> Self {
        Self {
            compiler: Box::new(ProcessCompiler::new(ToolCommand::from_argv("compiler", &config.compiler))),
            linter: Box::new(ProcessLinter::new(ToolCommand::from_argv("linter", &config.linter))),
            api_extractor: Box::new(ProcessApiExtractor::new(ToolCommand::from_argv(
                "api_extractor",
                &config.api_extractor,
            ))),
            bundler: Box::new(ProcessBundler::new(ToolCommand::from_argv("bundler", &config.bundler))),
            scripts: Box::new(ProcessRunner),
        }
    }
}

impl std::fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolchain").finish_non_exhaustive()
    }
}
