//! Bridge-process implementations of the tool traits
//!
//! Every bridge is spawned per request: one JSON request line in, one JSON
//! response line out.

use std::collections::{HashSet, VecDeque};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use serde::Deserialize;
use tracing::debug;

use super::protocol::{ToolRequest, ToolResponse};
use super::{
    ApiExtractor, Bundle, Bundler, CompilerService, ConfigHost, ExtractorMessage,
    ExtractorOptions, ExtractorResult, LintReport, Linter, OutputChunk, ProjectBuild,
    ScriptRunner, ToolError,
};
use crate::storage::{ApiExtractorConfig, BundleConfig, BundleOutput, LintConfig};

/// A configured bridge command line
#[derive(Debug, Clone)]
pub struct ToolCommand {
    tool: &'static str,
    argv: Vec<String>,
}

impl ToolCommand {
    /// Returns `None` when `argv` is empty (tool not configured)
    pub fn from_argv(tool: &'static str, argv: &[String]) -> Option<Self> {
        if argv.is_empty() {
            return None;
        }
        Some(Self {
            tool,
            argv: argv.to_vec(),
        })
    }

    pub fn tool(&self) -> &'static str {
        self.tool
    }

    /// Sends one request and reads one response
    pub fn execute(&self, cwd: &Path, request: &ToolRequest) -> Result<ToolResponse, ToolError> {
        let spawn_error = |source| ToolError::Spawn {
            tool: self.tool.to_string(),
            source,
        };
        debug!(tool = self.tool, operation = %request.operation, "sending tool request");

        let mut child = Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(spawn_error)?;

        match self.exchange(&mut child, request) {
            Ok(response) => {
                let _ = child.wait();
                Ok(response)
            }
            Err(e) => {
                // Reap the bridge so failed requests leave no zombies
                let _ = child.kill();
                let _ = child.wait();
                Err(e)
            }
        }
    }

    /// Writes the request, closes stdin and reads the response line
    fn exchange(&self, child: &mut Child, request: &ToolRequest) -> Result<ToolResponse, ToolError> {
        let io_error = |source| ToolError::Spawn {
            tool: self.tool.to_string(),
            source,
        };
        let protocol_error = |message: String| ToolError::Protocol {
            tool: self.tool.to_string(),
            message,
        };

        // Send request, then close stdin so the bridge sees EOF
        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| protocol_error("stdin unavailable".to_string()))?;
            let request_json =
                serde_json::to_string(request).map_err(|e| protocol_error(e.to_string()))?;
            writeln!(stdin, "{}", request_json).map_err(io_error)?;
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| protocol_error("stdout unavailable".to_string()))?;
        let response_line = BufReader::new(stdout)
            .lines()
            .next()
            .ok_or_else(|| protocol_error("no response".to_string()))?
            .map_err(io_error)?;

        serde_json::from_str(&response_line).map_err(|e| protocol_error(e.to_string()))
    }

    fn call<T: for<'de> Deserialize<'de>>(
        &self,
        cwd: &Path,
        operation: &str,
        params: serde_json::Value,
    ) -> Result<T, ToolError> {
        self.execute(cwd, &ToolRequest::new(operation, params))?
            .into_data(self.tool)
    }
}

fn require<'a>(command: &'a Option<ToolCommand>, tool: &'static str) -> Result<&'a ToolCommand, ToolError> {
    command.as_ref().ok_or(ToolError::NotConfigured(tool))
}

/// Compiler bridge
///
/// The bridge builds the whole reference graph of a root project in one
/// request and reports every project it rebuilt; those are then handed
/// out one at a time through [`CompilerService::build_next`].
#[derive(Debug)]
pub struct ProcessCompiler {
    command: Option<ToolCommand>,
    queue: VecDeque<ProjectBuild>,
    active_root: Option<PathBuf>,
}

impl ProcessCompiler {
    pub fn new(command: Option<ToolCommand>) -> Self {
        Self {
            command,
            queue: VecDeque::new(),
            active_root: None,
        }
    }

    /// Collects the configs of `root` and every project it references
    fn resolve_projects(root: &Path, host: &dyn ConfigHost) -> serde_json::Map<String, serde_json::Value> {
        let mut projects = serde_json::Map::new();
        let mut visited = HashSet::new();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            if !visited.insert(dir.clone()) {
                continue;
            }
            let Some(config) = host.project_config(&dir) else {
                continue;
            };
            pending.extend(config.reference_dirs(&dir));
            if let Ok(value) = serde_json::to_value(&config) {
                projects.insert(dir.to_string_lossy().into_owned(), value);
            }
        }
        projects
    }
}

#[derive(Deserialize)]
struct BuildData {
    #[serde(default)]
    projects: Vec<ProjectBuild>,
}

impl CompilerService for ProcessCompiler {
    fn begin(&mut self, root: &Path) {
        if !self.queue.is_empty() {
            debug!(root = %root.display(), stale = self.queue.len(), "dropping queued projects");
        }
        self.queue.clear();
        self.active_root = None;
    }

    fn build_next(
        &mut self,
        root: &Path,
        host: &dyn ConfigHost,
    ) -> Result<Option<ProjectBuild>, ToolError> {
        if self.active_root.as_deref() != Some(root) {
            let command = require(&self.command, "compiler")?;
            let params = serde_json::json!({
                "root": root,
                "projects": Self::resolve_projects(root, host),
            });
            let data: BuildData = command.call(root, "build", params)?;
            self.queue = data.projects.into();
            self.active_root = Some(root.to_path_buf());
        }

        let next = self.queue.pop_front();
        match &next {
            // A failed project ends the run; the rest is rebuilt next time
            Some(project) if !project.success => self.begin(root),
            None => self.active_root = None,
            Some(_) => {}
        }
        Ok(next)
    }
}

/// Linter bridge
#[derive(Debug)]
pub struct ProcessLinter {
    command: Option<ToolCommand>,
}

impl ProcessLinter {
    pub fn new(command: Option<ToolCommand>) -> Self {
        Self { command }
    }
}

impl Linter for ProcessLinter {
    fn lint_text(
        &mut self,
        text: &str,
        path: &Path,
        config: Option<&LintConfig>,
    ) -> Result<LintReport, ToolError> {
        let command = require(&self.command, "linter")?;
        let cwd = path.parent().unwrap_or_else(|| Path::new("."));
        let params = serde_json::json!({
            "path": path,
            "text": text,
            "config": config.map(|c| &c.rules),
            "configPath": config.map(|c| &c.path),
        });
        command.call(cwd, "lint", params)
    }
}

/// API-extractor bridge
#[derive(Debug)]
pub struct ProcessApiExtractor {
    command: Option<ToolCommand>,
}

impl ProcessApiExtractor {
    pub fn new(command: Option<ToolCommand>) -> Self {
        Self { command }
    }
}

#[derive(Deserialize)]
struct ExtractData {
    #[serde(flatten)]
    result: ExtractorResult,
    #[serde(default)]
    messages: Vec<ExtractorMessage>,
}

impl ApiExtractor for ProcessApiExtractor {
    fn extract(
        &mut self,
        config_path: &Path,
        config: &ApiExtractorConfig,
        options: ExtractorOptions,
        on_message: &mut dyn FnMut(&mut ExtractorMessage),
    ) -> Result<ExtractorResult, ToolError> {
        let command = require(&self.command, "api_extractor")?;
        let cwd = config_path.parent().unwrap_or_else(|| Path::new("."));
        let params = serde_json::json!({
            "configPath": config_path,
            "config": config,
            "localBuild": options.local_build,
        });
        let data: ExtractData = command.call(cwd, "extract", params)?;

        for mut message in data.messages {
            on_message(&mut message);
            if !message.handled {
                debug!(text = %message.text, "unhandled extractor message");
            }
        }
        Ok(data.result)
    }
}

/// Bundler bridge
#[derive(Debug)]
pub struct ProcessBundler {
    command: Option<ToolCommand>,
}

impl ProcessBundler {
    pub fn new(command: Option<ToolCommand>) -> Self {
        Self { command }
    }
}

#[derive(Deserialize)]
struct BundleData {
    #[serde(default)]
    chunks: Vec<TaggedChunk>,
}

#[derive(Deserialize)]
struct TaggedChunk {
    /// The declared output (`output[].file`) this chunk belongs to
    output: String,
    #[serde(flatten)]
    chunk: OutputChunk,
}

/// Bundle produced by the bridge in a single request
struct ProcessBundle {
    chunks: Vec<TaggedChunk>,
}

impl Bundle for ProcessBundle {
    fn generate(&mut self, output: &BundleOutput) -> Result<Vec<OutputChunk>, ToolError> {
        let (matching, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.chunks)
            .into_iter()
            .partition(|c| c.output == output.file);
        self.chunks = rest;
        Ok(matching.into_iter().map(|c| c.chunk).collect())
    }

    fn close(self: Box<Self>) -> Result<(), ToolError> {
        Ok(())
    }
}

impl Bundler for ProcessBundler {
    fn bundle(&mut self, config: &BundleConfig) -> Result<Box<dyn Bundle>, ToolError> {
        let command = require(&self.command, "bundler")?;
        // Bundles run with the library directory as the working directory
        let cwd = std::env::current_dir().map_err(|source| ToolError::Spawn {
            tool: command.tool().to_string(),
            source,
        })?;
        let data: BundleData = command.call(&cwd, "bundle", serde_json::json!({ "config": config }))?;
        Ok(Box::new(ProcessBundle {
            chunks: data.chunks,
        }))
    }
}

/// Runs commands as child processes with inherited stdio
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ScriptRunner for ProcessRunner {
    fn run(&mut self, dir: &Path, argv: &[String]) -> Result<i32, ToolError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(ToolError::Failed {
                tool: "script".to_string(),
                message: "empty command line".to_string(),
            });
        };

        debug!(dir = %dir.display(), command = %argv.join(" "), "running command");

        let status = Command::new(program)
            .args(args)
            .current_dir(dir)
            .status()
            .map_err(|source| ToolError::Spawn {
                tool: program.clone(),
                source,
            })?;

        Ok(status.code().unwrap_or(-1))
    }
}
