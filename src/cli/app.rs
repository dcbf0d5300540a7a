//! Main CLI application structure

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use super::console::ConsoleReporter;
use super::output::{Output, OutputFormat};
use crate::domain::TaskStatus;
use crate::scope::{
    LibraryTask, PackageTask, Scope, ScopeId, TaskKind, TaskOptions, TaskRequest, WatcherScope, Workspace,
};
use crate::storage::{Config, Manifest};
use crate::tools::Toolchain;

#[derive(Parser)]
#[command(name = "keystone")]
#[command(author, version, about = "Dependency-aware builds for package monorepos")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global config, then text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub selection: Selection,

    #[command(subcommand)]
    pub command: Commands,
}

/// Which scopes a command runs on, and how
#[derive(Args, Debug, Clone, Default)]
pub struct Selection {
    /// Packages to run on, by full or unscoped name (default: all)
    #[arg(long, short = 'p', global = true, value_delimiter = ',')]
    pub projects: Vec<String>,

    /// Libraries to run on, by directory name (default: all)
    #[arg(long, short = 'l', global = true, value_delimiter = ',')]
    pub libraries: Vec<String>,

    /// Also run on the dependencies of the selected packages
    #[arg(long, short = 'd', global = true)]
    pub with_dependencies: bool,

    /// Run stages even when nothing changed
    #[arg(long, global = true)]
    pub force: bool,

    /// Report what would change without writing or publishing
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile libraries incrementally
    Compile,

    /// Lint the files the last compile emitted
    Lint,

    /// Extract the public API report
    Api,

    /// Bundle library outputs
    Bundle,

    /// Compile, lint, extract and bundle
    Build,

    /// Build, then rebuild affected packages on every change
    Watch,

    /// Show package dependencies and dependents
    Deps,

    /// Build every library of each package
    Libs,

    /// Run each package's `test` script
    Test,

    /// Run each package's `doc` script
    Doc,

    /// Rewrite package versions and dependency ranges
    Version {
        /// New version for a package, as `name=version`
        #[arg(long = "set", value_parser = parse_assignment, conflicts_with = "snapshot")]
        set: Vec<(String, String)>,

        /// Move the selection and its dependencies to the next snapshot
        #[arg(long)]
        snapshot: bool,

        /// Snapshot tag (default from keystone.toml)
        #[arg(long, requires = "snapshot")]
        tag: Option<String>,
    },

    /// Publish packages
    Publish {
        /// Distribution tag (default from keystone.toml)
        #[arg(long)]
        tag: Option<String>,
    },

    /// Remove compiler outputs
    Clean,

    /// List packages with their libraries and dependencies
    List,
}

impl Commands {
    /// The task this command runs through the workspace, if any
    fn task(&self) -> Option<TaskKind> {
        let task: TaskKind = match self {
            Commands::Compile => LibraryTask::Compile.into(),
            Commands::Lint => LibraryTask::Lint.into(),
            Commands::Api => LibraryTask::Api.into(),
            Commands::Bundle => LibraryTask::Bundle.into(),
            Commands::Build | Commands::Watch => LibraryTask::Build.into(),
            Commands::Deps => PackageTask::Deps.into(),
            Commands::Libs => PackageTask::Libs.into(),
            Commands::Test => PackageTask::Test.into(),
            Commands::Doc => PackageTask::Doc.into(),
            Commands::Publish { .. } => PackageTask::Publish.into(),
            Commands::Clean => PackageTask::Clean.into(),
            Commands::Version { .. } | Commands::List => return None,
        };
        Some(task)
    }
}

fn parse_assignment(s: &str) -> Result<(String, String), String> {
    let (name, version) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=version, got '{}'", s))?;
    let (name, version) = (name.trim(), version.trim());
    if name.is_empty() || version.is_empty() {
        return Err(format!("expected name=version, got '{}'", s));
    }
    Ok((name.to_string(), version.to_string()))
}

/// Main entry point for the CLI
///
/// Returns the combined status of everything that ran.
pub fn run() -> Result<TaskStatus> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load()?;
    let format = cli
        .format
        .unwrap_or_else(|| config.global.default_format.into());
    let output = Output::new(format, cli.verbose);
    debug!(root = %config.root.display(), "workspace root");

    let toolchain = Toolchain::from_config(&config.workspace.tools);
    let reporter = Box::new(ConsoleReporter::new(output));
    let mut workspace = Workspace::load(&config.root, config.workspace, toolchain, reporter)
        .context("Failed to load workspace")?;

    let selection = cli.selection;
    let selects = !matches!(cli.command, Commands::List | Commands::Version { snapshot: false, .. });
    let unknown = selects && unknown_packages(&workspace, &selection.projects);

    let status = match cli.command {
        Commands::List => {
            list(&workspace, &output);
            TaskStatus::Success
        }
        Commands::Version { set, snapshot, tag } => {
            if snapshot {
                let tag = tag.unwrap_or_else(|| workspace.config().version.tag.clone());
                let today = chrono::Local::now().date_naive();
                workspace.bump_snapshot(projects(&selection), &tag, today, selection.dry_run)
            } else if set.is_empty() {
                anyhow::bail!("Nothing to do: pass --set name=version or --snapshot");
            } else {
                let versions: BTreeMap<String, String> = set.into_iter().collect();
                workspace.set_versions(versions, selection.dry_run)
            }
        }
        Commands::Watch => {
            let request = request(LibraryTask::Build.into(), &selection, None);
            let debounce = Duration::from_millis(workspace.config().watch.debounce_ms);
            WatcherScope::new(request, debounce).run(&mut workspace)?
        }
        command => {
            let tag = match &command {
                Commands::Publish { tag } => tag.clone(),
                _ => None,
            };
            let Some(task) = command.task() else {
                return Ok(TaskStatus::Skipped);
            };
            workspace.run(&request(task, &selection, tag))
        }
    };

    // Unknown names were already reported while selecting
    let status = if unknown { status.escalate(TaskStatus::Failure) } else { status };
    debug!(%status, "command finished");
    Ok(status)
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn projects(selection: &Selection) -> Option<&[String]> {
    if selection.projects.is_empty() {
        None
    } else {
        Some(&selection.projects)
    }
}

fn request(task: TaskKind, selection: &Selection, tag: Option<String>) -> TaskRequest {
    let mut request = TaskRequest::new(task).options(TaskOptions {
        force: selection.force,
        dry_run: selection.dry_run,
        tag,
        ..Default::default()
    });
    if let Some(names) = projects(selection) {
        request = request.packages(names.iter().cloned());
    }
    if !selection.libraries.is_empty() {
        request = request.libraries(selection.libraries.iter().cloned());
    }
    if selection.with_dependencies {
        request = request.with_dependencies();
    }
    request
}

fn unknown_packages(workspace: &Workspace, names: &[String]) -> bool {
    names.iter().any(|name| workspace.find_package(name).is_none())
}

/// Prints every package, dependencies first
fn list(workspace: &Workspace, output: &Output) {
    let registry = workspace.registry();
    let order = registry.dependency_closure(&registry.package_ids());

    let mut items = Vec::new();
    for id in order {
        let package = &registry[id];
        let libraries: Vec<&str> = package
            .libraries()
            .iter()
            .filter_map(|lib| registry.get_library(*lib))
            .map(|lib| lib.name())
            .collect();
        let dependencies: Vec<String> = registry
            .dependencies(id)
            .into_iter()
            .map(|dep| registry.qualified_name(ScopeId::Package(dep)))
            .collect();
        let version = package.manifest().and_then(Manifest::version);
        let dir = package
            .base_dir()
            .strip_prefix(workspace.root())
            .unwrap_or(package.base_dir());

        if output.is_json() {
            items.push(serde_json::json!({
                "name": package.name(),
                "version": version,
                "dir": dir.display().to_string(),
                "private": package.manifest().is_some_and(Manifest::is_private),
                "libraries": libraries,
                "dependencies": dependencies,
            }));
            continue;
        }

        let dir = if dir.as_os_str().is_empty() { ".".into() } else { dir.display().to_string() };
        println!("{} {} ({})", package.name(), version.unwrap_or("-"), dir);
        println!("  libraries: {}", join_or_none(&libraries));
        println!("  dependencies: {}", join_or_none(&dependencies));
    }

    if output.is_json() {
        output.data(&items);
    }
}

fn join_or_none<S: AsRef<str>>(items: &[S]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(", ")
    }
}
