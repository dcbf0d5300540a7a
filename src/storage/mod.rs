//! # Storage Layer
//!
//! File formats Keystone reads and (for manifests) writes.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Package manifest | JSON, order preserving | `{package}/package.json` |
//! | Compiler config | JSON | `{library}/tsconfig.json` |
//! | Bundle config | JSON (object or array) | `{library}/bundle.config.json` |
//! | API-report config | JSON | `{library}/api-extractor.json` |
//! | Lint config | JSON or YAML | nearest `.lintrc.*` up the tree |
//! | Workspace config | TOML | `{root}/keystone.toml` |
//!
//! ## Concurrency Safety
//!
//! - [`Manifest::save`] holds an exclusive `fs2` lock on a temp file and
//!   renames it into place
//! - Everything else is read-only
//!
//! ## Key Types
//!
//! - [`Manifest`] - Read/rewrite package manifests
//! - [`CompilerConfig`] - Library sources, references, outputs
//! - [`Config`] - Workspace and global configuration

mod config;
mod library_config;
mod manifest;

pub use config::{
    Config, ConfigError, FilesConfig, GlobalConfig, OutputFormat, PublishConfig, ToolsConfig,
    VersionConfig, WatchConfig, WorkspaceConfig, WORKSPACE_CONFIG_FILE,
};
pub use library_config::{
    find_lint_config, normalize, relative_path, ApiExtractorConfig, ApiReportConfig, BundleConfig,
    BundleOutput, CompilerConfig, CompilerOptions, LintConfig, ProjectReference,
};
pub use manifest::{Manifest, ManifestError, DEPENDENCY_FIELDS};
