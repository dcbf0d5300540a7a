//! Configuration handling for Keystone
//!
//! Configuration is stored in `keystone.toml` (workspace) and
//! `~/.config/keystone/config.toml` (global).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the workspace configuration file
pub const WORKSPACE_CONFIG_FILE: &str = "keystone.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Names of the files Keystone looks for in package and library directories
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilesConfig {
    /// Package manifest
    pub manifest: String,

    /// Compiler config; its presence makes a directory a library
    pub compiler_config: String,

    /// Static bundle config
    pub bundle_config: String,

    /// API-report config
    pub api_config: String,

    /// Lint config candidates, searched in every ancestor directory
    pub lint_config: Vec<String>,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            manifest: "package.json".to_string(),
            compiler_config: "tsconfig.json".to_string(),
            bundle_config: "bundle.config.json".to_string(),
            api_config: "api-extractor.json".to_string(),
            lint_config: vec![
                ".lintrc.json".to_string(),
                ".lintrc.yaml".to_string(),
                ".lintrc.yml".to_string(),
            ],
        }
    }
}

/// Command lines of the external tool bridges
///
/// Each entry is an argv list; an empty list means the tool is not
/// configured and the tasks that need it fail with a diagnostic.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ToolsConfig {
    pub compiler: Vec<String>,
    pub linter: Vec<String>,
    pub bundler: Vec<String>,
    pub api_extractor: Vec<String>,
}

/// Configuration for the watch loop
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period after the last change before a rebuild starts
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 500 }
    }
}

/// Configuration for publishing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PublishConfig {
    /// Publish command line, run in the package directory
    pub command: Vec<String>,

    /// Distribution tag used when none is given
    pub tag: Option<String>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            command: vec!["npm".to_string(), "publish".to_string()],
            tag: None,
        }
    }
}

/// Configuration for version bumps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VersionConfig {
    /// Default snapshot tag
    pub tag: String,
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            tag: "dev".to_string(),
        }
    }
}

/// Workspace-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub files: FilesConfig,
    pub tools: ToolsConfig,
    pub watch: WatchConfig,
    pub publish: PublishConfig,
    pub version: VersionConfig,
}

/// Global user configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default output format (text or json)
    pub default_format: OutputFormat,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Combined configuration (global + workspace)
#[derive(Debug, Clone)]
pub struct Config {
    pub workspace: WorkspaceConfig,
    pub global: GlobalConfig,
    pub root: PathBuf,
}

impl Config {
    /// Loads configuration for the workspace containing the current directory
    pub fn load() -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        let root = Self::find_workspace_root(&cwd)
            .ok_or_else(|| anyhow::anyhow!("Not in a workspace: no {} or package.json found", WORKSPACE_CONFIG_FILE))?;
        Self::for_root(&root)
    }

    /// Loads configuration for a specific workspace root
    pub fn for_root(root: &Path) -> Result<Self> {
        let global = Self::load_global()?;
        let workspace = Self::load_workspace_config(root)?;

        Ok(Self {
            workspace,
            global,
            root: root.to_path_buf(),
        })
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "keystone", "keystone")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Loads global configuration
    fn load_global() -> Result<GlobalConfig> {
        let config_dir = match Self::global_config_dir() {
            Some(dir) => dir,
            None => return Ok(GlobalConfig::default()),
        };

        let config_path = config_dir.join("config.toml");
        if !config_path.exists() {
            return Ok(GlobalConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read global config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse global config")
    }

    /// Loads workspace configuration from a specific root
    pub fn load_workspace_config(root: &Path) -> Result<WorkspaceConfig> {
        let config_path = root.join(WORKSPACE_CONFIG_FILE);

        if !config_path.exists() {
            return Ok(WorkspaceConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read workspace config: {}", config_path.display()))?;

        let config: WorkspaceConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse workspace config")?;

        config.validate()?;
        Ok(config)
    }

    /// Finds the workspace root
    ///
    /// The nearest ancestor holding `keystone.toml` wins; otherwise the
    /// nearest ancestor holding a manifest.
    pub fn find_workspace_root(start: &Path) -> Option<PathBuf> {
        let explicit = start
            .ancestors()
            .find(|dir| dir.join(WORKSPACE_CONFIG_FILE).is_file());
        if let Some(dir) = explicit {
            return Some(dir.to_path_buf());
        }

        let manifest = FilesConfig::default().manifest;
        start
            .ancestors()
            .find(|dir| dir.join(&manifest).is_file())
            .map(Path::to_path_buf)
    }
}

impl WorkspaceConfig {
    /// Checks values serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.files.manifest.is_empty() {
            return Err(ConfigError::Invalid("files.manifest must not be empty".into()));
        }
        if self.files.compiler_config.is_empty() {
            return Err(ConfigError::Invalid(
                "files.compiler_config must not be empty".into(),
            ));
        }
        if self.publish.command.is_empty() {
            return Err(ConfigError::Invalid("publish.command must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config() {
        let config = WorkspaceConfig::default();
        assert_eq!(config.files.manifest, "package.json");
        assert_eq!(config.watch.debounce_ms, 500);
        assert_eq!(config.version.tag, "dev");
        assert!(config.tools.compiler.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_workspace_config() {
        let toml = r#"
[files]
compiler_config = "jsconfig.json"

[tools]
compiler = ["node", "tools/compile-bridge.js"]

[watch]
debounce_ms = 50
"#;

        let config: WorkspaceConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.files.compiler_config, "jsconfig.json");
        assert_eq!(config.files.manifest, "package.json");
        assert_eq!(config.tools.compiler, vec!["node", "tools/compile-bridge.js"]);
        assert_eq!(config.watch.debounce_ms, 50);
    }

    #[test]
    fn parse_global_config() {
        let config: GlobalConfig = toml::from_str("default_format = \"json\"\n").unwrap();
        assert_eq!(config.default_format, OutputFormat::Json);
    }

    #[test]
    fn invalid_workspace_config() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(WORKSPACE_CONFIG_FILE),
            "[publish]\ncommand = []\n",
        )
        .unwrap();

        assert!(Config::load_workspace_config(dir.path()).is_err());
    }

    #[test]
    fn find_workspace_root_prefers_config_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(WORKSPACE_CONFIG_FILE), "").unwrap();
        let pkg = dir.path().join("packages/core");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("package.json"), "{}").unwrap();

        assert_eq!(Config::find_workspace_root(&pkg), Some(dir.path().to_path_buf()));
    }

    #[test]
    fn find_workspace_root_falls_back_to_manifest() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        let nested = dir.path().join("src");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(Config::find_workspace_root(&nested), Some(dir.path().to_path_buf()));
    }
}
