//! Per-library configuration files
//!
//! | File | Default name | Consumer |
//! |------|--------------|----------|
//! | Compiler config | `tsconfig.json` | Compile task, library discovery |
//! | Bundle config | `bundle.config.json` | Bundle task |
//! | API-report config | `api-extractor.json` | Api task |
//! | Lint config | `.lintrc.json` / `.lintrc.yaml` (ancestors searched) | Lint task |
//!
//! All of them are read-only to Keystone.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A reference from one compiler project to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectReference {
    pub path: String,
}

/// Compiler options Keystone looks at
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerOptions {
    pub composite: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts_build_info_file: Option<String>,

    /// Options passed through to the compiler untouched
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

/// A library's compiler configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerConfig {
    pub compiler_options: CompilerOptions,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ProjectReference>,
}

impl CompilerConfig {
    /// Loads a compiler config from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read compiler config: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse compiler config: {}", path.display()))
    }

    /// Enumerates the source files of the library rooted at `dir`
    pub fn source_files(&self, dir: &Path) -> Vec<PathBuf> {
        let mut sources: Vec<PathBuf> = self
            .files
            .iter()
            .map(|f| normalize(&dir.join(f)))
            .filter(|p| p.is_file())
            .collect();

        let excluded: Vec<glob::Pattern> = self
            .exclude
            .iter()
            .filter_map(|p| glob::Pattern::new(&dir.join(p).to_string_lossy()).ok())
            .collect();

        for pattern in &self.include {
            let pattern = dir.join(pattern);
            let Ok(paths) = glob::glob(&pattern.to_string_lossy()) else {
                continue;
            };
            for path in paths.flatten() {
                if !path.is_file() || excluded.iter().any(|p| p.matches_path(&path)) {
                    continue;
                }
                let path = normalize(&path);
                if !sources.contains(&path) {
                    sources.push(path);
                }
            }
        }

        sources
    }

    /// Returns true if the config names at least one source file or reference
    pub fn has_inputs(&self, dir: &Path) -> bool {
        !self.references.is_empty() || !self.source_files(dir).is_empty()
    }

    /// Resolves project references to absolute library directories
    pub fn reference_dirs(&self, dir: &Path) -> Vec<PathBuf> {
        self.references
            .iter()
            .map(|r| {
                let target = normalize(&dir.join(&r.path));
                // A reference may point at the config file itself
                if target.extension().is_some_and(|ext| ext == "json") {
                    target.parent().map(Path::to_path_buf).unwrap_or(target)
                } else {
                    target
                }
            })
            .collect()
    }

    /// Returns a copy with synthesized references to `dirs` added
    ///
    /// References the config already declares are skipped.
    pub fn with_references(&self, dir: &Path, dirs: &[PathBuf]) -> Self {
        let mut config = self.clone();
        let mut declared = self.reference_dirs(dir);
        let own = normalize(dir);

        for target in dirs {
            let target = normalize(target);
            if target == own || declared.contains(&target) {
                continue;
            }
            config.references.push(ProjectReference {
                path: relative_path(dir, &target).to_string_lossy().into_owned(),
            });
            declared.push(target);
        }
        config
    }

    /// Returns the output directory, if configured
    pub fn out_dir(&self, dir: &Path) -> Option<PathBuf> {
        self.compiler_options
            .out_dir
            .as_ref()
            .map(|out| normalize(&dir.join(out)))
    }

    /// Returns the incremental build-info file, if configured
    pub fn build_info_file(&self, dir: &Path) -> Option<PathBuf> {
        self.compiler_options
            .ts_build_info_file
            .as_ref()
            .map(|file| normalize(&dir.join(file)))
    }
}

/// One output of a bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleOutput {
    pub file: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// A static bundle configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleConfig {
    pub input: String,

    #[serde(default, deserialize_with = "one_or_many")]
    pub output: Vec<BundleOutput>,

    /// Bundler options passed through untouched
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl BundleConfig {
    /// Loads one or more bundle configurations from a file
    pub fn load_all(path: &Path) -> Result<Vec<Self>> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read bundle config: {}", path.display()))?;

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            Many(Vec<BundleConfig>),
            One(Box<BundleConfig>),
        }

        let configs = match serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse bundle config: {}", path.display()))?
        {
            OneOrMany::Many(configs) => configs,
            OneOrMany::One(config) => vec![*config],
        };
        Ok(configs)
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<BundleOutput>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<BundleOutput>),
        One(BundleOutput),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(outputs) => outputs,
        OneOrMany::One(output) => vec![output],
    })
}

/// API report settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiReportConfig {
    pub enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_folder: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_file_name: Option<String>,
}

/// API-extractor configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiExtractorConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_entry_point_file_path: Option<String>,

    pub api_report: ApiReportConfig,

    /// Remaining extractor settings, passed through untouched
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

impl ApiExtractorConfig {
    /// Loads an API-extractor config from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read API config: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse API config: {}", path.display()))
    }

    /// Returns the directory the API report is written to
    pub fn report_dir(&self, dir: &Path) -> PathBuf {
        let folder = self
            .api_report
            .report_folder
            .as_deref()
            .unwrap_or("etc/");
        normalize(&dir.join(folder))
    }
}

/// A resolved lint configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LintConfig {
    pub path: PathBuf,
    pub rules: serde_json::Value,
}

/// Finds the nearest lint config, walking up from `dir`
pub fn find_lint_config(dir: &Path, candidates: &[String]) -> Result<Option<LintConfig>> {
    for ancestor in dir.ancestors() {
        for name in candidates {
            let path = ancestor.join(name);
            if !path.is_file() {
                continue;
            }
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read lint config: {}", path.display()))?;
            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yaml" || ext == "yml");
            let rules = if is_yaml {
                serde_yaml::from_str(&content)
                    .with_context(|| format!("Failed to parse lint config: {}", path.display()))?
            } else {
                serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse lint config: {}", path.display()))?
            };
            return Ok(Some(LintConfig { path, rules }));
        }
    }
    Ok(None)
}

/// Lexically normalizes a path, resolving `.` and `..` components
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Returns `target` relative to `base`; both must be absolute or both relative
pub fn relative_path(base: &Path, target: &Path) -> PathBuf {
    let base = normalize(base);
    let target = normalize(target);
    let base_parts: Vec<_> = base.components().collect();
    let target_parts: Vec<_> = target.components().collect();

    let common = base_parts
        .iter()
        .zip(&target_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..base_parts.len() {
        relative.push("..");
    }
    for part in &target_parts[common..] {
        relative.push(part.as_os_str());
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    relative
}
