//! Package manifest storage
//!
//! Manifests are JSON documents (`package.json` by default). They are kept
//! as an order-preserving map so that a rewrite only touches the fields it
//! changes: key order and unrelated entries pass through untouched.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::unscoped_name;
use crate::domain::version::rewrite_range;

/// Dependency tables scanned for workspace packages, in rewrite order
pub const DEPENDENCY_FIELDS: [&str; 4] = [
    "dependencies",
    "optionalDependencies",
    "peerDependencies",
    "devDependencies",
];

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Manifest is not a JSON object: {0}")]
    NotAnObject(PathBuf),

    #[error("Failed to parse manifest {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// A package manifest
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    fields: Map<String, Value>,
}

impl Manifest {
    /// Loads a manifest from disk
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        Self::parse(path, &content)
    }

    /// Parses manifest text that was read from `path`
    pub fn parse(path: impl Into<PathBuf>, content: &str) -> Result<Self> {
        let path = path.into();
        let value: Value = serde_json::from_str(content).map_err(|e| ManifestError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;

        match value {
            Value::Object(fields) => Ok(Self { path, fields }),
            _ => Err(ManifestError::NotAnObject(path).into()),
        }
    }

    /// Returns the path the manifest was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the directory containing the manifest
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.str_field("name").filter(|n| !n.is_empty())
    }

    /// Returns the unscoped alias of the package name, if it is scoped
    pub fn unscoped_name(&self) -> Option<&str> {
        self.name().and_then(unscoped_name)
    }

    pub fn version(&self) -> Option<&str> {
        self.str_field("version")
    }

    pub fn is_private(&self) -> bool {
        self.fields
            .get("private")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Returns the command line of a named script
    pub fn script(&self, name: &str) -> Option<&str> {
        self.fields
            .get("scripts")
            .and_then(Value::as_object)
            .and_then(|scripts| scripts.get(name))
            .and_then(Value::as_str)
    }

    /// Returns the workspace package directories declared by a root manifest
    pub fn workspaces(&self) -> Vec<String> {
        let list = match self.fields.get("workspaces") {
            Some(Value::Array(list)) => Some(list),
            Some(Value::Object(obj)) => obj.get("packages").and_then(Value::as_array),
            _ => None,
        };

        list.map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
    }

    /// Returns the names declared across all dependency tables, first occurrence first
    pub fn dependency_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for field in DEPENDENCY_FIELDS {
            if let Some(table) = self.fields.get(field).and_then(Value::as_object) {
                for name in table.keys() {
                    if !names.contains(name) {
                        names.push(name.clone());
                    }
                }
            }
        }
        names
    }

    /// Returns the declared range of a dependency, searching every table
    pub fn dependency_range(&self, name: &str) -> Option<&str> {
        DEPENDENCY_FIELDS.iter().find_map(|field| {
            self.fields
                .get(*field)
                .and_then(Value::as_object)
                .and_then(|table| table.get(name))
                .and_then(Value::as_str)
        })
    }

    /// Applies a name -> version map
    ///
    /// Rewrites the `version` field when the map names this package, and the
    /// range of every dependency the map names, keeping range operators.
    /// Returns true if anything changed.
    pub fn apply_versions(&mut self, versions: &BTreeMap<String, String>) -> bool {
        let mut changed = false;

        let own_version = self.name().and_then(|name| versions.get(name)).cloned();
        if let Some(version) = own_version {
            if self.version() != Some(version.as_str()) {
                self.fields
                    .insert("version".to_string(), Value::String(version));
                changed = true;
            }
        }

        for field in DEPENDENCY_FIELDS {
            let Some(table) = self.fields.get_mut(field).and_then(Value::as_object_mut) else {
                continue;
            };
            for (name, range) in table.iter_mut() {
                let (Some(version), Some(current)) = (versions.get(name), range.as_str()) else {
                    continue;
                };
                let rewritten = rewrite_range(current, version);
                if rewritten != current {
                    *range = Value::String(rewritten);
                    changed = true;
                }
            }
        }

        changed
    }

    /// Renders the manifest with two-space indentation and a trailing newline
    pub fn to_json_string(&self) -> Result<String> {
        let mut content =
            serde_json::to_string_pretty(&self.fields).context("Failed to serialize manifest")?;
        content.push('\n');
        Ok(content)
    }

    /// Writes the manifest back to its path
    pub fn save(&self) -> Result<()> {
        let content = self.to_json_string()?;
        let temp_path = self.path.with_extension("json.tmp");

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

            file.lock_exclusive()
                .context("Failed to acquire write lock on manifest")?;
            file.write_all(content.as_bytes())
                .context("Failed to write manifest")?;
            file.flush().context("Failed to flush manifest")?;
        }

        // Atomic rename
        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                self.path.display()
            )
        })
    }
}
