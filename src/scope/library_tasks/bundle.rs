//! Bundle task
//!
//! Reads the static bundle config and, for every declared output, asks the
//! bundler to generate files and writes them beneath the library. The
//! process working directory is the library directory for the duration.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

use crate::domain::{LibraryId, TaskStatus};
use crate::scope::{Scope, TaskContext};
use crate::storage::{BundleConfig, BundleOutput};
use crate::tools::{Bundle, Bundler};

pub(crate) fn exec(cx: &mut TaskContext<'_>, library: LibraryId, name: &str) -> TaskStatus {
    let dir = cx.registry[library].base_dir().to_path_buf();
    let config_path = dir.join(&cx.config.files.bundle_config);
    if !config_path.is_file() {
        return TaskStatus::Pending;
    }

    let _cwd = match CurrentDirGuard::change(&dir) {
        Ok(guard) => guard,
        Err(e) => {
            cx.reporter.error(
                name,
                &format!("Failed to enter {}: {}", dir.display(), e),
            );
            return TaskStatus::Failure;
        }
    };

    match run_bundles(cx.toolchain.bundler.as_mut(), &config_path, &dir) {
        Ok(written) => {
            for file in written {
                cx.reporter.info(name, &format!("wrote {}", file.display()));
            }
            TaskStatus::Success
        }
        Err(e) => {
            cx.reporter.error(name, &format!("{:#}", e));
            TaskStatus::Failure
        }
    }
}

/// Generates every declared output and returns the files written
fn run_bundles(bundler: &mut dyn Bundler, config_path: &Path, dir: &Path) -> Result<Vec<PathBuf>> {
    let configs = BundleConfig::load_all(config_path)?;
    let mut written = Vec::new();

    for config in &configs {
        let mut bundle = bundler
            .bundle(config)
            .with_context(|| format!("Failed to bundle {}", config.input))?;
        let result = write_outputs(bundle.as_mut(), &config.output, dir, &mut written);
        let closed = bundle.close();
        result?;
        closed?;
    }
    Ok(written)
}

fn write_outputs(
    bundle: &mut dyn Bundle,
    outputs: &[BundleOutput],
    dir: &Path,
    written: &mut Vec<PathBuf>,
) -> Result<()> {
    for output in outputs {
        let chunks = bundle
            .generate(output)
            .with_context(|| format!("Failed to generate {}", output.file))?;
        for chunk in chunks {
            let path = dir.join(&chunk.file);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            fs::write(&path, chunk.contents)
                .with_context(|| format!("Failed to write bundle output: {}", path.display()))?;
            written.push(path);
        }
    }
    Ok(())
}

/// Switches the process working directory, restoring it on drop
pub(crate) struct CurrentDirGuard {
    previous: PathBuf,
}

impl CurrentDirGuard {
    pub(crate) fn change(dir: &Path) -> io::Result<Self> {
        let previous = std::env::current_dir()?;
        std::env::set_current_dir(dir)?;
        Ok(Self { previous })
    }
}

impl Drop for CurrentDirGuard {
    fn drop(&mut self) {
        if let Err(e) = std::env::set_current_dir(&self.previous) {
            warn!(dir = %self.previous.display(), error = %e, "failed to restore working directory");
        }
    }
}
