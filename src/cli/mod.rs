//! # CLI Module
//!
//! Command-line interface for keystone. Every command loads the workspace
//! around the current directory, then runs one task over the selected
//! packages.
//!
//! ## Command Groups
//!
//! | Group | Commands |
//! |-------|----------|
//! | Library tasks | `compile`, `lint`, `api`, `bundle`, `build`, `watch` |
//! | Package tasks | `deps`, `libs`, `test`, `doc`, `publish`, `clean` |
//! | Releases | `version --set name=x.y.z`, `version --snapshot [--tag t]` |
//! | Inspection | `list` |
//!
//! ## Global Flags
//!
//! - `--format text|json` (`-f`): Output format
//! - `--verbose` (`-v`): Show task starts and debug logs
//! - `--projects a,b` (`-p`): Restrict to packages
//! - `--libraries x` (`-l`): Restrict to libraries by directory name
//! - `--with-dependencies` (`-d`): Include dependencies of the selection
//! - `--force`, `--dry-run`

mod app;
mod console;
mod output;

pub use app::{run, Cli, Commands, Selection};
pub use console::ConsoleReporter;
pub use output::{Output, OutputFormat};
