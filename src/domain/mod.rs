//! Domain models for Keystone
//!
//! Contains the core build logic without any I/O concerns: the task status
//! algebra, the uniform diagnostic format, the package dependency graph and
//! version arithmetic.

mod diagnostic;
mod graph;
mod id;
mod status;
pub mod version;

pub use diagnostic::{Diagnostic, Position, Severity, SourceSpan};
pub use graph::{DependencyGraph, GraphError};
pub use id::{unscoped_name, IdError, LibraryId, PackageId};
pub use status::TaskStatus;
pub use version::{Snapshot, Version, VersionError};
