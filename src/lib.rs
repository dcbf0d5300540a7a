//! keystone - dependency-aware builds for package monorepos
//!
//! A workspace is a tree of packages, each holding one or more compiler
//! projects ("libraries"). keystone runs compile, lint, API extraction
//! and bundling per library, package scripts and releases per package,
//! and orders everything along the package dependency graph. The external
//! tools are reached through a JSON bridge protocol.

pub mod cli;
pub mod domain;
pub mod scope;
pub mod storage;
pub mod tools;

pub use domain::{Diagnostic, LibraryId, PackageId, Severity, TaskStatus, Version};
pub use scope::{LibraryTask, PackageTask, TaskKind, TaskRequest, Workspace};
