//! Typed identifiers for scopes held in the workspace arena
//!
//! ID Format:
//! - Package IDs: `p{index}` (e.g., `p3`)
//! - Library IDs: `l{index}` (e.g., `l12`)
//!
//! Indices are slots in the workspace registry and are never reused while
//! the workspace is alive.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("Invalid package ID format: expected 'p{{index}}', got '{0}'")]
    InvalidPackageId(String),

    #[error("Invalid library ID format: expected 'l{{index}}', got '{0}'")]
    InvalidLibraryId(String),
}

/// Index of a package scope in the workspace registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageId(pub(crate) usize);

/// Index of a library scope in the workspace registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LibraryId(pub(crate) usize);

impl PackageId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl LibraryId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "l{}", self.0)
    }
}

impl FromStr for PackageId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .strip_prefix('p')
            .and_then(|n| n.parse().ok())
            .map(PackageId)
            .ok_or_else(|| IdError::InvalidPackageId(s.to_string()))
    }
}

impl FromStr for LibraryId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .strip_prefix('l')
            .and_then(|n| n.parse().ok())
            .map(LibraryId)
            .ok_or_else(|| IdError::InvalidLibraryId(s.to_string()))
    }
}

/// Returns the unscoped alias of a package name
///
/// `@scope/foo` has the alias `foo`; unscoped names have no alias.
pub fn unscoped_name(name: &str) -> Option<&str> {
    if !name.starts_with('@') {
        return None;
    }
    name.split_once('/')
        .map(|(_, rest)| rest)
        .filter(|rest| !rest.is_empty())
}
