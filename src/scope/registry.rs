//! Scope registry
//!
//! Packages and libraries live in two arenas addressed by [`PackageId`] and
//! [`LibraryId`]. Slots are never reused, so a stale id from an unmounted
//! scope can never alias a newer one. The dependency graph between packages
//! is kept alongside, together with lookup maps by name and directory.

use std::collections::HashMap;
use std::ops::{Index, IndexMut};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::library::LibraryScope;
use super::package::PackageScope;
use super::task::LibraryTask;
use super::{Scope, ScopeId};
use crate::domain::{DependencyGraph, LibraryId, PackageId, TaskStatus};
use crate::storage::{normalize, CompilerConfig};
use crate::tools::ConfigHost;

/// Every mounted scope of a workspace
#[derive(Debug)]
pub struct Registry {
    packages: Vec<Option<PackageScope>>,
    libraries: Vec<Option<LibraryScope>>,
    graph: DependencyGraph,
    package_names: HashMap<String, PackageId>,
    unscoped_names: HashMap<String, PackageId>,
    package_dirs: HashMap<PathBuf, PackageId>,
    library_dirs: HashMap<PathBuf, LibraryId>,
    compiler_config_name: String,
}

impl Registry {
    pub fn new(compiler_config_name: impl Into<String>) -> Self {
        Self {
            packages: Vec::new(),
            libraries: Vec::new(),
            graph: DependencyGraph::new(),
            package_names: HashMap::new(),
            unscoped_names: HashMap::new(),
            package_dirs: HashMap::new(),
            library_dirs: HashMap::new(),
            compiler_config_name: compiler_config_name.into(),
        }
    }

    // -- Mounting --

    /// Mounts a package and indexes it by directory and name
    pub fn add_package(&mut self, mut package: PackageScope) -> PackageId {
        let id = PackageId(self.packages.len());
        package.id = id;
        self.package_dirs.insert(package.base_dir().to_path_buf(), id);
        let name = package.name().to_string();
        self.packages.push(Some(package));
        self.graph.add_package(id);
        if !name.is_empty() {
            self.index_name(id, &name);
        }
        id
    }

    /// Sets the name of a package that was mounted before its manifest loaded
    ///
    /// Returns false if the package already has a name.
    pub fn rename_package(&mut self, id: PackageId, name: &str) -> bool {
        let Some(package) = self.get_package_mut(id) else {
            return false;
        };
        if !package.name().is_empty() || name.is_empty() {
            return false;
        }
        package.set_name(name.to_string());
        self.index_name(id, name);
        true
    }

    fn index_name(&mut self, id: PackageId, name: &str) {
        if let Some(previous) = self.package_names.insert(name.to_string(), id) {
            warn!(package = name, "duplicate package name; the later package wins");
            debug!(?previous, current = ?id, "replaced package name entry");
        }
        if let Some(unscoped) = crate::domain::unscoped_name(name) {
            self.unscoped_names.insert(unscoped.to_string(), id);
        }
    }

    /// Mounts a library, attaching it to its package when it has one
    pub fn add_library(&mut self, mut library: LibraryScope, package: Option<PackageId>) -> LibraryId {
        let id = LibraryId(self.libraries.len());
        library.id = id;
        let package = package.filter(|p| self.get_package(*p).is_some());
        library.set_package(package);
        self.library_dirs.insert(library.base_dir().to_path_buf(), id);
        self.libraries.push(Some(library));
        if let Some(package) = package.and_then(|p| self.get_package_mut(p)) {
            package.libraries.push(id);
        }
        id
    }

    /// Unmounts a package and its libraries
    ///
    /// Dependency edges in both directions are removed first. Dropping the
    /// libraries stops their file watchers.
    pub fn remove_package(&mut self, id: PackageId) -> Option<PackageScope> {
        let package = self.packages.get_mut(id.index())?.take()?;
        self.graph.remove_package(id);
        self.package_dirs.retain(|_, p| *p != id);
        self.package_names.retain(|_, p| *p != id);
        self.unscoped_names.retain(|_, p| *p != id);
        for library in &package.libraries {
            self.remove_library(*library);
        }
        Some(package)
    }

    /// Unmounts a library
    pub fn remove_library(&mut self, id: LibraryId) -> Option<LibraryScope> {
        let library = self.libraries.get_mut(id.index())?.take()?;
        self.library_dirs.retain(|_, l| *l != id);
        if let Some(package) = library.package().and_then(|p| self.get_package_mut(p)) {
            package.libraries.retain(|l| *l != id);
        }
        Some(library)
    }

    // -- Lookup --

    pub fn get_package(&self, id: PackageId) -> Option<&PackageScope> {
        self.packages.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_package_mut(&mut self, id: PackageId) -> Option<&mut PackageScope> {
        self.packages.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn get_library(&self, id: LibraryId) -> Option<&LibraryScope> {
        self.libraries.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_library_mut(&mut self, id: LibraryId) -> Option<&mut LibraryScope> {
        self.libraries.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Mounted packages in registration order
    pub fn packages(&self) -> impl Iterator<Item = &PackageScope> {
        self.packages.iter().flatten()
    }

    pub fn package_ids(&self) -> Vec<PackageId> {
        self.packages().map(PackageScope::id).collect()
    }

    /// Mounted libraries in registration order
    pub fn libraries(&self) -> impl Iterator<Item = &LibraryScope> {
        self.libraries.iter().flatten()
    }

    /// Looks a package up by full name, then by unscoped name
    pub fn find_package(&self, name: &str) -> Option<PackageId> {
        self.package_names
            .get(name)
            .or_else(|| self.unscoped_names.get(name))
            .copied()
    }

    /// Looks a package up by its exact manifest name
    pub fn package_named(&self, name: &str) -> Option<PackageId> {
        self.package_names.get(name).copied()
    }

    pub fn package_in(&self, dir: &Path) -> Option<PackageId> {
        self.package_dirs.get(&normalize(dir)).copied()
    }

    pub fn library_in(&self, dir: &Path) -> Option<LibraryId> {
        self.library_dirs.get(&normalize(dir)).copied()
    }

    /// Returns `package/library` for libraries and the name for packages
    pub fn qualified_name(&self, scope: ScopeId) -> String {
        match scope {
            ScopeId::Package(id) => self
                .get_package(id)
                .map(|p| p.name().to_string())
                .unwrap_or_else(|| id.to_string()),
            ScopeId::Library(id) => {
                let Some(library) = self.get_library(id) else {
                    return id.to_string();
                };
                match library.package().and_then(|p| self.get_package(p)) {
                    Some(package) => format!("{}/{}", package.name(), library.name()),
                    None => library.name().to_string(),
                }
            }
        }
    }

    // -- Dependencies --

    /// Declares that `package` depends on `dependency`
    ///
    /// Returns false for self-references, unknown ids and existing edges.
    pub fn attach_dependency(&mut self, package: PackageId, dependency: PackageId) -> bool {
        match self.graph.add_dependency(package, dependency) {
            Ok(added) => added,
            Err(e) => {
                debug!(error = %e, "dependency not attached");
                false
            }
        }
    }

    pub fn detach_dependency(&mut self, package: PackageId, dependency: PackageId) -> bool {
        self.graph.remove_dependency(package, dependency)
    }

    pub fn dependencies(&self, package: PackageId) -> Vec<PackageId> {
        self.graph.dependencies(package)
    }

    pub fn dependents(&self, package: PackageId) -> Vec<PackageId> {
        self.graph.dependents(package)
    }

    pub fn transitive_dependencies(&self, package: PackageId) -> Vec<PackageId> {
        self.graph.transitive_dependencies(package)
    }

    pub fn transitive_dependents(&self, package: PackageId) -> Vec<PackageId> {
        self.graph.transitive_dependents(package)
    }

    /// Roots and everything they depend on, dependencies first
    pub fn dependency_closure(&self, roots: &[PackageId]) -> Vec<PackageId> {
        self.graph.dependency_closure(roots)
    }

    /// Roots and everything that depends on them
    pub fn dependent_closure(&self, roots: &[PackageId]) -> Vec<PackageId> {
        self.graph.dependent_closure(roots)
    }

    // -- Status --

    /// Escalates a library task's status over every library of `package`
    pub fn libraries_status(&self, package: PackageId, task: LibraryTask, floor: TaskStatus) -> TaskStatus {
        let statuses = self
            .get_package(package)
            .into_iter()
            .flat_map(|p| p.libraries.iter())
            .filter_map(|l| self.get_library(*l))
            .filter_map(|l| l.status(task));
        TaskStatus::escalate_all(floor, statuses)
    }

    /// Escalates a library task's status over all transitive dependencies
    pub fn dependencies_status(&self, package: PackageId, task: LibraryTask, floor: TaskStatus) -> TaskStatus {
        self.transitive_dependencies(package)
            .into_iter()
            .fold(floor, |status, dependency| {
                self.libraries_status(dependency, task, status)
            })
    }

    /// Directories of composite libraries in the packages `package` depends on
    fn dependency_library_dirs(&self, package: PackageId) -> Vec<PathBuf> {
        self.transitive_dependencies(package)
            .into_iter()
            .filter_map(|p| self.get_package(p))
            .flat_map(|p| p.libraries.iter())
            .filter_map(|l| self.get_library(*l))
            .filter(|l| l.config().compiler_options.composite)
            .map(|l| l.base_dir().to_path_buf())
            .collect()
    }
}

impl ConfigHost for Registry {
    fn project_config(&self, dir: &Path) -> Option<CompilerConfig> {
        let Some(library) = self.library_in(dir).and_then(|id| self.get_library(id)) else {
            let path = dir.join(&self.compiler_config_name);
            return CompilerConfig::load(&path)
                .map_err(|e| debug!(path = %path.display(), error = %e, "no compiler config"))
                .ok();
        };

        let dirs = library
            .package()
            .map(|p| self.dependency_library_dirs(p))
            .unwrap_or_default();
        Some(library.config().with_references(library.base_dir(), &dirs))
    }
}

impl Index<PackageId> for Registry {
    type Output = PackageScope;

    fn index(&self, id: PackageId) -> &PackageScope {
        match self.get_package(id) {
            Some(package) => package,
            None => panic!("package {} is not mounted", id),
        }
    }
}

impl IndexMut<PackageId> for Registry {
    fn index_mut(&mut self, id: PackageId) -> &mut PackageScope {
        match self.get_package_mut(id) {
            Some(package) => package,
            None => panic!("package {} is not mounted", id),
        }
    }
}

impl Index<LibraryId> for Registry {
    type Output = LibraryScope;

    fn index(&self, id: LibraryId) -> &LibraryScope {
        match self.get_library(id) {
            Some(library) => library,
            None => panic!("library {} is not mounted", id),
        }
    }
}

impl IndexMut<LibraryId> for Registry {
    fn index_mut(&mut self, id: LibraryId) -> &mut LibraryScope {
        match self.get_library_mut(id) {
            Some(library) => library,
            None => panic!("library {} is not mounted", id),
        }
    }
}
