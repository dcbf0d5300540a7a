//! Package scope: one manifest and the libraries beneath it

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::task::{PackageTask, TaskKind};
use super::{Scope, ScopeId};
use crate::domain::{unscoped_name, LibraryId, PackageId, TaskStatus};
use crate::storage::{normalize, Manifest};

/// A manifest-bearing directory
pub struct PackageScope {
    pub(crate) id: PackageId,
    name: String,
    base_dir: PathBuf,
    manifest: Option<Manifest>,
    pub(crate) libraries: Vec<LibraryId>,
    tasks: Vec<PackageTask>,
    statuses: HashMap<PackageTask, TaskStatus>,
}

impl PackageScope {
    /// Creates an unnamed package; the name is set once the manifest loads
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: PackageId(usize::MAX),
            name: String::new(),
            base_dir: normalize(&base_dir.into()),
            manifest: None,
            libraries: Vec::new(),
            tasks: PackageTask::ALL.to_vec(),
            statuses: HashMap::new(),
        }
    }

    /// Creates a package with a known name and no manifest
    pub fn named(name: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        let mut package = Self::new(base_dir);
        package.name = name.into();
        package
    }

    pub fn with_tasks(mut self, tasks: impl IntoIterator<Item = PackageTask>) -> Self {
        self.tasks = tasks.into_iter().collect();
        self
    }

    pub fn id(&self) -> PackageId {
        self.id
    }

    /// Name without its `@scope/` prefix, when it has one
    pub fn unscoped_name(&self) -> Option<&str> {
        unscoped_name(&self.name)
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    pub(crate) fn set_manifest(&mut self, manifest: Manifest) {
        self.manifest = Some(manifest);
    }

    pub fn manifest_path(&self, file_name: &str) -> PathBuf {
        self.base_dir.join(file_name)
    }

    pub fn libraries(&self) -> &[LibraryId] {
        &self.libraries
    }

    pub fn tasks(&self) -> &[PackageTask] {
        &self.tasks
    }

    pub fn has_task(&self, task: PackageTask) -> bool {
        self.tasks.contains(&task)
    }

    pub fn status(&self, task: PackageTask) -> Option<TaskStatus> {
        if !self.has_task(task) {
            return None;
        }
        Some(self.statuses.get(&task).copied().unwrap_or_default())
    }

    pub fn set_status(&mut self, task: PackageTask, status: TaskStatus) {
        self.statuses.insert(task, status);
    }
}

impl Scope for PackageScope {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn parent(&self) -> Option<ScopeId> {
        None
    }

    fn task_status(&self, task: TaskKind) -> Option<TaskStatus> {
        match task {
            TaskKind::Package(task) => self.status(task),
            TaskKind::Library(_) => None,
        }
    }
}

impl std::fmt::Debug for PackageScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageScope")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("base_dir", &self.base_dir)
            .field("libraries", &self.libraries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unscoped_name_strips_scope() {
        let package = PackageScope::named("@acme/core", "/ws/core");
        assert_eq!(package.name(), "@acme/core");
        assert_eq!(package.unscoped_name(), Some("core"));

        let plain = PackageScope::named("core", "/ws/core");
        assert_eq!(plain.unscoped_name(), None);
    }

    #[test]
    fn package_has_no_parent() {
        let package = PackageScope::new("/ws/core/");
        assert_eq!(package.parent(), None);
        assert_eq!(package.name(), "");
        assert_eq!(package.manifest_path("package.json"), PathBuf::from("/ws/core/package.json"));
    }

    #[test]
    fn library_tasks_have_no_package_status() {
        let package = PackageScope::named("core", "/ws/core");
        assert_eq!(
            package.task_status(TaskKind::Package(PackageTask::Test)),
            Some(TaskStatus::Pending)
        );
        assert_eq!(
            package.task_status(TaskKind::Library(crate::scope::LibraryTask::Build)),
            None
        );
    }
}
