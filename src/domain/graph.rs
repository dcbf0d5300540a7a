//! Dependency graph for packages
//!
//! Edges run from a dependency to its dependent, so "dependencies" are the
//! incoming neighbors and "dependents" the outgoing ones. Both directions
//! live in one graph, which keeps them mutually consistent.
//!
//! Manifests across a large monorepo may declare mutual dependencies, so
//! cycles are accepted; every walk tracks a visited set and stops
//! expanding when it meets a package twice.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use thiserror::Error;

use super::id::PackageId;

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("Dependency cycle through package {0}")]
    CycleDetected(PackageId),

    #[error("Package not found: {0}")]
    PackageNotFound(PackageId),

    #[error("Self-dependency not allowed: {0}")]
    SelfDependency(PackageId),
}

/// A dependency graph for packages
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// The underlying directed graph; indices survive node removal
    graph: StableDiGraph<PackageId, ()>,

    /// Map from PackageId to node index
    node_map: HashMap<PackageId, NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph
    pub fn new() -> Self {
        Self {
            graph: StableDiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    /// Adds a package to the graph
    pub fn add_package(&mut self, package: PackageId) {
        if !self.node_map.contains_key(&package) {
            let idx = self.graph.add_node(package);
            self.node_map.insert(package, idx);
        }
    }

    /// Removes a package from the graph along with its edges in both directions
    pub fn remove_package(&mut self, package: PackageId) -> bool {
        match self.node_map.remove(&package) {
            Some(idx) => {
                self.graph.remove_node(idx);
                true
            }
            None => false,
        }
    }

    /// Adds a dependency edge: `package` depends on `dependency`
    ///
    /// Returns `Ok(false)` when the edge already exists.
    pub fn add_dependency(
        &mut self,
        package: PackageId,
        dependency: PackageId,
    ) -> Result<bool, GraphError> {
        if package == dependency {
            return Err(GraphError::SelfDependency(package));
        }

        let package_idx = self.index(package)?;
        let dependency_idx = self.index(dependency)?;

        if self.graph.find_edge(dependency_idx, package_idx).is_some() {
            return Ok(false);
        }
        self.graph.add_edge(dependency_idx, package_idx, ());
        Ok(true)
    }

    /// Removes a dependency edge
    pub fn remove_dependency(&mut self, package: PackageId, dependency: PackageId) -> bool {
        let (Some(&package_idx), Some(&dependency_idx)) =
            (self.node_map.get(&package), self.node_map.get(&dependency))
        else {
            return false;
        };

        match self.graph.find_edge(dependency_idx, package_idx) {
            Some(edge) => {
                self.graph.remove_edge(edge);
                true
            }
            None => false,
        }
    }

    fn index(&self, package: PackageId) -> Result<NodeIndex, GraphError> {
        self.node_map
            .get(&package)
            .copied()
            .ok_or(GraphError::PackageNotFound(package))
    }

    /// Neighbors in edge insertion order
    fn neighbors(&self, package: PackageId, direction: Direction) -> Vec<PackageId> {
        let Some(&idx) = self.node_map.get(&package) else {
            return vec![];
        };

        // petgraph yields the most recently added edge first
        let mut neighbors: Vec<_> = self
            .graph
            .neighbors_directed(idx, direction)
            .filter_map(|n| self.graph.node_weight(n).copied())
            .collect();
        neighbors.reverse();
        neighbors
    }

    /// Returns the direct dependencies of a package
    pub fn dependencies(&self, package: PackageId) -> Vec<PackageId> {
        self.neighbors(package, Direction::Incoming)
    }

    /// Returns the direct dependents of a package (packages that depend on it)
    pub fn dependents(&self, package: PackageId) -> Vec<PackageId> {
        self.neighbors(package, Direction::Outgoing)
    }

    /// Returns the transitive dependencies of `roots`, roots included
    ///
    /// Post-order: a package is listed only after all of its dependencies.
    pub fn dependency_closure(&self, roots: &[PackageId]) -> Vec<PackageId> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        for &root in roots {
            self.visit_dependencies(root, &mut visited, &mut order);
        }
        order
    }

    fn visit_dependencies(
        &self,
        package: PackageId,
        visited: &mut HashSet<PackageId>,
        order: &mut Vec<PackageId>,
    ) {
        if !self.contains(package) || !visited.insert(package) {
            return;
        }
        for dependency in self.dependencies(package) {
            self.visit_dependencies(dependency, visited, order);
        }
        order.push(package);
    }

    /// Returns the transitive dependents of `roots`, roots included
    ///
    /// Pre-order: a package is listed before the packages that depend on it.
    pub fn dependent_closure(&self, roots: &[PackageId]) -> Vec<PackageId> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        for &root in roots {
            self.visit_dependents(root, &mut visited, &mut order);
        }
        order
    }

    fn visit_dependents(
        &self,
        package: PackageId,
        visited: &mut HashSet<PackageId>,
        order: &mut Vec<PackageId>,
    ) {
        if !self.contains(package) || !visited.insert(package) {
            return;
        }
        order.push(package);
        for dependent in self.dependents(package) {
            self.visit_dependents(dependent, visited, order);
        }
    }

    /// Returns the transitive dependencies of a package, excluding itself
    pub fn transitive_dependencies(&self, package: PackageId) -> Vec<PackageId> {
        let mut closure = self.dependency_closure(&[package]);
        closure.retain(|&p| p != package);
        closure
    }

    /// Returns the transitive dependents of a package, excluding itself
    pub fn transitive_dependents(&self, package: PackageId) -> Vec<PackageId> {
        let mut closure = self.dependent_closure(&[package]);
        closure.retain(|&p| p != package);
        closure
    }

    /// Returns all packages in topological order (dependencies before dependents)
    pub fn topological_order(&self) -> Result<Vec<PackageId>, GraphError> {
        toposort(&self.graph, None)
            .map(|order| {
                order
                    .into_iter()
                    .filter_map(|idx| self.graph.node_weight(idx).copied())
                    .collect()
            })
            .map_err(|cycle| {
                let package = self
                    .graph
                    .node_weight(cycle.node_id())
                    .copied()
                    .unwrap_or(PackageId(usize::MAX));
                GraphError::CycleDetected(package)
            })
    }

    /// Returns true if the graph contains the package
    pub fn contains(&self, package: PackageId) -> bool {
        self.node_map.contains_key(&package)
    }

    /// Returns the number of packages in the graph
    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    /// Returns true if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }
}
