// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Paths through a service graph, and the per-service catalog they are
//! collected in.

use std::collections::BTreeMap;

use crate::TopologyGraph;

/// One way of routing a service through its components: the selected
/// locations and links of the service graph, how often every physical link
/// is traversed, and which node hosts each component.
///
/// Paths are immutable once created.
#[derive(Clone, Debug)]
pub struct Path {
    name: String,
    route: TopologyGraph,
    sequence: Vec<u64>,
    traversals: Vec<u32>,
    assignment: BTreeMap<u64, u64>,
    hops: f64,
    latency: f64,
}

impl Path {
    pub(crate) fn new(
        name: String,
        route: TopologyGraph,
        sequence: Vec<u64>,
        traversals: Vec<u32>,
        assignment: BTreeMap<u64, u64>,
        hops: f64,
        latency: f64,
    ) -> Self {
        Self {
            name,
            route,
            sequence,
            traversals,
            assignment,
            hops,
            latency,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the selected locations and links of the service graph.
    pub fn route(&self) -> &TopologyGraph {
        &self.route
    }

    /// Returns the ids of the service graph locations on the path, from the
    /// source to the sink.
    pub fn sequence(&self) -> &[u64] {
        &self.sequence
    }

    /// Returns how many times each physical link is traversed, indexed by the
    /// link's position in the physical topology.
    pub fn traversals(&self) -> &[u32] {
        &self.traversals
    }

    /// Returns how many times the physical link at `position` is traversed.
    pub fn traversal(&self, position: usize) -> u32 {
        self.traversals.get(position).copied().unwrap_or(0)
    }

    /// Returns the component id to physical node id mapping of the path.
    pub fn assignments(&self) -> &BTreeMap<u64, u64> {
        &self.assignment
    }

    /// Returns the node that hosts the given component on this path.
    pub fn assigned_node(&self, component_id: u64) -> Option<u64> {
        self.assignment.get(&component_id).copied()
    }

    /// Returns `1` if this path hosts the component on the node, `0`
    /// otherwise.
    pub fn assignment(&self, component_id: u64, node_id: u64) -> u8 {
        u8::from(self.assigned_node(component_id) == Some(node_id))
    }

    /// Returns the total unit cost of the path in the service graph, which is
    /// the number of physical hops.
    pub fn hops(&self) -> f64 {
        self.hops
    }

    /// Returns the summed latency of the physical links on the path.
    pub fn latency(&self) -> f64 {
        self.latency
    }
}

/// The paths generated for a service.  Paths are only ever appended.
#[derive(Clone, Debug, Default)]
pub struct PathCatalog {
    paths: Vec<Path>,
}

impl PathCatalog {
    pub(crate) fn push(&mut self, path: Path) {
        self.paths.push(path);
    }

    /// Returns true if a path with the same location sequence is already in
    /// the catalog.
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p.sequence == path.sequence)
    }

    pub fn get(&self, index: usize) -> Option<&Path> {
        self.paths.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Path> {
        self.paths.iter()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl<'a> IntoIterator for &'a PathCatalog {
    type Item = &'a Path;
    type IntoIter = std::slice::Iter<'a, Path>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.iter()
    }
}
