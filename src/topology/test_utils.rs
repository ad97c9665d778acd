// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! This module is only compiled when running unit tests and contains features
//! that are shared by all tests of the crate.
//!
//! - the `TopologyBuilder`, which can declaratively build datacenter
//!   topologies for use in tests,
//! - the `tiny` and `reference` topologies, and a helper for making
//!   services over them.

use crate::{
    Component, Error, IdAllocator, Link, LinkParameters, Location, LocationKind, NodeResources,
    Service, TopologyGraph,
};

/// Represents a location added to the `TopologyBuilder`.
#[derive(Eq, Hash, PartialEq, Copy, Clone, Debug)]
pub(crate) struct LocationHandle(u64);

impl LocationHandle {
    /// Returns the id of the location.
    pub(crate) fn id(&self) -> u64 {
        self.0
    }
}

/// A builder for creating datacenter topologies easily, for use in tests.
pub(crate) struct TopologyBuilder {
    ids: IdAllocator,
    locations: Vec<Location>,
    links: Vec<Link>,
}

impl TopologyBuilder {
    /// Creates a new `TopologyBuilder`.
    pub(crate) fn new() -> Self {
        TopologyBuilder {
            ids: IdAllocator::new(),
            locations: Vec::new(),
            links: Vec::new(),
        }
    }

    fn add_location(&mut self, description: &str, kind: LocationKind) -> LocationHandle {
        let location = Location::new(&mut self.ids, description, kind);
        let handle = LocationHandle(location.id());
        self.locations.push(location);
        handle
    }

    /// Adds a gateway to the topology and returns its handle.
    pub(crate) fn gateway(&mut self, description: &str) -> LocationHandle {
        self.add_location(description, LocationKind::Gateway)
    }

    /// Adds a spine switch to the topology and returns its handle.
    pub(crate) fn spine(&mut self, description: &str) -> LocationHandle {
        self.add_location(description, LocationKind::Spine)
    }

    /// Adds a leaf switch to the topology and returns its handle.
    pub(crate) fn leaf(&mut self, description: &str) -> LocationHandle {
        self.add_location(description, LocationKind::Leaf)
    }

    /// Adds a compute node with the given cpu and ram budgets and rental cost
    /// to the topology and returns its handle.
    pub(crate) fn node(
        &mut self,
        description: &str,
        cpu: f64,
        ram: f64,
        cost: f64,
    ) -> LocationHandle {
        self.add_location(
            description,
            LocationKind::Node(NodeResources::new([("cpu", cpu), ("ram", ram)], cost)),
        )
    }

    /// Adds a one-way link with the given bandwidth, unit latency and unit
    /// cost.
    pub(crate) fn connect(
        &mut self,
        from: LocationHandle,
        to: LocationHandle,
        bandwidth: f64,
    ) -> &mut Self {
        self.links.push(Link::new(
            from.0,
            to.0,
            LinkParameters::new(bandwidth, 1.0, 1.0),
        ));
        self
    }

    /// Adds a two-way link with the given bandwidth, unit latency and unit
    /// cost.
    pub(crate) fn connect_two_way(
        &mut self,
        from: LocationHandle,
        to: LocationHandle,
        bandwidth: f64,
    ) -> &mut Self {
        self.links.push(Link::two_way(
            from.0,
            to.0,
            LinkParameters::new(bandwidth, 1.0, 1.0),
        ));
        self
    }

    /// Builds the topology from the locations and links added to the builder,
    /// and returns it together with the id allocator, for creating further
    /// ids that don't collide with the topology's.
    pub(crate) fn build(self, name: &str) -> Result<(TopologyGraph, IdAllocator), Error> {
        let graph = TopologyGraph::try_new(name, self.locations, self.links)?;
        Ok((graph, self.ids))
    }

    /// `Gateway -> Leaf1 -> Node1` and `Gateway -> Leaf2 -> Node1`, all links
    /// with bandwidth 5.
    pub(crate) fn tiny() -> Result<(TopologyGraph, IdAllocator), Error> {
        Self::tiny_with_bandwidth(5.0)
    }

    /// The tiny topology, with the given bandwidth on every link.
    pub(crate) fn tiny_with_bandwidth(
        bandwidth: f64,
    ) -> Result<(TopologyGraph, IdAllocator), Error> {
        let mut builder = Self::new();
        let gateway = builder.gateway("Gateway");
        let leaf1 = builder.leaf("Leaf1");
        let leaf2 = builder.leaf("Leaf2");
        let node1 = builder.node("Node1", 4.0, 8.0, 1.0);
        builder
            .connect(gateway, leaf1, bandwidth)
            .connect(gateway, leaf2, bandwidth)
            .connect(leaf1, node1, bandwidth)
            .connect(leaf2, node1, bandwidth);
        builder.build("tiny")
    }

    /// The six-location reference topology: a gateway, one spine, two leafs
    /// with a two-way link between them, and two nodes reachable from both
    /// leafs.
    pub(crate) fn reference() -> Result<(TopologyGraph, IdAllocator), Error> {
        let mut builder = Self::new();
        let gateway = builder.gateway("Gateway");
        let spine = builder.spine("Spine1");
        let leaf1 = builder.leaf("Leaf1");
        let leaf2 = builder.leaf("Leaf2");
        let node1 = builder.node("Node1", 4.0, 8.0, 3.0);
        let node2 = builder.node("Node2", 2.0, 16.0, 2.0);
        builder
            .connect(gateway, spine, 10.0)
            .connect(spine, leaf1, 5.0)
            .connect(spine, leaf2, 5.0)
            .connect_two_way(leaf1, leaf2, 5.0)
            .connect(leaf1, node1, 5.0)
            .connect(leaf1, node2, 5.0)
            .connect(leaf2, node1, 5.0)
            .connect(leaf2, node2, 5.0);
        builder.build("reference")
    }
}

/// Creates a service whose components all require one cpu and two ram, with
/// the given replica counts.
pub(crate) fn service_with_replicas(
    ids: &mut IdAllocator,
    description: &str,
    replicas: &[u32],
    throughput: f64,
) -> Result<Service, Error> {
    let components = replicas
        .iter()
        .enumerate()
        .map(|(i, r)| {
            Component::try_new(
                ids,
                format!("component{}", i + 1),
                [("cpu", 1.0), ("ram", 2.0)],
                *r,
            )
        })
        .collect::<Result<Vec<_>, _>>()?;
    Service::try_new(description, components, throughput, 100.0)
}
