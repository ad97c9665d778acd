// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! The layered service graph: an expansion of a physical topology in which
//! every source-to-sink path is one way of placing a service's components and
//! routing its traffic between them.

mod builder;

pub(crate) use builder::ServiceGraphBuilder;

use std::collections::HashMap;

use petgraph::Direction;

use crate::{Error, Link, Location, TopologyGraph};

/// A layered service graph.
///
/// Every location is either a copy of a physical location, for which
/// [`origin`][ServiceGraph::origin] returns the physical id, or a dummy
/// location that stands for placing one component on one node, for which
/// [`placement`][ServiceGraph::placement] returns the pair.
#[derive(Clone, Debug)]
pub struct ServiceGraph {
    graph: TopologyGraph,
    origins: HashMap<u64, u64>,
    placements: HashMap<u64, (u64, u64)>,
    source: u64,
    sink: u64,
}

impl ServiceGraph {
    /// Creates a service graph, checking that there is exactly one location
    /// without incoming links and exactly one without outgoing links.
    pub(crate) fn try_new(
        name: String,
        locations: Vec<Location>,
        links: Vec<Link>,
        origins: HashMap<u64, u64>,
        placements: HashMap<u64, (u64, u64)>,
    ) -> Result<Self, Error> {
        let graph = TopologyGraph::try_new(name, locations, links)?;
        let source = Self::find_terminal(&graph, Direction::Incoming)?;
        let sink = Self::find_terminal(&graph, Direction::Outgoing)?;

        Ok(Self {
            graph,
            origins,
            placements,
            source,
            sink,
        })
    }

    /// Finds the only location without links in the given direction.
    fn find_terminal(graph: &TopologyGraph, direction: Direction) -> Result<u64, Error> {
        let inner = graph.graph();
        let terminals = inner
            .node_indices()
            .filter(|i| inner.neighbors_directed(*i, direction).next().is_none())
            .map(|i| inner[i].id())
            .collect::<Vec<_>>();

        let which = match direction {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        };
        match terminals.as_slice() {
            [terminal] => Ok(*terminal),
            [] => Err(Error::invalid_graph(format!(
                "Service graph {}: no location without {which} links found.",
                graph.name()
            ))),
            _ => Err(Error::invalid_graph(format!(
                "Service graph {}: multiple locations without {which} links found: {:?}",
                graph.name(),
                terminals
            ))),
        }
    }

    /// Returns the underlying graph.
    pub fn graph(&self) -> &TopologyGraph {
        &self.graph
    }

    /// Returns the id of the only location without incoming links.
    pub fn source(&self) -> u64 {
        self.source
    }

    /// Returns the id of the only location without outgoing links.
    pub fn sink(&self) -> u64 {
        self.sink
    }

    /// Returns the id of the physical location the given location is a copy
    /// of.
    pub fn origin(&self, location_id: u64) -> Option<u64> {
        self.origins.get(&location_id).copied()
    }

    /// Returns the `(component id, node id)` pair the given dummy location
    /// stands for.
    pub fn placement(&self, location_id: u64) -> Option<(u64, u64)> {
        self.placements.get(&location_id).copied()
    }

    /// Returns an iterator over the dummy locations of the graph.
    pub fn dummies(&self) -> impl Iterator<Item = &Location> {
        self.graph
            .locations()
            .filter(|l| self.placements.contains_key(&l.id()))
    }
}
