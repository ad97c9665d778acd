// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! A graph representation of the locations of a datacenter and the links
//! between them.

mod creation;
mod dot;
pub mod iterators;
mod retrieval;

#[cfg(test)]
pub(crate) mod test_utils;

use crate::{Link, Location};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use std::collections::HashMap;

/// `Location`s stored in a `DiGraph` instance can be addressed with
/// `NodeIndex`es.
///
/// `NodeIndexMap` stores the corresponding `NodeIndex` for any location id,
/// so that locations in the `DiGraph` can be retrieved from their ids.
pub(crate) type NodeIndexMap = HashMap<u64, NodeIndex>;

/// `EdgeIndexMap` can be used to lookup the `EdgeIndex` of the `Link` for any
/// pair of source and sink location ids.
pub(crate) type EdgeIndexMap = HashMap<(u64, u64), EdgeIndex>;

/// A named graph of locations and the directed links between them.
///
/// Links are stored as the edge weights of the graph, and refer to their
/// endpoints by location id.  Both physical topologies and the layered
/// service graphs derived from them are `TopologyGraph`s.
#[derive(Clone, Debug)]
pub struct TopologyGraph {
    name: String,
    graph: DiGraph<Location, Link>,
    node_indices: NodeIndexMap,
    edge_indices: EdgeIndexMap,
}
