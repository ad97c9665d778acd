// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Iterators over locations and links in a `TopologyGraph`.

use petgraph::graph::DiGraph;

use crate::{Link, Location};

/// An iterator over the locations in a `TopologyGraph`.
pub struct Locations<'a> {
    pub(crate) iter: std::slice::Iter<'a, petgraph::graph::Node<Location>>,
}

impl<'a> Iterator for Locations<'a> {
    type Item = &'a Location;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|n| &n.weight)
    }
}

/// An iterator over the links in a `TopologyGraph`.
pub struct Links<'a> {
    pub(crate) iter: std::slice::Iter<'a, petgraph::graph::Edge<Link>>,
}

impl<'a> Iterator for Links<'a> {
    type Item = &'a Link;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|e| &e.weight)
    }
}

/// An iterator over the links entering or leaving a location.
pub struct LinksAt<'a> {
    pub(crate) iter: petgraph::graph::Edges<'a, Link, petgraph::Directed>,
}

impl<'a> Iterator for LinksAt<'a> {
    type Item = &'a Link;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|e| e.weight())
    }
}

/// An iterator over the neighbors of a location in a `TopologyGraph`.
pub struct Neighbors<'a> {
    pub(crate) graph: &'a DiGraph<Location, Link>,
    pub(crate) iter: petgraph::graph::Neighbors<'a, Link>,
}

impl<'a> Iterator for Neighbors<'a> {
    type Item = &'a Location;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|i| &self.graph[i])
    }
}
