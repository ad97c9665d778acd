// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Methods for creating [`TopologyGraph`] instances from given locations and
//! links.

use petgraph::graph::DiGraph;

use crate::{Error, Link, Location};

use super::{EdgeIndexMap, NodeIndexMap, TopologyGraph};

/// `TopologyGraph` instantiation.
impl TopologyGraph {
    /// Creates a new [`TopologyGraph`] from the given locations and links.
    ///
    /// Two-way links without an explicit opposing link get one added, with the
    /// same parameters.
    ///
    /// Returns an error if a link refers to a missing location, if a pair of
    /// locations is linked more than once in the same direction, or if a
    /// two-way link's opposing link doesn't match it.
    pub fn try_new<L: IntoIterator<Item = Location>, K: IntoIterator<Item = Link>>(
        name: impl Into<String>,
        locations: L,
        links: K,
    ) -> Result<Self, Error> {
        let (graph, indices) = Self::create_graph(locations)?;

        let mut tg = Self {
            name: name.into(),
            graph,
            node_indices: indices,
            edge_indices: EdgeIndexMap::new(),
        };
        tg.add_links(links)?;
        tg.pair_two_way_links()?;

        Ok(tg)
    }

    fn create_graph(
        locations: impl IntoIterator<Item = Location>,
    ) -> Result<(DiGraph<Location, Link>, NodeIndexMap), Error> {
        let mut graph = DiGraph::new();
        let mut indices = NodeIndexMap::new();

        for location in locations {
            let lid = location.id();
            if indices.contains_key(&lid) {
                return Err(Error::invalid_graph(format!(
                    "Duplicate location ID found: {lid}"
                )));
            }

            let idx = graph.add_node(location);
            indices.insert(lid, idx);
        }

        Ok((graph, indices))
    }

    fn add_links(&mut self, links: impl IntoIterator<Item = Link>) -> Result<(), Error> {
        for link in links {
            let sid = link.source();
            let did = link.sink();

            if sid == did {
                return Err(Error::invalid_link(format!(
                    "Link:({sid}, {did}) Can't connect a location to itself."
                )));
            }
            for lid in [sid, did] {
                if !self.node_indices.contains_key(&lid) {
                    return Err(Error::invalid_link(format!(
                        "Link:({sid}, {did}) Can't find a location with ID {lid}"
                    )));
                }
            }
            if self.edge_indices.contains_key(&(sid, did)) {
                if self.edge_indices.contains_key(&(did, sid)) {
                    return Err(Error::multiple_opposing_links(format!(
                        "Link:({did}, {sid}) would have more than one opposing link."
                    )));
                }
                return Err(Error::invalid_link(format!(
                    "Link:({sid}, {did}) is defined more than once."
                )));
            }

            self.insert_link(link);
        }

        Ok(())
    }

    /// Makes sure every two-way link has exactly one matching opposing link.
    fn pair_two_way_links(&mut self) -> Result<(), Error> {
        let two_way = self
            .graph
            .raw_edges()
            .iter()
            .map(|e| &e.weight)
            .filter(|l| l.is_two_way())
            .cloned()
            .collect::<Vec<_>>();

        for link in two_way {
            let (sid, did) = (link.source(), link.sink());
            match self.opposing_link(&link)? {
                None => {
                    tracing::debug!("Adding opposing link ({did}, {sid}) for two-way link.");
                    self.insert_link(link.reversed());
                }
                Some(opposing) if !opposing.is_two_way() => {
                    return Err(Error::invalid_link(format!(
                        "Link:({did}, {sid}) opposes two-way link ({sid}, {did}) but is one-way."
                    )));
                }
                Some(opposing) if opposing.parameters() != link.parameters() => {
                    return Err(Error::invalid_link(format!(
                        "Link:({did}, {sid}) opposes two-way link ({sid}, {did}) \
                         with different parameters."
                    )));
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    fn insert_link(&mut self, link: Link) {
        let (sid, did) = (link.source(), link.sink());
        let source_idx = self.node_indices[&sid];
        let dest_idx = self.node_indices[&did];
        let edge_idx = self.graph.add_edge(source_idx, dest_idx, link);
        self.edge_indices.insert((sid, did), edge_idx);
    }
}
