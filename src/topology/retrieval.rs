// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Methods for retrieving locations and links from a [`TopologyGraph`].

use petgraph::graph::NodeIndex;
use petgraph::Direction;

use crate::iterators::{LinksAt, Locations, Links, Neighbors};
use crate::{Error, Link, Location, LocationType, TopologyGraph};

/// `Location` and `Link` retrieval.
impl TopologyGraph {
    /// Returns the name of the topology.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the location with the given `location_id`, if it exists.
    pub fn location(&self, location_id: u64) -> Result<&Location, Error> {
        self.index_of(location_id).map(|i| &self.graph[i])
    }

    /// Returns the last location with the given description, if any.
    pub fn location_by_description(&self, description: &str) -> Option<&Location> {
        self.locations()
            .filter(|l| l.description() == description)
            .last()
    }

    /// Returns an iterator over the locations in the graph, in insertion
    /// order.
    pub fn locations(&self) -> Locations {
        Locations {
            iter: self.graph.raw_nodes().iter(),
        }
    }

    /// Returns an iterator over the links in the graph, in insertion order.
    ///
    /// Opposing links added for two-way links come after all given links.
    pub fn links(&self) -> Links {
        Links {
            iter: self.graph.raw_edges().iter(),
        }
    }

    /// Returns the number of links in the graph.
    pub fn link_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns the position of the given link in the [`links`][Self::links]
    /// order, if it is part of the graph.
    pub fn link_position(&self, link: &Link) -> Option<usize> {
        self.edge_indices
            .get(&(link.source(), link.sink()))
            .map(|i| i.index())
    }

    /// Returns all locations of the given type.
    pub fn locations_by_type(&self, location_type: LocationType) -> Vec<&Location> {
        self.locations()
            .filter(|l| l.location_type() == location_type)
            .collect()
    }

    /// Returns the non-empty physical tiers of the graph, from the gateway
    /// down to the nodes.
    pub fn tiers(&self) -> Vec<Vec<&Location>> {
        LocationType::TIERS
            .iter()
            .map(|t| self.locations_by_type(*t))
            .filter(|tier| !tier.is_empty())
            .collect()
    }

    /// Returns the link from `source_id` to `sink_id`, if it exists.
    pub fn link_between(&self, source_id: u64, sink_id: u64) -> Option<&Link> {
        self.edge_indices
            .get(&(source_id, sink_id))
            .map(|i| &self.graph[*i])
    }

    /// Returns the link that runs opposite to `link`, if there is one.
    ///
    /// Returns an error if more than one link runs opposite to `link`.
    pub fn opposing_link(&self, link: &Link) -> Result<Option<&Link>, Error> {
        let (Some(&sink), Some(&source)) = (
            self.node_indices.get(&link.sink()),
            self.node_indices.get(&link.source()),
        ) else {
            return Ok(None);
        };

        let mut opposing = self.graph.edges_connecting(sink, source);
        let first = opposing.next().map(|e| e.weight());
        if opposing.next().is_some() {
            return Err(Error::multiple_opposing_links(format!(
                "Link:({}, {}) has more than one opposing link.",
                link.source(),
                link.sink()
            )));
        }
        Ok(first)
    }

    /// Returns an iterator over the links leaving the location with the given
    /// `location_id`.
    ///
    /// Returns an error if the given `location_id` does not exist.
    pub fn outgoing(&self, location_id: u64) -> Result<LinksAt, Error> {
        self.index_of(location_id).map(|index| LinksAt {
            iter: self.graph.edges_directed(index, Direction::Outgoing),
        })
    }

    /// Returns an iterator over the links entering the location with the
    /// given `location_id`.
    ///
    /// Returns an error if the given `location_id` does not exist.
    pub fn incoming(&self, location_id: u64) -> Result<LinksAt, Error> {
        self.index_of(location_id).map(|index| LinksAt {
            iter: self.graph.edges_directed(index, Direction::Incoming),
        })
    }

    /// Returns an iterator over the *predecessors* of the location with the
    /// given `location_id`.
    ///
    /// Returns an error if the given `location_id` does not exist.
    pub fn predecessors(&self, location_id: u64) -> Result<Neighbors, Error> {
        self.index_of(location_id).map(|index| Neighbors {
            graph: &self.graph,
            iter: self.graph.neighbors_directed(index, Direction::Incoming),
        })
    }

    /// Returns an iterator over the *successors* of the location with the
    /// given `location_id`.
    ///
    /// Returns an error if the given `location_id` does not exist.
    pub fn successors(&self, location_id: u64) -> Result<Neighbors, Error> {
        self.index_of(location_id).map(|index| Neighbors {
            graph: &self.graph,
            iter: self.graph.neighbors_directed(index, Direction::Outgoing),
        })
    }

    pub(crate) fn index_of(&self, location_id: u64) -> Result<NodeIndex, Error> {
        self.node_indices.get(&location_id).copied().ok_or_else(|| {
            Error::location_not_found(format!("Location with id {} not found.", location_id))
        })
    }

    pub(crate) fn graph(&self) -> &petgraph::graph::DiGraph<Location, Link> {
        &self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::test_utils::TopologyBuilder;
    use crate::LinkParameters;

    #[test]
    fn test_location() -> Result<(), Error> {
        let (graph, _) = TopologyBuilder::tiny()?;

        assert_eq!(graph.location(0)?.description(), "Gateway");
        assert_eq!(
            graph.location_by_description("Node1").map(|l| l.id()),
            Some(3)
        );
        assert_eq!(
            graph.location(9),
            Err(Error::location_not_found("Location with id 9 not found."))
        );

        Ok(())
    }

    #[test]
    fn test_locations_by_type() -> Result<(), Error> {
        let (graph, _) = TopologyBuilder::reference()?;

        let leafs = graph
            .locations_by_type(LocationType::Leaf)
            .iter()
            .map(|l| l.description().to_string())
            .collect::<Vec<_>>();
        assert_eq!(leafs, ["Leaf1", "Leaf2"]);

        let tiers = graph
            .tiers()
            .iter()
            .map(|t| t.len())
            .collect::<Vec<_>>();
        assert_eq!(tiers, [1, 1, 2, 2]);

        Ok(())
    }

    #[test]
    fn test_adjacency() -> Result<(), Error> {
        let (graph, _) = TopologyBuilder::tiny()?;

        assert!(graph
            .outgoing(0)?
            .map(|l| l.sink())
            .collect::<Vec<_>>()
            .iter()
            .all(|sink| [1, 2].contains(sink)));
        assert_eq!(graph.outgoing(0)?.count(), 2);
        assert_eq!(graph.incoming(3)?.count(), 2);
        assert_eq!(graph.incoming(0)?.count(), 0);
        assert_eq!(graph.predecessors(1)?.map(|l| l.id()).collect::<Vec<_>>(), [0]);
        assert_eq!(graph.successors(3)?.count(), 0);
        assert!(graph
            .outgoing(32)
            .is_err_and(|e| e == Error::location_not_found("Location with id 32 not found.")));

        let link = graph.link_between(1, 3);
        assert!(link.is_some_and(|l| l.bandwidth() == 5.0));
        assert_eq!(graph.link_between(3, 1), None);
        assert_eq!(link.and_then(|l| graph.link_position(l)), Some(2));

        Ok(())
    }

    #[test]
    fn test_opposing_link() -> Result<(), Error> {
        let (graph, _) = TopologyBuilder::reference()?;

        for link in graph.links() {
            let opposing = graph.opposing_link(link)?;
            if link.is_two_way() {
                let opposing = opposing.ok_or_else(|| Error::internal("missing opposing"))?;
                assert_eq!(opposing.parameters(), link.parameters());
                assert_eq!(
                    (opposing.source(), opposing.sink()),
                    (link.sink(), link.source())
                );
            } else {
                assert_eq!(opposing, None);
            }
        }

        let dangling = Link::new(40, 41, LinkParameters::new(1.0, 1.0, 1.0));
        assert_eq!(graph.opposing_link(&dangling)?, None);

        Ok(())
    }
}
