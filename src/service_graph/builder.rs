// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Construction of a [`ServiceGraph`] from a service and a physical topology.
//!
//! The graph is made of `k + 1` layers for a service with `k` components:
//!
//! - an entry layer, a copy of the topology for routing from the gateway down
//!   to the first component,
//! - `k - 1` segment layers for routing between consecutive components: an
//!   upward `out` copy of every tier below the top switch tier, a `mid` copy
//!   of that tier, and a downward `in` copy of the tiers below it, with a free
//!   shortcut from every `out` location to its own `in` copy,
//! - an exit layer, a reversed copy of the topology for routing from the
//!   last component back up to the gateway.
//!
//! Between layer `i` and layer `i + 1`, one dummy location per node stands for
//! placing component `i` on that node.

use std::collections::{HashMap, HashSet};

use crate::link::LinkParameters;
use crate::location::LocationPredicates;
use crate::{Error, IdAllocator, Link, Location, LocationKind, Service, ServiceGraph, TopologyGraph};

/// The cost of every copied physical link.
const UNIT_COST: f64 = 1.0;

/// The locations and links of one layer, before they are merged into the
/// service graph.
#[derive(Default)]
struct Layer {
    locations: Vec<Location>,
    links: Vec<Link>,
    origins: HashMap<u64, u64>,
    edges: HashSet<(u64, u64)>,
}

impl Layer {
    /// Copies the given locations into the layer and returns a map from
    /// physical id to copy id.
    fn copy_all<'l>(
        &mut self,
        ids: &mut IdAllocator,
        locations: impl IntoIterator<Item = &'l Location>,
    ) -> HashMap<u64, u64> {
        let mut copies = HashMap::new();
        for location in locations {
            let copy = location.duplicate(ids);
            copies.insert(location.id(), copy.id());
            self.origins.insert(copy.id(), location.id());
            self.locations.push(copy);
        }
        copies
    }

    /// Connects two locations of the layer.  Repeated connections are
    /// ignored.
    fn connect(&mut self, source: u64, sink: u64, parameters: LinkParameters) {
        if self.edges.insert((source, sink)) {
            self.links.push(Link::new(source, sink, parameters));
        }
    }

    /// Copies of `physical` that have no outgoing link within the layer.
    fn without_outgoing(&self, physical: u64) -> Vec<u64> {
        self.copies_of(physical)
            .filter(|c| !self.edges.iter().any(|(s, _)| s == c))
            .collect()
    }

    /// Copies of `physical` that have no incoming link within the layer.
    fn without_incoming(&self, physical: u64) -> Vec<u64> {
        self.copies_of(physical)
            .filter(|c| !self.edges.iter().any(|(_, d)| d == c))
            .collect()
    }

    fn copies_of(&self, physical: u64) -> impl Iterator<Item = u64> + '_ {
        self.locations
            .iter()
            .map(|l| l.id())
            .filter(move |c| self.origins.get(c) == Some(&physical))
    }
}

/// Builds the layered [`ServiceGraph`] of a service over a topology.
pub(crate) struct ServiceGraphBuilder<'a> {
    topology: &'a TopologyGraph,
    service: &'a Service,
    ids: &'a mut IdAllocator,
}

impl<'a> ServiceGraphBuilder<'a> {
    pub(crate) fn new(
        topology: &'a TopologyGraph,
        service: &'a Service,
        ids: &'a mut IdAllocator,
    ) -> Self {
        Self {
            topology,
            service,
            ids,
        }
    }

    pub(crate) fn build(mut self) -> Result<ServiceGraph, Error> {
        let component_count = self.service.components().len();

        let mut layers = Vec::with_capacity(component_count + 1);
        layers.push(self.entry_layer());
        for _ in 1..component_count {
            layers.push(self.segment_layer()?);
        }
        layers.push(self.exit_layer());

        let mut locations = Vec::new();
        let mut links = Vec::new();
        let mut placements = HashMap::new();
        let nodes = self
            .physical_locations()
            .into_iter()
            .filter(|l| l.is_node())
            .collect::<Vec<_>>();

        for (i, component) in self.service.components().iter().enumerate() {
            let (pre, post) = (&layers[i], &layers[i + 1]);
            for node in &nodes {
                let dummy = Location::new(
                    self.ids,
                    format!("{}_{}", node.description(), component.description()),
                    LocationKind::Dummy,
                );
                let arrivals = pre.without_outgoing(node.id());
                let departures = post.without_incoming(node.id());
                if arrivals.is_empty() || departures.is_empty() {
                    tracing::warn!(
                        "Service {}: component {} can't be placed on node {}.",
                        self.service.description(),
                        component.description(),
                        node.description()
                    );
                }

                for arrival in arrivals {
                    links.push(Link::new(arrival, dummy.id(), LinkParameters::synthetic(0.0)));
                }
                for departure in departures {
                    links.push(Link::new(dummy.id(), departure, LinkParameters::synthetic(0.0)));
                }
                placements.insert(dummy.id(), (component.id(), node.id()));
                locations.push(dummy);
            }
        }

        let mut origins = HashMap::new();
        for layer in layers {
            origins.extend(layer.origins);
            locations.extend(layer.locations);
            links.extend(layer.links);
        }

        tracing::debug!(
            "Service graph for {} over {}: {} locations, {} links.",
            self.service.description(),
            self.topology.name(),
            locations.len(),
            links.len()
        );

        ServiceGraph::try_new(
            format!("{}_{}", self.topology.name(), self.service.description()),
            locations,
            links,
            origins,
            placements,
        )
    }

    /// The physical locations that take part in routing.  Dummy locations of
    /// the physical topology are left out.
    fn physical_locations(&self) -> Vec<&'a Location> {
        self.topology
            .locations()
            .filter(|l| !l.is_dummy())
            .collect()
    }

    /// A copy of the topology, for routing from the gateway to the first
    /// component.
    fn entry_layer(&mut self) -> Layer {
        let locations = self.physical_locations();
        let mut layer = Layer::default();
        let copies = layer.copy_all(self.ids, locations);
        for link in self.topology.links() {
            if let (Some(&s), Some(&d)) = (copies.get(&link.source()), copies.get(&link.sink())) {
                layer.connect(s, d, unit_cost(link));
            }
        }
        layer
    }

    /// A reversed copy of the topology, for routing from the last component
    /// back to the gateway.
    fn exit_layer(&mut self) -> Layer {
        let locations = self.physical_locations();
        let mut layer = Layer::default();
        let copies = layer.copy_all(self.ids, locations);
        for link in self.topology.links() {
            if let (Some(&s), Some(&d)) = (copies.get(&link.source()), copies.get(&link.sink())) {
                layer.connect(d, s, unit_cost(link));
            }
        }
        layer
    }

    /// The layer between two consecutive components.
    fn segment_layer(&mut self) -> Result<Layer, Error> {
        let tiers = self.topology.tiers();
        let [gateway_tier, mid_tier, lower_tiers @ ..] = tiers.as_slice() else {
            return Err(Error::invalid_graph(format!(
                "Topology {} needs a tier below the gateway to route between components.",
                self.topology.name()
            )));
        };
        if !gateway_tier.iter().all(|l| l.is_gateway()) {
            return Err(Error::invalid_graph(format!(
                "Topology {} has no gateway.",
                self.topology.name()
            )));
        }

        let lower = lower_tiers.iter().flatten().copied().collect::<Vec<_>>();
        let mut layer = Layer::default();
        let out = layer.copy_all(self.ids, lower.iter().copied());
        let mid = layer.copy_all(self.ids, mid_tier.iter().copied());
        let inn = layer.copy_all(self.ids, lower.iter().copied());

        for link in self.topology.links() {
            let (s, d) = (link.source(), link.sink());
            let params = unit_cost(link);
            match (mid.get(&s), mid.get(&d)) {
                (Some(&ms), Some(&md)) => layer.connect(ms, md, params),
                (Some(&ms), None) => {
                    if let (Some(&od), Some(&id)) = (out.get(&d), inn.get(&d)) {
                        layer.connect(od, ms, params);
                        layer.connect(ms, id, params);
                    }
                }
                (None, Some(&md)) => {
                    if let (Some(&os), Some(&is)) = (out.get(&s), inn.get(&s)) {
                        layer.connect(os, md, params);
                        layer.connect(md, is, params);
                    }
                }
                (None, None) => {
                    if let (Some(&os), Some(&od), Some(&is), Some(&id)) =
                        (out.get(&s), out.get(&d), inn.get(&s), inn.get(&d))
                    {
                        layer.connect(od, os, params);
                        layer.connect(is, id, params);
                    }
                }
            }
        }

        for location in &lower {
            layer.connect(
                out[&location.id()],
                inn[&location.id()],
                LinkParameters::synthetic(0.0),
            );
        }

        Ok(layer)
    }
}

/// The parameters of a copied physical link: the physical bandwidth and
/// latency, with unit cost.
fn unit_cost(link: &Link) -> LinkParameters {
    LinkParameters {
        cost: UNIT_COST,
        ..*link.parameters()
    }
}

#[cfg(test)]
mod tests {
    use crate::location::LocationPredicates;
    use crate::topology::test_utils::{service_with_replicas, TopologyBuilder};
    use crate::{Error, LocationType};

    #[test]
    fn test_single_component_graph() -> Result<(), Error> {
        let (topology, mut ids) = TopologyBuilder::tiny()?;
        let mut service = service_with_replicas(&mut ids, "web", &[1], 1.0)?;
        let graph = service.add_graph(&topology, &mut ids)?;
        let inner = graph.graph();

        // entry and exit copies of the 4 locations, one dummy for Node1.
        assert_eq!(inner.locations().count(), 9);
        // 4 links in each direction, one link into and out of the dummy.
        assert_eq!(inner.links().count(), 10);

        let source = inner.location(graph.source())?;
        let sink = inner.location(graph.sink())?;
        assert_eq!(source.description(), "Gateway");
        assert_eq!(sink.description(), "Gateway");
        assert_ne!(graph.source(), graph.sink());
        assert_eq!(graph.origin(graph.source()), Some(0));

        let dummies = graph.dummies().collect::<Vec<_>>();
        assert_eq!(dummies.len(), 1);
        assert_eq!(dummies[0].description(), "Node1_component1");
        assert_eq!(
            graph.placement(dummies[0].id()),
            Some((service.components()[0].id(), 3))
        );

        Ok(())
    }

    #[test]
    fn test_two_component_graph() -> Result<(), Error> {
        let (topology, mut ids) = TopologyBuilder::reference()?;
        let mut service = service_with_replicas(&mut ids, "web", &[2, 2], 1.0)?;
        let graph = service.add_graph(&topology, &mut ids)?;
        let inner = graph.graph();

        // 6 entry + 6 exit copies, 4 out + 1 mid + 4 in copies, 2 x 2 dummies.
        assert_eq!(inner.locations().count(), 25);
        assert_eq!(
            inner.locations().filter(|l| l.is_dummy()).count(),
            4
        );
        assert_eq!(inner.locations_by_type(LocationType::Dummy).len(), 4);

        for dummy in graph.dummies() {
            assert_eq!(inner.incoming(dummy.id())?.count(), 1);
            assert_eq!(inner.outgoing(dummy.id())?.count(), 1);
            assert!(inner.incoming(dummy.id())?.all(|l| l.cost() == 0.0));
        }

        // every copied physical link costs one unit, only dummy and
        // shortcut links are free.
        let free = inner.links().filter(|l| l.cost() == 0.0).count();
        assert_eq!(free, 8 + 4);
        assert!(inner
            .links()
            .all(|l| l.cost() == 0.0 || l.cost() == 1.0));

        Ok(())
    }

    #[test]
    fn test_segment_needs_lower_tier() -> Result<(), Error> {
        let mut builder = TopologyBuilder::new();
        builder.gateway("Gateway");
        let (topology, mut ids) = builder.build("lonely")?;

        let mut service = service_with_replicas(&mut ids, "web", &[1, 1], 1.0)?;
        assert!(service.add_graph(&topology, &mut ids).is_err_and(|e| e
            == Error::invalid_graph(
                "Topology lonely needs a tier below the gateway to route between components."
            )));

        Ok(())
    }
}
