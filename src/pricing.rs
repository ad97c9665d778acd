// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! The pricing subproblem: a shortest path through a service graph, weighted
//! by the dual prices of the master problem.

use std::collections::BTreeMap;

use petgraph::algo::astar;
use petgraph::visit::EdgeRef;

use crate::{
    DualPrices, Error, Link, Objective, Path, PlacementConfig, Service, ServiceGraph,
    TopologyGraph,
};

/// Added per unit of layer cost under [`Objective::NodeCost`], so that among
/// equally priced paths the one with fewer hops wins.
const HOP_TIE_BREAK: f64 = 1e-6;

/// Added per physical link crossed, growing with the link's position, so
/// that ties between routes go to the links declared first.
const ORDER_TIE_BREAK: f64 = 1e-9;

/// A path found by pricing, with its reduced cost.  The reduced cost is
/// `None` when there were no dual prices to price against.
#[derive(Clone, Debug)]
pub struct Column {
    path: Path,
    reduced_cost: Option<f64>,
}

impl Column {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn reduced_cost(&self) -> Option<f64> {
        self.reduced_cost
    }

    pub fn into_path(self) -> Path {
        self.path
    }
}

/// What pricing a service did to its catalog.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PricingOutcome {
    reduced_cost: Option<f64>,
    added: bool,
}

impl PricingOutcome {
    pub(crate) fn skipped() -> Self {
        Self {
            reduced_cost: None,
            added: false,
        }
    }

    pub fn reduced_cost(&self) -> Option<f64> {
        self.reduced_cost
    }

    /// Whether a new path was appended to the catalog.
    pub fn added(&self) -> bool {
        self.added
    }
}

/// Finds minimum reduced cost paths through the service graphs over one
/// physical topology.
pub struct PricingSolver<'a> {
    topology: &'a TopologyGraph,
    config: &'a PlacementConfig,
}

impl<'a> PricingSolver<'a> {
    pub fn new(topology: &'a TopologyGraph, config: &'a PlacementConfig) -> Self {
        Self { topology, config }
    }

    /// Prices the service at `service_index` and appends the path it finds to
    /// the service's catalog if it improves the master problem.
    ///
    /// Without dual prices every new path is added.  With dual prices, a path
    /// is added only if its reduced cost is below the negated tolerance and
    /// it isn't in the catalog yet.
    pub fn improve(
        &self,
        service_index: usize,
        service: &mut Service,
        duals: Option<&DualPrices>,
    ) -> Result<PricingOutcome, Error> {
        let column = self.price(service_index, service, duals)?;
        let improving = column
            .reduced_cost
            .map_or(true, |rc| rc < -self.config.reduced_cost_tolerance);
        let added = improving && !service.catalog().contains(&column.path);

        if added {
            tracing::debug!(
                "Service {}: adding {} with reduced cost {:?}.",
                service.description(),
                column.path.name(),
                column.reduced_cost
            );
            service.catalog_mut().push(column.path);
        }
        Ok(PricingOutcome {
            reduced_cost: column.reduced_cost,
            added,
        })
    }

    /// Finds the minimum reduced cost path of the service at `service_index`
    /// without touching its catalog.
    ///
    /// Returns a `NoFeasiblePath` error if the sink of the service graph
    /// can't be reached from its source.
    pub fn price(
        &self,
        service_index: usize,
        service: &Service,
        duals: Option<&DualPrices>,
    ) -> Result<Column, Error> {
        let graph = service.graph(self.topology.name()).ok_or_else(|| {
            Error::invalid_graph(format!(
                "Service {} has no service graph over topology {}.",
                service.description(),
                self.topology.name()
            ))
        })?;
        let inner = graph.graph();
        let throughput = service.required_throughput();

        let weights = inner
            .links()
            .map(|link| self.weight(service_index, throughput, graph, link, duals))
            .collect::<Vec<_>>();

        let source = inner.index_of(graph.source())?;
        let sink = inner.index_of(graph.sink())?;
        let Some((_, nodes)) = astar(
            inner.graph(),
            source,
            |n| n == sink,
            |e| weights[e.id().index()],
            |_| 0.0,
        ) else {
            return Err(Error::no_feasible_path(format!(
                "Service {}: the sink of the service graph over {} can't be reached from its source.",
                service.description(),
                self.topology.name()
            )));
        };
        let sequence = nodes.iter().map(|i| inner.graph()[*i].id()).collect::<Vec<_>>();

        let path = self.to_path(service, graph, sequence)?;
        let reduced_cost = duals.map(|d| self.reduced_cost(service_index, throughput, &path, d));
        Ok(Column { path, reduced_cost })
    }

    /// The weight of a service graph link: its share of the column cost plus
    /// the dual prices of the master rows that using it would touch.
    fn weight(
        &self,
        service_index: usize,
        throughput: f64,
        graph: &ServiceGraph,
        link: &Link,
        duals: Option<&DualPrices>,
    ) -> f64 {
        let mut weight = HOP_TIE_BREAK * link.cost();
        if self.config.objective == Objective::PathCost {
            weight += throughput * link.cost();
        }

        if let (Some(a), Some(b)) = (graph.origin(link.source()), graph.origin(link.sink())) {
            for position in self.physical_positions(a, b) {
                weight += ORDER_TIE_BREAK * (position + 1) as f64;
                if let Some(duals) = duals {
                    weight += (-duals.capacity(position)).max(0.0) * throughput;
                }
            }
        }
        if let (Some((component, node)), Some(duals)) = (graph.placement(link.sink()), duals) {
            weight += (-duals.assignment(service_index, component, node)).max(0.0) * throughput;
        }
        weight
    }

    /// Positions of the physical links between `a` and `b`, in either
    /// direction.
    fn physical_positions(&self, a: u64, b: u64) -> impl Iterator<Item = usize> + '_ {
        let links = if a == b {
            [None, None]
        } else {
            [self.topology.link_between(a, b), self.topology.link_between(b, a)]
        };
        links
            .into_iter()
            .flatten()
            .filter_map(|link| self.topology.link_position(link))
    }

    fn to_path(
        &self,
        service: &Service,
        graph: &ServiceGraph,
        sequence: Vec<u64>,
    ) -> Result<Path, Error> {
        let inner = graph.graph();

        let mut locations = Vec::with_capacity(sequence.len());
        for id in &sequence {
            locations.push(inner.location(*id)?.clone());
        }
        let mut links = Vec::with_capacity(sequence.len().saturating_sub(1));
        for pair in sequence.windows(2) {
            let link = inner.link_between(pair[0], pair[1]).ok_or_else(|| {
                Error::internal(format!(
                    "Service {}: no link between {} and {} on the found path.",
                    service.description(),
                    pair[0],
                    pair[1]
                ))
            })?;
            links.push(link.clone());
        }

        let mut traversals = vec![0; self.topology.link_count()];
        for link in &links {
            if let (Some(a), Some(b)) = (graph.origin(link.source()), graph.origin(link.sink())) {
                for position in self.physical_positions(a, b) {
                    traversals[position] += 1;
                }
            }
        }

        let mut assignment = BTreeMap::new();
        for id in &sequence {
            if let Some((component, node)) = graph.placement(*id) {
                if assignment.insert(component, node).is_some() {
                    return Err(Error::internal(format!(
                        "Service {}: path places component {component} twice.",
                        service.description()
                    )));
                }
            }
        }
        if assignment.len() != service.components().len() {
            return Err(Error::internal(format!(
                "Service {}: path places {} of {} components.",
                service.description(),
                assignment.len(),
                service.components().len()
            )));
        }

        let hops = links.iter().map(|l| l.cost()).sum::<f64>();
        let latency = links.iter().map(|l| l.latency()).sum::<f64>();
        if latency > service.required_latency() {
            tracing::warn!(
                "Service {}: path latency {latency} exceeds the required {}.",
                service.description(),
                service.required_latency()
            );
        }

        let name = format!("{}_path{}", service.description(), service.catalog().len());
        let route = TopologyGraph::try_new(name.clone(), locations, links)?;
        Ok(Path::new(
            name, route, sequence, traversals, assignment, hops, latency,
        ))
    }

    /// The exact reduced cost of a path: its column cost minus the duals of
    /// the rows it enters.
    fn reduced_cost(
        &self,
        service_index: usize,
        throughput: f64,
        path: &Path,
        duals: &DualPrices,
    ) -> f64 {
        let cost = match self.config.objective {
            Objective::PathCost => path.hops() * throughput,
            Objective::NodeCost => 0.0,
        };
        let capacity = path
            .traversals()
            .iter()
            .enumerate()
            .map(|(position, t)| f64::from(*t) * throughput * duals.capacity(position))
            .sum::<f64>();
        let assignment = path
            .assignments()
            .iter()
            .map(|(component, node)| throughput * duals.assignment(service_index, *component, *node))
            .sum::<f64>();

        cost - duals.demand(service_index) - capacity - assignment
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::topology::test_utils::{service_with_replicas, TopologyBuilder};
    use crate::ErrorKind;

    #[test]
    fn test_single_component_path() -> Result<(), Error> {
        let (topology, mut ids) = TopologyBuilder::tiny()?;
        let mut service = service_with_replicas(&mut ids, "web", &[1], 1.0)?;
        service.add_graph(&topology, &mut ids)?;

        let config = PlacementConfig::default();
        let pricer = PricingSolver::new(&topology, &config);
        let outcome = pricer.improve(0, &mut service, None)?;
        assert!(outcome.added());
        assert_eq!(outcome.reduced_cost(), None);

        let path = service
            .catalog()
            .get(0)
            .ok_or_else(|| Error::internal("no path"))?;
        assert_eq!(path.name(), "web_path0");
        // down to Node1 and back up over Leaf1.
        assert_eq!(path.hops(), 4.0);
        let used = path.traversals().iter().filter(|t| **t > 0).count();
        assert_eq!(used, 2);
        assert_eq!(path.traversals(), [2, 0, 2, 0]);
        assert_eq!(path.latency(), 4.0);
        assert_eq!(path.assigned_node(service.components()[0].id()), Some(3));
        assert_eq!(path.assignment(service.components()[0].id(), 3), 1);

        // the same path again is a duplicate.
        let outcome = pricer.improve(0, &mut service, Some(&DualPrices::default()))?;
        assert!(!outcome.added());
        assert_eq!(service.catalog().len(), 1);

        Ok(())
    }

    #[test]
    fn test_two_component_path() -> Result<(), Error> {
        let (topology, mut ids) = TopologyBuilder::reference()?;
        let mut service = service_with_replicas(&mut ids, "web", &[1, 1], 1.0)?;
        service.add_graph(&topology, &mut ids)?;

        let config = PlacementConfig::default();
        let column = PricingSolver::new(&topology, &config).price(0, &service, None)?;
        let path = column.path();
        let graph = service
            .graph(topology.name())
            .ok_or_else(|| Error::internal("no graph"))?;

        let dummies = path
            .sequence()
            .iter()
            .filter(|id| graph.placement(**id).is_some())
            .count();
        assert_eq!(dummies, 2);
        assert_eq!(path.assignments().len(), 2);
        assert_eq!(path.sequence().first(), Some(&graph.source()));
        assert_eq!(path.sequence().last(), Some(&graph.sink()));

        Ok(())
    }

    #[test]
    fn test_flow_conservation() -> Result<(), Error> {
        let (topology, mut ids) = TopologyBuilder::reference()?;
        let mut service = service_with_replicas(&mut ids, "web", &[1, 2, 1], 1.0)?;
        service.add_graph(&topology, &mut ids)?;

        let config = PlacementConfig::default();
        let column = PricingSolver::new(&topology, &config).price(0, &service, None)?;
        let route = column.path().route();
        let sequence = column.path().sequence();

        let mut degrees = HashMap::<u64, (usize, usize)>::new();
        for link in route.links() {
            degrees.entry(link.sink()).or_default().0 += 1;
            degrees.entry(link.source()).or_default().1 += 1;
        }
        for id in &sequence[1..sequence.len() - 1] {
            assert_eq!(degrees[id], (1, 1));
        }
        assert_eq!(degrees[&sequence[0]], (0, 1));
        assert_eq!(degrees[&sequence[sequence.len() - 1]], (1, 0));

        Ok(())
    }

    #[test]
    fn test_no_feasible_path() -> Result<(), Error> {
        // Node1 hangs off a pair of leaves the gateway can't reach, while the
        // leaves it can reach have no node below them.
        let mut builder = TopologyBuilder::new();
        let gateway = builder.gateway("Gateway");
        let leaf1 = builder.leaf("Leaf1");
        let leaf2 = builder.leaf("Leaf2");
        let leaf3 = builder.leaf("Leaf3");
        let leaf4 = builder.leaf("Leaf4");
        let node = builder.node("Node1", 4.0, 8.0, 1.0);
        builder
            .connect(gateway, leaf1, 5.0)
            .connect_two_way(leaf1, leaf4, 5.0)
            .connect_two_way(leaf2, leaf3, 5.0)
            .connect(leaf2, node, 5.0);
        let (topology, mut ids) = builder.build("split")?;

        let mut service = service_with_replicas(&mut ids, "web", &[1], 1.0)?;
        service.add_graph(&topology, &mut ids)?;

        let config = PlacementConfig::default();
        let result = PricingSolver::new(&topology, &config).price(0, &service, None);
        assert!(result.is_err_and(|e| e.kind() == ErrorKind::NoFeasiblePath));

        Ok(())
    }
}
