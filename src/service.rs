// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Services, the ordered chains of components that have to be placed on the
//! nodes of a topology, and the components themselves.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::service_graph::ServiceGraphBuilder;
use crate::{Error, IdAllocator, PathCatalog, ServiceGraph, TopologyGraph};

/// A part of a service that has to run on a compute node.
#[derive(Clone, Debug, PartialEq)]
pub struct Component {
    id: u64,
    description: String,
    requirements: BTreeMap<String, f64>,
    replica_count: u32,
}

impl Component {
    /// Creates a new component with an id drawn from `ids`.
    ///
    /// Returns an error if `replica_count` is zero.
    pub fn try_new<S: Into<String>>(
        ids: &mut IdAllocator,
        description: impl Into<String>,
        requirements: impl IntoIterator<Item = (S, f64)>,
        replica_count: u32,
    ) -> Result<Self, Error> {
        let description = description.into();
        if replica_count == 0 {
            return Err(Error::invalid_service(format!(
                "Component {description} must have at least one replica."
            )));
        }
        Ok(Self {
            id: ids.next_id(),
            description,
            requirements: requirements
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
            replica_count,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the amount of the given resource the component requires on
    /// every node it is placed on.
    pub fn requirement(&self, dimension: &str) -> f64 {
        self.requirements.get(dimension).copied().unwrap_or(0.0)
    }

    pub fn requirements(&self) -> &BTreeMap<String, f64> {
        &self.requirements
    }

    /// Returns the number of distinct nodes the component has to run on.
    pub fn replica_count(&self) -> u32 {
        self.replica_count
    }
}

/// A network service: traffic enters at the gateway, passes through every
/// component in order and leaves through the gateway again.
#[derive(Clone, Debug)]
pub struct Service {
    description: String,
    components: Vec<Component>,
    required_throughput: f64,
    required_latency: f64,
    graphs: HashMap<String, ServiceGraph>,
    catalog: PathCatalog,
}

impl Service {
    /// Creates a new service from its ordered components.
    ///
    /// Returns an error if there are no components, if a component appears
    /// twice, or if the throughput isn't positive.
    pub fn try_new(
        description: impl Into<String>,
        components: Vec<Component>,
        required_throughput: f64,
        required_latency: f64,
    ) -> Result<Self, Error> {
        let description = description.into();
        if components.is_empty() {
            return Err(Error::invalid_service(format!(
                "Service {description} must have at least one component."
            )));
        }
        let mut seen = HashSet::new();
        for component in &components {
            if !seen.insert(component.id()) {
                return Err(Error::invalid_service(format!(
                    "Service {description} contains component {} more than once.",
                    component.id()
                )));
            }
        }
        if !(required_throughput.is_finite() && required_throughput > 0.0) {
            return Err(Error::invalid_service(format!(
                "Service {description} must have a positive throughput, found {required_throughput}."
            )));
        }

        Ok(Self {
            description,
            components,
            required_throughput,
            required_latency,
            graphs: HashMap::new(),
            catalog: PathCatalog::default(),
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn required_throughput(&self) -> f64 {
        self.required_throughput
    }

    pub fn required_latency(&self) -> f64 {
        self.required_latency
    }

    /// Builds the layered service graph of this service over the given
    /// topology, replacing any previous graph for a topology of the same name.
    pub fn add_graph(
        &mut self,
        topology: &TopologyGraph,
        ids: &mut IdAllocator,
    ) -> Result<&ServiceGraph, Error> {
        let graph = ServiceGraphBuilder::new(topology, self, ids).build()?;
        Ok(match self.graphs.entry(topology.name().to_string()) {
            Entry::Occupied(mut entry) => {
                entry.insert(graph);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(graph),
        })
    }

    /// Returns the service graph over the topology with the given name, if it
    /// was built.
    pub fn graph(&self, topology_name: &str) -> Option<&ServiceGraph> {
        self.graphs.get(topology_name)
    }

    /// Returns the paths generated for this service so far.
    pub fn catalog(&self) -> &PathCatalog {
        &self.catalog
    }

    pub(crate) fn catalog_mut(&mut self) -> &mut PathCatalog {
        &mut self.catalog
    }
}
