// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

/*!
# Datacenter Service Placement

This is a library for placing multi-component network services on the compute
nodes of a datacenter and routing their traffic, under bandwidth, replica and
node capacity constraints, by column generation.

## Topologies

The physical datacenter is a [`TopologyGraph`] of [`Location`]s (a gateway,
switch tiers and compute nodes) and the directed [`Link`]s between them,
created with [`try_new`][TopologyGraph::try_new].  Creation checks that:

- Location ids are unique.
- All links point to existing locations, and no location links to itself.
- Every `two_way` link has exactly one opposing link with the same
  parameters.  A missing opposing link is added.

Only locations of type `node` carry [`NodeResources`].  Ids are drawn from an
explicit [`IdAllocator`].

## Service graphs

A [`Service`] is an ordered chain of [`Component`]s.  For every topology it is
placed on, [`add_graph`][Service::add_graph] builds a layered
[`ServiceGraph`] in which every path from the source to the sink passes
through exactly one dummy location per component, and so stands for one
placement of the components together with a route for the service's traffic.

## Column generation

The [`Orchestrator`] alternates between

- the [`MasterProblem`], which splits every service's throughput over the
  [`Path`]s found so far and places the components, through a
  [`SolverBackend`] such as the bundled [`MicroLpBackend`], and
- the [`PricingSolver`], which searches the service graphs for new paths
  with a negative reduced cost under the master's [`DualPrices`],

until no service has an improving path left.  Demand that the current paths
can't carry is priced at an artificial penalty, so the master problem stays
solvable while paths are still missing.  If the master problem is infeasible,
the returned [`Error`] names an irreducible set of conflicting constraints.
*/

mod config;
pub use config::{Objective, PlacementConfig};

mod error;
pub use error::{Error, ErrorKind};

mod link;
pub use link::{Link, LinkParameters};

mod location;
pub use location::{IdAllocator, Location, LocationKind, LocationType, NodeResources};

mod master;
pub use master::{DualPrices, MasterProblem, MasterSolution};

mod orchestrator;
pub use orchestrator::{CancelHandle, Orchestrator, PlacementOutcome, PlacementState, Termination};

mod path;
pub use path::{Path, PathCatalog};

mod pricing;
pub use pricing::{Column, PricingOutcome, PricingSolver};

mod service;
pub use service::{Component, Service};

mod service_graph;
pub use service_graph::ServiceGraph;

pub mod solver;
pub use solver::{MicroLpBackend, SolveOutcome, SolveStatus, SolverBackend};

mod topology;
pub use topology::{iterators, TopologyGraph};
