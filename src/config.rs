// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! This module contains the configuration options for placing services.

use std::time::Duration;

/// What the master problem minimises.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Objective {
    /// The rental cost of every node a component replica is placed on.
    #[default]
    NodeCost,
    /// The number of physical hops of the chosen paths, weighted by the share
    /// of throughput each path carries.
    PathCost,
}

/// Configuration options for the column generation loop.
#[derive(Clone, Debug)]
pub struct PlacementConfig {
    /// The objective of the master problem.
    pub objective: Objective,

    /// The maximum number of master solves.
    pub max_iterations: usize,

    /// The wall clock budget for the whole loop.  It is checked between
    /// rounds only.
    pub time_budget: Option<Duration>,

    /// Columns with a reduced cost above `-reduced_cost_tolerance` are not
    /// considered improving.
    pub reduced_cost_tolerance: f64,

    /// The cost per unit of demand a service leaves unrouted.  Keeps the
    /// master problem feasible while columns are still missing.
    pub artificial_penalty: f64,

    /// Whether the services of a round are priced on the rayon thread pool.
    pub parallel_pricing: bool,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            objective: Objective::default(),
            max_iterations: 50,
            time_budget: None,
            reduced_cost_tolerance: 1e-6,
            artificial_penalty: 10_000.0,
            parallel_pricing: true,
        }
    }
}
