// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! This module defines the `Link` struct, a directed edge between two
//! locations.

use std::fmt::Display;

/// The capacity and cost attributes of a link.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinkParameters {
    pub bandwidth: f64,
    pub latency: f64,
    pub cost: f64,
}

impl LinkParameters {
    pub fn new(bandwidth: f64, latency: f64, cost: f64) -> Self {
        Self {
            bandwidth,
            latency,
            cost,
        }
    }

    /// Parameters of a synthetic edge: unlimited bandwidth, no latency.
    pub(crate) fn synthetic(cost: f64) -> Self {
        Self::new(f64::INFINITY, 0.0, cost)
    }
}

/// A directed link between two locations, addressed by their ids.
///
/// A `two_way` link is paired with exactly one opposing link that has the same
/// parameters and swapped endpoints.
#[derive(Clone, Debug, PartialEq)]
pub struct Link {
    source: u64,
    sink: u64,
    parameters: LinkParameters,
    two_way: bool,
}

impl Link {
    /// Creates a one-way link.
    pub fn new(source: u64, sink: u64, parameters: LinkParameters) -> Self {
        Self {
            source,
            sink,
            parameters,
            two_way: false,
        }
    }

    /// Creates a link that can carry traffic in both directions.  The
    /// opposing link is added when the topology is created, unless it is
    /// given explicitly.
    pub fn two_way(source: u64, sink: u64, parameters: LinkParameters) -> Self {
        Self {
            two_way: true,
            ..Self::new(source, sink, parameters)
        }
    }

    /// Returns the opposing link, with swapped endpoints.
    pub fn reversed(&self) -> Self {
        Self {
            source: self.sink,
            sink: self.source,
            ..self.clone()
        }
    }

    pub fn source(&self) -> u64 {
        self.source
    }

    pub fn sink(&self) -> u64 {
        self.sink
    }

    pub fn parameters(&self) -> &LinkParameters {
        &self.parameters
    }

    pub fn bandwidth(&self) -> f64 {
        self.parameters.bandwidth
    }

    pub fn latency(&self) -> f64 {
        self.parameters.latency
    }

    pub fn cost(&self) -> f64 {
        self.parameters.cost
    }

    pub fn is_two_way(&self) -> bool {
        self.two_way
    }
}

impl Display for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cost {}, bandwidth {}",
            self.parameters.cost, self.parameters.bandwidth
        )
    }
}
