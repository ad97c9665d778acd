// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Rendering of a [`TopologyGraph`] in the graphviz DOT format.

use petgraph::dot::Dot;

use crate::TopologyGraph;

impl TopologyGraph {
    /// Renders the graph as DOT, with locations labelled by their description
    /// and links by their cost and bandwidth.
    pub fn to_dot(&self) -> String {
        format!("{}", Dot::with_config(&self.graph, &[]))
    }
}
