// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! This module defines the `Location` struct and the `LocationKind` enum,
//! which represent the places of a datacenter topology, and the
//! `IdAllocator` that hands out their ids.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use crate::Error;

/// Hands out ids for locations and components.
///
/// Ids are never reused by an allocator.  Pass the same allocator to every
/// constructor that belongs to one problem instance, so that physical
/// locations, service graph copies and components never collide.
#[derive(Clone, Debug, Default)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    /// Creates an allocator whose first id is `0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an allocator whose first id is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self { next: first }
    }

    /// Returns a fresh id.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// The resources offered by a compute node, and the cost of renting it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeResources {
    resources: BTreeMap<String, f64>,
    cost: f64,
}

impl NodeResources {
    /// Creates a resource record from `(dimension, amount)` pairs.
    pub fn new<S: Into<String>>(resources: impl IntoIterator<Item = (S, f64)>, cost: f64) -> Self {
        Self {
            resources: resources.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            cost,
        }
    }

    /// Returns the budget for the given resource dimension, `0.0` if the node
    /// doesn't offer it.
    pub fn get(&self, dimension: &str) -> f64 {
        self.resources.get(dimension).copied().unwrap_or(0.0)
    }

    /// Returns all resource dimensions and their budgets.
    pub fn resources(&self) -> &BTreeMap<String, f64> {
        &self.resources
    }

    /// Returns the rental cost of the node.
    pub fn cost(&self) -> f64 {
        self.cost
    }
}

/// The tag of a location, without any attached data.
///
/// The declaration order is the order of tiers from the top of a
/// datacenter to the bottom.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocationType {
    Gateway,
    SuperSpine,
    Spine,
    Leaf,
    Node,
    Dummy,
}

impl LocationType {
    /// The physical tiers, top to bottom.
    pub const TIERS: [LocationType; 5] = [
        LocationType::Gateway,
        LocationType::SuperSpine,
        LocationType::Spine,
        LocationType::Leaf,
        LocationType::Node,
    ];
}

impl Display for LocationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocationType::Gateway => write!(f, "gateway"),
            LocationType::SuperSpine => write!(f, "super_spine"),
            LocationType::Spine => write!(f, "spine"),
            LocationType::Leaf => write!(f, "leaf"),
            LocationType::Node => write!(f, "node"),
            LocationType::Dummy => write!(f, "dummy"),
        }
    }
}

impl FromStr for LocationType {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "gateway" => Ok(LocationType::Gateway),
            "super_spine" => Ok(LocationType::SuperSpine),
            "spine" => Ok(LocationType::Spine),
            "leaf" => Ok(LocationType::Leaf),
            "node" => Ok(LocationType::Node),
            "dummy" => Ok(LocationType::Dummy),
            _ => Err(Error::invalid_location_type(format!(
                "Unknown location type: {tag}"
            ))),
        }
    }
}

/// Represents the kind of a location.
///
/// Only the `Node` variant carries resources.
#[derive(Clone, Debug, PartialEq)]
pub enum LocationKind {
    Gateway,
    SuperSpine,
    Spine,
    Leaf,
    Node(NodeResources),
    Dummy,
}

impl LocationKind {
    /// Creates a `LocationKind` from a type tag and optional resources.
    ///
    /// Returns an error if the tag is unknown, or if resources are given for
    /// anything but a node, or missing for a node.
    pub fn try_from_tag(tag: &str, resources: Option<NodeResources>) -> Result<Self, Error> {
        match (tag.parse::<LocationType>()?, resources) {
            (LocationType::Node, Some(resources)) => Ok(LocationKind::Node(resources)),
            (LocationType::Node, None) => Err(Error::invalid_location_type(
                "Location of type node must have resources.",
            )),
            (_, Some(_)) => Err(Error::invalid_location_type(format!(
                "Only locations of type node can have resources, found type {tag}."
            ))),
            (LocationType::Gateway, None) => Ok(LocationKind::Gateway),
            (LocationType::SuperSpine, None) => Ok(LocationKind::SuperSpine),
            (LocationType::Spine, None) => Ok(LocationKind::Spine),
            (LocationType::Leaf, None) => Ok(LocationKind::Leaf),
            (LocationType::Dummy, None) => Ok(LocationKind::Dummy),
        }
    }

    /// Returns the tag of the kind.
    pub fn location_type(&self) -> LocationType {
        match self {
            LocationKind::Gateway => LocationType::Gateway,
            LocationKind::SuperSpine => LocationType::SuperSpine,
            LocationKind::Spine => LocationType::Spine,
            LocationKind::Leaf => LocationType::Leaf,
            LocationKind::Node(_) => LocationType::Node,
            LocationKind::Dummy => LocationType::Dummy,
        }
    }
}

/// A place in a datacenter topology: a gateway, a switch or a compute node.
#[derive(Clone, Debug, PartialEq)]
pub struct Location {
    id: u64,
    description: String,
    kind: LocationKind,
}

impl Location {
    /// Creates a new location with an id drawn from `ids`.
    pub fn new(ids: &mut IdAllocator, description: impl Into<String>, kind: LocationKind) -> Self {
        Self {
            id: ids.next_id(),
            description: description.into(),
            kind,
        }
    }

    /// Creates a new location from a type tag, validating that resources are
    /// given exactly when the tag is `node`.
    pub fn try_new(
        ids: &mut IdAllocator,
        description: impl Into<String>,
        tag: &str,
        resources: Option<NodeResources>,
    ) -> Result<Self, Error> {
        let kind = LocationKind::try_from_tag(tag, resources)?;
        Ok(Self::new(ids, description, kind))
    }

    /// Creates a copy of this location with a fresh id.
    pub fn duplicate(&self, ids: &mut IdAllocator) -> Self {
        Self::new(ids, self.description.clone(), self.kind.clone())
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn kind(&self) -> &LocationKind {
        &self.kind
    }

    pub fn location_type(&self) -> LocationType {
        self.kind.location_type()
    }

    /// Returns the resources of the location if it is a node.
    pub fn resources(&self) -> Option<&NodeResources> {
        match &self.kind {
            LocationKind::Node(resources) => Some(resources),
            _ => None,
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description)
    }
}

/// Predicates for checking the type of a `Location`.
pub(crate) trait LocationPredicates {
    fn is_gateway(&self) -> bool;
    fn is_node(&self) -> bool;
    fn is_dummy(&self) -> bool;
}

impl LocationPredicates for Location {
    fn is_gateway(&self) -> bool {
        self.location_type() == LocationType::Gateway
    }

    fn is_node(&self) -> bool {
        self.location_type() == LocationType::Node
    }

    fn is_dummy(&self) -> bool {
        self.location_type() == LocationType::Dummy
    }
}
