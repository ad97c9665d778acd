// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! The restricted master problem over the path catalogs of all services.
//!
//! Every path `p` of service `s` gets a non-negative fraction `λ(s,p)` of the
//! service's throughput `T(s)`, and every pair of component `c` and node `n` a
//! binary `x(c,n)`.  The rows are:
//!
//! - `demand`: `Σ λ(s,p) + σ(s) = 1` for every service, where `σ(s)` is the
//!   unrouted share of the demand, priced at the artificial penalty.  The
//!   equality keeps every fraction in `[0, 1]` without bound rows, whose
//!   duals would hide the price of the demand from pricing,
//! - `capacity`: `Σ t(p,l) T(s) λ(s,p) <= bandwidth(l)` for every physical
//!   link `l` some path traverses,
//! - `assignment`: `Σ a(p,c,n) T(s) λ(s,p) - T(s) x(c,n) <= 0` for every
//!   service, component and node, used by a path or not, so that pricing
//!   sees the price of opening a placement,
//! - `replica`: `Σ x(c,n) = replicas(c)` for every component,
//! - `node_capacity`: `Σ requirement(c,d) x(c,n) <= budget(n,d)` for every
//!   node and every resource dimension a component requires.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::solver::{Direction, LinearExpr, Model, Relation, SolveOutcome, SolveStatus, VarId};
use crate::{Error, LocationType, Objective, PlacementConfig, Service, SolverBackend, TopologyGraph};

/// Binary values above this are read as "placed".
const ON_THRESHOLD: f64 = 0.5;

/// The dual prices of the master rows that pricing needs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DualPrices {
    demand: Vec<f64>,
    capacity: Vec<f64>,
    assignment: HashMap<(usize, u64, u64), f64>,
}

impl DualPrices {
    /// The price of one more unit of demand of the service at
    /// `service_index`.
    pub fn demand(&self, service_index: usize) -> f64 {
        self.demand.get(service_index).copied().unwrap_or(0.0)
    }

    /// The price of one more unit of bandwidth on the physical link at
    /// `position`.  Non-positive.
    pub fn capacity(&self, position: usize) -> f64 {
        self.capacity.get(position).copied().unwrap_or(0.0)
    }

    /// The price of the assignment row of a service, component and node.
    /// Non-positive.
    pub fn assignment(&self, service_index: usize, component_id: u64, node_id: u64) -> f64 {
        self.assignment
            .get(&(service_index, component_id, node_id))
            .copied()
            .unwrap_or(0.0)
    }
}

/// A solved master problem.
#[derive(Clone, Debug)]
pub struct MasterSolution {
    objective: f64,
    penalty: f64,
    flows: Vec<Vec<f64>>,
    shortfall: Vec<f64>,
    placements: BTreeMap<u64, BTreeSet<u64>>,
    link_loads: Vec<f64>,
    duals: DualPrices,
}

impl MasterSolution {
    /// The objective value, including the penalty for unrouted demand.
    pub fn objective(&self) -> f64 {
        self.objective
    }

    /// The objective value without the penalty for unrouted demand.
    pub fn cost(&self) -> f64 {
        self.objective - self.penalty * self.total_shortfall()
    }

    /// The path fractions of the service at `service_index`, in catalog
    /// order.
    pub fn flows(&self, service_index: usize) -> &[f64] {
        self.flows.get(service_index).map_or(&[][..], |f| f.as_slice())
    }

    pub fn flow(&self, service_index: usize, path_index: usize) -> f64 {
        self.flows(service_index)
            .get(path_index)
            .copied()
            .unwrap_or(0.0)
    }

    /// The share of the service's demand that no path carries.
    pub fn shortfall(&self, service_index: usize) -> f64 {
        self.shortfall.get(service_index).copied().unwrap_or(0.0)
    }

    pub fn total_shortfall(&self) -> f64 {
        self.shortfall.iter().sum()
    }

    /// The nodes every component is placed on, by component id.
    pub fn placements(&self) -> &BTreeMap<u64, BTreeSet<u64>> {
        &self.placements
    }

    pub fn nodes_of(&self, component_id: u64) -> Option<&BTreeSet<u64>> {
        self.placements.get(&component_id)
    }

    /// The traffic carried by the physical link at `position`.
    pub fn link_load(&self, position: usize) -> f64 {
        self.link_loads.get(position).copied().unwrap_or(0.0)
    }

    pub fn duals(&self) -> &DualPrices {
        &self.duals
    }
}

/// Where the variables and rows of a built model live.
struct Layout {
    model: Model,
    flows: Vec<Vec<VarId>>,
    shortfall: Vec<Option<VarId>>,
    placements: Vec<(u64, u64, VarId)>,
    demand_rows: Vec<usize>,
    capacity_rows: Vec<(usize, usize)>,
    assignment_rows: Vec<((usize, u64, u64), usize)>,
}

/// The restricted master problem of a set of services over a topology.
pub struct MasterProblem<'a> {
    topology: &'a TopologyGraph,
    services: &'a [Service],
    config: &'a PlacementConfig,
}

impl<'a> MasterProblem<'a> {
    /// Creates a master problem.
    ///
    /// Returns an error if a service has no paths yet.
    pub fn new(
        topology: &'a TopologyGraph,
        services: &'a [Service],
        config: &'a PlacementConfig,
    ) -> Result<Self, Error> {
        if let Some(service) = services.iter().find(|s| s.catalog().is_empty()) {
            return Err(Error::invalid_model(format!(
                "Service {} has no paths to choose from.",
                service.description()
            )));
        }
        Ok(Self {
            topology,
            services,
            config,
        })
    }

    /// Builds the model.  Without shortfall variables, every service has to
    /// be fully routed over its current paths.
    pub fn build(&self, with_shortfall: bool) -> Result<Model, Error> {
        Ok(self.layout(with_shortfall)?.model)
    }

    fn layout(&self, with_shortfall: bool) -> Result<Layout, Error> {
        let mut model = Model::new();
        let mut objective = LinearExpr::new();
        let nodes = self.topology.locations_by_type(LocationType::Node);

        let mut flows = Vec::with_capacity(self.services.len());
        let mut shortfall = Vec::with_capacity(self.services.len());
        for (s, service) in self.services.iter().enumerate() {
            let mut vars = Vec::with_capacity(service.catalog().len());
            for (p, path) in service.catalog().iter().enumerate() {
                let var = model.add_continuous_var(
                    0.0,
                    f64::INFINITY,
                    format!("flow[{s}:{}/{p}:{}]", service.description(), path.name()),
                )?;
                if self.config.objective == Objective::PathCost {
                    objective.add(var, path.hops() * service.required_throughput());
                }
                vars.push(var);
            }
            flows.push(vars);

            shortfall.push(if with_shortfall {
                let var = model.add_continuous_var(
                    0.0,
                    f64::INFINITY,
                    format!("shortfall[{s}:{}]", service.description()),
                )?;
                objective.add(var, self.config.artificial_penalty);
                Some(var)
            } else {
                None
            });
        }

        let mut placements = Vec::new();
        for component in self.services.iter().flat_map(|s| s.components()) {
            for node in &nodes {
                let var = model.add_binary_var(format!(
                    "place[{}:{}@{}:{}]",
                    component.id(),
                    component.description(),
                    node.id(),
                    node.description()
                ))?;
                if self.config.objective == Objective::NodeCost {
                    let cost = node.resources().map_or(0.0, |r| r.cost());
                    objective.add(var, cost);
                }
                placements.push((component.id(), node.id(), var));
            }
        }
        let placement_var = |component_id: u64, node_id: u64| {
            placements
                .iter()
                .find(|(c, n, _)| *c == component_id && *n == node_id)
                .map(|(_, _, v)| *v)
        };

        let mut demand_rows = Vec::with_capacity(self.services.len());
        for (s, service) in self.services.iter().enumerate() {
            let mut expr = flows[s].iter().map(|v| (*v, 1.0)).collect::<LinearExpr>();
            if let Some(var) = shortfall[s] {
                expr.add(var, 1.0);
            }
            demand_rows.push(model.constraints().len());
            model.add_linear_constraint(
                expr,
                Relation::Equal,
                1.0,
                format!("demand[{s}:{}]", service.description()),
            )?;
        }

        let mut capacity_rows = Vec::new();
        for (position, link) in self.topology.links().enumerate() {
            let mut expr = LinearExpr::new();
            for (s, service) in self.services.iter().enumerate() {
                for (p, path) in service.catalog().iter().enumerate() {
                    let t = path.traversal(position);
                    if t > 0 {
                        expr.add(flows[s][p], f64::from(t) * service.required_throughput());
                    }
                }
            }
            if expr.is_empty() || !link.bandwidth().is_finite() {
                continue;
            }
            capacity_rows.push((position, model.constraints().len()));
            model.add_linear_constraint(
                expr,
                Relation::LessEq,
                link.bandwidth(),
                format!("capacity[{position}:{}->{}]", link.source(), link.sink()),
            )?;
        }

        let mut assignment_rows = Vec::new();
        for (s, service) in self.services.iter().enumerate() {
            let throughput = service.required_throughput();
            for component in service.components() {
                for node in &nodes {
                    let mut expr = LinearExpr::new();
                    for (p, path) in service.catalog().iter().enumerate() {
                        if path.assignment(component.id(), node.id()) == 1 {
                            expr.add(flows[s][p], throughput);
                        }
                    }
                    let x = placement_var(component.id(), node.id()).ok_or_else(|| {
                        Error::internal(format!(
                            "No placement variable for component {} on node {}.",
                            component.id(),
                            node.id()
                        ))
                    })?;
                    expr.add(x, -throughput);
                    assignment_rows.push(((s, component.id(), node.id()), model.constraints().len()));
                    model.add_linear_constraint(
                        expr,
                        Relation::LessEq,
                        0.0,
                        format!(
                            "assignment[{s}:{}/{}:{}@{}:{}]",
                            service.description(),
                            component.id(),
                            component.description(),
                            node.id(),
                            node.description()
                        ),
                    )?;
                }
            }
        }

        for component in self.services.iter().flat_map(|s| s.components()) {
            let expr = placements
                .iter()
                .filter(|(c, _, _)| *c == component.id())
                .map(|(_, _, v)| (*v, 1.0))
                .collect::<LinearExpr>();
            model.add_linear_constraint(
                expr,
                Relation::Equal,
                f64::from(component.replica_count()),
                format!("replica[{}:{}]", component.id(), component.description()),
            )?;
        }

        let dimensions = self
            .services
            .iter()
            .flat_map(|s| s.components())
            .flat_map(|c| c.requirements().keys())
            .collect::<BTreeSet<_>>();
        for node in &nodes {
            let budget = node.resources();
            for dimension in &dimensions {
                let expr = self
                    .services
                    .iter()
                    .flat_map(|s| s.components())
                    .filter(|c| c.requirement(dimension) != 0.0)
                    .filter_map(|c| {
                        placement_var(c.id(), node.id()).map(|v| (v, c.requirement(dimension)))
                    })
                    .collect::<LinearExpr>();
                if expr.is_empty() {
                    continue;
                }
                model.add_linear_constraint(
                    expr,
                    Relation::LessEq,
                    budget.map_or(0.0, |r| r.get(dimension)),
                    format!("node_capacity[{}:{}.{dimension}]", node.id(), node.description()),
                )?;
            }
        }

        model.set_objective(objective, Direction::Minimize)?;

        Ok(Layout {
            model,
            flows,
            shortfall,
            placements,
            demand_rows,
            capacity_rows,
            assignment_rows,
        })
    }

    /// Solves the master problem with shortfall variables.
    ///
    /// Returns a `MasterInfeasible` error carrying an irreducible infeasible
    /// subsystem if the model has no solution.
    pub fn solve<B: SolverBackend + ?Sized>(&self, backend: &B) -> Result<MasterSolution, Error> {
        let layout = self.layout(true)?;
        let outcome = backend.solve(&layout.model)?;
        match outcome.status() {
            SolveStatus::Optimal => Ok(self.read_solution(&layout, &outcome)),
            SolveStatus::Unbounded => Err(Error::solver("Master problem is unbounded.")),
            SolveStatus::Infeasible => {
                let conflict = backend.explain_infeasibility(&layout.model)?;
                tracing::warn!("Master problem is infeasible: {:?}", conflict);
                Err(Error::master_infeasible("Master problem is infeasible.").with_conflict(conflict))
            }
        }
    }

    /// Returns an irreducible infeasible subsystem of the model that has to
    /// route every service fully over its current paths.  Empty if that
    /// model is feasible.
    pub fn explain_infeasibility<B: SolverBackend + ?Sized>(
        &self,
        backend: &B,
    ) -> Result<BTreeSet<String>, Error> {
        backend.explain_infeasibility(&self.layout(false)?.model)
    }

    fn read_solution(&self, layout: &Layout, outcome: &SolveOutcome) -> MasterSolution {
        let flows = layout
            .flows
            .iter()
            .map(|vars| vars.iter().map(|v| outcome.value(*v)).collect::<Vec<_>>())
            .collect::<Vec<_>>();
        let shortfall = layout
            .shortfall
            .iter()
            .map(|v| v.map_or(0.0, |v| outcome.value(v)))
            .collect();

        let mut placements = BTreeMap::<u64, BTreeSet<u64>>::new();
        for (component, node, var) in &layout.placements {
            if outcome.value(*var) > ON_THRESHOLD {
                placements.entry(*component).or_default().insert(*node);
            }
        }

        let link_loads = (0..self.topology.link_count())
            .map(|position| {
                self.services
                    .iter()
                    .zip(&flows)
                    .map(|(service, service_flows)| {
                        service
                            .catalog()
                            .iter()
                            .zip(service_flows)
                            .map(|(path, flow)| {
                                f64::from(path.traversal(position))
                                    * service.required_throughput()
                                    * flow
                            })
                            .sum::<f64>()
                    })
                    .sum()
            })
            .collect();

        let mut capacity = vec![0.0; self.topology.link_count()];
        for (position, row) in &layout.capacity_rows {
            capacity[*position] = outcome.dual(*row);
        }
        let duals = DualPrices {
            demand: layout.demand_rows.iter().map(|r| outcome.dual(*r)).collect(),
            capacity,
            assignment: layout
                .assignment_rows
                .iter()
                .map(|(key, row)| (*key, outcome.dual(*row)))
                .collect(),
        };

        MasterSolution {
            objective: outcome.objective(),
            penalty: self.config.artificial_penalty,
            flows,
            shortfall,
            placements,
            link_loads,
            duals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::test_utils::{service_with_replicas, TopologyBuilder};
    use crate::{Component, IdAllocator, MicroLpBackend, PricingSolver};

    const TOLERANCE: f64 = 1e-6;

    /// Gives every service one path from pricing without duals.
    fn seed(
        topology: &TopologyGraph,
        services: &mut [Service],
        ids: &mut IdAllocator,
        config: &PlacementConfig,
    ) -> Result<(), Error> {
        let pricer = PricingSolver::new(topology, config);
        for (i, service) in services.iter_mut().enumerate() {
            service.add_graph(topology, ids)?;
            pricer.improve(i, service, None)?;
        }
        Ok(())
    }

    #[test]
    fn test_needs_paths() -> Result<(), Error> {
        let (topology, mut ids) = TopologyBuilder::tiny()?;
        let services = vec![service_with_replicas(&mut ids, "web", &[1], 1.0)?];
        let config = PlacementConfig::default();

        assert!(MasterProblem::new(&topology, &services, &config).is_err_and(|e| e
            == Error::invalid_model("Service web has no paths to choose from.")));

        Ok(())
    }

    #[test]
    fn test_model_rows() -> Result<(), Error> {
        let (topology, mut ids) = TopologyBuilder::tiny()?;
        let mut services = vec![service_with_replicas(&mut ids, "web", &[1], 1.0)?];
        let config = PlacementConfig::default();
        seed(&topology, &mut services, &mut ids, &config)?;

        let master = MasterProblem::new(&topology, &services, &config)?;
        let model = master.build(true)?;
        let names = model
            .constraints()
            .iter()
            .map(|c| c.name().split('[').next().unwrap_or_default().to_string())
            .collect::<Vec<_>>();
        // one demand row, two used links, one assignment row, one replica
        // row and one row per resource dimension of Node1.
        assert_eq!(
            names,
            [
                "demand",
                "capacity",
                "capacity",
                "assignment",
                "replica",
                "node_capacity",
                "node_capacity"
            ]
        );
        assert_eq!(model.variables().len(), 3);
        assert_eq!(master.build(false)?.variables().len(), 2);

        Ok(())
    }

    #[test]
    fn test_unused_placements_are_priced() -> Result<(), Error> {
        // the first path places the component on Node1, which costs 3.
        // Node2 costs 2 and has no path yet.
        let (topology, mut ids) = TopologyBuilder::reference()?;
        let mut services = vec![service_with_replicas(&mut ids, "web", &[1], 1.0)?];
        let config = PlacementConfig::default();
        seed(&topology, &mut services, &mut ids, &config)?;

        let master = MasterProblem::new(&topology, &services, &config)?;
        let assignments = master
            .build(true)?
            .constraints()
            .iter()
            .filter(|c| c.name().starts_with("assignment["))
            .count();
        assert_eq!(assignments, 2);

        let solution = master.solve(&MicroLpBackend)?;
        assert!((solution.cost() - 3.0).abs() < TOLERANCE);
        // moving the demand to Node2 saves at least the difference in cost.
        assert!(solution.duals().demand(0) >= 1.0 - TOLERANCE);

        Ok(())
    }

    #[test]
    fn test_capacity_and_replicas() -> Result<(), Error> {
        let (topology, mut ids) = TopologyBuilder::reference()?;
        let mut services = vec![
            service_with_replicas(&mut ids, "web", &[2, 1], 1.0)?,
            service_with_replicas(&mut ids, "db", &[1], 1.0)?,
        ];
        let config = PlacementConfig::default();
        seed(&topology, &mut services, &mut ids, &config)?;

        let master = MasterProblem::new(&topology, &services, &config)?;
        let solution = master.solve(&MicroLpBackend)?;

        for (position, link) in topology.links().enumerate() {
            assert!(solution.link_load(position) <= link.bandwidth() + TOLERANCE);
        }
        for component in services.iter().flat_map(|s| s.components()) {
            let placed = solution.nodes_of(component.id()).map_or(0, |n| n.len());
            assert_eq!(placed, component.replica_count() as usize);
        }
        for (s, service) in services.iter().enumerate() {
            let routed = solution.flows(s).iter().sum::<f64>() + solution.shortfall(s);
            assert!(routed >= 1.0 - TOLERANCE);
            assert_eq!(solution.flows(s).len(), service.catalog().len());
        }
        assert!(solution.total_shortfall() < TOLERANCE);
        assert!(solution.duals().demand(0) >= -TOLERANCE);

        Ok(())
    }

    #[test]
    fn test_infeasible_replicas() -> Result<(), Error> {
        let (topology, mut ids) = TopologyBuilder::reference()?;
        // Node2 has only two cpus, so two replicas needing three cpus can't
        // be placed.
        let heavy = Component::try_new(&mut ids, "heavy", [("cpu", 3.0)], 2)?;
        let heavy_id = heavy.id();
        let mut services = vec![Service::try_new("batch", vec![heavy], 1.0, 100.0)?];
        let config = PlacementConfig::default();
        seed(&topology, &mut services, &mut ids, &config)?;

        let master = MasterProblem::new(&topology, &services, &config)?;
        let err = master
            .solve(&MicroLpBackend)
            .err()
            .ok_or_else(|| Error::internal("expected an infeasible master problem"))?;

        assert_eq!(err.kind(), crate::ErrorKind::MasterInfeasible);
        assert_eq!(
            err.conflict(),
            [
                "node_capacity[5:Node2.cpu]".to_string(),
                format!("replica[{heavy_id}:heavy]"),
            ]
        );

        Ok(())
    }
}
