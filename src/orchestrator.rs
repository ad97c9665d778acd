// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! The column generation loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use crate::{
    DualPrices, Error, ErrorKind, IdAllocator, MasterProblem, MasterSolution, PlacementConfig,
    PricingOutcome, PricingSolver, Service, SolverBackend, TopologyGraph,
};

/// Where the loop is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlacementState {
    /// Services are being priced for new paths.
    NeedsColumns,
    /// The master problem is being solved.
    Solving,
    /// No service has an improving path left.
    Converged,
    /// The services can't be placed.
    Infeasible,
}

/// Why the loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    NoImprovingColumn,
    IterationLimit,
    TimeLimit,
    Cancelled,
}

/// Stops a running [`Orchestrator`] before its next round.  Clones share the
/// same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The result of a completed or stopped loop.
#[derive(Clone, Debug)]
pub struct PlacementOutcome {
    solution: MasterSolution,
    termination: Termination,
    rounds: usize,
    objective_history: Vec<f64>,
}

impl PlacementOutcome {
    /// The last master solution.
    pub fn solution(&self) -> &MasterSolution {
        &self.solution
    }

    pub fn termination(&self) -> Termination {
        self.termination
    }

    /// The number of master solves.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// The master objective after every round.
    pub fn objective_history(&self) -> &[f64] {
        &self.objective_history
    }
}

/// Alternates master solves and pricing rounds until no service has an
/// improving path.
pub struct Orchestrator<B: SolverBackend> {
    topology: TopologyGraph,
    services: Vec<Service>,
    backend: B,
    config: PlacementConfig,
    state: PlacementState,
    cancel: CancelHandle,
}

impl<B: SolverBackend> Orchestrator<B> {
    /// Creates an orchestrator, building the service graph over `topology`
    /// of every service that doesn't have one yet.
    pub fn try_new(
        topology: TopologyGraph,
        mut services: Vec<Service>,
        backend: B,
        config: PlacementConfig,
        ids: &mut IdAllocator,
    ) -> Result<Self, Error> {
        if services.is_empty() {
            return Err(Error::invalid_service("There are no services to place."));
        }
        for service in &mut services {
            if service.graph(topology.name()).is_none() {
                service.add_graph(&topology, ids)?;
            }
        }

        Ok(Self {
            topology,
            services,
            backend,
            config,
            state: PlacementState::NeedsColumns,
            cancel: CancelHandle::default(),
        })
    }

    pub fn state(&self) -> PlacementState {
        self.state
    }

    pub fn topology(&self) -> &TopologyGraph {
        &self.topology
    }

    /// The services, with the paths generated so far.
    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// Returns a handle for stopping [`run`][Self::run] from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Runs the loop until convergence, a budget is exhausted, or it is
    /// cancelled.  Budgets and cancellation are checked between rounds.
    ///
    /// Returns a `MasterInfeasible` error if the services can't be placed,
    /// and a `NoFeasiblePath` error if a service can't be routed at all.
    pub fn run(&mut self) -> Result<PlacementOutcome, Error> {
        let started = Instant::now();
        let mut history = Vec::new();
        let mut last = None;

        self.state = PlacementState::NeedsColumns;
        let seeded = self.price_round(None)?;
        tracing::debug!("Seeded {seeded} services with a first path.");

        let termination = loop {
            if self.cancel.is_cancelled() {
                break Termination::Cancelled;
            }
            if history.len() >= self.config.max_iterations {
                break Termination::IterationLimit;
            }
            if self
                .config
                .time_budget
                .is_some_and(|budget| started.elapsed() >= budget)
            {
                break Termination::TimeLimit;
            }

            self.state = PlacementState::Solving;
            let solved = MasterProblem::new(&self.topology, &self.services, &self.config)
                .and_then(|master| master.solve(&self.backend));
            let solution = match solved {
                Ok(solution) => solution,
                Err(err) => {
                    if err.kind() == ErrorKind::MasterInfeasible {
                        self.state = PlacementState::Infeasible;
                    }
                    return Err(err);
                }
            };
            history.push(solution.objective());
            tracing::info!(
                "Round {}: objective {}, shortfall {}.",
                history.len(),
                solution.objective(),
                solution.total_shortfall()
            );

            self.state = PlacementState::NeedsColumns;
            let added = self.price_round(Some(solution.duals()))?;
            last = Some(solution);
            if added == 0 {
                break Termination::NoImprovingColumn;
            }
        };

        let Some(solution) = last else {
            return Err(Error::cancelled(format!(
                "Stopped with {termination:?} before the first master solve."
            )));
        };

        if termination == Termination::NoImprovingColumn {
            if solution.total_shortfall() > self.config.reduced_cost_tolerance {
                self.state = PlacementState::Infeasible;
                let conflict = MasterProblem::new(&self.topology, &self.services, &self.config)?
                    .explain_infeasibility(&self.backend)?;
                return Err(Error::master_infeasible(format!(
                    "No path left to route a shortfall of {} across services.",
                    solution.total_shortfall()
                ))
                .with_conflict(conflict));
            }
            self.state = PlacementState::Converged;
            tracing::info!(
                "Converged after {} rounds with cost {}.",
                history.len(),
                solution.cost()
            );
        } else {
            tracing::warn!(
                "Stopped with {termination:?} after {} rounds, shortfall {}.",
                history.len(),
                solution.total_shortfall()
            );
        }

        Ok(PlacementOutcome {
            solution,
            termination,
            rounds: history.len(),
            objective_history: history,
        })
    }

    /// Prices every service against `duals` and returns the number of paths
    /// added.  Without duals, only services with an empty catalog are
    /// priced.
    fn price_round(&mut self, duals: Option<&DualPrices>) -> Result<usize, Error> {
        let pricer = PricingSolver::new(&self.topology, &self.config);
        let price = |(index, service): (usize, &mut Service)| -> Result<PricingOutcome, Error> {
            if duals.is_none() && !service.catalog().is_empty() {
                return Ok(PricingOutcome::skipped());
            }
            pricer.improve(index, service, duals)
        };

        let outcomes = if self.config.parallel_pricing {
            self.services
                .par_iter_mut()
                .enumerate()
                .map(price)
                .collect::<Result<Vec<_>, _>>()?
        } else {
            self.services
                .iter_mut()
                .enumerate()
                .map(price)
                .collect::<Result<Vec<_>, _>>()?
        };

        let best = outcomes
            .iter()
            .filter_map(|o| o.reduced_cost())
            .fold(f64::INFINITY, f64::min);
        let added = outcomes.iter().filter(|o| o.added()).count();
        tracing::debug!("Pricing added {added} paths, best reduced cost {best}.");
        Ok(added)
    }
}
