// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! The seam between the master problem and the linear programming solver.

mod infeasibility;
mod microlp_backend;
mod model;

pub use microlp_backend::MicroLpBackend;
pub use model::{
    Direction, LinearConstraint, LinearExpr, Model, Relation, VarId, VarKind, VariableDef,
};

use std::collections::BTreeSet;

use crate::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
}

/// The result of solving a [`Model`].
///
/// `values` is indexed like [`Model::variables`] and `duals` like
/// [`Model::constraints`].  Both are empty unless the status is
/// [`SolveStatus::Optimal`].
#[derive(Clone, Debug, PartialEq)]
pub struct SolveOutcome {
    status: SolveStatus,
    objective: f64,
    values: Vec<f64>,
    duals: Vec<f64>,
}

impl SolveOutcome {
    pub fn optimal(objective: f64, values: Vec<f64>, duals: Vec<f64>) -> Self {
        Self {
            status: SolveStatus::Optimal,
            objective,
            values,
            duals,
        }
    }

    pub fn infeasible() -> Self {
        Self::without_solution(SolveStatus::Infeasible)
    }

    pub fn unbounded() -> Self {
        Self::without_solution(SolveStatus::Unbounded)
    }

    fn without_solution(status: SolveStatus) -> Self {
        Self {
            status,
            objective: f64::NAN,
            values: Vec::new(),
            duals: Vec::new(),
        }
    }

    pub fn status(&self) -> SolveStatus {
        self.status
    }

    pub fn objective(&self) -> f64 {
        self.objective
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Returns the value of the given variable, `0` without a solution.
    pub fn value(&self, var: VarId) -> f64 {
        self.values.get(var.index()).copied().unwrap_or(0.0)
    }

    pub fn duals(&self) -> &[f64] {
        &self.duals
    }

    /// Returns the dual price of the constraint at `position`, `0` without a
    /// solution.
    pub fn dual(&self, position: usize) -> f64 {
        self.duals.get(position).copied().unwrap_or(0.0)
    }
}

/// A solver that can optimise a [`Model`].
///
/// For a model with binary variables, the reported duals are those of its
/// linear relaxation, with every binary variable in `[0, 1]`.  Duals follow the sign convention of a minimisation: non-negative
/// for `>=` rows and non-positive for `<=` rows.
pub trait SolverBackend {
    fn solve(&self, model: &Model) -> Result<SolveOutcome, Error>;

    /// Returns whether the model has a feasible solution.  Backends that
    /// compute duals as a separate step should skip it here.
    fn is_feasible(&self, model: &Model) -> Result<bool, Error> {
        Ok(self.solve(model)?.status() != SolveStatus::Infeasible)
    }

    /// Returns the names of an irreducible infeasible subset of the model's
    /// constraints.  Empty if the model is feasible.
    fn explain_infeasibility(&self, model: &Model) -> Result<BTreeSet<String>, Error> {
        infeasibility::deletion_filter(self, model)
    }
}
