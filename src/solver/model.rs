// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! A declarative linear model, independent of any solver.

use std::collections::HashSet;
use std::fmt::Display;

use crate::Error;

/// Handle of a variable in a [`Model`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    /// Returns the position of the variable in [`Model::variables`].
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarKind {
    Continuous,
    Binary,
}

/// A variable with its bounds.  Binary variables have bounds `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct VariableDef {
    name: String,
    kind: VarKind,
    lower: f64,
    upper: f64,
}

impl VariableDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> VarKind {
        self.kind
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }
}

/// A sum of `coefficient * variable` terms.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LinearExpr {
    terms: Vec<(VarId, f64)>,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `coefficient * var` to the expression.
    pub fn add(&mut self, var: VarId, coefficient: f64) {
        self.terms.push((var, coefficient));
    }

    /// Builder form of [`add`][Self::add].
    pub fn with(mut self, var: VarId, coefficient: f64) -> Self {
        self.add(var, coefficient);
        self
    }

    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Evaluates the expression for the given variable values.
    pub fn value(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(v, c)| c * values.get(v.index()).copied().unwrap_or(0.0))
            .sum()
    }
}

impl FromIterator<(VarId, f64)> for LinearExpr {
    fn from_iter<T: IntoIterator<Item = (VarId, f64)>>(iter: T) -> Self {
        Self {
            terms: iter.into_iter().collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Relation {
    LessEq,
    GreaterEq,
    Equal,
}

impl Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Relation::LessEq => write!(f, "<="),
            Relation::GreaterEq => write!(f, ">="),
            Relation::Equal => write!(f, "="),
        }
    }
}

/// A named `expr relation rhs` row of a [`Model`].
#[derive(Clone, Debug, PartialEq)]
pub struct LinearConstraint {
    name: String,
    expr: LinearExpr,
    relation: Relation,
    rhs: f64,
}

impl LinearConstraint {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expr(&self) -> &LinearExpr {
        &self.expr
    }

    pub fn relation(&self) -> Relation {
        self.relation
    }

    pub fn rhs(&self) -> f64 {
        self.rhs
    }

    /// Returns true if the given values satisfy the row within `tolerance`.
    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        let lhs = self.expr.value(values);
        match self.relation {
            Relation::LessEq => lhs <= self.rhs + tolerance,
            Relation::GreaterEq => lhs >= self.rhs - tolerance,
            Relation::Equal => (lhs - self.rhs).abs() <= tolerance,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Minimize,
    Maximize,
}

/// A mixed integer linear model with named variables and constraints.
///
/// Constraint duals reported by a [`SolverBackend`][crate::SolverBackend]
/// are indexed like [`constraints`][Model::constraints].
#[derive(Clone, Debug, Default)]
pub struct Model {
    variables: Vec<VariableDef>,
    constraints: Vec<LinearConstraint>,
    objective: LinearExpr,
    direction: Direction,
    variable_names: HashSet<String>,
    constraint_names: HashSet<String>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a continuous variable with the given bounds.  Infinite bounds are
    /// allowed.
    ///
    /// Returns an error if the bounds are empty or the name is taken.
    pub fn add_continuous_var(
        &mut self,
        lower: f64,
        upper: f64,
        name: impl Into<String>,
    ) -> Result<VarId, Error> {
        let name = name.into();
        if lower.is_nan() || upper.is_nan() || lower > upper {
            return Err(Error::invalid_model(format!(
                "Variable {name} has empty bounds [{lower}, {upper}]."
            )));
        }
        self.push_variable(VariableDef {
            name,
            kind: VarKind::Continuous,
            lower,
            upper,
        })
    }

    /// Adds a `{0, 1}` variable.
    ///
    /// Returns an error if the name is taken.
    pub fn add_binary_var(&mut self, name: impl Into<String>) -> Result<VarId, Error> {
        self.push_variable(VariableDef {
            name: name.into(),
            kind: VarKind::Binary,
            lower: 0.0,
            upper: 1.0,
        })
    }

    fn push_variable(&mut self, def: VariableDef) -> Result<VarId, Error> {
        if !self.variable_names.insert(def.name.clone()) {
            return Err(Error::invalid_model(format!(
                "Variable {} is defined more than once.",
                def.name
            )));
        }
        self.variables.push(def);
        Ok(VarId(self.variables.len() - 1))
    }

    /// Adds the row `expr relation rhs`.
    ///
    /// Returns an error if the name is taken, or if the expression refers to
    /// a variable of another model.
    pub fn add_linear_constraint(
        &mut self,
        expr: LinearExpr,
        relation: Relation,
        rhs: f64,
        name: impl Into<String>,
    ) -> Result<(), Error> {
        let name = name.into();
        self.check_expr(&expr, &name)?;
        if !self.constraint_names.insert(name.clone()) {
            return Err(Error::invalid_model(format!(
                "Constraint {name} is defined more than once."
            )));
        }
        self.constraints.push(LinearConstraint {
            name,
            expr,
            relation,
            rhs,
        });
        Ok(())
    }

    /// Sets the objective and the optimisation direction.
    pub fn set_objective(&mut self, expr: LinearExpr, direction: Direction) -> Result<(), Error> {
        self.check_expr(&expr, "objective")?;
        self.objective = expr;
        self.direction = direction;
        Ok(())
    }

    fn check_expr(&self, expr: &LinearExpr, name: &str) -> Result<(), Error> {
        if let Some((var, _)) = expr
            .terms()
            .iter()
            .find(|(v, _)| v.index() >= self.variables.len())
        {
            return Err(Error::invalid_model(format!(
                "{name} refers to unknown variable {}.",
                var.index()
            )));
        }
        Ok(())
    }

    pub fn variables(&self) -> &[VariableDef] {
        &self.variables
    }

    pub fn variable(&self, var: VarId) -> Option<&VariableDef> {
        self.variables.get(var.index())
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    pub fn objective(&self) -> &LinearExpr {
        &self.objective
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns a copy of the model without objective, keeping only the
    /// constraints at the positions for which `keep` returns true.
    pub(crate) fn feasibility_subset(&self, keep: impl Fn(usize) -> bool) -> Model {
        let constraints = self
            .constraints
            .iter()
            .enumerate()
            .filter(|(i, _)| keep(*i))
            .map(|(_, c)| c.clone())
            .collect::<Vec<_>>();
        Model {
            variables: self.variables.clone(),
            constraint_names: constraints.iter().map(|c| c.name.clone()).collect(),
            constraints,
            objective: LinearExpr::new(),
            direction: Direction::Minimize,
            variable_names: self.variable_names.clone(),
        }
    }

    fn write_expr(&self, f: &mut std::fmt::Formatter<'_>, expr: &LinearExpr) -> std::fmt::Result {
        if expr.is_empty() {
            return write!(f, "0");
        }
        for (i, (var, coefficient)) in expr.terms().iter().enumerate() {
            let name = self.variables[var.index()].name();
            match (i, *coefficient < 0.0) {
                (0, false) => write!(f, "{coefficient} {name}")?,
                (0, true) => write!(f, "- {} {name}", -coefficient)?,
                (_, false) => write!(f, " + {coefficient} {name}")?,
                (_, true) => write!(f, " - {} {name}", -coefficient)?,
            }
        }
        Ok(())
    }
}

/// An LP-like text dump of the model.
impl Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.direction {
            Direction::Minimize => writeln!(f, "minimize")?,
            Direction::Maximize => writeln!(f, "maximize")?,
        }
        write!(f, "  obj: ")?;
        self.write_expr(f, &self.objective)?;
        writeln!(f)?;

        writeln!(f, "subject to")?;
        for constraint in &self.constraints {
            write!(f, "  {}: ", constraint.name)?;
            self.write_expr(f, &constraint.expr)?;
            writeln!(f, " {} {}", constraint.relation, constraint.rhs)?;
        }

        writeln!(f, "bounds")?;
        for var in self.variables.iter().filter(|v| v.kind == VarKind::Continuous) {
            writeln!(f, "  {} <= {} <= {}", var.lower, var.name, var.upper)?;
        }

        let binaries = self
            .variables
            .iter()
            .filter(|v| v.kind == VarKind::Binary)
            .map(|v| v.name.as_str())
            .collect::<Vec<_>>();
        if !binaries.is_empty() {
            writeln!(f, "binary")?;
            writeln!(f, "  {}", binaries.join(" "))?;
        }
        write!(f, "end")
    }
}
