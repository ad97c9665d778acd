// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! A [`SolverBackend`] on top of `good_lp`'s pure rust `microlp` solver.

use good_lp::{
    constraint, microlp, variable, Expression, ProblemVariables, ResolutionError, Solution,
    SolverModel, Variable,
};

use super::{
    Direction, LinearExpr, Model, Relation, SolveOutcome, SolverBackend, VarKind, VariableDef,
};
use crate::Error;

/// Solves models with microlp.
///
/// microlp doesn't report dual values, so they are computed by solving the
/// dual of the model's linear relaxation as a second linear program.
#[derive(Clone, Copy, Debug, Default)]
pub struct MicroLpBackend;

enum Primal {
    Solved(Vec<f64>),
    Infeasible,
    Unbounded,
}

impl SolverBackend for MicroLpBackend {
    fn solve(&self, model: &Model) -> Result<SolveOutcome, Error> {
        let values = match run(model)? {
            Primal::Solved(values) => values,
            Primal::Infeasible => return Ok(SolveOutcome::infeasible()),
            Primal::Unbounded => return Ok(SolveOutcome::unbounded()),
        };
        let objective = model.objective().value(&values);
        let duals = dual_prices(model)?;

        tracing::debug!(
            "Solved model with {} variables and {} constraints, objective {objective}.",
            model.variables().len(),
            model.constraints().len()
        );
        Ok(SolveOutcome::optimal(objective, values, duals))
    }

    fn is_feasible(&self, model: &Model) -> Result<bool, Error> {
        Ok(!matches!(run(model)?, Primal::Infeasible))
    }
}

/// A model variable as microlp sees it: `sign * main - negative`.  microlp
/// doesn't terminate on variables without a finite lower bound, so a
/// variable bounded only from above is negated and a free variable is split
/// into two non-negative parts.
#[derive(Clone, Copy)]
struct Handle {
    main: Variable,
    sign: f64,
    negative: Option<Variable>,
}

impl Handle {
    fn new(vars: &mut ProblemVariables, def: &VariableDef) -> Self {
        let name = def.name();
        let (main, sign, negative) = match def.kind() {
            VarKind::Binary => (vars.add(variable().name(name).binary()), 1.0, None),
            VarKind::Continuous if def.lower().is_finite() => {
                let mut definition = variable().name(name).min(def.lower());
                if def.upper().is_finite() {
                    definition = definition.max(def.upper());
                }
                (vars.add(definition), 1.0, None)
            }
            VarKind::Continuous if def.upper().is_finite() => (
                vars.add(variable().name(format!("{name}-")).min(-def.upper())),
                -1.0,
                None,
            ),
            VarKind::Continuous => (
                vars.add(variable().name(format!("{name}+")).min(0.0)),
                1.0,
                Some(vars.add(variable().name(format!("{name}-")).min(0.0))),
            ),
        };
        Self {
            main,
            sign,
            negative,
        }
    }

    fn add_to(&self, expr: &mut Expression, coefficient: f64) {
        expr.add_mul(self.sign * coefficient, self.main);
        if let Some(negative) = self.negative {
            expr.add_mul(-coefficient, negative);
        }
    }

    fn value(&self, solution: &impl Solution) -> f64 {
        self.sign * solution.value(self.main) - self.negative.map_or(0.0, |v| solution.value(v))
    }
}

/// Solves the model with microlp.
fn run(model: &Model) -> Result<Primal, Error> {
    let mut vars = ProblemVariables::new();
    let handles = model
        .variables()
        .iter()
        .map(|def| Handle::new(&mut vars, def))
        .collect::<Vec<_>>();

    let objective = to_expression(model.objective(), &handles);
    let mut problem = match model.direction() {
        Direction::Minimize => vars.minimise(objective),
        Direction::Maximize => vars.maximise(objective),
    }
    .using(microlp);

    for row in model.constraints() {
        let lhs = to_expression(row.expr(), &handles);
        problem = problem.with(match row.relation() {
            Relation::LessEq => constraint::leq(lhs, row.rhs()),
            Relation::GreaterEq => constraint::geq(lhs, row.rhs()),
            Relation::Equal => constraint::eq(lhs, row.rhs()),
        });
    }

    match problem.solve() {
        Ok(solution) => Ok(Primal::Solved(
            handles.iter().map(|h| h.value(&solution)).collect(),
        )),
        Err(ResolutionError::Infeasible) => Ok(Primal::Infeasible),
        Err(ResolutionError::Unbounded) => Ok(Primal::Unbounded),
        Err(err) => Err(Error::solver(format!("microlp failed: {err}"))),
    }
}

fn to_expression(expr: &LinearExpr, handles: &[Handle]) -> Expression {
    let mut out = Expression::with_capacity(expr.terms().len());
    for (var, coefficient) in expr.terms() {
        handles[var.index()].add_to(&mut out, *coefficient);
    }
    out
}

/// A row of the model in the form solved for its dual: the model's own
/// constraints first, then one row per finite variable bound, with binary
/// variables relaxed to `[0, 1]`.
struct Row {
    name: String,
    terms: Vec<(usize, f64)>,
    relation: Relation,
    rhs: f64,
}

/// Solves the dual of the model's linear relaxation and returns one price
/// per model constraint.
///
/// With every bound written as a row, the relaxation is `min c x` over free
/// `x`, so its dual is `max b y` subject to `A' y = c`, with `y >= 0` for
/// `>=` rows, `y <= 0` for `<=` rows and free `y` for `=` rows.
fn dual_prices(model: &Model) -> Result<Vec<f64>, Error> {
    let sign = match model.direction() {
        Direction::Minimize => 1.0,
        Direction::Maximize => -1.0,
    };

    let mut rows = model
        .constraints()
        .iter()
        .map(|c| Row {
            name: c.name().to_string(),
            terms: c.expr().terms().iter().map(|(v, a)| (v.index(), *a)).collect(),
            relation: c.relation(),
            rhs: c.rhs(),
        })
        .collect::<Vec<_>>();
    for (j, def) in model.variables().iter().enumerate() {
        let (lower, upper) = match def.kind() {
            VarKind::Binary => (0.0, 1.0),
            VarKind::Continuous => (def.lower(), def.upper()),
        };
        let bound = |suffix: &str, relation, rhs| Row {
            name: format!("{suffix}[{}]", def.name()),
            terms: vec![(j, 1.0)],
            relation,
            rhs,
        };
        if lower.is_finite() {
            rows.push(bound("lower", Relation::GreaterEq, lower));
        }
        if upper.is_finite() {
            rows.push(bound("upper", Relation::LessEq, upper));
        }
    }

    let mut dual = Model::new();
    let mut prices = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let (lower, upper) = match row.relation {
            Relation::GreaterEq => (0.0, f64::INFINITY),
            Relation::LessEq => (f64::NEG_INFINITY, 0.0),
            Relation::Equal => (f64::NEG_INFINITY, f64::INFINITY),
        };
        prices.push(dual.add_continuous_var(lower, upper, format!("y{i}[{}]", row.name))?);
    }

    let mut columns = vec![LinearExpr::new(); model.variables().len()];
    for (row, price) in rows.iter().zip(&prices) {
        for (j, a) in &row.terms {
            columns[*j].add(*price, *a);
        }
    }
    let mut costs = vec![0.0; model.variables().len()];
    for (var, c) in model.objective().terms() {
        costs[var.index()] += sign * c;
    }
    for ((column, cost), def) in columns.into_iter().zip(costs).zip(model.variables()) {
        if !column.is_empty() {
            dual.add_linear_constraint(
                column,
                Relation::Equal,
                cost,
                format!("column[{}]", def.name()),
            )?;
        }
    }
    dual.set_objective(
        rows.iter().zip(&prices).map(|(row, y)| (*y, row.rhs)).collect(),
        Direction::Maximize,
    )?;

    match run(&dual)? {
        Primal::Solved(y) => Ok(y
            .into_iter()
            .take(model.constraints().len())
            .map(|v| sign * v)
            .collect()),
        Primal::Infeasible | Primal::Unbounded => Err(Error::solver(
            "Could not compute dual prices of the solved model.",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::SolveStatus;

    const TOLERANCE: f64 = 1e-6;

    #[test]
    fn test_lp_with_duals() -> Result<(), Error> {
        // min x + 2y  s.t.  x + y >= 2,  x <= 1
        let mut model = Model::new();
        let x = model.add_continuous_var(0.0, f64::INFINITY, "x")?;
        let y = model.add_continuous_var(0.0, f64::INFINITY, "y")?;
        model.add_linear_constraint(
            LinearExpr::new().with(x, 1.0).with(y, 1.0),
            Relation::GreaterEq,
            2.0,
            "demand",
        )?;
        model.add_linear_constraint(LinearExpr::new().with(x, 1.0), Relation::LessEq, 1.0, "cap")?;
        model.set_objective(LinearExpr::new().with(x, 1.0).with(y, 2.0), Direction::Minimize)?;

        let outcome = MicroLpBackend.solve(&model)?;
        assert_eq!(outcome.status(), SolveStatus::Optimal);
        assert!((outcome.objective() - 3.0).abs() < TOLERANCE);
        assert!((outcome.value(x) - 1.0).abs() < TOLERANCE);
        assert!((outcome.value(y) - 1.0).abs() < TOLERANCE);

        // one more unit of demand costs 2, one more unit of capacity saves 1.
        assert!((outcome.dual(0) - 2.0).abs() < TOLERANCE);
        assert!((outcome.dual(1) + 1.0).abs() < TOLERANCE);

        Ok(())
    }

    #[test]
    fn test_milp_duals_from_relaxation() -> Result<(), Error> {
        // min 5z + v  s.t.  v - 4z <= 0,  v >= 1
        let mut model = Model::new();
        let z = model.add_binary_var("z")?;
        let v = model.add_continuous_var(0.0, 10.0, "v")?;
        model.add_linear_constraint(
            LinearExpr::new().with(v, 1.0).with(z, -4.0),
            Relation::LessEq,
            0.0,
            "open",
        )?;
        model.add_linear_constraint(LinearExpr::new().with(v, 1.0), Relation::GreaterEq, 1.0, "need")?;
        model.set_objective(LinearExpr::new().with(z, 5.0).with(v, 1.0), Direction::Minimize)?;

        let outcome = MicroLpBackend.solve(&model)?;
        assert!((outcome.value(z) - 1.0).abs() < TOLERANCE);
        assert!((outcome.objective() - 6.0).abs() < TOLERANCE);
        // the relaxation opens a quarter of z, so one more unit of v needs
        // another quarter.
        assert!((outcome.dual(0) + 1.25).abs() < TOLERANCE);
        assert!((outcome.dual(1) - 2.25).abs() < TOLERANCE);

        Ok(())
    }

    #[test]
    fn test_free_and_upper_bounded_variables() -> Result<(), Error> {
        // min x - z  s.t.  x - y = 0,  y >= 2,  with x free and z <= 3
        let mut model = Model::new();
        let x = model.add_continuous_var(f64::NEG_INFINITY, f64::INFINITY, "x")?;
        let y = model.add_continuous_var(0.0, f64::INFINITY, "y")?;
        let z = model.add_continuous_var(f64::NEG_INFINITY, 3.0, "z")?;
        model.add_linear_constraint(
            LinearExpr::new().with(x, 1.0).with(y, -1.0),
            Relation::Equal,
            0.0,
            "link",
        )?;
        model.add_linear_constraint(LinearExpr::new().with(y, 1.0), Relation::GreaterEq, 2.0, "floor")?;
        model.set_objective(LinearExpr::new().with(x, 1.0).with(z, -1.0), Direction::Minimize)?;

        let outcome = MicroLpBackend.solve(&model)?;
        assert_eq!(outcome.status(), SolveStatus::Optimal);
        assert!((outcome.value(x) - 2.0).abs() < TOLERANCE);
        assert!((outcome.value(z) - 3.0).abs() < TOLERANCE);
        assert!((outcome.objective() + 1.0).abs() < TOLERANCE);
        assert!((outcome.dual(0) - 1.0).abs() < TOLERANCE);
        assert!((outcome.dual(1) - 1.0).abs() < TOLERANCE);
        assert!(MicroLpBackend.is_feasible(&model)?);

        Ok(())
    }

    #[test]
    fn test_maximise() -> Result<(), Error> {
        let mut model = Model::new();
        let x = model.add_continuous_var(0.0, f64::INFINITY, "x")?;
        model.add_linear_constraint(LinearExpr::new().with(x, 2.0), Relation::LessEq, 4.0, "cap")?;
        model.set_objective(LinearExpr::new().with(x, 3.0), Direction::Maximize)?;

        let outcome = MicroLpBackend.solve(&model)?;
        assert!((outcome.objective() - 6.0).abs() < TOLERANCE);
        assert!((outcome.dual(0) - 1.5).abs() < TOLERANCE);

        Ok(())
    }

    #[test]
    fn test_infeasible_and_unbounded() -> Result<(), Error> {
        let mut model = Model::new();
        let x = model.add_continuous_var(0.0, 1.0, "x")?;
        model.add_linear_constraint(LinearExpr::new().with(x, 1.0), Relation::GreaterEq, 2.0, "high")?;
        assert_eq!(MicroLpBackend.solve(&model)?.status(), SolveStatus::Infeasible);

        let mut model = Model::new();
        let x = model.add_continuous_var(0.0, f64::INFINITY, "x")?;
        model.set_objective(LinearExpr::new().with(x, 1.0), Direction::Maximize)?;
        assert_eq!(MicroLpBackend.solve(&model)?.status(), SolveStatus::Unbounded);

        Ok(())
    }
}
