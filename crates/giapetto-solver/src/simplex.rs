use thiserror::Error;

use crate::model::Model;
use crate::solution::{self, SolverResult};
use crate::standard::StandardForm;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolveError {
    #[error("Iteration limit of {limit} pivots exceeded")]
    IterationLimitExceeded { limit: usize },
}

/// Two-phase primal simplex solver for linear programming problems
#[derive(Debug, Clone)]
pub struct Solver {
    /// Maximum pivots before giving up, `None` for `10 * (rows + columns)`
    max_iterations: Option<usize>,
    /// Tolerance for floating point comparisons
    tolerance: f64,
}

impl Default for Solver {
    fn default() -> Self {
        Self {
            max_iterations: None,
            tolerance: 1e-9,
        }
    }
}

impl Solver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = Some(max);
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Solve the LP problem using the two-phase simplex method.
    ///
    /// Infeasible and unbounded problems are reported through
    /// [`SolverResult::status`]; only running out of pivots is an error.
    pub fn solve(&self, model: &Model) -> Result<SolverResult, SolveError> {
        let form = StandardForm::from_model(model);
        let limit = self
            .max_iterations
            .unwrap_or(10 * (form.num_rows() + form.num_columns()));

        let mut tableau = Tableau::new(&form);
        let outcome = self.run(&mut tableau, &form, limit)?;
        log::debug!("simplex finished: {:?}", outcome);

        let output = EngineOutput {
            outcome,
            column_values: tableau.column_values(),
            reduced_costs: tableau.reduced_costs(),
            basic: tableau.basic_flags(),
        };
        let result = solution::report(model, &form, &output, self.tolerance);

        if let Some(values) = result.values.as_deref() {
            let violations = model.violations(values, 1e-6);
            if !violations.is_empty() {
                log::warn!(
                    "optimal point violates {} constraint(s), worst: {}",
                    violations.len(),
                    violations[0].description
                );
            }
        }
        Ok(result)
    }

    fn run(&self, tableau: &mut Tableau, form: &StandardForm, limit: usize) -> Result<Outcome, SolveError> {
        let mut iterations = 0;
        let mut phase = if form.has_artificial() {
            tableau.load_phase1_objective();
            Phase::One
        } else {
            tableau.load_objective(form.objective());
            Phase::Two
        };

        loop {
            phase = match phase {
                Phase::One => {
                    let eligible = tableau.n_cols;
                    log::debug!("phase 1: {} artificial variables", eligible - tableau.first_artificial);
                    match self.optimize(tableau, eligible, limit, &mut iterations)? {
                        Pivoting::Optimal => {
                            let infeasibility = -tableau.objective_value();
                            if infeasibility > self.tolerance {
                                log::warn!("phase 1 ended with infeasibility {:.3e}", infeasibility);
                                Phase::Done(Outcome::Infeasible)
                            } else {
                                self.drive_out_artificials(tableau);
                                tableau.load_objective(form.objective());
                                Phase::Two
                            }
                        }
                        // Phase 1 is bounded below by zero, so this is numerical trouble
                        Pivoting::Unbounded(_) => Phase::Done(Outcome::Infeasible),
                    }
                }
                Phase::Two => {
                    let eligible = tableau.first_artificial;
                    log::debug!("phase 2 after {} pivots", iterations);
                    match self.optimize(tableau, eligible, limit, &mut iterations)? {
                        Pivoting::Optimal => Phase::Done(Outcome::Optimal),
                        Pivoting::Unbounded(col) => {
                            log::debug!("column {} has no positive entry", col);
                            Phase::Done(Outcome::Unbounded)
                        }
                    }
                }
                Phase::Done(outcome) => return Ok(outcome),
            };
        }
    }

    /// Pivot until no column below `eligible` has a negative reduced cost.
    fn optimize(
        &self,
        tableau: &mut Tableau,
        eligible: usize,
        limit: usize,
        iterations: &mut usize,
    ) -> Result<Pivoting, SolveError> {
        loop {
            let Some(pivot_col) = self.find_pivot_column(tableau, eligible) else {
                return Ok(Pivoting::Optimal);
            };
            let Some(pivot_row) = self.find_pivot_row(tableau, pivot_col) else {
                return Ok(Pivoting::Unbounded(pivot_col));
            };
            if *iterations >= limit {
                log::warn!("iteration limit of {} pivots reached", limit);
                return Err(SolveError::IterationLimitExceeded { limit });
            }
            *iterations += 1;
            log::trace!(
                "pivot {}: row {} col {} value {:.6e}",
                iterations,
                pivot_row,
                pivot_col,
                tableau.data[pivot_row][pivot_col]
            );
            tableau.pivot(pivot_row, pivot_col);
        }
    }

    /// Replace zero-level artificials left in the basis after phase 1 by any
    /// non-artificial column with a usable entry in their row.
    fn drive_out_artificials(&self, tableau: &mut Tableau) {
        for row in 0..tableau.basic_vars.len() {
            if tableau.basic_vars[row] < tableau.first_artificial {
                continue;
            }
            let col = (0..tableau.first_artificial).find(|&j| tableau.data[row][j].abs() > self.tolerance);
            match col {
                Some(col) => {
                    log::trace!("drive artificial out of row {} via col {}", row, col);
                    tableau.pivot(row, col);
                }
                None => log::debug!("row {} is redundant", row),
            }
        }
    }

    /// Most negative reduced cost below `eligible`, lowest index on ties
    fn find_pivot_column(&self, tableau: &Tableau, eligible: usize) -> Option<usize> {
        let obj_row = tableau.obj_row();

        let mut min_val = -self.tolerance;
        let mut min_col = None;

        for j in 0..eligible {
            if tableau.data[obj_row][j] < min_val {
                min_val = tableau.data[obj_row][j];
                min_col = Some(j);
            }
        }

        min_col
    }

    /// Minimum ratio test, lowest basic column index on ties
    fn find_pivot_row(&self, tableau: &Tableau, col: usize) -> Option<usize> {
        let rhs_col = tableau.n_cols;

        let mut min_ratio = f64::INFINITY;
        let mut min_row: Option<usize> = None;

        for i in 0..tableau.obj_row() {
            let val = tableau.data[i][col];
            if val <= self.tolerance {
                continue;
            }
            let ratio = tableau.data[i][rhs_col] / val;
            let better = match min_row {
                None => true,
                Some(best) => {
                    ratio < min_ratio - self.tolerance
                        || ((ratio - min_ratio).abs() <= self.tolerance
                            && tableau.basic_vars[i] < tableau.basic_vars[best])
                }
            };
            if better {
                min_ratio = ratio;
                min_row = Some(i);
            }
        }

        min_row
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Optimal,
    Infeasible,
    Unbounded,
}

enum Phase {
    One,
    Two,
    Done(Outcome),
}

enum Pivoting {
    Optimal,
    Unbounded(usize),
}

/// Final state of the engine, in standard-form column space
pub(crate) struct EngineOutput {
    pub outcome: Outcome,
    pub column_values: Vec<f64>,
    pub reduced_costs: Vec<f64>,
    pub basic: Vec<bool>,
}

/// Dense tableau: one row per constraint plus the objective row last, one
/// column per standard-form column plus the right-hand side last. The
/// objective row holds reduced costs `z_j − c_j` and the objective value.
struct Tableau {
    data: Vec<Vec<f64>>,
    basic_vars: Vec<usize>,
    n_cols: usize,
    first_artificial: usize,
}

impl Tableau {
    fn new(form: &StandardForm) -> Self {
        let n_cols = form.num_columns();
        let mut data: Vec<Vec<f64>> = form
            .matrix()
            .iter()
            .zip(form.rhs())
            .map(|(row, &rhs)| {
                let mut row = row.clone();
                row.push(rhs);
                row
            })
            .collect();
        data.push(vec![0.0; n_cols + 1]);

        Self {
            data,
            basic_vars: form.initial_basis(),
            n_cols,
            first_artificial: form.first_artificial(),
        }
    }

    fn obj_row(&self) -> usize {
        self.data.len() - 1
    }

    fn objective_value(&self) -> f64 {
        self.data[self.obj_row()][self.n_cols]
    }

    /// Maximise minus the sum of artificials
    fn load_phase1_objective(&mut self) {
        let mut costs = vec![0.0; self.n_cols];
        for cost in &mut costs[self.first_artificial..] {
            *cost = -1.0;
        }
        self.load_objective(&costs);
    }

    /// Write `-c` into the objective row, then eliminate basic columns so it
    /// holds reduced costs for the current basis.
    fn load_objective(&mut self, costs: &[f64]) {
        let obj_row = self.obj_row();
        let n_cols = self.n_cols;
        for j in 0..n_cols {
            self.data[obj_row][j] = -costs[j];
        }
        self.data[obj_row][n_cols] = 0.0;

        for i in 0..obj_row {
            let factor = self.data[obj_row][self.basic_vars[i]];
            if factor != 0.0 {
                for j in 0..=n_cols {
                    self.data[obj_row][j] -= factor * self.data[i][j];
                }
            }
        }
    }

    fn pivot(&mut self, row: usize, col: usize) {
        let n_rows = self.data.len();
        let n_cols = self.n_cols + 1;

        // Update basic variable
        self.basic_vars[row] = col;

        // Scale pivot row
        let pivot_val = self.data[row][col];
        for j in 0..n_cols {
            self.data[row][j] /= pivot_val;
        }

        // Eliminate column in other rows
        for i in 0..n_rows {
            if i != row {
                let factor = self.data[i][col];
                if factor != 0.0 {
                    for j in 0..n_cols {
                        self.data[i][j] -= factor * self.data[row][j];
                    }
                }
            }
        }
    }

    fn column_values(&self) -> Vec<f64> {
        let mut values = vec![0.0; self.n_cols];
        for (i, &basic) in self.basic_vars.iter().enumerate() {
            values[basic] = self.data[i][self.n_cols];
        }
        values
    }

    fn reduced_costs(&self) -> Vec<f64> {
        self.data[self.obj_row()][..self.n_cols].to_vec()
    }

    fn basic_flags(&self) -> Vec<bool> {
        let mut flags = vec![false; self.n_cols];
        for &basic in &self.basic_vars {
            flags[basic] = true;
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConstraintOp, Domain, ModelBuilder};
    use crate::solution::SolutionStatus;

    fn values(solution: &SolverResult) -> &[f64] {
        solution.values.as_deref().expect("optimal solution has values")
    }

    #[test]
    fn test_simple_maximization() {
        // Maximize: 3x + 2y
        // Subject to:
        //   x + y <= 4
        //   x <= 3
        //   y <= 3
        //   x, y >= 0
        // Optimal: x=3, y=1, obj=11
        let mut builder = ModelBuilder::new();
        let x = builder.add_continuous("x").unwrap();
        let y = builder.add_continuous("y").unwrap();
        builder.maximize(3.0 * x + 2.0 * y).unwrap();
        builder.add_named_constraint("sum", x + y, ConstraintOp::Le, 4.0).unwrap();
        builder.add_named_constraint("x_max", x, ConstraintOp::Le, 3.0).unwrap();
        builder.add_named_constraint("y_max", y, ConstraintOp::Le, 3.0).unwrap();
        let problem = builder.build().unwrap();

        let solver = Solver::new();
        let solution = solver.solve(&problem).unwrap();

        assert_eq!(solution.status, SolutionStatus::Optimal);
        let v = values(&solution);
        let obj = solution.objective_value.unwrap();
        assert!((v[0] - 3.0).abs() < 1e-6, "x = {} (expected 3)", v[0]);
        assert!((v[1] - 1.0).abs() < 1e-6, "y = {} (expected 1)", v[1]);
        assert!((obj - 11.0).abs() < 1e-6, "obj = {} (expected 11)", obj);
    }

    #[test]
    fn test_minimization_with_ge() {
        // Minimize: 2x + 3y
        // Subject to:
        //   x + y >= 4
        //   x <= 3
        //   y <= 3
        //   x, y >= 0
        // Optimal: x=3, y=1, obj=9
        let mut builder = ModelBuilder::new();
        let x = builder.add_continuous("x").unwrap();
        let y = builder.add_continuous("y").unwrap();
        builder.minimize(2.0 * x + 3.0 * y).unwrap();
        builder.add_named_constraint("sum", x + y, ConstraintOp::Ge, 4.0).unwrap();
        builder.add_named_constraint("x_max", x, ConstraintOp::Le, 3.0).unwrap();
        builder.add_named_constraint("y_max", y, ConstraintOp::Le, 3.0).unwrap();
        let problem = builder.build().unwrap();

        let solution = Solver::new().solve(&problem).unwrap();

        assert_eq!(solution.status, SolutionStatus::Optimal);
        let v = values(&solution);
        let obj = solution.objective_value.unwrap();
        assert!((v[0] - 3.0).abs() < 1e-6, "x = {} (expected 3)", v[0]);
        assert!((v[1] - 1.0).abs() < 1e-6, "y = {} (expected 1)", v[1]);
        assert!((obj - 9.0).abs() < 1e-6, "obj = {} (expected 9)", obj);
    }

    #[test]
    fn test_infeasible() {
        // x >= 5
        // x <= 3
        let mut builder = ModelBuilder::new();
        let x = builder.add_continuous("x").unwrap();
        builder.minimize(x).unwrap();
        builder.add_named_constraint("lower", x, ConstraintOp::Ge, 5.0).unwrap();
        builder.add_named_constraint("upper", x, ConstraintOp::Le, 3.0).unwrap();
        let problem = builder.build().unwrap();

        let solution = Solver::new().solve(&problem).unwrap();

        assert_eq!(solution.status, SolutionStatus::Infeasible);
        assert!(solution.values.is_none());
        assert!(solution.objective_value.is_none());
    }

    #[test]
    fn test_unbounded() {
        let mut builder = ModelBuilder::new();
        let x = builder.add_continuous("x").unwrap();
        let y = builder.add_continuous("y").unwrap();
        builder.maximize(x + y).unwrap();
        builder.add_constraint(x - y, ConstraintOp::Le, 2.0).unwrap();
        let problem = builder.build().unwrap();

        let solution = Solver::new().solve(&problem).unwrap();
        assert_eq!(solution.status, SolutionStatus::Unbounded);
    }

    #[test]
    fn test_redundant_equality_rows() {
        // x + y = 2 twice over; the second artificial cannot leave the basis
        let mut builder = ModelBuilder::new();
        let x = builder.add_continuous("x").unwrap();
        let y = builder.add_continuous("y").unwrap();
        builder.maximize(x).unwrap();
        builder.add_constraint(x + y, ConstraintOp::Eq, 2.0).unwrap();
        builder.add_constraint(2.0 * x + 2.0 * y, ConstraintOp::Eq, 4.0).unwrap();
        let problem = builder.build().unwrap();

        let solution = Solver::new().solve(&problem).unwrap();

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert_eq!(values(&solution), &[2.0, 0.0]);
        assert_eq!(solution.objective_value, Some(2.0));
    }

    #[test]
    fn test_negative_rhs_row_needs_phase1() {
        // -x <= -2 with minimize x: optimum on the flipped row
        let mut builder = ModelBuilder::new();
        let x = builder.add_continuous("x").unwrap();
        builder.minimize(x).unwrap();
        builder.add_constraint(-x, ConstraintOp::Le, -2.0).unwrap();
        let problem = builder.build().unwrap();

        let solution = Solver::new().solve(&problem).unwrap();

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!((values(&solution)[0] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_flipped_ge_row_reaches_optimum() {
        let mut builder = ModelBuilder::new();
        let x = builder.add_continuous("x").unwrap();
        builder.maximize(x).unwrap();
        builder.add_constraint(x, ConstraintOp::Ge, -1.0).unwrap();
        builder.add_constraint(x, ConstraintOp::Le, 3.0).unwrap();
        let problem = builder.build().unwrap();

        let solution = Solver::new().solve(&problem).unwrap();

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!((values(&solution)[0] - 3.0).abs() < 1e-9);
        assert!((solution.objective_value.unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_free_variable() {
        let mut builder = ModelBuilder::new();
        let x = builder
            .add_variable("x", f64::NEG_INFINITY, f64::INFINITY, Domain::Continuous)
            .unwrap();
        builder.minimize(x).unwrap();
        builder.add_constraint(x, ConstraintOp::Ge, -3.0).unwrap();
        let problem = builder.build().unwrap();

        let solution = Solver::new().solve(&problem).unwrap();

        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert!((values(&solution)[0] + 3.0).abs() < 1e-9);
        assert!((solution.objective_value.unwrap() + 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_iteration_limit() {
        let mut builder = ModelBuilder::new();
        let soldiers = builder.add_integer("soldiers").unwrap();
        let trains = builder.add_integer("trains").unwrap();
        builder.maximize(3.0 * soldiers + 2.0 * trains).unwrap();
        builder.add_constraint(soldiers + trains, ConstraintOp::Le, 80.0).unwrap();
        builder.add_constraint(2.0 * soldiers + trains, ConstraintOp::Le, 100.0).unwrap();
        builder.add_constraint(soldiers, ConstraintOp::Le, 40.0).unwrap();
        let problem = builder.build().unwrap();

        // Three pivots are needed to reach the optimum
        let err = Solver::new().with_max_iterations(2).solve(&problem).unwrap_err();
        assert_eq!(err, SolveError::IterationLimitExceeded { limit: 2 });
        assert!(Solver::new().with_max_iterations(3).solve(&problem).is_ok());
    }
}
