use crate::expr::VarId;
use crate::model::{Domain, Model};
use crate::simplex::{EngineOutput, Outcome};
use crate::standard::{RowOrigin, StandardForm, VariableMap};

/// The result of solving an LP problem
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolverResult {
    /// Solution status
    pub status: SolutionStatus,
    /// Optimal values indexed by [`VarId::index`], `None` unless optimal
    pub values: Option<Vec<f64>>,
    /// Optimal objective value, `None` unless optimal
    pub objective_value: Option<f64>,
    /// How the optimum relates to integer domains, `None` unless optimal
    pub integrality: Option<Integrality>,
    /// Detailed analysis (empty unless optimal)
    pub analysis: Analysis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SolutionStatus {
    /// An optimal solution was found
    Optimal,
    /// The problem is infeasible (no solution exists)
    Infeasible,
    /// The problem is unbounded
    Unbounded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Integrality {
    /// The model has no integer variables
    Continuous,
    /// The relaxation happens to be integral, so it is the integer optimum
    Integral,
    /// The relaxation is fractional; the objective is only a bound on the
    /// integer optimum
    Relaxation,
}

/// Detailed analysis of the optimal solution
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Analysis {
    /// Shadow prices (dual values) for each constraint
    /// Indicates how much the objective would change per unit increase of the RHS
    pub shadow_prices: Vec<ShadowPrice>,

    /// Reduced costs for each variable
    pub reduced_costs: Vec<ReducedCost>,

    /// Which constraints are binding (tight) at optimum
    pub binding_constraints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShadowPrice {
    /// Constraint name
    pub constraint: String,
    /// Shadow price value
    pub value: f64,
    /// Interpretation
    pub interpretation: String,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReducedCost {
    /// Variable name
    pub variable: String,
    /// Current value in solution
    pub value: f64,
    /// Change in the objective per unit increase of a non-basic variable;
    /// zero for basic ones
    pub reduced_cost: f64,
    /// Is this variable in the basis?
    pub is_basic: bool,
}

/// Information about a violated constraint
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConstraintViolation {
    /// Constraint name
    pub constraint: String,
    /// Required value (from constraint RHS)
    pub required: f64,
    /// Actual value achieved
    pub actual: f64,
    /// How much the constraint is violated by
    pub violation_amount: f64,
    /// Human-readable description of what's wrong
    pub description: String,
}

impl SolverResult {
    pub fn infeasible() -> Self {
        Self::without_solution(SolutionStatus::Infeasible)
    }

    pub fn unbounded() -> Self {
        Self::without_solution(SolutionStatus::Unbounded)
    }

    fn without_solution(status: SolutionStatus) -> Self {
        Self {
            status,
            values: None,
            objective_value: None,
            integrality: None,
            analysis: Analysis::default(),
        }
    }

    pub fn is_optimal(&self) -> bool {
        self.status == SolutionStatus::Optimal
    }

    /// Value of `var`, `None` unless optimal
    pub fn value(&self, var: VarId) -> Option<f64> {
        self.values.as_ref()?.get(var.index()).copied()
    }
}

/// Map the engine's final tableau back to the model's variables.
pub(crate) fn report(
    model: &Model,
    form: &StandardForm,
    output: &EngineOutput,
    tolerance: f64,
) -> SolverResult {
    match output.outcome {
        Outcome::Infeasible => return SolverResult::infeasible(),
        Outcome::Unbounded => return SolverResult::unbounded(),
        Outcome::Optimal => {}
    }

    let mut values: Vec<f64> = form
        .variable_maps()
        .iter()
        .map(|map| match *map {
            VariableMap::Shifted { column, offset } => output.column_values[column] + offset,
            VariableMap::Split { positive, negative } => {
                output.column_values[positive] - output.column_values[negative]
            }
        })
        .collect();

    let integrality = integrality(model, &mut values, tolerance);
    let objective_value = model.objective().expr.evaluate(&values);
    let analysis = analyze(model, form, output, &values, tolerance);

    log::debug!("objective {} ({:?})", objective_value, integrality);

    SolverResult {
        status: SolutionStatus::Optimal,
        values: Some(values),
        objective_value: Some(objective_value),
        integrality: Some(integrality),
        analysis,
    }
}

/// Snap integer variables to whole numbers when the relaxation already is
/// integral.
fn integrality(model: &Model, values: &mut [f64], tolerance: f64) -> Integrality {
    if !model.has_integer_variables() {
        return Integrality::Continuous;
    }

    let integer_columns: Vec<usize> = model
        .variables()
        .iter()
        .enumerate()
        .filter(|(_, v)| v.domain == Domain::Integer)
        .map(|(j, _)| j)
        .collect();

    if integer_columns
        .iter()
        .all(|&j| (values[j] - values[j].round()).abs() <= tolerance)
    {
        for j in integer_columns {
            values[j] = values[j].round();
        }
        Integrality::Integral
    } else {
        Integrality::Relaxation
    }
}

fn analyze(
    model: &Model,
    form: &StandardForm,
    output: &EngineOutput,
    values: &[f64],
    tolerance: f64,
) -> Analysis {
    let user_sign = if form.is_negated() { -1.0 } else { 1.0 };

    let mut shadow_prices = Vec::new();
    let mut binding_constraints = Vec::new();

    for row in form.rows() {
        let RowOrigin::Constraint(k) = row.origin else {
            continue;
        };
        let constraint = &model.constraints()[k];

        // The initial basic column is a unit column of this row with zero
        // cost, so its reduced cost is the row's dual value.
        let flip = if row.flipped { -1.0 } else { 1.0 };
        let value = output.reduced_costs[row.initial_basic] * flip * user_sign;
        let interpretation = if value.abs() < tolerance {
            "Non-binding constraint".to_string()
        } else if value > 0.0 {
            format!("Increasing RHS by 1 unit would increase the objective by {:.4}", value)
        } else {
            format!("Increasing RHS by 1 unit would decrease the objective by {:.4}", -value)
        };
        shadow_prices.push(ShadowPrice {
            constraint: constraint.name.clone(),
            value,
            interpretation,
        });

        let tight = match row.logical {
            Some(column) => output.column_values[column] <= tolerance,
            None => true,
        };
        if tight {
            binding_constraints.push(constraint.name.clone());
        }
    }

    let reduced_costs = model
        .variables()
        .iter()
        .zip(form.variable_maps())
        .zip(values)
        .map(|((var, map), &value)| {
            let (column, is_basic) = match *map {
                VariableMap::Shifted { column, .. } => (column, output.basic[column]),
                VariableMap::Split { positive, negative } => {
                    (positive, output.basic[positive] || output.basic[negative])
                }
            };
            let reduced_cost = if is_basic {
                0.0
            } else {
                -output.reduced_costs[column] * user_sign
            };
            ReducedCost {
                variable: var.name.clone(),
                value,
                reduced_cost,
                is_basic,
            }
        })
        .collect();

    Analysis {
        shadow_prices,
        reduced_costs,
        binding_constraints,
    }
}

#[cfg(test)]
mod tests {
    use float_eq::assert_float_eq;

    use super::*;
    use crate::model::{ConstraintOp, ModelBuilder};
    use crate::simplex::Solver;

    fn woodcarving() -> Model {
        let mut builder = ModelBuilder::new();
        let soldiers = builder.add_integer("soldiers").unwrap();
        let trains = builder.add_integer("trains").unwrap();
        builder.maximize(3.0 * soldiers + 2.0 * trains).unwrap();
        builder
            .add_named_constraint("finishing", soldiers + trains, ConstraintOp::Le, 80.0)
            .unwrap();
        builder
            .add_named_constraint("carpentry", 2.0 * soldiers + trains, ConstraintOp::Le, 100.0)
            .unwrap();
        builder
            .add_named_constraint("demand", soldiers, ConstraintOp::Le, 40.0)
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_woodcarving_analysis() {
        let solution = Solver::new().solve(&woodcarving()).unwrap();

        assert_eq!(solution.integrality, Some(Integrality::Integral));

        for (sp, expected) in solution.analysis.shadow_prices.iter().zip([1.0, 1.0, 0.0]) {
            assert_float_eq!(sp.value, expected, abs <= 1e-9);
        }
        assert_eq!(solution.analysis.shadow_prices[2].interpretation, "Non-binding constraint");
        assert_eq!(solution.analysis.binding_constraints, vec!["finishing", "carpentry"]);

        assert!(solution.analysis.reduced_costs.iter().all(|rc| rc.is_basic));
        assert_eq!(solution.analysis.reduced_costs[1].value, 60.0);
    }

    #[test]
    fn test_minimization_shadow_prices() {
        // Minimize 2x + 3y s.t. x + y >= 4, x <= 3: optimum x=3, y=1
        let mut builder = ModelBuilder::new();
        let x = builder.add_continuous("x").unwrap();
        let y = builder.add_continuous("y").unwrap();
        builder.minimize(2.0 * x + 3.0 * y).unwrap();
        builder.add_named_constraint("demand", x + y, ConstraintOp::Ge, 4.0).unwrap();
        builder.add_named_constraint("x_max", x, ConstraintOp::Le, 3.0).unwrap();
        let model = builder.build().unwrap();

        let solution = Solver::new().solve(&model).unwrap();

        assert_eq!(solution.integrality, Some(Integrality::Continuous));
        // One more unit of demand is met by y at cost 3; one more unit of
        // x capacity replaces a unit of y and saves 1.
        for (sp, expected) in solution.analysis.shadow_prices.iter().zip([3.0, -1.0]) {
            assert_float_eq!(sp.value, expected, abs <= 1e-9);
        }
    }

    #[test]
    fn test_reduced_cost_of_nonbasic_variable() {
        // Maximize 3x + y s.t. x + y <= 4: y stays at zero and costs 2 per unit
        let mut builder = ModelBuilder::new();
        let x = builder.add_continuous("x").unwrap();
        let y = builder.add_continuous("y").unwrap();
        builder.maximize(3.0 * x + y).unwrap();
        builder.add_constraint(x + y, ConstraintOp::Le, 4.0).unwrap();
        let model = builder.build().unwrap();

        let solution = Solver::new().solve(&model).unwrap();
        let rc = &solution.analysis.reduced_costs[1];

        assert!(!rc.is_basic);
        assert_eq!(rc.value, 0.0);
        assert_float_eq!(rc.reduced_cost, -2.0, abs <= 1e-9);
    }

    #[test]
    fn test_fractional_relaxation() {
        let mut builder = ModelBuilder::new();
        let x = builder.add_integer("x").unwrap();
        let y = builder.add_integer("y").unwrap();
        builder.maximize(x + y).unwrap();
        builder.add_constraint(x + y, ConstraintOp::Le, 3.5).unwrap();
        let model = builder.build().unwrap();

        let solution = Solver::new().solve(&model).unwrap();

        assert!(solution.is_optimal());
        assert_eq!(solution.integrality, Some(Integrality::Relaxation));
        assert_float_eq!(solution.objective_value.unwrap(), 3.5, abs <= 1e-9);
    }

    #[test]
    fn test_no_solution_has_empty_analysis() {
        let result = SolverResult::unbounded();
        assert_eq!(result.status, SolutionStatus::Unbounded);
        assert_eq!(result.value(VarId::new(0, 0)), None);
        assert_eq!(result.analysis, Analysis::default());
    }
}
