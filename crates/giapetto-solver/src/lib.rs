mod expr;
mod model;
mod simplex;
mod solution;
mod standard;

pub use expr::{LinearExpression, VarId};
pub use model::{Constraint, ConstraintOp, Domain, Model, ModelBuilder, ModelError, Objective, Sense, Variable};
pub use simplex::{SolveError, Solver};
pub use solution::{
    Analysis, ConstraintViolation, Integrality, ReducedCost, ShadowPrice, SolutionStatus, SolverResult,
};
pub use standard::{ColumnKind, RowInfo, RowOrigin, StandardForm, VariableMap};

/// Start building a model.
pub fn build_model() -> ModelBuilder {
    ModelBuilder::new()
}

/// Solve `model` with the default [`Solver`] settings.
pub fn solve(model: &Model) -> Result<SolverResult, SolveError> {
    Solver::default().solve(model)
}
