use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;

use crate::expr::{LinearExpression, VarId};
use crate::solution::ConstraintViolation;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Duplicate variable: {0}")]
    DuplicateVariable(String),
    #[error("Unknown variable: {0}")]
    UnknownVariable(VarId),
    #[error("Model has no objective")]
    EmptyObjective,
    #[error("Model has no variables")]
    EmptyModel,
    #[error("Invalid bounds for variable {name}: [{lower}, {upper}]")]
    InvalidBounds { name: String, lower: f64, upper: f64 },
    #[error("Non-finite value {value} in {context}")]
    NonFiniteCoefficient { context: String, value: f64 },
}

static NEXT_BUILDER: AtomicU32 = AtomicU32::new(0);

/// Whether a variable may take any real value or only whole numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Domain {
    #[default]
    Continuous,
    Integer,
}

/// A decision variable
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Variable {
    pub name: String,
    /// Lower bound, may be `-inf`
    pub lower: f64,
    /// Upper bound, may be `+inf`
    pub upper: f64,
    pub domain: Domain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConstraintOp {
    /// Less than or equal (<=)
    Le,
    /// Greater than or equal (>=)
    Ge,
    /// Equal (=)
    Eq,
}

impl ConstraintOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ConstraintOp::Le => "<=",
            ConstraintOp::Ge => ">=",
            ConstraintOp::Eq => "=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Constraint {
    /// Name/label for the constraint (for diagnostics)
    pub name: String,
    pub expr: LinearExpression,
    pub op: ConstraintOp,
    pub rhs: f64,
}

impl Constraint {
    /// Left-hand side value at `values`, including the expression constant
    pub fn activity(&self, values: &[f64]) -> f64 {
        self.expr.evaluate(values)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Sense {
    Maximize,
    Minimize,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Objective {
    pub expr: LinearExpression,
    pub sense: Sense,
}

/// A validated linear program. Produced by [`ModelBuilder::build`] and never
/// modified afterwards.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Model {
    owner: u32,
    variables: Vec<Variable>,
    objective: Objective,
    constraints: Vec<Constraint>,
}

impl Model {
    pub fn builder() -> ModelBuilder {
        ModelBuilder::new()
    }

    /// Variables in column order
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, id: VarId) -> Option<&Variable> {
        if id.owner() != self.owner {
            return None;
        }
        self.variables.get(id.index())
    }

    pub fn find_variable(&self, name: &str) -> Option<VarId> {
        self.variables
            .iter()
            .position(|v| v.name == name)
            .map(|j| self.var_id(j))
    }

    /// Handle of the variable in column `index`
    pub(crate) fn var_id(&self, index: usize) -> VarId {
        VarId::new(self.owner, index)
    }

    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn has_integer_variables(&self) -> bool {
        self.variables.iter().any(|v| v.domain == Domain::Integer)
    }

    /// Evaluate every constraint and variable bound at `values` and report
    /// the ones violated by more than `tolerance`, worst first.
    pub fn violations(&self, values: &[f64], tolerance: f64) -> Vec<ConstraintViolation> {
        let mut violations = Vec::new();

        for c in &self.constraints {
            let lhs = c.activity(values);

            let violated = match c.op {
                ConstraintOp::Le if lhs > c.rhs + tolerance => Some((
                    lhs - c.rhs,
                    format!("{} exceeds maximum of {:.2} by {:.2}", c.name, c.rhs, lhs - c.rhs),
                )),
                ConstraintOp::Ge if lhs < c.rhs - tolerance => Some((
                    c.rhs - lhs,
                    format!("{} is below minimum of {:.2} by {:.2}", c.name, c.rhs, c.rhs - lhs),
                )),
                ConstraintOp::Eq if (lhs - c.rhs).abs() > tolerance => Some((
                    (lhs - c.rhs).abs(),
                    format!("{} requires exactly {:.2} but got {:.2}", c.name, c.rhs, lhs),
                )),
                _ => None,
            };

            if let Some((violation_amount, description)) = violated {
                violations.push(ConstraintViolation {
                    constraint: c.name.clone(),
                    required: c.rhs,
                    actual: lhs,
                    violation_amount,
                    description,
                });
            }
        }

        for (j, var) in self.variables.iter().enumerate() {
            let value = values.get(j).copied().unwrap_or(0.0);
            if value < var.lower - tolerance {
                violations.push(ConstraintViolation {
                    constraint: format!("{} lower bound", var.name),
                    required: var.lower,
                    actual: value,
                    violation_amount: var.lower - value,
                    description: format!("{} is below its lower bound of {:.2}", var.name, var.lower),
                });
            } else if value > var.upper + tolerance {
                violations.push(ConstraintViolation {
                    constraint: format!("{} upper bound", var.name),
                    required: var.upper,
                    actual: value,
                    violation_amount: value - var.upper,
                    description: format!("{} exceeds its upper bound of {:.2}", var.name, var.upper),
                });
            }
        }

        violations.sort_by(|a, b| b.violation_amount.total_cmp(&a.violation_amount));
        violations
    }
}

/// Accumulates variables, an objective and constraints, then validates them
/// into an immutable [`Model`].
#[derive(Debug)]
pub struct ModelBuilder {
    /// Tags every handle this builder hands out
    owner: u32,
    variables: Vec<Variable>,
    names: HashMap<String, VarId>,
    objective: Option<Objective>,
    constraints: Vec<Constraint>,
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self {
            owner: NEXT_BUILDER.fetch_add(1, Ordering::Relaxed),
            variables: Vec::new(),
            names: HashMap::new(),
            objective: None,
            constraints: Vec::new(),
        }
    }
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable with explicit bounds and domain.
    ///
    /// Fails with [`ModelError::DuplicateVariable`] if the name is taken and
    /// with [`ModelError::InvalidBounds`] unless `lower <= upper`, `lower`
    /// is below `+inf` and `upper` is above `-inf`.
    pub fn add_variable(
        &mut self,
        name: impl Into<String>,
        lower: f64,
        upper: f64,
        domain: Domain,
    ) -> Result<VarId, ModelError> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(ModelError::DuplicateVariable(name));
        }
        if lower.is_nan()
            || upper.is_nan()
            || lower > upper
            || lower == f64::INFINITY
            || upper == f64::NEG_INFINITY
        {
            return Err(ModelError::InvalidBounds { name, lower, upper });
        }

        let id = VarId::new(self.owner, self.variables.len());
        log::trace!("add variable {} ({}) in [{}, {}] {:?}", name, id, lower, upper, domain);
        self.names.insert(name.clone(), id);
        self.variables.push(Variable {
            name,
            lower,
            upper,
            domain,
        });
        Ok(id)
    }

    /// Continuous variable with bounds `[0, +inf)`
    pub fn add_continuous(&mut self, name: impl Into<String>) -> Result<VarId, ModelError> {
        self.add_variable(name, 0.0, f64::INFINITY, Domain::Continuous)
    }

    /// Integer variable with bounds `[0, +inf)`
    pub fn add_integer(&mut self, name: impl Into<String>) -> Result<VarId, ModelError> {
        self.add_variable(name, 0.0, f64::INFINITY, Domain::Integer)
    }

    /// Set the objective, replacing any previous one.
    pub fn set_objective(
        &mut self,
        expr: impl Into<LinearExpression>,
        sense: Sense,
    ) -> Result<(), ModelError> {
        let expr = expr.into();
        self.check_references(&expr)?;
        check_finite(&expr, None, "objective")?;
        log::trace!("set objective {:?} {}", sense, expr);
        self.objective = Some(Objective { expr, sense });
        Ok(())
    }

    pub fn maximize(&mut self, expr: impl Into<LinearExpression>) -> Result<(), ModelError> {
        self.set_objective(expr, Sense::Maximize)
    }

    pub fn minimize(&mut self, expr: impl Into<LinearExpression>) -> Result<(), ModelError> {
        self.set_objective(expr, Sense::Minimize)
    }

    /// Append a constraint named after its position (`c0`, `c1`, ...).
    pub fn add_constraint(
        &mut self,
        expr: impl Into<LinearExpression>,
        op: ConstraintOp,
        rhs: f64,
    ) -> Result<(), ModelError> {
        let name = format!("c{}", self.constraints.len());
        self.add_named_constraint(name, expr, op, rhs)
    }

    pub fn add_named_constraint(
        &mut self,
        name: impl Into<String>,
        expr: impl Into<LinearExpression>,
        op: ConstraintOp,
        rhs: f64,
    ) -> Result<(), ModelError> {
        let expr = expr.into();
        self.check_references(&expr)?;
        let name = name.into();
        check_finite(&expr, Some(rhs), &format!("constraint {}", name))?;
        log::trace!("add constraint {}: {} {} {}", name, expr, op.symbol(), rhs);
        self.constraints.push(Constraint { name, expr, op, rhs });
        Ok(())
    }

    pub fn build(self) -> Result<Model, ModelError> {
        if self.variables.is_empty() {
            return Err(ModelError::EmptyModel);
        }
        let objective = self.objective.ok_or(ModelError::EmptyObjective)?;

        Ok(Model {
            owner: self.owner,
            variables: self.variables,
            objective,
            constraints: self.constraints,
        })
    }

    fn check_references(&self, expr: &LinearExpression) -> Result<(), ModelError> {
        match expr
            .terms()
            .find(|(var, _)| var.owner() != self.owner || var.index() >= self.variables.len())
        {
            Some((var, _)) => Err(ModelError::UnknownVariable(var)),
            None => Ok(()),
        }
    }
}

/// Reject NaN or infinite coefficients, constants and right-hand sides.
fn check_finite(
    expr: &LinearExpression,
    rhs: Option<f64>,
    context: &str,
) -> Result<(), ModelError> {
    let values = expr
        .terms()
        .map(|(_, coefficient)| coefficient)
        .chain(std::iter::once(expr.constant()))
        .chain(rhs);
    for value in values {
        if !value.is_finite() {
            return Err(ModelError::NonFiniteCoefficient {
                context: context.to_string(),
                value,
            });
        }
    }
    Ok(())
}
