use crate::expr::VarId;
use crate::model::{ConstraintOp, Model, Sense};

/// What a standard-form column stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// The (possibly shifted) variable, or the positive part of a split one
    Structural(VarId),
    /// Negative part of a free variable, `x = x⁺ − x⁻`
    Mirror(VarId),
    /// Slack of a `<=` row (row index)
    Slack(usize),
    /// Surplus of a `>=` row (row index)
    Surplus(usize),
    /// Phase 1 seed of a row (row index)
    Artificial(usize),
}

/// Where a standard-form row came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrigin {
    /// Index into [`Model::constraints`]
    Constraint(usize),
    /// Finite upper bound of a variable
    UpperBound(VarId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowInfo {
    pub origin: RowOrigin,
    /// Row was multiplied by -1 to make its right-hand side non-negative
    pub flipped: bool,
    /// Slack or surplus column, `None` for equality rows
    pub logical: Option<usize>,
    /// Column holding the `+1` that seeds the initial basis (slack or artificial)
    pub initial_basic: usize,
}

/// How an original variable is recovered from standard-form columns
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VariableMap {
    /// `x = column + offset`
    Shifted { column: usize, offset: f64 },
    /// `x = positive − negative`
    Split { positive: usize, negative: usize },
}

/// `maximize c·x  s.t.  A x = b, x >= 0, b >= 0`
///
/// Columns are ordered structural, then slack/surplus, then artificial.
#[derive(Debug, Clone)]
pub struct StandardForm {
    matrix: Vec<Vec<f64>>,
    rhs: Vec<f64>,
    objective: Vec<f64>,
    negated: bool,
    columns: Vec<ColumnKind>,
    rows: Vec<RowInfo>,
    variables: Vec<VariableMap>,
    first_artificial: usize,
}

struct PendingRow {
    origin: RowOrigin,
    coefficients: Vec<f64>,
    op: ConstraintOp,
    rhs: f64,
}

impl StandardForm {
    pub fn from_model(model: &Model) -> Self {
        let mut columns = Vec::new();
        let mut variables = Vec::with_capacity(model.num_variables());

        for (j, var) in model.variables().iter().enumerate() {
            let id = model.var_id(j);
            if var.lower.is_finite() {
                variables.push(VariableMap::Shifted {
                    column: columns.len(),
                    offset: var.lower,
                });
                columns.push(ColumnKind::Structural(id));
            } else {
                let positive = columns.len();
                variables.push(VariableMap::Split {
                    positive,
                    negative: positive + 1,
                });
                columns.push(ColumnKind::Structural(id));
                columns.push(ColumnKind::Mirror(id));
            }
        }
        let n_structural = columns.len();

        let mut pending = Vec::new();
        for (i, c) in model.constraints().iter().enumerate() {
            let mut coefficients = vec![0.0; n_structural];
            let mut rhs = c.rhs - c.expr.constant();
            for (var, coef) in c.expr.terms() {
                rhs -= place(variables[var.index()], coef, &mut coefficients);
            }
            pending.push(PendingRow {
                origin: RowOrigin::Constraint(i),
                coefficients,
                op: c.op,
                rhs,
            });
        }
        for (j, var) in model.variables().iter().enumerate() {
            if var.upper.is_finite() {
                let mut coefficients = vec![0.0; n_structural];
                let shift = place(variables[j], 1.0, &mut coefficients);
                pending.push(PendingRow {
                    origin: RowOrigin::UpperBound(model.var_id(j)),
                    coefficients,
                    op: ConstraintOp::Le,
                    rhs: var.upper - shift,
                });
            }
        }

        // Normalise signs, then lay out slack/surplus columns followed by artificials
        let mut logical_signs = Vec::with_capacity(pending.len());
        for (i, row) in pending.iter_mut().enumerate() {
            let flip = row.rhs < 0.0;
            if flip {
                row.rhs = -row.rhs;
                row.coefficients.iter_mut().for_each(|a| *a = -*a);
            }
            let sign = match row.op {
                ConstraintOp::Le => Some(1.0),
                ConstraintOp::Ge => Some(-1.0),
                ConstraintOp::Eq => None,
            };
            if let Some(sign) = sign {
                columns.push(match row.op {
                    ConstraintOp::Ge => ColumnKind::Surplus(i),
                    _ => ColumnKind::Slack(i),
                });
            }
            logical_signs.push((flip, sign.map(|s| if flip { -s } else { s })));
        }
        let first_artificial = columns.len();

        let mut rows = Vec::with_capacity(pending.len());
        let mut logical_column = n_structural;
        for (i, &(flipped, sign)) in logical_signs.iter().enumerate() {
            let logical = sign.map(|_| {
                logical_column += 1;
                logical_column - 1
            });
            // Only an unflipped `<=` row starts with its slack basic
            let initial_basic = match (logical, sign) {
                (Some(column), Some(s)) if s > 0.0 && !flipped => column,
                _ => {
                    columns.push(ColumnKind::Artificial(i));
                    columns.len() - 1
                }
            };
            rows.push(RowInfo {
                origin: pending[i].origin,
                flipped,
                logical,
                initial_basic,
            });
        }

        let n_cols = columns.len();
        let mut matrix = Vec::with_capacity(pending.len());
        let mut rhs = Vec::with_capacity(pending.len());
        for (row, (info, &(_, sign))) in pending.into_iter().zip(rows.iter().zip(&logical_signs)) {
            let mut data = row.coefficients;
            data.resize(n_cols, 0.0);
            if let (Some(column), Some(s)) = (info.logical, sign) {
                data[column] = s;
            }
            if info.initial_basic >= first_artificial {
                data[info.initial_basic] = 1.0;
            }
            matrix.push(data);
            rhs.push(row.rhs);
        }

        let negated = model.objective().sense == Sense::Minimize;
        let mut objective = vec![0.0; n_cols];
        for (var, coef) in model.objective().expr.terms() {
            let coef = if negated { -coef } else { coef };
            place(variables[var.index()], coef, &mut objective);
        }

        log::debug!(
            "standard form: {} rows, {} columns ({} structural, {} logical, {} artificial)",
            rows.len(),
            n_cols,
            n_structural,
            first_artificial - n_structural,
            n_cols - first_artificial
        );

        Self {
            matrix,
            rhs,
            objective,
            negated,
            columns,
            rows,
            variables,
            first_artificial,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Constraint coefficients, one `Vec` per row
    pub fn matrix(&self) -> &[Vec<f64>] {
        &self.matrix
    }

    pub fn rhs(&self) -> &[f64] {
        &self.rhs
    }

    /// Objective coefficients in maximisation form
    pub fn objective(&self) -> &[f64] {
        &self.objective
    }

    /// The model minimises and `objective` holds the negated coefficients
    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn columns(&self) -> &[ColumnKind] {
        &self.columns
    }

    pub fn rows(&self) -> &[RowInfo] {
        &self.rows
    }

    pub fn variable_map(&self, var: VarId) -> Option<VariableMap> {
        self.variables.get(var.index()).copied()
    }

    pub fn variable_maps(&self) -> &[VariableMap] {
        &self.variables
    }

    /// Index of the first artificial column; equals `num_columns` when there are none
    pub fn first_artificial(&self) -> usize {
        self.first_artificial
    }

    pub fn has_artificial(&self) -> bool {
        self.first_artificial < self.columns.len()
    }

    /// Initial basic column of each row
    pub fn initial_basis(&self) -> Vec<usize> {
        self.rows.iter().map(|r| r.initial_basic).collect()
    }
}

/// Add `coef * x` to `row` in standard-form columns and return the constant
/// `coef * offset` left over by a shift.
fn place(map: VariableMap, coef: f64, row: &mut [f64]) -> f64 {
    match map {
        VariableMap::Shifted { column, offset } => {
            row[column] += coef;
            coef * offset
        }
        VariableMap::Split { positive, negative } => {
            row[positive] += coef;
            row[negative] -= coef;
            0.0
        }
    }
}
