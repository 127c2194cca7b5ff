use std::collections::BTreeMap;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// Handle to a variable, returned by the model builder that created it.
///
/// The index is the variable's column in insertion order. Handles also carry
/// the id of their builder, so a handle from another builder is rejected
/// even when its index is in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VarId {
    index: usize,
    owner: u32,
}

impl VarId {
    pub(crate) fn new(owner: u32, index: usize) -> Self {
        Self { index, owner }
    }

    pub fn index(self) -> usize {
        self.index
    }

    pub(crate) fn owner(self) -> u32 {
        self.owner
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.index)
    }
}

/// A linear expression `sum(coefficient * variable) + constant`.
///
/// Terms are keyed by variable, so adding the same variable twice sums the
/// coefficients instead of creating a second entry.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinearExpression {
    terms: BTreeMap<VarId, f64>,
    constant: f64,
}

impl LinearExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_constant(constant: f64) -> Self {
        Self {
            terms: BTreeMap::new(),
            constant,
        }
    }

    /// Add `coefficient * var` to the expression.
    pub fn add_term(&mut self, var: VarId, coefficient: f64) -> &mut Self {
        *self.terms.entry(var).or_insert(0.0) += coefficient;
        self
    }

    pub fn with_term(mut self, var: VarId, coefficient: f64) -> Self {
        self.add_term(var, coefficient);
        self
    }

    pub fn add_constant(&mut self, value: f64) -> &mut Self {
        self.constant += value;
        self
    }

    /// Coefficient of `var`, zero if the variable does not appear.
    pub fn coefficient(&self, var: VarId) -> f64 {
        self.terms.get(&var).copied().unwrap_or(0.0)
    }

    /// Terms in ascending variable order.
    pub fn terms(&self) -> impl Iterator<Item = (VarId, f64)> + '_ {
        self.terms.iter().map(|(&var, &coefficient)| (var, coefficient))
    }

    pub fn constant(&self) -> f64 {
        self.constant
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Evaluate at a point given as values indexed by [`VarId::index`].
    /// Variables past the end of `values` count as zero.
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms.iter().fold(self.constant, |acc, (var, coefficient)| {
            acc + coefficient * values.get(var.index).copied().unwrap_or(0.0)
        })
    }

    fn scale(mut self, factor: f64) -> Self {
        for coefficient in self.terms.values_mut() {
            *coefficient *= factor;
        }
        self.constant *= factor;
        self
    }
}

impl fmt::Display for LinearExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (var, coefficient) in self.terms() {
            if first {
                write!(f, "{} {}", coefficient, var)?;
                first = false;
            } else if coefficient < 0.0 {
                write!(f, " - {} {}", -coefficient, var)?;
            } else {
                write!(f, " + {} {}", coefficient, var)?;
            }
        }
        if first {
            write!(f, "{}", self.constant)
        } else if self.constant != 0.0 {
            write!(f, " + {}", self.constant)
        } else {
            Ok(())
        }
    }
}

impl From<VarId> for LinearExpression {
    fn from(var: VarId) -> Self {
        Self::new().with_term(var, 1.0)
    }
}

impl From<f64> for LinearExpression {
    fn from(constant: f64) -> Self {
        Self::from_constant(constant)
    }
}

impl<T: Into<LinearExpression>> AddAssign<T> for LinearExpression {
    fn add_assign(&mut self, rhs: T) {
        let rhs = rhs.into();
        for (var, coefficient) in rhs.terms {
            self.add_term(var, coefficient);
        }
        self.constant += rhs.constant;
    }
}

impl<T: Into<LinearExpression>> SubAssign<T> for LinearExpression {
    fn sub_assign(&mut self, rhs: T) {
        *self += rhs.into().scale(-1.0);
    }
}

impl<T: Into<LinearExpression>> Add<T> for LinearExpression {
    type Output = LinearExpression;

    fn add(mut self, rhs: T) -> Self::Output {
        self += rhs;
        self
    }
}

impl<T: Into<LinearExpression>> Sub<T> for LinearExpression {
    type Output = LinearExpression;

    fn sub(mut self, rhs: T) -> Self::Output {
        self -= rhs;
        self
    }
}

impl<T: Into<LinearExpression>> Add<T> for VarId {
    type Output = LinearExpression;

    fn add(self, rhs: T) -> Self::Output {
        LinearExpression::from(self) + rhs
    }
}

impl<T: Into<LinearExpression>> Sub<T> for VarId {
    type Output = LinearExpression;

    fn sub(self, rhs: T) -> Self::Output {
        LinearExpression::from(self) - rhs
    }
}

impl Mul<f64> for LinearExpression {
    type Output = LinearExpression;

    fn mul(self, rhs: f64) -> Self::Output {
        self.scale(rhs)
    }
}

impl Mul<LinearExpression> for f64 {
    type Output = LinearExpression;

    fn mul(self, rhs: LinearExpression) -> Self::Output {
        rhs.scale(self)
    }
}

impl Mul<f64> for VarId {
    type Output = LinearExpression;

    fn mul(self, rhs: f64) -> Self::Output {
        LinearExpression::new().with_term(self, rhs)
    }
}

impl Mul<VarId> for f64 {
    type Output = LinearExpression;

    fn mul(self, rhs: VarId) -> Self::Output {
        LinearExpression::new().with_term(rhs, self)
    }
}

impl Neg for LinearExpression {
    type Output = LinearExpression;

    fn neg(self) -> Self::Output {
        self.scale(-1.0)
    }
}

impl Neg for VarId {
    type Output = LinearExpression;

    fn neg(self) -> Self::Output {
        LinearExpression::new().with_term(self, -1.0)
    }
}

impl Sum for LinearExpression {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(LinearExpression::new(), |acc, expr| acc + expr)
    }
}
