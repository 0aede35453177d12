use std::collections::HashMap;

use crate::variable::VariableId;

/// Square root of the machine epsilon for `f64`.
pub const SQRT_EPSILON: f64 = 1.4901161193847656e-8;

/// Step used for the finite difference around `x`.
pub fn finite_difference_step(x: f64) -> f64 {
    SQRT_EPSILON * x.abs().max(1.)
}

/// Symmetric finite difference of `func` at `x`, clamped to `[lower, upper]`.
///
/// The perturbed points are `b = min(x + h, upper)` and `a = max(x - h, lower)`,
/// so the step shrinks near a boundary instead of leaving the support.
/// `func` is called first at `b`, then at `a`. Restoring the unperturbed value
/// afterwards is the caller's job. If the interval is degenerate (`a == b`)
/// the derivative is zero.
pub fn numeric_derivative<F, E>(x: f64, lower: f64, upper: f64, mut func: F) -> Result<f64, E>
where
    F: FnMut(f64) -> Result<f64, E>,
{
    let step = finite_difference_step(x);

    let b = (x + step).min(upper);
    let fb = func(b)?;

    let a = (x - step).max(lower);
    let fa = func(a)?;

    if b == a {
        return Ok(0.);
    }
    Ok((fb - fa) / (b - a))
}

/// Additive accumulator of partial derivatives, keyed by variable.
///
/// Several likelihood terms can contribute to the same variable; their
/// contributions are summed per dimension.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gradient {
    gradient: HashMap<VariableId, Vec<f64>>,
    dimensions: HashMap<VariableId, usize>,
}

impl Gradient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the dimension of `variable`, so that `values` can return
    /// zeros for variables without contributions.
    pub fn with_dimension(mut self, variable: VariableId, dimension: usize) -> Self {
        self.dimensions.insert(variable, dimension);
        self
    }

    pub fn add_derivative(&mut self, variable: VariableId, index: usize, derivative: f64) {
        let dimension = self.dimension_of(variable).max(index + 1);
        let entry = self.entry(variable, dimension);
        entry[index] += derivative;
    }

    pub fn add_gradient(&mut self, variable: VariableId, gradient: &[f64]) {
        let dimension = self.dimension_of(variable).max(gradient.len());
        let entry = self.entry(variable, dimension);
        entry
            .iter_mut()
            .zip(gradient.iter())
            .for_each(|(acc, &g)| *acc += g);
    }

    pub fn get(&self, variable: VariableId) -> Option<&[f64]> {
        self.gradient.get(&variable).map(|g| &g[..])
    }

    /// The concatenated gradient of `variables`, in the given order.
    pub fn values(&self, variables: &[VariableId]) -> Vec<f64> {
        variables
            .iter()
            .flat_map(|v| match self.gradient.get(v) {
                Some(g) => g.clone(),
                None => vec![0.; self.dimension_of(*v)],
            })
            .collect()
    }

    fn dimension_of(&self, variable: VariableId) -> usize {
        self.dimensions
            .get(&variable)
            .copied()
            .or_else(|| self.gradient.get(&variable).map(|g| g.len()))
            .unwrap_or(0)
    }

    fn entry(&mut self, variable: VariableId, dimension: usize) -> &mut Vec<f64> {
        self.dimensions.insert(variable, dimension);
        let entry = self.gradient.entry(variable).or_default();
        if entry.len() < dimension {
            entry.resize(dimension, 0.);
        }
        entry
    }
}
