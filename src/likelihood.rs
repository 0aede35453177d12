//! Lazily evaluated, memoized log-likelihoods.
//!
//! Every likelihood owns a private aggregate model that contains the models
//! it was built from, and listens to it for both change and store events. A
//! change anywhere below marks the cached value unknown; the next call to
//! [`ModelGraph::log_likelihood`] recomputes it exactly once.

use std::fmt::{self, Display};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rayon::prelude::*;

use crate::{
    bounds::Bounds,
    checkpoint::Checkpoint,
    compound::CompoundLikelihood,
    error::{GraphError, Result},
    gradient::{numeric_derivative, Gradient},
    graph::ModelGraph,
    model::ModelId,
    variable::VariableId,
};

/// Handle of a likelihood inside a [`ModelGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LikelihoodId(pub(crate) usize);

/// The algorithm specific part of a likelihood.
///
/// Implementations read the current state through the graph they are given.
/// They must not ask the graph for their own log-likelihood, since that
/// value is being computed.
pub trait LikelihoodFunction: Send {
    /// The expensive computation the cache exists to avoid repeating.
    fn calculate_log_likelihood(&mut self, graph: &ModelGraph) -> anyhow::Result<f64>;

    /// Whether this term is cheap and may return negative infinity, so that
    /// more expensive terms can be skipped.
    fn evaluate_early(&self) -> bool {
        false
    }

    /// The analytic partial derivative of the log-likelihood, if known.
    ///
    /// Returning `Ok(None)` falls back to a finite difference.
    fn derivative(
        &mut self,
        _graph: &ModelGraph,
        _variable: VariableId,
        _index: usize,
    ) -> anyhow::Result<Option<f64>> {
        Ok(None)
    }

    /// Store any extra derived cache, next to the cached value.
    fn store_calculations(&mut self) {}

    fn restore_calculations(&mut self) {}

    /// Drop any extra derived cache.
    fn make_dirty(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Cached {
    pub(crate) known: bool,
    pub(crate) log_likelihood: f64,
}

impl Cached {
    fn unknown() -> Self {
        Cached {
            known: false,
            log_likelihood: f64::NAN,
        }
    }
}

pub(crate) enum LikelihoodKind {
    Function(Mutex<Box<dyn LikelihoodFunction>>),
    Compound(CompoundLikelihood),
}

pub struct LikelihoodNode {
    name: String,
    identifier: Option<String>,
    model: ModelId,
    used: bool,
    early: bool,
    pub(crate) kind: LikelihoodKind,
    cache: Mutex<Checkpoint<Cached>>,
}

pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LikelihoodNode {
    pub(crate) fn new(name: &str, model: ModelId, early: bool, kind: LikelihoodKind) -> Self {
        LikelihoodNode {
            name: name.to_string(),
            identifier: None,
            model,
            used: false,
            early,
            kind,
            cache: Mutex::new(Checkpoint::new(Cached::unknown())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub(crate) fn set_identifier(&mut self, identifier: &str) {
        self.identifier = Some(identifier.to_string());
    }

    /// The private aggregate model this likelihood listens to.
    pub fn model(&self) -> ModelId {
        self.model
    }

    pub fn evaluate_early(&self) -> bool {
        self.early
    }

    pub fn is_used(&self) -> bool {
        self.used
    }

    pub(crate) fn set_used(&mut self) {
        self.used = true;
    }

    pub fn is_compound(&self) -> bool {
        matches!(self.kind, LikelihoodKind::Compound(_))
    }

    /// The flattened child list, for compound likelihoods.
    pub fn likelihoods(&self) -> Option<&[LikelihoodId]> {
        match &self.kind {
            LikelihoodKind::Compound(compound) => Some(compound.likelihoods()),
            LikelihoodKind::Function(_) => None,
        }
    }

    pub fn likelihood_known(&self) -> bool {
        lock(&self.cache).get().known
    }

    fn cache_mut(&mut self) -> &mut Checkpoint<Cached> {
        self.cache
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_unknown(&mut self) {
        self.cache_mut().get_mut().known = false;
    }

    pub(crate) fn make_function_dirty(&mut self) {
        self.set_unknown();
        if let LikelihoodKind::Function(function) = &mut self.kind {
            function
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .make_dirty();
        }
    }

    pub(crate) fn model_stored(&mut self) {
        self.cache_mut().store();
        if let LikelihoodKind::Function(function) = &mut self.kind {
            function
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .store_calculations();
        }
    }

    pub(crate) fn model_restored(&mut self) {
        self.cache_mut().restore();
        if let LikelihoodKind::Function(function) = &mut self.kind {
            function
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .restore_calculations();
        }
    }
}

impl fmt::Debug for LikelihoodNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LikelihoodNode")
            .field("name", &self.name)
            .field("identifier", &self.identifier)
            .field("model", &self.model)
            .field("early", &self.early)
            .field("cache", &*lock(&self.cache))
            .finish_non_exhaustive()
    }
}

impl Display for LikelihoodNode {
    // Never recomputes.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(identifier) = &self.identifier {
            write!(f, "[{}]", identifier)?;
        }
        let cached = *lock(&self.cache).get();
        if cached.known {
            write!(f, "({})", cached.log_likelihood)
        } else {
            write!(f, "(??)")
        }
    }
}

impl ModelGraph {
    /// The log-likelihood, recomputed only if it is not known.
    ///
    /// This takes `&self` so that independent likelihoods can be evaluated
    /// from several threads; each likelihood guards its own cache.
    pub fn log_likelihood(&self, likelihood: LikelihoodId) -> Result<f64> {
        let node = self.likelihood(likelihood);
        let mut cache = lock(&node.cache);
        if cache.get().known {
            tracing::trace!(likelihood = %node.name, "log likelihood cache hit");
            return Ok(cache.get().log_likelihood);
        }

        tracing::debug!(likelihood = %node.name, "recomputing log likelihood");
        let value = match &node.kind {
            LikelihoodKind::Function(function) => lock(function)
                .calculate_log_likelihood(self)
                .map_err(|err| GraphError::evaluation(&node.name, err))?,
            LikelihoodKind::Compound(compound) => compound
                .calculate_log_likelihood(self)
                .map_err(|err| GraphError::evaluation(&node.name, err))?,
        };

        cache.set(Cached {
            known: true,
            log_likelihood: value,
        });
        Ok(value)
    }

    pub fn likelihood_known(&self, likelihood: LikelihoodId) -> bool {
        self.likelihood(likelihood).likelihood_known()
    }

    /// Forces a complete recalculation the next time the value is requested.
    ///
    /// Compound likelihoods forward this to every child.
    pub fn make_likelihood_dirty(&mut self, likelihood: LikelihoodId) {
        let children = self
            .likelihood(likelihood)
            .likelihoods()
            .map(|children| children.to_vec());
        self.likelihood_mut(likelihood).make_function_dirty();
        if let Some(children) = children {
            for child in children {
                self.make_likelihood_dirty(child);
            }
        }
    }

    /// Partial derivative of the log-likelihood with respect to one entry of
    /// a variable.
    ///
    /// Variables outside the likelihood's model contribute zero. Terms with
    /// an analytic derivative use it; all others are differentiated with a
    /// bounded symmetric finite difference, which temporarily mutates the
    /// variable and restores it afterwards.
    pub fn differentiate(
        &mut self,
        likelihood: LikelihoodId,
        variable: VariableId,
        index: usize,
    ) -> Result<f64> {
        self.variable(variable).check_index(index)?;
        let node = self.likelihood(likelihood);
        if !self.has_variable(node.model, variable) {
            return Ok(0.);
        }

        let (children, pool) = match &node.kind {
            LikelihoodKind::Compound(compound) => {
                (compound.likelihoods().to_vec(), compound.pool().cloned())
            }
            LikelihoodKind::Function(function) => {
                let analytic = lock(function)
                    .derivative(self, variable, index)
                    .map_err(|err| GraphError::evaluation(&node.name, err))?;
                return match analytic {
                    Some(derivative) => Ok(derivative),
                    None => self.numeric_derivative(likelihood, variable, index),
                };
            }
        };

        let analytic = match pool {
            Some(pool) => {
                let graph = &*self;
                pool.install(|| {
                    children
                        .par_iter()
                        .map(|&child| graph.analytic_derivative(child, variable, index))
                        .collect::<Result<Vec<_>>>()
                })
                .map_err(|err| GraphError::evaluation(self.likelihood(likelihood).name(), err))?
            }
            None => vec![None; children.len()],
        };

        let mut total = 0.;
        for (child, derivative) in children.into_iter().zip(analytic) {
            total += match derivative {
                Some(derivative) => derivative,
                None => self.differentiate(child, variable, index)?,
            };
        }
        Ok(total)
    }

    /// Accumulates the derivative for every entry of `variables`.
    pub fn gradient(
        &mut self,
        likelihood: LikelihoodId,
        variables: &[VariableId],
    ) -> Result<Gradient> {
        let mut gradient = Gradient::new();
        for &variable in variables {
            let dimension = self.variable(variable).dimension();
            gradient = gradient.with_dimension(variable, dimension);
            for index in 0..dimension {
                let derivative = self.differentiate(likelihood, variable, index)?;
                gradient.add_derivative(variable, index, derivative);
            }
        }
        Ok(gradient)
    }

    fn analytic_derivative(
        &self,
        likelihood: LikelihoodId,
        variable: VariableId,
        index: usize,
    ) -> Result<Option<f64>> {
        let node = self.likelihood(likelihood);
        if !self.has_variable(node.model, variable) {
            return Ok(Some(0.));
        }
        match &node.kind {
            LikelihoodKind::Function(function) => lock(function)
                .derivative(self, variable, index)
                .map_err(|err| GraphError::evaluation(&node.name, err)),
            LikelihoodKind::Compound(_) => Ok(None),
        }
    }

    fn numeric_derivative(
        &mut self,
        likelihood: LikelihoodId,
        variable: VariableId,
        index: usize,
    ) -> Result<f64> {
        let node = self.variable(variable);
        let x = node.value(index)?;
        let lower = node.bounds().lower_limit(index);
        let upper = node.bounds().upper_limit(index);

        let derivative = numeric_derivative(x, lower, upper, |point| {
            self.set_value(variable, index, point)?;
            self.log_likelihood(likelihood)
        });
        self.set_value(variable, index, x)?;
        derivative
    }
}
