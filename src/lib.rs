//! Lazily evaluated likelihood graphs for Markov chain Monte Carlo.
//!
//! Variables hold the parameters of a model, models aggregate variables and
//! other models, and likelihoods listen to models. Mutating a variable marks
//! every dependent likelihood as unknown; the next request recomputes it
//! once. A proposal is committed with [`ModelGraph::store_state`] or rolled
//! back with [`ModelGraph::restore_state`], which also returns every cached
//! likelihood to its stored value without recomputing it.
//!
//! ```
//! use likelihood_graph::{DistributionLikelihood, Exponential, ModelGraph};
//!
//! # fn main() -> likelihood_graph::Result<()> {
//! let mut graph = ModelGraph::new();
//! let rate = graph.new_variable_filled("rate", 1, 1.)?;
//! let prior = DistributionLikelihood::attach(
//!     &mut graph,
//!     "prior",
//!     rate,
//!     Exponential::new(1.).expect("positive rate"),
//! )?;
//! let model = graph.likelihood(prior).model();
//!
//! graph.store_state(model);
//! graph.set_value(rate, 0, 2.)?;
//! assert_eq!(graph.log_likelihood(prior)?, -2.);
//! graph.restore_state(model);
//! assert_eq!(graph.variable(rate).values(), &[1.]);
//! # Ok(())
//! # }
//! ```

pub(crate) mod bounds;
pub(crate) mod checkpoint;
pub(crate) mod columns;
pub(crate) mod compound;
pub(crate) mod distribution;
pub(crate) mod error;
pub(crate) mod gradient;
pub(crate) mod graph;
pub(crate) mod likelihood;
pub(crate) mod model;
pub(crate) mod operator;
pub(crate) mod random_walk;
pub(crate) mod variable;

pub use bounds::{Bounds, IntersectionBounds, RealBounds};
pub use checkpoint::Checkpoint;
pub use columns::{LogColumn, Loggable};
pub use compound::{CompoundSettings, Threads};
pub use distribution::{Distribution, DistributionLikelihood, Exponential, Uniform};
pub use error::{GraphError, Result};
pub use gradient::{finite_difference_step, numeric_derivative, Gradient, SQRT_EPSILON};
pub use graph::ModelGraph;
pub use likelihood::{LikelihoodFunction, LikelihoodId, LikelihoodNode};
pub use model::{ChangeListener, ModelChange, ModelId, ModelNode, ModelState};
pub use operator::{
    AcceptanceTargets, Coercable, CoercionMode, Operate, Operator, OperatorStats, Proposal,
};
pub use random_walk::RandomWalkOperator;
pub use variable::{ChangeKind, VariableChange, VariableId, VariableNode};
