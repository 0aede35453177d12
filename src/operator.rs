//! The transaction protocol between a proposal mechanism and the graph.
//!
//! An [`Operator`] is idle until [`Operator::operate`] mutates the graph; it
//! then stays pending until exactly one of [`Operator::accept`] or
//! [`Operator::reject`] is called. The driver pairs `accept` with
//! [`ModelGraph::store_state`] and `reject` with [`ModelGraph::restore_state`].

use std::time::Duration;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::{
    error::{GraphError, Result},
    graph::ModelGraph,
};

/// Outcome of a single move.
#[derive(Debug, Clone, PartialEq)]
pub enum Proposal {
    /// The graph was mutated.
    Proposed { log_hastings_ratio: f64 },
    /// The move is certain to be rejected, so the likelihood need not be
    /// evaluated. The driver treats this as an automatic reject.
    Infeasible { reason: String },
}

impl Proposal {
    pub fn is_feasible(&self) -> bool {
        matches!(self, Proposal::Proposed { .. })
    }
}

/// Acceptance rates a well tuned operator should reach.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceTargets {
    pub target: f64,
    pub minimum: f64,
    pub maximum: f64,
    pub minimum_good: f64,
    pub maximum_good: f64,
}

impl Default for AcceptanceTargets {
    fn default() -> Self {
        Self {
            target: 0.234,
            minimum: 0.05,
            maximum: 0.5,
            minimum_good: 0.1,
            maximum_good: 0.4,
        }
    }
}

/// Running counters of an operator.
///
/// These can be written back with the `set_*` methods of [`Operator`] when
/// resuming a chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatorStats {
    pub accept_count: u64,
    pub reject_count: u64,
    pub sum_deviation: f64,
    pub total_evaluation_time: Duration,
}

impl OperatorStats {
    pub fn operation_count(&self) -> u64 {
        self.accept_count + self.reject_count
    }

    /// Zero before the first recorded operation.
    pub fn acceptance_probability(&self) -> f64 {
        match self.operation_count() {
            0 => 0.,
            n => self.accept_count as f64 / n as f64,
        }
    }

    /// Zero before the first accepted operation.
    pub fn mean_deviation(&self) -> f64 {
        match self.accept_count {
            0 => 0.,
            n => self.sum_deviation / n as f64,
        }
    }

    pub fn mean_evaluation_time(&self) -> Duration {
        match self.operation_count() {
            0 => Duration::ZERO,
            n => Duration::from_secs_f64(self.total_evaluation_time.as_secs_f64() / n as f64),
        }
    }
}

/// Whether an operator adapts its tuning parameter during the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoercionMode {
    /// Adapt unless the driver disables adaptation globally.
    #[default]
    Default,
    On,
    Off,
}

/// An operator with a single tuning parameter.
///
/// The coercable parameter lives on an unbounded scale (for example the
/// logarithm of a window size) so that it can be moved additively; the raw
/// parameter is its value on the natural scale.
pub trait Coercable {
    fn coercable_parameter(&self) -> f64;

    fn set_coercable_parameter(&mut self, value: f64);

    fn raw_parameter(&self) -> f64;

    fn mode(&self) -> CoercionMode;
}

/// The concrete move an [`Operator`] performs.
pub trait Operate: Send {
    /// Mutates the graph and returns the log Hastings ratio of the move.
    fn operate(&mut self, graph: &mut ModelGraph, rng: &mut dyn RngCore) -> Result<Proposal>;

    fn handle_accept(&mut self, _deviation: f64) {}

    fn handle_reject(&mut self) {}

    /// Advice on how to tune the move, given its current statistics.
    fn performance_suggestion(&self, stats: &OperatorStats, targets: &AcceptanceTargets) -> String {
        let acceptance = stats.acceptance_probability();
        if stats.operation_count() == 0 {
            String::new()
        } else if acceptance < targets.minimum {
            "Acceptance too low, try a smaller move".to_string()
        } else if acceptance > targets.maximum {
            "Acceptance too high, try a larger move".to_string()
        } else {
            String::new()
        }
    }

    fn as_coercable(&mut self) -> Option<&mut dyn Coercable> {
        None
    }
}

/// Bookkeeping wrapper around a move, enforcing one accept or reject per
/// call to `operate`.
#[derive(Debug)]
pub struct Operator<O> {
    name: String,
    identifier: Option<String>,
    weight: f64,
    stats: OperatorStats,
    targets: AcceptanceTargets,
    pending: bool,
    inner: O,
}

impl<O: Operate> Operator<O> {
    pub fn new(name: &str, weight: f64, inner: O) -> Result<Self> {
        if !(weight > 0.) {
            return Err(GraphError::InvalidWeight {
                operator: name.to_string(),
                weight,
            });
        }
        Ok(Operator {
            name: name.to_string(),
            identifier: None,
            weight,
            stats: OperatorStats::default(),
            targets: AcceptanceTargets::default(),
            pending: false,
            inner,
        })
    }

    pub fn with_targets(mut self, targets: AcceptanceTargets) -> Self {
        self.targets = targets;
        self
    }

    /// Performs the move. The operator is pending afterwards, also if the
    /// move failed or turned out infeasible; the driver must restore the
    /// graph and reject in that case.
    pub fn operate(&mut self, graph: &mut ModelGraph, rng: &mut dyn RngCore) -> Result<Proposal> {
        if self.pending {
            tracing::warn!(operator = %self.name, "operate called while a move is pending");
            return Err(GraphError::OperatePending {
                operator: self.name.clone(),
            });
        }
        self.pending = true;
        let proposal = self.inner.operate(graph, rng)?;
        if let Proposal::Infeasible { reason } = &proposal {
            tracing::trace!(operator = %self.name, %reason, "infeasible proposal");
        }
        Ok(proposal)
    }

    pub fn accept(&mut self, deviation: f64) -> Result<()> {
        self.finish()?;
        self.stats.accept_count += 1;
        self.stats.sum_deviation += deviation;
        self.inner.handle_accept(deviation);
        Ok(())
    }

    pub fn reject(&mut self) -> Result<()> {
        self.finish()?;
        self.stats.reject_count += 1;
        self.inner.handle_reject();
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if !self.pending {
            tracing::warn!(operator = %self.name, "accept or reject without a pending move");
            return Err(GraphError::AcceptRejectWithoutOperate {
                operator: self.name.clone(),
            });
        }
        self.pending = false;
        Ok(())
    }

    /// Clears the counters and any pending move. Evaluation time is kept.
    pub fn reset(&mut self) {
        self.pending = false;
        self.stats = OperatorStats {
            total_evaluation_time: self.stats.total_evaluation_time,
            ..Default::default()
        };
    }

    /// Moves the coercable parameter towards the target acceptance rate.
    ///
    /// Returns the new parameter, or `None` if the move is not coercable or
    /// coercion is switched off.
    pub fn coerce(&mut self, acceptance: f64) -> Option<f64> {
        let target = self.targets.target;
        let count = self.stats.operation_count();
        let coercable = self.inner.as_coercable()?;
        if coercable.mode() == CoercionMode::Off {
            return None;
        }
        let parameter =
            coercable.coercable_parameter() + (acceptance - target) / (1. + count as f64);
        coercable.set_coercable_parameter(parameter);
        Some(parameter)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn set_identifier(&mut self, identifier: &str) {
        self.identifier = Some(identifier.to_string());
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn stats(&self) -> &OperatorStats {
        &self.stats
    }

    pub fn targets(&self) -> &AcceptanceTargets {
        &self.targets
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut O {
        &mut self.inner
    }

    pub fn operation_count(&self) -> u64 {
        self.stats.operation_count()
    }

    pub fn accept_count(&self) -> u64 {
        self.stats.accept_count
    }

    pub fn set_accept_count(&mut self, accept_count: u64) {
        self.stats.accept_count = accept_count;
    }

    pub fn reject_count(&self) -> u64 {
        self.stats.reject_count
    }

    pub fn set_reject_count(&mut self, reject_count: u64) {
        self.stats.reject_count = reject_count;
    }

    pub fn sum_deviation(&self) -> f64 {
        self.stats.sum_deviation
    }

    pub fn set_sum_deviation(&mut self, sum_deviation: f64) {
        self.stats.sum_deviation = sum_deviation;
    }

    pub fn mean_deviation(&self) -> f64 {
        self.stats.mean_deviation()
    }

    pub fn acceptance_probability(&self) -> f64 {
        self.stats.acceptance_probability()
    }

    pub fn add_evaluation_time(&mut self, time: Duration) {
        self.stats.total_evaluation_time += time;
    }

    pub fn total_evaluation_time(&self) -> Duration {
        self.stats.total_evaluation_time
    }

    pub fn mean_evaluation_time(&self) -> Duration {
        self.stats.mean_evaluation_time()
    }

    pub fn performance_suggestion(&self) -> String {
        self.inner.performance_suggestion(&self.stats, &self.targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[derive(Debug, Default)]
    struct Noop {
        accepted: Vec<f64>,
        rejected: usize,
        log_scale: f64,
        mode: CoercionMode,
    }

    impl Operate for Noop {
        fn operate(&mut self, _graph: &mut ModelGraph, _rng: &mut dyn RngCore) -> Result<Proposal> {
            Ok(Proposal::Proposed {
                log_hastings_ratio: 0.,
            })
        }

        fn handle_accept(&mut self, deviation: f64) {
            self.accepted.push(deviation);
        }

        fn handle_reject(&mut self) {
            self.rejected += 1;
        }

        fn as_coercable(&mut self) -> Option<&mut dyn Coercable> {
            Some(self)
        }
    }

    impl Coercable for Noop {
        fn coercable_parameter(&self) -> f64 {
            self.log_scale
        }

        fn set_coercable_parameter(&mut self, value: f64) {
            self.log_scale = value;
        }

        fn raw_parameter(&self) -> f64 {
            self.log_scale.exp()
        }

        fn mode(&self) -> CoercionMode {
            self.mode
        }
    }

    fn operator() -> Operator<Noop> {
        Operator::new("noop", 1., Noop::default()).unwrap()
    }

    #[test]
    fn weight_must_be_positive() {
        assert!(matches!(
            Operator::new("bad", 0., Noop::default()),
            Err(GraphError::InvalidWeight { .. })
        ));
        assert!(Operator::new("bad", f64::NAN, Noop::default()).is_err());
        assert!(Operator::new("bad", -1., Noop::default()).is_err());
    }

    #[test]
    fn acceptance_probability() {
        let mut graph = ModelGraph::new();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut op = operator();
        assert_eq!(op.acceptance_probability(), 0.);
        assert_eq!(op.mean_deviation(), 0.);

        for deviation in [1., 2., 3.] {
            op.operate(&mut graph, &mut rng).unwrap();
            op.accept(deviation).unwrap();
        }
        op.operate(&mut graph, &mut rng).unwrap();
        op.reject().unwrap();

        assert_eq!(op.acceptance_probability(), 0.75);
        assert_eq!(op.operation_count(), 4);
        assert_eq!(op.mean_deviation(), 2.);
        assert_eq!(op.inner().accepted, vec![1., 2., 3.]);
        assert_eq!(op.inner().rejected, 1);
    }

    #[test]
    fn double_accept_fails() {
        let mut graph = ModelGraph::new();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut op = operator();
        op.operate(&mut graph, &mut rng).unwrap();
        op.accept(0.).unwrap();
        assert!(matches!(
            op.accept(0.),
            Err(GraphError::AcceptRejectWithoutOperate { .. })
        ));
        assert!(op.reject().is_err());
        assert_eq!(op.accept_count(), 1);
    }

    #[test]
    fn operate_while_pending_fails() {
        let mut graph = ModelGraph::new();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut op = operator();
        op.operate(&mut graph, &mut rng).unwrap();
        assert!(matches!(
            op.operate(&mut graph, &mut rng),
            Err(GraphError::OperatePending { .. })
        ));
        op.reject().unwrap();
        assert!(!op.is_pending());
    }

    #[test]
    fn reset_clears_counters() {
        let mut graph = ModelGraph::new();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut op = operator();
        op.set_accept_count(10);
        op.set_reject_count(30);
        op.set_sum_deviation(5.);
        op.add_evaluation_time(Duration::from_millis(40));
        assert_eq!(op.acceptance_probability(), 0.25);
        assert_eq!(op.mean_evaluation_time(), Duration::from_millis(1));

        op.operate(&mut graph, &mut rng).unwrap();
        op.reset();
        assert!(!op.is_pending());
        assert_eq!(op.operation_count(), 0);
        assert_eq!(op.sum_deviation(), 0.);
        assert_eq!(op.total_evaluation_time(), Duration::from_millis(40));
    }

    #[test]
    fn coercion_moves_towards_target() {
        let mut op = operator();
        op.set_accept_count(1);
        op.set_reject_count(2);
        let parameter = op.coerce(1.).unwrap();
        assert_eq!(parameter, (1. - 0.234) / 4.);
        assert_eq!(op.inner().log_scale, parameter);

        op.inner_mut().mode = CoercionMode::Off;
        assert_eq!(op.coerce(0.), None);
        assert_eq!(op.inner().log_scale, parameter);
    }

    #[test]
    fn suggestion_depends_on_acceptance() {
        let mut op = operator();
        assert_eq!(op.performance_suggestion(), "");
        op.set_reject_count(100);
        assert!(op.performance_suggestion().contains("too low"));
        op.set_accept_count(300);
        assert!(op.performance_suggestion().contains("too high"));
        op.set_accept_count(30);
        assert_eq!(op.performance_suggestion(), "");
    }

    #[test]
    fn targets_deserialize() {
        let targets: AcceptanceTargets = serde_json::from_str(
            r#"{"target": 0.44, "minimum": 0.05, "maximum": 0.6, "minimum_good": 0.2, "maximum_good": 0.5}"#,
        )
        .unwrap();
        assert_eq!(targets.target, 0.44);
        let op = operator().with_targets(targets);
        assert_eq!(op.targets().maximum, 0.6);
    }
}
