use rand::{Rng, RngCore};
use rand_distr::Uniform;

use crate::{
    bounds::Bounds,
    error::{GraphError, Result},
    graph::ModelGraph,
    operator::{AcceptanceTargets, Coercable, CoercionMode, Operate, OperatorStats, Proposal},
    variable::VariableId,
};

/// Adds `U(-window, window)` to one uniformly chosen entry of a variable.
///
/// The move is symmetric, so its log Hastings ratio is zero. Proposals that
/// leave the variable's bounds are reported as infeasible and leave the
/// graph untouched.
#[derive(Debug, Clone)]
pub struct RandomWalkOperator {
    variable: VariableId,
    window: f64,
    mode: CoercionMode,
}

impl RandomWalkOperator {
    pub fn new(variable: VariableId, window: f64, mode: CoercionMode) -> Self {
        Self {
            variable,
            window,
            mode,
        }
    }

    pub fn variable(&self) -> VariableId {
        self.variable
    }

    pub fn window(&self) -> f64 {
        self.window
    }
}

impl Operate for RandomWalkOperator {
    fn operate(&mut self, graph: &mut ModelGraph, rng: &mut dyn RngCore) -> Result<Proposal> {
        let node = graph.variable(self.variable);
        let index = rng.random_range(0..node.dimension());
        let window = Uniform::new_inclusive(-self.window, self.window)
            .map_err(|err| GraphError::evaluation(node.name(), err))?;
        let step = rng.sample(window);
        let value = node.value(index)? + step;

        if !node.bounds().in_bounds(index, value) {
            return Ok(Proposal::Infeasible {
                reason: format!("{}[{}] = {} is out of bounds", node, index, value),
            });
        }

        graph.set_value(self.variable, index, value)?;
        Ok(Proposal::Proposed {
            log_hastings_ratio: 0.,
        })
    }

    fn performance_suggestion(&self, stats: &OperatorStats, targets: &AcceptanceTargets) -> String {
        let acceptance = stats.acceptance_probability();
        if stats.operation_count() == 0 {
            String::new()
        } else if acceptance < targets.minimum {
            format!("Try decreasing window size to about {:.4}", self.window / 2.)
        } else if acceptance > targets.maximum {
            format!("Try increasing window size to about {:.4}", self.window * 2.)
        } else {
            String::new()
        }
    }

    fn as_coercable(&mut self) -> Option<&mut dyn Coercable> {
        Some(self)
    }
}

impl Coercable for RandomWalkOperator {
    fn coercable_parameter(&self) -> f64 {
        self.window.ln()
    }

    fn set_coercable_parameter(&mut self, value: f64) {
        self.window = value.exp();
    }

    fn raw_parameter(&self) -> f64 {
        self.window
    }

    fn mode(&self) -> CoercionMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bounds::RealBounds, operator::Operator};
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn moves_stay_within_window() {
        let mut graph = ModelGraph::new();
        let x = graph.new_variable_filled("x", 3, 5.).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut op = RandomWalkOperator::new(x, 0.5, CoercionMode::Default);

        for _ in 0..100 {
            let proposal = op.operate(&mut graph, &mut rng).unwrap();
            assert_eq!(
                proposal,
                Proposal::Proposed {
                    log_hastings_ratio: 0.
                }
            );
            let changed = graph
                .variable(x)
                .values()
                .iter()
                .zip(graph.variable(x).stored_values())
                .filter(|(a, b)| a != b)
                .count();
            assert!(changed <= 1);
            for &value in graph.variable(x).values() {
                assert!((value - 5.).abs() <= 0.5);
            }
            graph.restore_variable_values(x);
        }
    }

    #[test]
    fn out_of_bounds_is_infeasible() {
        let mut graph = ModelGraph::new();
        let x = graph.new_variable_filled("x", 1, 0.).unwrap();
        graph
            .add_bounds(x, Box::new(RealBounds::uniform(1, 0., 0.).unwrap()))
            .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut op = RandomWalkOperator::new(x, 1., CoercionMode::Off);

        let proposal = op.operate(&mut graph, &mut rng).unwrap();
        assert!(!proposal.is_feasible());
        assert_eq!(graph.variable(x).values(), &[0.]);
    }

    #[test]
    fn positive_variable_stays_positive() {
        let mut graph = ModelGraph::new();
        let x = graph.new_variable_filled("x", 2, 0.1).unwrap();
        graph
            .add_bounds(x, Box::new(RealBounds::lower_only(&[0., 0.]).unwrap()))
            .unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut op = RandomWalkOperator::new(x, 1., CoercionMode::Off);

        let mut infeasible = 0;
        for _ in 0..200 {
            if !op.operate(&mut graph, &mut rng).unwrap().is_feasible() {
                infeasible += 1;
            }
            assert!(graph.variable(x).values().iter().all(|&value| value >= 0.));
        }
        assert!(infeasible > 0);
    }

    #[test]
    fn coerces_log_window() {
        let mut op = Operator::new(
            "walk",
            2.,
            RandomWalkOperator::new(VariableId(0), 1., CoercionMode::On),
        )
        .unwrap();
        let log_window = op.coerce(0.234 + 0.5).unwrap();
        assert_relative_eq!(log_window, 0.5);
        assert_relative_eq!(op.inner().window(), 0.5f64.exp());
        assert_relative_eq!(op.inner_mut().as_coercable().unwrap().raw_parameter(), 0.5f64.exp());
    }

    #[test]
    fn suggestion_names_window() {
        let op = RandomWalkOperator::new(VariableId(0), 1., CoercionMode::On);
        let stats = OperatorStats {
            reject_count: 10,
            ..Default::default()
        };
        assert_eq!(
            op.performance_suggestion(&stats, &AcceptanceTargets::default()),
            "Try decreasing window size to about 0.5000"
        );
    }
}
