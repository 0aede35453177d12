//! Values that a chain logger can pull from the graph.
//!
//! Formatting and writing the columns is the host's job.

use crate::{error::Result, graph::ModelGraph, likelihood::LikelihoodId, variable::VariableId};

#[derive(Debug, Clone, PartialEq)]
pub struct LogColumn {
    pub label: String,
    pub value: f64,
}

impl LogColumn {
    pub fn new(label: impl Into<String>, value: f64) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

/// Something with loggable columns.
pub trait Loggable {
    fn columns(&self, graph: &ModelGraph) -> Result<Vec<LogColumn>>;
}

/// One column per entry, labelled `name[i]` with a zero-based index.
impl Loggable for VariableId {
    fn columns(&self, graph: &ModelGraph) -> Result<Vec<LogColumn>> {
        let node = graph.variable(*self);
        Ok(node
            .values()
            .iter()
            .enumerate()
            .map(|(i, &value)| LogColumn::new(format!("{}[{}]", node.name(), i), value))
            .collect())
    }
}

/// The log-likelihood, recomputed if it is not known.
impl Loggable for LikelihoodId {
    fn columns(&self, graph: &ModelGraph) -> Result<Vec<LogColumn>> {
        let node = graph.likelihood(*self);
        let label = node.identifier().unwrap_or(node.name()).to_string();
        Ok(vec![LogColumn::new(label, graph.log_likelihood(*self)?)])
    }
}
