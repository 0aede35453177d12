use std::fmt::{self, Display};

use crate::{
    bounds::{Bounds, IntersectionBounds},
    checkpoint::Checkpoint,
    error::{GraphError, Result},
    model::ModelId,
};

/// Handle of a variable inside a [`crate::ModelGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A single entry changed.
    Value(usize),
    /// The whole vector was replaced.
    AllValues,
}

/// Payload of a variable mutation as seen by listening models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableChange {
    pub variable: VariableId,
    pub kind: ChangeKind,
}

/// A real-valued random variable of fixed dimension.
///
/// Values are only mutated through the owning graph, which notifies the
/// listening models before the mutating call returns.
#[derive(Debug)]
pub struct VariableNode {
    name: String,
    identifier: Option<String>,
    values: Checkpoint<Vec<f64>>,
    bounds: IntersectionBounds<f64>,
    pub(crate) listeners: Vec<ModelId>,
}

impl VariableNode {
    pub(crate) fn new(name: &str, values: Vec<f64>) -> Result<Self> {
        if values.is_empty() {
            return Err(GraphError::ZeroDimension {
                variable: name.to_string(),
            });
        }
        let dimension = values.len();
        Ok(VariableNode {
            name: name.to_string(),
            identifier: None,
            values: Checkpoint::new(values),
            bounds: IntersectionBounds::new(dimension, f64::NEG_INFINITY, f64::INFINITY),
            listeners: Vec::new(),
        })
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

    pub fn dimension(&self) -> usize {
        self.values.get().len()
    }

    pub fn value(&self, index: usize) -> Result<f64> {
        self.check_index(index)?;
        Ok(self.values.get()[index])
    }

    pub fn values(&self) -> &[f64] {
        self.values.get()
    }

    pub fn stored_values(&self) -> &[f64] {
        self.values.stored()
    }

    pub fn bounds(&self) -> &IntersectionBounds<f64> {
        &self.bounds
    }

    /// The models notified when this variable changes, in registration order.
    pub fn listeners(&self) -> &[ModelId] {
        &self.listeners
    }

    pub(crate) fn add_bounds(&mut self, bounds: Box<dyn Bounds<f64>>) -> Result<()> {
        self.bounds.add_bounds(bounds)
    }

    pub(crate) fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.dimension() {
            return Err(GraphError::IndexOutOfRange {
                variable: self.name.clone(),
                index,
                dimension: self.dimension(),
            });
        }
        Ok(())
    }

    pub(crate) fn write_value(&mut self, index: usize, value: f64) -> Result<()> {
        self.check_index(index)?;
        self.values.get_mut()[index] = value;
        Ok(())
    }

    pub(crate) fn write_values(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.dimension() {
            return Err(GraphError::DimensionMismatch {
                variable: self.name.clone(),
                expected: self.dimension(),
                found: values.len(),
            });
        }
        self.values.get_mut().copy_from_slice(values);
        Ok(())
    }

    pub(crate) fn store_values(&mut self) {
        self.values.store();
    }

    pub(crate) fn restore_values(&mut self) {
        self.values.restore();
    }
}

impl Display for VariableNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identifier {
            Some(identifier) => write!(f, "{}[{}]", self.name, identifier),
            None => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::RealBounds;
    use pretty_assertions::assert_eq;

    #[test]
    fn zero_dimension_is_rejected() {
        let err = VariableNode::new("empty", vec![]).unwrap_err();
        assert!(matches!(err, GraphError::ZeroDimension { .. }));
    }

    #[test]
    fn writes_check_shape() {
        let mut node = VariableNode::new("x", vec![0.; 3]).unwrap();
        assert!(matches!(
            node.write_value(3, 1.),
            Err(GraphError::IndexOutOfRange {
                index: 3,
                dimension: 3,
                ..
            })
        ));
        assert!(matches!(
            node.write_values(&[1., 2.]),
            Err(GraphError::DimensionMismatch {
                expected: 3,
                found: 2,
                ..
            })
        ));
        assert_eq!(node.values(), &[0.; 3]);
    }

    #[test]
    fn bounds_start_unbounded() {
        let mut node = VariableNode::new("x", vec![0.5]).unwrap();
        assert_eq!(node.bounds().lower_limit(0), f64::NEG_INFINITY);
        node.add_bounds(Box::new(RealBounds::uniform(1, 0., 1.).unwrap()))
            .unwrap();
        assert_eq!(node.bounds().lower_limit(0), 0.);
        assert_eq!(node.bounds().upper_limit(0), 1.);
    }

    #[test]
    fn display_includes_identifier() {
        let mut node = VariableNode::new("kappa", vec![1.]).unwrap();
        assert_eq!(node.to_string(), "kappa");
        node.set_identifier("k1");
        assert_eq!(node.to_string(), "kappa[k1]");
    }
}
