//! Aggregating nodes of the likelihood graph.
//!
//! A model owns an ordered, de-duplicated set of child models and child
//! variables. Change events from anywhere in its subtree are forwarded to
//! its own change listeners, and `store_state`/`restore_state` recurse into
//! the subtree before notifying its store listeners.

use std::fmt::{self, Display};

use crate::{likelihood::LikelihoodId, variable::VariableChange, variable::VariableId};

/// Handle of a model inside a [`crate::ModelGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(pub(crate) usize);

/// What a model reports to its change listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelChange {
    /// A variable somewhere in the subtree was mutated.
    Variable(VariableChange),
    /// The model itself changed in a way not tied to a single variable.
    Model(ModelId),
}

/// Receivers of a model's change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeListener {
    /// A parent model, which forwards the event unchanged.
    Model(ModelId),
    /// A likelihood, which becomes unknown.
    Likelihood(LikelihoodId),
}

/// Model specific state that is stored and restored with the model.
///
/// Sub-models and child variables are handled by the graph; this hook only
/// sees what lives outside of them. The default model keeps nothing.
pub trait ModelState: Send + Sync {
    fn store_model_state(&mut self) {}

    /// After this call the extra state must coincide with the last
    /// `store_model_state`.
    fn restore_model_state(&mut self) {}

    fn handle_variable_changed(&mut self, _change: &VariableChange) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Stateless;

impl ModelState for Stateless {}

pub struct ModelNode {
    name: String,
    identifier: Option<String>,
    pub(crate) models: Vec<ModelId>,
    pub(crate) variables: Vec<VariableId>,
    pub(crate) change_listeners: Vec<ChangeListener>,
    pub(crate) store_listeners: Vec<LikelihoodId>,
    pub(crate) state: Box<dyn ModelState>,
}

impl ModelNode {
    pub(crate) fn new(name: &str, state: Box<dyn ModelState>) -> Self {
        ModelNode {
            name: name.to_string(),
            identifier: None,
            models: Vec::new(),
            variables: Vec::new(),
            change_listeners: Vec::new(),
            store_listeners: Vec::new(),
            state,
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

    /// Direct child models in registration order.
    pub fn models(&self) -> &[ModelId] {
        &self.models
    }

    /// Direct child variables in registration order.
    pub fn variables(&self) -> &[VariableId] {
        &self.variables
    }

    pub fn change_listeners(&self) -> &[ChangeListener] {
        &self.change_listeners
    }

    pub fn store_listeners(&self) -> &[LikelihoodId] {
        &self.store_listeners
    }

    /// A model nobody listens to can skip work.
    pub fn is_used(&self) -> bool {
        self.change_listeners.len() + self.store_listeners.len() > 0
    }
}

impl fmt::Debug for ModelNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelNode")
            .field("name", &self.name)
            .field("identifier", &self.identifier)
            .field("models", &self.models)
            .field("variables", &self.variables)
            .field("change_listeners", &self.change_listeners)
            .field("store_listeners", &self.store_listeners)
            .finish_non_exhaustive()
    }
}

impl Display for ModelNode {
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
    use pretty_assertions::assert_eq;

    #[test]
    fn used_once_listened_to() {
        let mut node = ModelNode::new("tree", Box::new(Stateless));
        assert!(!node.is_used());
        node.store_listeners.push(LikelihoodId(0));
        assert!(node.is_used());
    }

    #[test]
    fn display_includes_identifier() {
        let mut node = ModelNode::new("clock", Box::new(Stateless));
        node.set_identifier("strict");
        assert_eq!(node.to_string(), "clock[strict]");
    }
}
