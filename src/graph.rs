//! The arena that owns every variable, model and likelihood.
//!
//! Nodes address each other through copyable handles, and listener
//! relationships are stored as handle lists on the node being listened to.
//! Events are dispatched by walking those lists in registration order,
//! synchronously, before the mutating call returns.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::{
    bounds::Bounds,
    compound::{CompoundLikelihood, CompoundSettings},
    error::{GraphError, Result},
    likelihood::{LikelihoodFunction, LikelihoodId, LikelihoodKind, LikelihoodNode},
    model::{ChangeListener, ModelChange, ModelId, ModelNode, ModelState, Stateless},
    variable::{ChangeKind, VariableChange, VariableId, VariableNode},
};

#[derive(Debug, Default)]
pub struct ModelGraph {
    variables: Vec<VariableNode>,
    models: Vec<ModelNode>,
    likelihoods: Vec<LikelihoodNode>,
}

impl ModelGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new variable with every entry set to zero.
    pub fn new_variable(&mut self, name: &str, dimension: usize) -> Result<VariableId> {
        self.new_variable_with_values(name, &vec![0.; dimension])
    }

    pub fn new_variable_filled(
        &mut self,
        name: &str,
        dimension: usize,
        value: f64,
    ) -> Result<VariableId> {
        self.new_variable_with_values(name, &vec![value; dimension])
    }

    pub fn new_variable_with_values(&mut self, name: &str, values: &[f64]) -> Result<VariableId> {
        let node = VariableNode::new(name, values.to_vec())?;
        self.variables.push(node);
        Ok(VariableId(self.variables.len() - 1))
    }

    /// A model without state of its own.
    pub fn new_model(&mut self, name: &str) -> ModelId {
        self.new_model_with_state(name, Box::new(Stateless))
    }

    pub fn new_model_with_state(&mut self, name: &str, state: Box<dyn ModelState>) -> ModelId {
        self.models.push(ModelNode::new(name, state));
        ModelId(self.models.len() - 1)
    }

    /// A stateless model aggregating `models`.
    pub fn new_compound_model(&mut self, name: &str, models: &[ModelId]) -> Result<ModelId> {
        let model = self.new_model(name);
        self.add_models(model, models)?;
        Ok(model)
    }

    /// A likelihood over `models`, computed by `function`.
    ///
    /// The likelihood gets a private aggregate model named `{name}Model`
    /// containing `models`, and listens to it for changes and stores.
    pub fn new_likelihood(
        &mut self,
        name: &str,
        models: &[ModelId],
        function: impl LikelihoodFunction + 'static,
    ) -> Result<LikelihoodId> {
        let early = function.evaluate_early();
        let function: Box<dyn LikelihoodFunction> = Box::new(function);
        let kind = LikelihoodKind::Function(Mutex::new(function));
        self.insert_likelihood(name, models, early, kind)
    }

    /// The product of `likelihoods`.
    ///
    /// With `settings.unroll`, nested compound likelihoods are replaced by
    /// their children. A likelihood reachable through several paths is only
    /// kept once.
    pub fn new_compound_likelihood(
        &mut self,
        name: &str,
        settings: CompoundSettings,
        likelihoods: &[LikelihoodId],
    ) -> Result<LikelihoodId> {
        if likelihoods.is_empty() {
            return Err(GraphError::EmptyCompound {
                likelihood: name.to_string(),
            });
        }

        let mut children = Vec::new();
        for &likelihood in likelihoods {
            self.collect_children(likelihood, settings.unroll, &mut children);
        }
        let children = children
            .into_iter()
            .map(|child| (child, self.likelihood(child).evaluate_early()))
            .collect::<Vec<_>>();

        let compound = CompoundLikelihood::new(name, children, &settings)?;
        let early = !compound.early().is_empty();
        let models = likelihoods
            .iter()
            .map(|&likelihood| self.likelihood(likelihood).model())
            .collect::<Vec<_>>();
        self.insert_likelihood(name, &models, early, LikelihoodKind::Compound(compound))
    }

    fn collect_children(
        &self,
        likelihood: LikelihoodId,
        unroll: bool,
        children: &mut Vec<LikelihoodId>,
    ) {
        match self.likelihood(likelihood).likelihoods() {
            Some(nested) if unroll => {
                for &child in nested {
                    self.collect_children(child, unroll, children);
                }
            }
            _ => {
                if !children.contains(&likelihood) {
                    children.push(likelihood);
                }
            }
        }
    }

    fn insert_likelihood(
        &mut self,
        name: &str,
        models: &[ModelId],
        early: bool,
        kind: LikelihoodKind,
    ) -> Result<LikelihoodId> {
        let id = LikelihoodId(self.likelihoods.len());
        let model = self.new_compound_model(&format!("{}Model", name), models)?;
        self.add_change_listener(model, ChangeListener::Likelihood(id))?;
        self.add_store_listener(model, id);
        self.likelihoods
            .push(LikelihoodNode::new(name, model, early, kind));
        Ok(id)
    }

    pub fn variable(&self, variable: VariableId) -> &VariableNode {
        &self.variables[variable.0]
    }

    pub fn model(&self, model: ModelId) -> &ModelNode {
        &self.models[model.0]
    }

    pub fn likelihood(&self, likelihood: LikelihoodId) -> &LikelihoodNode {
        &self.likelihoods[likelihood.0]
    }

    pub(crate) fn likelihood_mut(&mut self, likelihood: LikelihoodId) -> &mut LikelihoodNode {
        &mut self.likelihoods[likelihood.0]
    }

    pub fn variable_ids(&self) -> impl Iterator<Item = VariableId> {
        (0..self.variables.len()).map(VariableId)
    }

    pub fn model_ids(&self) -> impl Iterator<Item = ModelId> {
        (0..self.models.len()).map(ModelId)
    }

    pub fn likelihood_ids(&self) -> impl Iterator<Item = LikelihoodId> {
        (0..self.likelihoods.len()).map(LikelihoodId)
    }

    pub fn set_variable_identifier(&mut self, variable: VariableId, identifier: &str) {
        self.variables[variable.0].set_identifier(identifier);
    }

    pub fn set_model_identifier(&mut self, model: ModelId, identifier: &str) {
        self.models[model.0].set_identifier(identifier);
    }

    pub fn set_likelihood_identifier(&mut self, likelihood: LikelihoodId, identifier: &str) {
        self.likelihoods[likelihood.0].set_identifier(identifier);
    }

    /// Marks a likelihood as used by the chain.
    pub fn set_likelihood_used(&mut self, likelihood: LikelihoodId) {
        self.likelihoods[likelihood.0].set_used();
    }

    /// Adds a sub-model. Adding a model that is already a direct child does
    /// nothing; adding one that would make the tree cyclic fails.
    pub fn add_model(&mut self, parent: ModelId, child: ModelId) -> Result<()> {
        if self.models[parent.0].models.contains(&child) {
            return Ok(());
        }
        if parent == child || self.contains_model(child, parent) {
            return Err(GraphError::ModelCycle {
                parent: self.models[parent.0].to_string(),
                child: self.models[child.0].to_string(),
            });
        }
        self.add_change_listener(child, ChangeListener::Model(parent))?;
        self.models[parent.0].models.push(child);
        Ok(())
    }

    pub fn add_models(&mut self, parent: ModelId, children: &[ModelId]) -> Result<()> {
        children
            .iter()
            .try_for_each(|&child| self.add_model(parent, child))
    }

    pub fn remove_model(&mut self, parent: ModelId, child: ModelId) {
        self.models[parent.0].models.retain(|&m| m != child);
        self.remove_change_listener(child, ChangeListener::Model(parent));
    }

    /// Adds a variable unless it is already somewhere in the model's subtree.
    pub fn add_variable(&mut self, model: ModelId, variable: VariableId) {
        if !self.has_variable(model, variable) {
            self.models[model.0].variables.push(variable);
            self.add_variable_listener(variable, model);
        }
    }

    pub fn remove_variable(&mut self, model: ModelId, variable: VariableId) {
        self.models[model.0].variables.retain(|&v| v != variable);
        self.remove_variable_listener(variable, model);
    }

    pub fn add_variable_listener(&mut self, variable: VariableId, model: ModelId) {
        let listeners = &mut self.variables[variable.0].listeners;
        if !listeners.contains(&model) {
            listeners.push(model);
        }
    }

    pub fn remove_variable_listener(&mut self, variable: VariableId, model: ModelId) {
        self.variables[variable.0].listeners.retain(|&m| m != model);
    }

    /// Registers a change listener. A model listener whose own change events
    /// already reach `model` would forward events in a loop and is rejected.
    pub fn add_change_listener(&mut self, model: ModelId, listener: ChangeListener) -> Result<()> {
        if let ChangeListener::Model(parent) = listener {
            if parent == model || self.forwards_to(parent, model) {
                return Err(GraphError::ModelCycle {
                    parent: self.models[parent.0].to_string(),
                    child: self.models[model.0].to_string(),
                });
            }
        }
        let listeners = &mut self.models[model.0].change_listeners;
        if !listeners.contains(&listener) {
            listeners.push(listener);
        }
        Ok(())
    }

    pub fn remove_change_listener(&mut self, model: ModelId, listener: ChangeListener) {
        self.models[model.0]
            .change_listeners
            .retain(|&l| l != listener);
    }

    pub fn add_store_listener(&mut self, model: ModelId, likelihood: LikelihoodId) {
        let listeners = &mut self.models[model.0].store_listeners;
        if !listeners.contains(&likelihood) {
            listeners.push(likelihood);
        }
    }

    pub fn remove_store_listener(&mut self, model: ModelId, likelihood: LikelihoodId) {
        self.models[model.0]
            .store_listeners
            .retain(|&l| l != likelihood);
    }

    pub fn add_bounds(&mut self, variable: VariableId, bounds: Box<dyn Bounds<f64>>) -> Result<()> {
        self.variables[variable.0].add_bounds(bounds)
    }

    /// Whether `variable` is a direct child of `model` or of any model in
    /// its subtree.
    pub fn has_variable(&self, model: ModelId, variable: VariableId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![model];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let node = &self.models[current.0];
            if node.variables.contains(&variable) {
                return true;
            }
            stack.extend(node.models.iter().copied());
        }
        false
    }

    /// Whether change events of `source` reach `target` through model
    /// listeners.
    fn forwards_to(&self, source: ModelId, target: ModelId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![source];
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if visited.insert(current) {
                stack.extend(self.models[current.0].change_listeners.iter().filter_map(
                    |listener| match listener {
                        ChangeListener::Model(model) => Some(*model),
                        ChangeListener::Likelihood(_) => None,
                    },
                ));
            }
        }
        false
    }

    fn contains_model(&self, root: ModelId, target: ModelId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if visited.insert(current) {
                stack.extend(self.models[current.0].models.iter().copied());
            }
        }
        false
    }

    pub fn set_value(&mut self, variable: VariableId, index: usize, value: f64) -> Result<()> {
        self.variables[variable.0].write_value(index, value)?;
        self.fire_variable_changed(variable, ChangeKind::Value(index));
        Ok(())
    }

    pub fn set_values(&mut self, variable: VariableId, values: &[f64]) -> Result<()> {
        self.variables[variable.0].write_values(values)?;
        self.fire_variable_changed(variable, ChangeKind::AllValues);
        Ok(())
    }

    pub fn fill(&mut self, variable: VariableId, value: f64) -> Result<()> {
        self.set_all(variable, |_| value)
    }

    pub fn set_all(&mut self, variable: VariableId, generator: impl FnMut(usize) -> f64) -> Result<()> {
        let values = (0..self.variables[variable.0].dimension())
            .map(generator)
            .collect::<Vec<_>>();
        self.set_values(variable, &values)
    }

    pub fn store_variable_values(&mut self, variable: VariableId) {
        self.variables[variable.0].store_values();
    }

    /// Returns the variable to its last stored values. No change event is
    /// fired; listeners restore their own state from the matching store.
    pub fn restore_variable_values(&mut self, variable: VariableId) {
        self.variables[variable.0].restore_values();
    }

    /// Notifies every listening model, which forwards the change up the tree.
    pub fn fire_variable_changed(&mut self, variable: VariableId, kind: ChangeKind) {
        let change = VariableChange { variable, kind };
        for i in 0..self.variables[variable.0].listeners.len() {
            let model = self.variables[variable.0].listeners[i];
            self.models[model.0].state.handle_variable_changed(&change);
            self.fire_model_changed(model, ModelChange::Variable(change));
        }
    }

    /// Passes `change` unchanged to the model's change listeners.
    pub fn fire_model_changed(&mut self, model: ModelId, change: ModelChange) {
        for i in 0..self.models[model.0].change_listeners.len() {
            match self.models[model.0].change_listeners[i] {
                ChangeListener::Model(parent) => self.fire_model_changed(parent, change),
                ChangeListener::Likelihood(likelihood) => {
                    tracing::trace!(
                        likelihood = %self.likelihoods[likelihood.0].name(),
                        ?change,
                        "likelihood invalidated"
                    );
                    self.likelihoods[likelihood.0].set_unknown();
                }
            }
        }
    }

    /// Stores the whole subtree: child models first, then child variables,
    /// then the model's own state, then the store listeners.
    pub fn store_state(&mut self, model: ModelId) {
        for i in 0..self.models[model.0].models.len() {
            let child = self.models[model.0].models[i];
            self.store_state(child);
        }
        for i in 0..self.models[model.0].variables.len() {
            let variable = self.models[model.0].variables[i];
            self.variables[variable.0].store_values();
        }
        self.models[model.0].state.store_model_state();
        for i in 0..self.models[model.0].store_listeners.len() {
            let likelihood = self.models[model.0].store_listeners[i];
            self.likelihoods[likelihood.0].model_stored();
        }
        tracing::debug!(model = %self.models[model.0], "stored model state");
    }

    /// Mirror of [`ModelGraph::store_state`].
    pub fn restore_state(&mut self, model: ModelId) {
        for i in 0..self.models[model.0].models.len() {
            let child = self.models[model.0].models[i];
            self.restore_state(child);
        }
        for i in 0..self.models[model.0].variables.len() {
            let variable = self.models[model.0].variables[i];
            self.variables[variable.0].restore_values();
        }
        self.models[model.0].state.restore_model_state();
        for i in 0..self.models[model.0].store_listeners.len() {
            let likelihood = self.models[model.0].store_listeners[i];
            self.likelihoods[likelihood.0].model_restored();
        }
        tracing::debug!(model = %self.models[model.0], "restored model state");
    }
}
