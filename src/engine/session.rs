use std::sync::Arc;

use tracing::{debug, trace};

use super::errors::{ActionError, SessionError, SessionState};
use super::facts::{FactStore, TagId};
use super::graph::{RuleGraph, ScheduledRule};
use super::rule::{Quantity, RuleInput, SessionVariables};

/// Turns the facts of a processed session into a result value
pub trait SessionResultCollector<V> {
    type Output;

    fn collect(&self, facts: &FactStore<V>) -> Self::Output;
}

/// Reusable execution context bound to one rule graph
///
/// Lifecycle: `activate` -> `call` -> `passivate`, then again. The fact store
/// and variable map are cleared, not dropped, on passivation.
pub struct Session<V> {
    graph: Arc<RuleGraph<V>>,
    state: SessionState,
    facts: FactStore<V>,
    variables: SessionVariables,
}

impl<V> Session<V> {
    pub fn new(graph: Arc<RuleGraph<V>>) -> Self {
        Self {
            graph,
            state: SessionState::Idle,
            facts: FactStore::new(),
            variables: SessionVariables::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn graph(&self) -> &Arc<RuleGraph<V>> {
        &self.graph
    }

    pub fn facts(&self) -> &FactStore<V> {
        &self.facts
    }

    /// Seeds the root fact and copies the session variables
    pub fn activate(&mut self, root: V, variables: &SessionVariables) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::IllegalState {
                operation: "activate",
                state: self.state,
            });
        }
        self.variables
            .extend(variables.iter().map(|(name, value)| (name.clone(), *value)));
        self.facts.insert(self.graph.root_tag(), root, None);
        self.state = SessionState::Activated;
        Ok(())
    }

    /// Fires every eligible rule in topological order
    pub fn call(&mut self) -> Result<&FactStore<V>, SessionError> {
        if self.state != SessionState::Activated {
            return Err(SessionError::IllegalState {
                operation: "call",
                state: self.state,
            });
        }
        self.state = SessionState::Processed;

        let graph = Arc::clone(&self.graph);
        for scheduled in graph.rules() {
            let fired = self.fire(scheduled)?;
            trace!(rule = scheduled.name(), fired, "Rule evaluated");
        }

        debug!(facts = self.facts.len(), "Session call completed");
        Ok(&self.facts)
    }

    /// Returns the session to idle, ready for the next activation
    pub fn passivate(&mut self) {
        self.facts.clear();
        self.variables.clear();
        self.state = SessionState::Idle;
    }

    /// Runs one rule for every binding of its anchor tag; returns the firing count
    fn fire(&mut self, scheduled: &ScheduledRule<V>) -> Result<usize, SessionError> {
        let anchors: Vec<TagId> = self.facts.ids(scheduled.anchor()).to_vec();
        let mut fired = 0;

        for anchor in anchors {
            let values = {
                let Some(input) = self.bind(scheduled, anchor) else {
                    continue;
                };
                if let Some(missing) = scheduled
                    .descriptor()
                    .session_variables
                    .iter()
                    .find(|variable| !variable.optional && input.variable(variable.name).is_none())
                {
                    return Err(execution_error(
                        scheduled,
                        ActionError::MissingSessionVariable(missing.name.to_string()),
                    ));
                }
                if !scheduled.rule.condition(&input) {
                    continue;
                }
                scheduled
                    .rule
                    .action(&input)
                    .map_err(|source| SessionError::RuleExecution {
                        rule: scheduled.name().to_string(),
                        source,
                    })?
                    .into_values()
            };
            fired += 1;

            let descriptor = scheduled.descriptor();
            if descriptor.quantity == Quantity::Single && values.len() > 1 {
                return Err(execution_error(
                    scheduled,
                    ActionError::UnexpectedQuantity {
                        tag: descriptor.output.to_string(),
                        produced: values.len(),
                    },
                ));
            }
            for value in values {
                self.facts.insert(descriptor.output, value, Some(anchor));
            }
        }
        Ok(fired)
    }

    /// Resolves every declared input along the lineage of `anchor`
    fn bind(&self, scheduled: &ScheduledRule<V>, anchor: TagId) -> Option<RuleInput<'_, V>> {
        let root = &self.facts.root()?.value;
        let mut tags = Vec::with_capacity(scheduled.descriptor().inputs.len());
        for input in &scheduled.descriptor().inputs {
            let bound = self
                .facts
                .find_in_lineage(anchor, input.tag)
                .or_else(|| {
                    // optional inputs off the lineage fall back to the first stored value
                    input
                        .optional
                        .then(|| self.facts.tags(input.tag).next())
                        .flatten()
                })
                .map(|tag| &tag.value);
            if bound.is_none() && !input.optional {
                return None;
            }
            tags.push((input.tag, bound));
        }
        Some(RuleInput {
            root,
            tags,
            variables: &self.variables,
        })
    }
}

fn execution_error<V>(scheduled: &ScheduledRule<V>, error: ActionError) -> SessionError {
    SessionError::RuleExecution {
        rule: scheduled.name().to_string(),
        source: Box::new(error),
    }
}
