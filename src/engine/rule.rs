use rustc_hash::FxHashMap;

use super::errors::ActionError;

/// Result type of a rule action
pub type ActionResult<V> = Result<RuleOutput<V>, Box<dyn std::error::Error + Send + Sync>>;

/// Session variables copied in on activation (e.g. `baseline`)
pub type SessionVariables = FxHashMap<String, f64>;

/// How many values one firing of a rule may write under its output tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quantity {
    #[default]
    Single,
    Multiple,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInput {
    pub tag: &'static str,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableInput {
    pub name: &'static str,
    pub optional: bool,
}

/// Declarative metadata of a rule: what it reads, what it writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDescriptor {
    pub name: &'static str,
    pub inputs: Vec<TagInput>,
    pub session_variables: Vec<VariableInput>,
    pub output: &'static str,
    pub quantity: Quantity,
}

impl RuleDescriptor {
    pub fn new(name: &'static str, output: &'static str) -> Self {
        Self {
            name,
            inputs: Vec::new(),
            session_variables: Vec::new(),
            output,
            quantity: Quantity::Single,
        }
    }

    pub fn input(mut self, tag: &'static str) -> Self {
        self.inputs.push(TagInput { tag, optional: false });
        self
    }

    pub fn optional_input(mut self, tag: &'static str) -> Self {
        self.inputs.push(TagInput { tag, optional: true });
        self
    }

    pub fn variable(mut self, name: &'static str) -> Self {
        self.session_variables.push(VariableInput { name, optional: false });
        self
    }

    pub fn optional_variable(mut self, name: &'static str) -> Self {
        self.session_variables.push(VariableInput { name, optional: true });
        self
    }

    pub fn multiple(mut self) -> Self {
        self.quantity = Quantity::Multiple;
        self
    }
}

/// Values written by one firing of a rule
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutput<V> {
    Nothing,
    Single(V),
    Multiple(Vec<V>),
}

impl<V> RuleOutput<V> {
    pub fn into_values(self) -> Vec<V> {
        match self {
            RuleOutput::Nothing => Vec::new(),
            RuleOutput::Single(value) => vec![value],
            RuleOutput::Multiple(values) => values,
        }
    }
}

/// A unit of analysis scheduled by the rule graph
pub trait Rule<V>: Send + Sync {
    /// Queried once at registration
    fn descriptor(&self) -> RuleDescriptor;

    /// Gate evaluated after all required inputs are bound
    fn condition(&self, _input: &RuleInput<'_, V>) -> bool {
        true
    }

    fn action(&self, input: &RuleInput<'_, V>) -> ActionResult<V>;
}

/// Inputs bound for one firing of a rule
pub struct RuleInput<'a, V> {
    pub(super) root: &'a V,
    pub(super) tags: Vec<(&'static str, Option<&'a V>)>,
    pub(super) variables: &'a SessionVariables,
}

impl<'a, V> RuleInput<'a, V> {
    /// Binds inputs by hand, for firing a rule outside a session
    pub fn new(
        root: &'a V,
        tags: Vec<(&'static str, Option<&'a V>)>,
        variables: &'a SessionVariables,
    ) -> Self {
        Self {
            root,
            tags,
            variables,
        }
    }

    /// The fact the session was activated with
    pub fn root(&self) -> &'a V {
        self.root
    }

    /// Bound value of a declared input; `None` for absent optional inputs
    pub fn tag(&self, tag: &str) -> Option<&'a V> {
        self.tags
            .iter()
            .find(|(name, _)| *name == tag)
            .and_then(|(_, value)| *value)
    }

    pub fn require(&self, tag: &str) -> Result<&'a V, ActionError> {
        self.tag(tag)
            .ok_or_else(|| ActionError::MissingInput(tag.to_string()))
    }

    pub fn variable(&self, name: &str) -> Option<f64> {
        self.variables.get(name).copied()
    }

    pub fn require_variable(&self, name: &str) -> Result<f64, ActionError> {
        self.variable(name)
            .ok_or_else(|| ActionError::MissingSessionVariable(name.to_string()))
    }
}
