use thiserror::Error;

/// Raised while registering rules; fatal at startup
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleDefinitionError {
    #[error("Rule '{rule}' declares no input tags")]
    NoInputs { rule: String },

    #[error("Rule '{rule}' requires tag '{tag}' but no rule produces it")]
    MissingProducer { rule: String, tag: String },

    #[error("Rules form a dependency cycle: {}", rules.join(" -> "))]
    Cycle { rules: Vec<String> },

    #[error("Rule '{rule}' declares '{name}' both as tag input and as session variable")]
    ConflictingDeclaration { rule: String, name: String },

    #[error("Rule '{rule}' declares input '{name}' more than once")]
    DuplicateInput { rule: String, name: String },

    #[error("Rule name '{0}' is registered twice")]
    DuplicateRuleName(String),

    #[error("Rule '{rule}' writes the root tag '{tag}'")]
    WritesRootTag { rule: String, tag: String },
}

/// Session lifecycle position, reported by [`SessionError::IllegalState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Activated,
    Processed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "IDLE"),
            SessionState::Activated => write!(f, "ACTIVATED"),
            SessionState::Processed => write!(f, "PROCESSED"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Cannot {operation} a session in state {state}")]
    IllegalState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("Rule '{rule}' failed: {source}")]
    RuleExecution {
        rule: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl SessionError {
    /// Name of the failing rule, if the error came from a rule action
    pub fn rule(&self) -> Option<&str> {
        match self {
            SessionError::RuleExecution { rule, .. } => Some(rule.as_str()),
            SessionError::IllegalState { .. } => None,
        }
    }
}

/// Engine-side faults raised while a rule is bound or its output stored
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("Session variable '{0}' is not set")]
    MissingSessionVariable(String),

    #[error("Input tag '{0}' is not bound")]
    MissingInput(String),

    #[error("Rule declared a single '{tag}' value but produced {produced}")]
    UnexpectedQuantity { tag: String, produced: usize },
}
