//! Root-cause diagnosis rules
//!
//! Five analysis steps narrow a slow request down to its culprit:
//! global context, time-wasting operations, problem context, problem cause
//! and cause structure. The database N+1 pair replaces the last two steps
//! when the problem context is a single SQL call.

pub mod cause_structure;
pub mod errors;
pub mod global_context;
pub mod problem_cause;
pub mod problem_context;
pub mod structs;
pub mod time_wasting_operations;

use std::sync::Arc;

pub use cause_structure::{CauseStructureNPlusOneRule, CauseStructureRule};
pub use errors::DiagnosisError;
pub use global_context::GlobalContextRule;
pub use problem_cause::{ProblemCauseNPlusOneRule, ProblemCauseRule};
pub use problem_context::ProblemContextRule;
pub use structs::{CauseCluster, CauseStructure, CauseType, DiagnosisFact, Thresholds};
pub use time_wasting_operations::TimeWastingOperationsRule;

use crate::common::constants::BASELINE_VARIABLE;
use crate::engine::{Rule, RuleDefinitionError, RuleGraph, RuleInput, SessionVariables};
use crate::tree::{AggregatedInvocation, InvocationTree, NodeId};

// Tag types
pub const TAG_ROOT: &str = "diagnosis.root";
pub const TAG_GLOBAL_CONTEXT: &str = "diagnosis.global_context";
pub const TAG_TIME_WASTING_OPERATIONS: &str = "diagnosis.time_wasting_operations";
pub const TAG_PROBLEM_CONTEXT: &str = "diagnosis.problem_context";
pub const TAG_PROBLEM_CAUSE: &str = "diagnosis.problem_cause";
pub const TAG_PROBLEM_CAUSE_N_PLUS_ONE: &str = "diagnosis.problem_cause.n_plus_one";
pub const TAG_CAUSE_STRUCTURE: &str = "diagnosis.cause_structure";

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The full diagnosis rule set
pub fn diagnosis_rules(thresholds: &Thresholds) -> Vec<Box<dyn Rule<DiagnosisFact>>> {
    vec![
        Box::new(GlobalContextRule),
        Box::new(TimeWastingOperationsRule::new(thresholds)),
        Box::new(ProblemContextRule::new(thresholds)),
        Box::new(ProblemCauseRule::new(thresholds)),
        Box::new(ProblemCauseNPlusOneRule::new(thresholds)),
        Box::new(CauseStructureRule::new(thresholds)),
        Box::new(CauseStructureNPlusOneRule),
    ]
}

/// Registers [`diagnosis_rules`] under [`TAG_ROOT`]
pub fn diagnosis_graph(thresholds: &Thresholds) -> Result<RuleGraph<DiagnosisFact>, RuleDefinitionError> {
    RuleGraph::register(TAG_ROOT, diagnosis_rules(thresholds))
}

/// Typed access to diagnosis facts bound for one rule firing
pub(crate) trait DiagnosisInput<'a> {
    fn tree(&self) -> Result<&'a InvocationTree, DiagnosisError>;
    fn baseline(&self) -> Result<f64, DiagnosisError>;
    fn node(&self, tag: &'static str) -> Result<NodeId, BoxError>;
    fn aggregate(&self, tag: &'static str) -> Result<&'a AggregatedInvocation, BoxError>;
    fn cluster(&self, tag: &'static str) -> Result<&'a CauseCluster, BoxError>;
}

impl<'a> DiagnosisInput<'a> for RuleInput<'a, DiagnosisFact> {
    fn tree(&self) -> Result<&'a InvocationTree, DiagnosisError> {
        let root = self.root();
        root.as_tree()
            .map(|tree| &**tree)
            .ok_or_else(|| unexpected(TAG_ROOT, "root", root))
    }

    fn baseline(&self) -> Result<f64, DiagnosisError> {
        self.variable(BASELINE_VARIABLE)
            .ok_or_else(|| DiagnosisError::MissingSessionVariable(BASELINE_VARIABLE.to_string()))
    }

    fn node(&self, tag: &'static str) -> Result<NodeId, BoxError> {
        let fact = self.require(tag)?;
        fact.as_node()
            .ok_or_else(|| BoxError::from(unexpected(tag, "node", fact)))
    }

    fn aggregate(&self, tag: &'static str) -> Result<&'a AggregatedInvocation, BoxError> {
        let fact = self.require(tag)?;
        fact.as_aggregate()
            .ok_or_else(|| BoxError::from(unexpected(tag, "aggregate", fact)))
    }

    fn cluster(&self, tag: &'static str) -> Result<&'a CauseCluster, BoxError> {
        let fact = self.require(tag)?;
        fact.as_cluster()
            .ok_or_else(|| BoxError::from(unexpected(tag, "cluster", fact)))
    }
}

fn unexpected(tag: &str, expected: &'static str, found: &DiagnosisFact) -> DiagnosisError {
    DiagnosisError::UnexpectedFact {
        tag: tag.to_string(),
        expected,
        found: found.kind(),
    }
}

/// Session variables for one diagnosis
pub fn session_variables(baseline: f64) -> SessionVariables {
    let mut variables = SessionVariables::default();
    variables.insert(BASELINE_VARIABLE.to_string(), baseline);
    variables
}

/// Root fact for a diagnosis of `tree`
pub fn root_fact(tree: Arc<InvocationTree>) -> DiagnosisFact {
    DiagnosisFact::Root(tree)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::engine::Session;

    /// Runs the whole rule set once over `tree`; the processed session is returned
    pub fn run(tree: InvocationTree, baseline: f64, thresholds: &Thresholds) -> Session<DiagnosisFact> {
        let graph = Arc::new(diagnosis_graph(thresholds).expect("diagnosis rules should register"));
        let mut session = Session::new(graph);
        session
            .activate(root_fact(Arc::new(tree)), &session_variables(baseline))
            .expect("fresh session");
        session.call().expect("diagnosis should succeed");
        session
    }

    /// Hand-bound input for firing a single rule
    pub fn input<'a>(
        root: &'a DiagnosisFact,
        tags: Vec<(&'static str, Option<&'a DiagnosisFact>)>,
        variables: &'a SessionVariables,
    ) -> RuleInput<'a, DiagnosisFact> {
        RuleInput::new(root, tags, variables)
    }
}
