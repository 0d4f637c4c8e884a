use thiserror::Error;

use crate::tree::{NodeId, TreeError};

/// Faults raised by diagnosis rule actions; reported as a rule execution failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiagnosisError {
    #[error("Tag '{tag}' holds a {found} fact, expected {expected}")]
    UnexpectedFact {
        tag: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("Node {0} is not part of the diagnosed tree")]
    MissingNode(NodeId),
    #[error("Node {0} carries no timing data")]
    MissingTimingData(NodeId),
    #[error("Root cause aggregate holds no invocations")]
    EmptyCause,
    #[error("Parent chain of node {node} ends after {walked} of {requested} steps")]
    BrokenParentChain {
        node: NodeId,
        walked: usize,
        requested: usize,
    },
    #[error("Session variable '{0}' is not set")]
    MissingSessionVariable(String),
}

impl From<TreeError> for DiagnosisError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::UnknownNode(node) => DiagnosisError::MissingNode(node),
            TreeError::BrokenParentChain {
                node,
                walked,
                requested,
            } => DiagnosisError::BrokenParentChain {
                node,
                walked,
                requested,
            },
            TreeError::Empty => DiagnosisError::MissingNode(NodeId(0)),
        }
    }
}
