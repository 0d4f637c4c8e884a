use thiserror::Error;

use super::structs::NodeId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Node {0} does not belong to this invocation tree")]
    UnknownNode(NodeId),

    #[error("Parent chain of node {node} ends after {walked} of {requested} steps")]
    BrokenParentChain {
        node: NodeId,
        walked: usize,
        requested: usize,
    },

    #[error("Invocation tree has no root node")]
    Empty,
}
