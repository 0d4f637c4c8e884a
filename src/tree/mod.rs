//! Call-tree model
//!
//! Arena-indexed invocation trees as handed over by the trace source, plus
//! the aggregation of equivalent invocations used by the diagnosis rules.

pub mod aggregation;
pub mod errors;
pub mod invocation_tree;
pub mod structs;

pub use aggregation::{AggregatedInvocation, AggregationKey, Aggregator};
pub use errors::TreeError;
pub use invocation_tree::{DepthFirstIter, InvocationTree, TreeBuilder};
pub use structs::{
    HttpTimerData, InvocationNode, NodeData, NodeId, NodeSpec, SqlStatementData, TimerData,
};
