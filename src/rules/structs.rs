use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::common::constants::{
    DEFAULT_MAX_MERGE_ROUNDS, DEFAULT_MIN_CALLS_N_PLUS_ONE, DEFAULT_MIN_CALLS_TIME_WASTING,
    DEFAULT_PROPORTION, DEFAULT_SIGMA_FACTOR,
};
use crate::tree::{AggregatedInvocation, InvocationTree, NodeId};

/// Value stored under a diagnosis tag
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosisFact {
    /// The request root; the whole tree travels with it
    Root(Arc<InvocationTree>),
    Node(NodeId),
    Aggregate(AggregatedInvocation),
    Cluster(CauseCluster),
    Structure(CauseStructure),
}

impl DiagnosisFact {
    pub fn kind(&self) -> &'static str {
        match self {
            DiagnosisFact::Root(_) => "root",
            DiagnosisFact::Node(_) => "node",
            DiagnosisFact::Aggregate(_) => "aggregate",
            DiagnosisFact::Cluster(_) => "cluster",
            DiagnosisFact::Structure(_) => "structure",
        }
    }

    pub fn as_tree(&self) -> Option<&Arc<InvocationTree>> {
        match self {
            DiagnosisFact::Root(tree) => Some(tree),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            DiagnosisFact::Node(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_aggregate(&self) -> Option<&AggregatedInvocation> {
        match self {
            DiagnosisFact::Aggregate(aggregate) => Some(aggregate),
            _ => None,
        }
    }

    pub fn as_cluster(&self) -> Option<&CauseCluster> {
        match self {
            DiagnosisFact::Cluster(cluster) => Some(cluster),
            _ => None,
        }
    }

    pub fn as_structure(&self) -> Option<&CauseStructure> {
        match self {
            DiagnosisFact::Structure(structure) => Some(structure),
            _ => None,
        }
    }
}

/// Cause invocations grouped under their lowest common ancestor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CauseCluster {
    invocations: Vec<NodeId>,
    common_context: NodeId,
    exclusive_time: f64,
}

impl CauseCluster {
    pub fn new(invocations: Vec<NodeId>, common_context: NodeId, exclusive_time: f64) -> Self {
        Self {
            invocations,
            common_context,
            exclusive_time,
        }
    }

    /// Cause invocations in traversal order
    pub fn invocations(&self) -> &[NodeId] {
        &self.invocations
    }

    /// The problem context node
    pub fn common_context(&self) -> NodeId {
        self.common_context
    }

    pub fn exclusive_time(&self) -> f64 {
        self.exclusive_time
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CauseType {
    Single,
    Iterative,
    Recursive,
    SingleDatabase,
    IterativeDatabase,
    RecursiveDatabase,
    #[serde(rename = "NPLUSONE_DATABASE")]
    NPlusOneDatabase,
}

impl CauseType {
    pub fn is_database(self) -> bool {
        matches!(
            self,
            CauseType::SingleDatabase
                | CauseType::IterativeDatabase
                | CauseType::RecursiveDatabase
                | CauseType::NPlusOneDatabase
        )
    }
}

impl fmt::Display for CauseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CauseType::Single => "SINGLE",
            CauseType::Iterative => "ITERATIVE",
            CauseType::Recursive => "RECURSIVE",
            CauseType::SingleDatabase => "SINGLE_DATABASE",
            CauseType::IterativeDatabase => "ITERATIVE_DATABASE",
            CauseType::RecursiveDatabase => "RECURSIVE_DATABASE",
            CauseType::NPlusOneDatabase => "NPLUSONE_DATABASE",
        };
        f.write_str(label)
    }
}

/// How the root cause recurs, with the deepest nesting observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CauseStructure {
    pub cause_type: CauseType,
    pub depth: usize,
}

impl CauseStructure {
    pub fn new(cause_type: CauseType, depth: usize) -> Self {
        Self { cause_type, depth }
    }
}

/// Tunable knobs of the diagnosis rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Share of a duration that must be explained (0.8)
    pub proportion: f64,
    /// Aggregates with more calls are always time-wasting
    pub min_calls_time_wasting: usize,
    /// Repetitions of one SQL statement that indicate N+1 access
    pub min_calls_n_plus_one: usize,
    pub sigma_factor: f64,
    /// Clustering gives up after this many merge rounds
    pub max_merge_rounds: usize,
    /// Cap on matching calls inspected when classifying the structure; `None` walks the whole context
    pub recursion_call_budget: Option<usize>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            proportion: DEFAULT_PROPORTION,
            min_calls_time_wasting: DEFAULT_MIN_CALLS_TIME_WASTING,
            min_calls_n_plus_one: DEFAULT_MIN_CALLS_N_PLUS_ONE,
            sigma_factor: DEFAULT_SIGMA_FACTOR,
            max_merge_rounds: DEFAULT_MAX_MERGE_ROUNDS,
            recursion_call_budget: None,
        }
    }
}
