use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rules::CauseStructure;
use crate::tree::{AggregatedInvocation, InvocationTree, NodeId, TimerData, TreeError};

static NEXT_OCCURRENCE_ID: AtomicU64 = AtomicU64::new(1);

/// Timing values copied out of a node so results outlive the tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TimerSummary {
    pub duration: f64,
    pub exclusive_duration: Option<f64>,
    pub cpu_duration: f64,
    pub count: u64,
}

impl From<&TimerData> for TimerSummary {
    fn from(timer: &TimerData) -> Self {
        Self {
            duration: timer.duration,
            exclusive_duration: timer.exclusive_duration,
            cpu_duration: timer.cpu_duration,
            count: timer.count,
        }
    }
}

/// Reference to one node of the diagnosed tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationIdentifier {
    pub invocation_id: u64,
    pub node: NodeId,
    pub method_ident: u64,
    pub timer: TimerSummary,
}

impl InvocationIdentifier {
    pub fn of(tree: &InvocationTree, id: NodeId) -> Result<Self, TreeError> {
        let node = tree.node(id)?;
        let timer = match node.data.timer() {
            Some(timer) => TimerSummary::from(timer),
            None => TimerSummary {
                duration: node.duration,
                count: 1,
                ..TimerSummary::default()
            },
        };
        Ok(Self {
            invocation_id: node.invocation_id,
            node: id,
            method_ident: node.method_ident,
            timer,
        })
    }
}

/// Reference to every member of the root cause aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedInvocationIdentifier {
    pub method_ident: u64,
    pub sql: Option<String>,
    pub http_uri: Option<String>,
    pub invocation_ids: Vec<u64>,
    pub nodes: Vec<NodeId>,
    pub exclusive_time: f64,
    pub duration: f64,
    pub count: usize,
}

impl AggregatedInvocationIdentifier {
    pub fn of(tree: &InvocationTree, aggregate: &AggregatedInvocation) -> Result<Self, TreeError> {
        let invocation_ids = aggregate
            .members()
            .iter()
            .map(|id| tree.node(*id).map(|node| node.invocation_id))
            .collect::<Result<Vec<_>, _>>()?;
        let key = aggregate.key();
        Ok(Self {
            method_ident: key.method_ident,
            sql: key.sql.clone(),
            http_uri: key.http_uri.clone(),
            invocation_ids,
            nodes: aggregate.members().to_vec(),
            exclusive_time: aggregate.exclusive_time(),
            duration: aggregate.duration(),
            count: aggregate.size(),
        })
    }
}

/// Outcome of one diagnosis lineage: where the time went and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemOccurrence {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub request_root: InvocationIdentifier,
    pub global_context: InvocationIdentifier,
    pub problem_context: InvocationIdentifier,
    pub root_cause: AggregatedInvocationIdentifier,
    pub cause_structure: CauseStructure,
    pub application_id: u32,
    pub business_transaction_id: u32,
}

impl ProblemOccurrence {
    /// Process-unique occurrence id
    pub fn next_id() -> u64 {
        NEXT_OCCURRENCE_ID.fetch_add(1, Ordering::Relaxed)
    }
}

/// Filter over stored occurrences; unset fields match everything
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultQuery {
    pub application_id: Option<u32>,
    pub business_transaction_id: Option<u32>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl ResultQuery {
    pub fn matches(&self, occurrence: &ProblemOccurrence) -> bool {
        self.application_id
            .map_or(true, |id| id == occurrence.application_id)
            && self
                .business_transaction_id
                .map_or(true, |id| id == occurrence.business_transaction_id)
            && self.from.map_or(true, |from| occurrence.timestamp >= from)
            && self.to.map_or(true, |to| occurrence.timestamp <= to)
    }
}
