//! Grouping of structurally equivalent invocations
//!
//! Two invocations are equivalent when they call the same method and, where
//! present, execute the same SQL text or serve the same HTTP route. An
//! [`AggregatedInvocation`] keeps the original node handles and summed timings;
//! the source tree is never touched.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::errors::TreeError;
use super::invocation_tree::InvocationTree;
use super::structs::{InvocationNode, NodeId};

/// Identity used to decide whether two invocations are the same operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregationKey {
    pub method_ident: u64,
    pub sql: Option<String>,
    pub http_uri: Option<String>,
}

impl AggregationKey {
    pub fn of(node: &InvocationNode) -> Self {
        Self {
            method_ident: node.method_ident,
            sql: node.data.sql().map(str::to_owned),
            http_uri: node.data.http_uri().map(str::to_owned),
        }
    }

    pub fn is_sql(&self) -> bool {
        self.sql.is_some()
    }

    pub fn is_http(&self) -> bool {
        self.http_uri.is_some()
    }

    /// Same method, plus same SQL text or HTTP route when the key carries one
    pub fn matches(&self, node: &InvocationNode) -> bool {
        if node.method_ident != self.method_ident {
            return false;
        }
        match (&self.sql, &self.http_uri) {
            (Some(sql), _) => node.data.sql() == Some(sql.as_str()),
            (None, Some(uri)) => node.data.http_uri() == Some(uri.as_str()),
            (None, None) => node.has_timer_data(),
        }
    }
}

/// Synthetic node standing for every member invocation with the same key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedInvocation {
    key: AggregationKey,
    members: Vec<NodeId>,
    exclusive_times: Vec<f64>,
    exclusive_time: f64,
    duration: f64,
}

impl AggregatedInvocation {
    pub fn new(key: AggregationKey) -> Self {
        Self {
            key,
            members: Vec::new(),
            exclusive_times: Vec::new(),
            exclusive_time: 0.0,
            duration: 0.0,
        }
    }

    /// Aggregate holding a single node
    pub fn of_node(tree: &InvocationTree, id: NodeId) -> Result<Self, TreeError> {
        let node = tree.node(id)?;
        let mut aggregate = Self::new(AggregationKey::of(node));
        aggregate.push(id, node);
        Ok(aggregate)
    }

    pub fn push(&mut self, id: NodeId, node: &InvocationNode) {
        let exclusive = node.exclusive_time();
        self.members.push(id);
        self.exclusive_times.push(exclusive);
        self.exclusive_time += exclusive;
        self.duration += node.duration;
    }

    pub fn key(&self) -> &AggregationKey {
        &self.key
    }

    pub fn method_ident(&self) -> u64 {
        self.key.method_ident
    }

    /// The raw member invocations in encounter order
    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    /// Exclusive time of each member, parallel to [`Self::members`]
    pub fn exclusive_times(&self) -> &[f64] {
        &self.exclusive_times
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn exclusive_time(&self) -> f64 {
        self.exclusive_time
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn is_sql(&self) -> bool {
        self.key.is_sql()
    }

    pub fn is_http(&self) -> bool {
        self.key.is_http()
    }
}

/// Groups invocations by [`AggregationKey`], first encounter decides the order
#[derive(Debug, Default)]
pub struct Aggregator {
    index: FxHashMap<AggregationKey, usize>,
    aggregates: Vec<AggregatedInvocation>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tree: &InvocationTree, id: NodeId) -> Result<(), TreeError> {
        let node = tree.node(id)?;
        let key = AggregationKey::of(node);
        let slot = match self.index.get(&key) {
            Some(slot) => *slot,
            None => {
                self.aggregates.push(AggregatedInvocation::new(key.clone()));
                self.index.insert(key, self.aggregates.len() - 1);
                self.aggregates.len() - 1
            }
        };
        self.aggregates[slot].push(id, node);
        Ok(())
    }

    pub fn finish(self) -> Vec<AggregatedInvocation> {
        self.aggregates
    }

    /// Convenience for one-shot aggregation of a node list
    pub fn aggregate<I>(tree: &InvocationTree, nodes: I) -> Result<Vec<AggregatedInvocation>, TreeError>
    where
        I: IntoIterator<Item = NodeId>,
    {
        let mut aggregator = Self::new();
        for id in nodes {
            aggregator.add(tree, id)?;
        }
        Ok(aggregator.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{NodeSpec, TreeBuilder};

    #[test]
    fn test_groups_by_method_and_sql_text() {
        let mut builder = TreeBuilder::new();
        let root = builder.root(NodeSpec::new(1, 100.0).with_timer(10.0));
        let q1 = builder.child(root, NodeSpec::new(7, 20.0).with_sql("select a", 20.0)).unwrap();
        let m1 = builder.child(root, NodeSpec::new(5, 15.0).with_timer(15.0)).unwrap();
        let q2 = builder.child(root, NodeSpec::new(7, 30.0).with_sql("select b", 30.0)).unwrap();
        let q3 = builder.child(root, NodeSpec::new(7, 25.0).with_sql("select a", 25.0)).unwrap();
        let tree = builder.build().unwrap();

        let aggregates = Aggregator::aggregate(&tree, [q1, m1, q2, q3]).unwrap();

        assert_eq!(aggregates.len(), 3);
        assert_eq!(aggregates[0].members(), &[q1, q3]);
        assert_eq!(aggregates[0].exclusive_time(), 45.0);
        assert!(aggregates[0].is_sql());
        assert_eq!(aggregates[1].members(), &[m1]);
        assert_eq!(aggregates[2].members(), &[q2]);
    }

    #[test]
    fn test_key_matching_respects_http_route() {
        let mut builder = TreeBuilder::new();
        let root = builder.root(NodeSpec::new(3, 100.0).with_http("/orders", 5.0));
        let same = builder.child(root, NodeSpec::new(3, 50.0).with_http("/orders", 5.0)).unwrap();
        let other = builder.child(root, NodeSpec::new(3, 40.0).with_http("/users", 5.0)).unwrap();
        let tree = builder.build().unwrap();

        let key = AggregationKey::of(tree.node(root).unwrap());
        assert!(key.matches(tree.node(same).unwrap()));
        assert!(!key.matches(tree.node(other).unwrap()));
    }

    #[test]
    fn test_missing_exclusive_time_counts_as_zero() {
        let mut builder = TreeBuilder::new();
        let root = builder.root(NodeSpec::new(1, 100.0));
        let tree = builder.build().unwrap();

        let aggregate = AggregatedInvocation::of_node(&tree, root).unwrap();
        assert_eq!(aggregate.exclusive_time(), 0.0);
        assert_eq!(aggregate.duration(), 100.0);
        assert_eq!(aggregate.size(), 1);
    }
}
