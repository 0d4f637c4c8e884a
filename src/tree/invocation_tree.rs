//! Arena-backed call tree
//!
//! Nodes live in one `Vec` and refer to each other through [`NodeId`] handles.
//! The parent of every node is recorded at insertion time, so upward walks
//! never need shared ownership.

use chrono::Utc;

use super::errors::TreeError;
use super::structs::{InvocationNode, NodeId, NodeSpec};

/// Immutable recorded call tree ("invocation sequence")
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationTree {
    nodes: Vec<InvocationNode>,
}

impl InvocationTree {
    /// The request root, always the first node inserted
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&InvocationNode> {
        self.nodes.get(id.index())
    }

    pub fn node(&self, id: NodeId) -> Result<&InvocationNode, TreeError> {
        self.get(id).ok_or(TreeError::UnknownNode(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    /// Walks `steps` parent links up from `id`
    pub fn ancestor(&self, id: NodeId, steps: usize) -> Result<NodeId, TreeError> {
        let mut current = id;
        for walked in 0..steps {
            current = self
                .node(current)?
                .parent()
                .ok_or(TreeError::BrokenParentChain {
                    node: id,
                    walked,
                    requested: steps,
                })?;
        }
        Ok(current)
    }

    /// Pre-order traversal of the subtree under `start`. Depth of `start` is 0.
    pub fn iter_depth_first(&self, start: NodeId) -> DepthFirstIter<'_> {
        let stack = if self.contains(start) {
            vec![(start, 0)]
        } else {
            Vec::new()
        };
        DepthFirstIter { tree: self, stack }
    }
}

/// Iterative pre-order walk; yields `(node, depth)` pairs
pub struct DepthFirstIter<'a> {
    tree: &'a InvocationTree,
    stack: Vec<(NodeId, usize)>,
}

impl<'a> Iterator for DepthFirstIter<'a> {
    type Item = (NodeId, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let (id, depth) = self.stack.pop()?;
        if let Some(node) = self.tree.get(id) {
            // reversed so the first child is popped first
            self.stack
                .extend(node.children().iter().rev().map(|child| (*child, depth + 1)));
        }
        Some((id, depth))
    }
}

/// Builds an [`InvocationTree`] top-down, keeping parent links consistent
#[derive(Debug, Default)]
pub struct TreeBuilder {
    nodes: Vec<InvocationNode>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the root node. Must be called once, before any `child` call.
    pub fn root(&mut self, spec: NodeSpec) -> NodeId {
        debug_assert!(self.nodes.is_empty(), "root added twice");
        self.insert(spec, None)
    }

    /// Appends a child to `parent`; children keep insertion (call) order
    pub fn child(&mut self, parent: NodeId, spec: NodeSpec) -> Result<NodeId, TreeError> {
        if parent.index() >= self.nodes.len() {
            return Err(TreeError::UnknownNode(parent));
        }
        let id = self.insert(spec, Some(parent));
        self.nodes[parent.index()].children.push(id);
        Ok(id)
    }

    pub fn build(self) -> Result<InvocationTree, TreeError> {
        if self.nodes.is_empty() {
            return Err(TreeError::Empty);
        }
        Ok(InvocationTree { nodes: self.nodes })
    }

    fn insert(&mut self, spec: NodeSpec, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let invocation_id = if spec.invocation_id == 0 {
            id.0 as u64 + 1
        } else {
            spec.invocation_id
        };
        self.nodes.push(InvocationNode {
            invocation_id,
            timestamp: spec.timestamp.unwrap_or_else(Utc::now),
            method_ident: spec.method_ident,
            duration: spec.duration,
            application_id: spec.application_id,
            business_transaction_id: spec.business_transaction_id,
            data: spec.data,
            parent,
            children: Vec::new(),
        });
        id
    }
}
