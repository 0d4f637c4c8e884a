//! Clustering of cause invocations into a problem context
//!
//! Every member of a time-wasting operation starts as its own cluster. Clusters
//! that are close in the tree are merged, smallest distance first, until one of
//! them holds a significant share of the operation's exclusive time. The common
//! context of that cluster is the problem context.

use tracing::{debug, warn};

use crate::engine::{ActionResult, Rule, RuleDescriptor, RuleInput, RuleOutput};
use crate::tree::{AggregatedInvocation, InvocationTree, NodeId};

use super::{
    CauseCluster, DiagnosisError, DiagnosisFact, DiagnosisInput, Thresholds, TAG_GLOBAL_CONTEXT,
    TAG_PROBLEM_CONTEXT, TAG_TIME_WASTING_OPERATIONS,
};

/// Distance of the last cluster, which has no successor
const NO_SUCCESSOR: usize = usize::MAX;

#[derive(Debug, Clone)]
pub struct ProblemContextRule {
    proportion: f64,
    max_merge_rounds: usize,
}

/// Cluster under construction
#[derive(Debug, Clone)]
struct WorkingCluster {
    invocations: Vec<NodeId>,
    common_context: NodeId,
    exclusive_time: f64,
    /// Parent links between this cluster's context and the common ancestor
    /// with the next cluster
    distance_to_next: usize,
}

impl WorkingCluster {
    fn singleton(invocation: NodeId, exclusive_time: f64) -> Self {
        Self {
            invocations: vec![invocation],
            common_context: invocation,
            exclusive_time,
            distance_to_next: NO_SUCCESSOR,
        }
    }

    fn into_cluster(self) -> CauseCluster {
        CauseCluster::new(self.invocations, self.common_context, self.exclusive_time)
    }
}

impl ProblemContextRule {
    pub fn new(thresholds: &Thresholds) -> Self {
        Self {
            proportion: thresholds.proportion,
            max_merge_rounds: thresholds.max_merge_rounds,
        }
    }

    pub fn cluster(
        &self,
        tree: &InvocationTree,
        global_context: NodeId,
        operation: &AggregatedInvocation,
    ) -> Result<CauseCluster, DiagnosisError> {
        let mut clusters = Vec::with_capacity(operation.size());
        for id in operation.members() {
            let node = tree.node(*id)?;
            if node.data.timer().is_none() {
                return Err(DiagnosisError::MissingTimingData(*id));
            }
            clusters.push(WorkingCluster::singleton(*id, node.exclusive_time()));
        }

        match clusters.len() {
            0 => return Err(DiagnosisError::EmptyCause),
            1 => return Ok(clusters.remove(0).into_cluster()),
            _ => {}
        }

        let overall: f64 = clusters.iter().map(|cluster| cluster.exclusive_time).sum();
        let significance = self.proportion * overall;

        for round in 0..self.max_merge_rounds {
            if let Some(index) = clusters
                .iter()
                .position(|cluster| cluster.exclusive_time > significance)
            {
                debug!(round, clusters = clusters.len(), "Significant cluster found");
                return Ok(clusters.swap_remove(index).into_cluster());
            }

            assign_distances(tree, global_context, &mut clusters);
            match merge_closest(tree, clusters)? {
                Merge::Merged(merged) => clusters = merged,
                Merge::Exhausted(unchanged) => {
                    clusters = unchanged;
                    break;
                }
            }
        }

        if let Some(index) = clusters
            .iter()
            .position(|cluster| cluster.exclusive_time > significance)
        {
            return Ok(clusters.swap_remove(index).into_cluster());
        }

        warn!(
            clusters = clusters.len(),
            "No significant cluster emerged, falling back to the longest one"
        );
        let mut longest = 0;
        for (index, cluster) in clusters.iter().enumerate() {
            if cluster.exclusive_time > clusters[longest].exclusive_time {
                longest = index;
            }
        }
        Ok(clusters.swap_remove(longest).into_cluster())
    }
}

impl Rule<DiagnosisFact> for ProblemContextRule {
    fn descriptor(&self) -> RuleDescriptor {
        RuleDescriptor::new("ProblemContextRule", TAG_PROBLEM_CONTEXT)
            .input(TAG_GLOBAL_CONTEXT)
            .input(TAG_TIME_WASTING_OPERATIONS)
    }

    fn action(&self, input: &RuleInput<'_, DiagnosisFact>) -> ActionResult<DiagnosisFact> {
        let tree = input.tree()?;
        let global_context = input.node(TAG_GLOBAL_CONTEXT)?;
        let operation = input.aggregate(TAG_TIME_WASTING_OPERATIONS)?;

        let cluster = self.cluster(tree, global_context, operation)?;
        debug!(
            problem_context = %cluster.common_context(),
            invocations = cluster.invocations().len(),
            "Problem context identified"
        );
        Ok(RuleOutput::Single(DiagnosisFact::Cluster(cluster)))
    }
}

/// Single pre-order pass from the global context
///
/// Clusters are visited in list order. The distance of a cluster is one more
/// than the depth climbed, relative to its context, before the next cluster's
/// context is reached.
fn assign_distances(tree: &InvocationTree, global_context: NodeId, clusters: &mut [WorkingCluster]) {
    for cluster in clusters.iter_mut() {
        cluster.distance_to_next = NO_SUCCESSOR;
    }

    let mut next = 0;
    let mut current: Option<usize> = None;
    let mut current_depth: usize = 0;
    let mut min_depth = usize::MAX;

    for (id, depth) in tree.iter_depth_first(global_context) {
        if next >= clusters.len() {
            break;
        }
        min_depth = min_depth.min(depth);
        if clusters[next].common_context == id {
            if let Some(index) = current {
                clusters[index].distance_to_next = (current_depth + 1).saturating_sub(min_depth);
            }
            current = Some(next);
            next += 1;
            current_depth = depth;
            min_depth = usize::MAX;
        }
    }
}

enum Merge {
    Merged(Vec<WorkingCluster>),
    /// No two clusters could be joined
    Exhausted(Vec<WorkingCluster>),
}

/// Joins every run of consecutive clusters separated by the smallest distance
fn merge_closest(tree: &InvocationTree, clusters: Vec<WorkingCluster>) -> Result<Merge, DiagnosisError> {
    let threshold = clusters
        .iter()
        .map(|cluster| cluster.distance_to_next)
        .filter(|distance| *distance != NO_SUCCESSOR)
        .min();
    let Some(threshold) = threshold else {
        return Ok(Merge::Exhausted(clusters));
    };

    let mut merged = Vec::with_capacity(clusters.len());
    let mut run: Vec<WorkingCluster> = Vec::new();
    for cluster in clusters {
        let closes_run = cluster.distance_to_next > threshold;
        run.push(cluster);
        if closes_run {
            merged.push(join(tree, std::mem::take(&mut run))?);
        }
    }
    if !run.is_empty() {
        merged.push(join(tree, run)?);
    }
    Ok(Merge::Merged(merged))
}

fn join(tree: &InvocationTree, mut run: Vec<WorkingCluster>) -> Result<WorkingCluster, DiagnosisError> {
    if run.len() == 1 {
        return Ok(run.remove(0));
    }
    let first = &run[0];
    let common_context = tree.ancestor(first.common_context, first.distance_to_next)?;

    let mut invocations = Vec::new();
    let mut exclusive_time = 0.0;
    for cluster in run {
        invocations.extend(cluster.invocations);
        exclusive_time += cluster.exclusive_time;
    }
    Ok(WorkingCluster {
        invocations,
        common_context,
        exclusive_time,
        distance_to_next: NO_SUCCESSOR,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Aggregator, NodeSpec, TreeBuilder};

    fn cluster_of(tree: &InvocationTree, members: &[NodeId]) -> CauseCluster {
        let operation = Aggregator::aggregate(tree, members.iter().copied())
            .unwrap()
            .remove(0);
        ProblemContextRule::new(&Thresholds::default())
            .cluster(tree, tree.root(), &operation)
            .unwrap()
    }

    #[test]
    fn test_single_invocation_is_its_own_context() {
        let mut builder = TreeBuilder::new();
        let root = builder.root(NodeSpec::new(1, 2000.0).with_timer(0.0));
        let call = builder.child(root, NodeSpec::new(7, 1800.0).with_timer(1800.0)).unwrap();
        let tree = builder.build().unwrap();

        let cluster = cluster_of(&tree, &[call]);
        assert_eq!(cluster.common_context(), call);
        assert_eq!(cluster.invocations(), &[call]);
    }

    #[test]
    fn test_dominant_invocation_is_significant_immediately() {
        let mut builder = TreeBuilder::new();
        let root = builder.root(NodeSpec::new(1, 2000.0).with_timer(0.0));
        let heavy = builder.child(root, NodeSpec::new(7, 900.0).with_timer(900.0)).unwrap();
        let a = builder.child(root, NodeSpec::new(7, 50.0).with_timer(50.0)).unwrap();
        let b = builder.child(root, NodeSpec::new(7, 50.0).with_timer(50.0)).unwrap();
        let tree = builder.build().unwrap();

        let cluster = cluster_of(&tree, &[heavy, a, b]);
        assert_eq!(cluster.common_context(), heavy);
        assert_eq!(cluster.exclusive_time(), 900.0);
    }

    fn two_branches() -> (InvocationTree, NodeId, [NodeId; 3]) {
        let mut builder = TreeBuilder::new();
        let root = builder.root(NodeSpec::new(1, 1200.0).with_timer(0.0));
        let left = builder.child(root, NodeSpec::new(2, 900.0).with_timer(0.0)).unwrap();
        let x1 = builder.child(left, NodeSpec::new(7, 450.0).with_timer(450.0)).unwrap();
        let x2 = builder.child(left, NodeSpec::new(7, 450.0).with_timer(450.0)).unwrap();
        let right = builder.child(root, NodeSpec::new(3, 300.0).with_timer(200.0)).unwrap();
        let x3 = builder.child(right, NodeSpec::new(7, 100.0).with_timer(100.0)).unwrap();
        (builder.build().unwrap(), left, [x1, x2, x3])
    }

    #[test]
    fn test_siblings_merge_into_their_parent() {
        let (tree, left, members) = two_branches();

        let cluster = cluster_of(&tree, &members);
        assert_eq!(cluster.common_context(), left);
        assert_eq!(cluster.invocations(), &members[..2]);
        assert_eq!(cluster.exclusive_time(), 900.0);
    }

    #[test]
    fn test_merging_climbs_over_several_rounds() {
        let mut builder = TreeBuilder::new();
        let root = builder.root(NodeSpec::new(1, 1000.0).with_timer(0.0));
        let a = builder.child(root, NodeSpec::new(2, 1000.0).with_timer(100.0)).unwrap();
        let p = builder.child(a, NodeSpec::new(3, 600.0).with_timer(0.0)).unwrap();
        let x1 = builder.child(p, NodeSpec::new(7, 300.0).with_timer(300.0)).unwrap();
        let x2 = builder.child(p, NodeSpec::new(7, 300.0).with_timer(300.0)).unwrap();
        let q = builder.child(a, NodeSpec::new(4, 300.0).with_timer(0.0)).unwrap();
        let r = builder.child(q, NodeSpec::new(5, 300.0).with_timer(0.0)).unwrap();
        let x3 = builder.child(r, NodeSpec::new(7, 300.0).with_timer(300.0)).unwrap();
        let tree = builder.build().unwrap();

        // x1 and x2 join under p first; only the next round reaches a
        let cluster = cluster_of(&tree, &[x1, x2, x3]);
        assert_eq!(cluster.common_context(), a);
        assert_eq!(cluster.invocations(), &[x1, x2, x3]);
        assert_eq!(cluster.exclusive_time(), 900.0);
    }

    #[test]
    fn test_clustering_is_deterministic() {
        let (tree, _, members) = two_branches();

        let first = cluster_of(&tree, &members);
        let second = cluster_of(&tree, &members);
        assert_eq!(first, second);
    }

    #[test]
    fn test_distances_follow_tree_shape() {
        let (tree, _, [x1, x2, x3]) = two_branches();
        let mut clusters = vec![
            WorkingCluster::singleton(x1, 450.0),
            WorkingCluster::singleton(x2, 450.0),
            WorkingCluster::singleton(x3, 100.0),
        ];

        assign_distances(&tree, tree.root(), &mut clusters);
        let distances: Vec<_> = clusters.iter().map(|c| c.distance_to_next).collect();
        assert_eq!(distances, vec![1, 2, NO_SUCCESSOR]);
    }

    #[test]
    fn test_without_exclusive_time_falls_back_to_everything() {
        let mut builder = TreeBuilder::new();
        let root = builder.root(NodeSpec::new(1, 1000.0).with_timer(0.0));
        let left = builder.child(root, NodeSpec::new(2, 500.0).with_timer(0.0)).unwrap();
        let x1 = builder.child(left, NodeSpec::new(7, 100.0).with_timer(0.0)).unwrap();
        let x2 = builder.child(root, NodeSpec::new(7, 100.0).with_timer(0.0)).unwrap();
        let tree = builder.build().unwrap();

        let cluster = cluster_of(&tree, &[x1, x2]);
        assert_eq!(cluster.invocations(), &[x1, x2]);
        assert_eq!(cluster.common_context(), root);
    }
}
