use tracing::debug;

use crate::common::constants::BASELINE_VARIABLE;
use crate::engine::{ActionResult, Rule, RuleDescriptor, RuleInput, RuleOutput};
use crate::tree::{AggregatedInvocation, Aggregator, InvocationTree, NodeId};

use super::{
    DiagnosisError, DiagnosisFact, DiagnosisInput, Thresholds, TAG_GLOBAL_CONTEXT,
    TAG_TIME_WASTING_OPERATIONS,
};

/// Selects the aggregated operations that account for most exclusive time
/// below the global context
#[derive(Debug, Clone)]
pub struct TimeWastingOperationsRule {
    proportion: f64,
    min_calls: usize,
}

impl TimeWastingOperationsRule {
    pub fn new(thresholds: &Thresholds) -> Self {
        Self {
            proportion: thresholds.proportion,
            min_calls: thresholds.min_calls_time_wasting,
        }
    }

    /// Aggregates sorted by summed exclusive time, longest first
    fn ranked_operations(
        tree: &InvocationTree,
        global_context: NodeId,
    ) -> Result<Vec<AggregatedInvocation>, DiagnosisError> {
        let mut aggregator = Aggregator::new();
        for (id, _) in tree.iter_depth_first(global_context) {
            if tree.node(id)?.has_exclusive_time() {
                aggregator.add(tree, id)?;
            }
        }
        let mut aggregates = aggregator.finish();
        // stable: equal times keep encounter order
        aggregates.sort_by(|a, b| b.exclusive_time().total_cmp(&a.exclusive_time()));
        Ok(aggregates)
    }
}

impl Rule<DiagnosisFact> for TimeWastingOperationsRule {
    fn descriptor(&self) -> RuleDescriptor {
        RuleDescriptor::new("TimeWastingOperationsRule", TAG_TIME_WASTING_OPERATIONS)
            .input(TAG_GLOBAL_CONTEXT)
            .variable(BASELINE_VARIABLE)
            .multiple()
    }

    fn action(&self, input: &RuleInput<'_, DiagnosisFact>) -> ActionResult<DiagnosisFact> {
        let tree = input.tree()?;
        let global_context = input.node(TAG_GLOBAL_CONTEXT)?;
        let limit = self.proportion * tree.node(global_context)?.duration;

        let mut operations = Vec::new();
        let mut sum = 0.0;
        for aggregate in Self::ranked_operations(tree, global_context)? {
            if sum >= limit && aggregate.size() <= self.min_calls {
                break;
            }
            sum += aggregate.exclusive_time();
            operations.push(DiagnosisFact::Aggregate(aggregate));
        }

        debug!(
            global_context = %global_context,
            operations = operations.len(),
            exclusive_sum = sum,
            "Time wasting operations selected"
        );
        Ok(RuleOutput::Multiple(operations))
    }
}
