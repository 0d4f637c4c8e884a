use crate::engine::{FactStore, SessionResultCollector, Tag, TagId};
use crate::rules::{
    DiagnosisError, DiagnosisFact, TAG_CAUSE_STRUCTURE, TAG_GLOBAL_CONTEXT, TAG_PROBLEM_CAUSE,
    TAG_PROBLEM_CAUSE_N_PLUS_ONE, TAG_PROBLEM_CONTEXT, TAG_ROOT,
};

use super::structs::{AggregatedInvocationIdentifier, InvocationIdentifier, ProblemOccurrence};

/// Builds one [`ProblemOccurrence`] per cause-structure lineage
#[derive(Debug, Default, Clone, Copy)]
pub struct ProblemOccurrenceCollector;

impl SessionResultCollector<DiagnosisFact> for ProblemOccurrenceCollector {
    type Output = Result<Vec<ProblemOccurrence>, DiagnosisError>;

    fn collect(&self, facts: &FactStore<DiagnosisFact>) -> Self::Output {
        let Some(root) = facts.root() else {
            return Ok(Vec::new());
        };
        let tree = root
            .value
            .as_tree()
            .ok_or_else(|| unexpected(TAG_ROOT, "root", Some(&root.value)))?;
        let request_root = tree.root();
        let root_node = tree.node(request_root)?;

        let mut occurrences = Vec::with_capacity(facts.ids(TAG_CAUSE_STRUCTURE).len());
        for tag in facts.tags(TAG_CAUSE_STRUCTURE) {
            let structure = tag
                .value
                .as_structure()
                .ok_or_else(|| unexpected(TAG_CAUSE_STRUCTURE, "structure", Some(&tag.value)))?;

            let cause_tag = find(facts, tag.id, TAG_PROBLEM_CAUSE)
                .or_else(|| find(facts, tag.id, TAG_PROBLEM_CAUSE_N_PLUS_ONE));
            let cause = cause_tag
                .and_then(|cause| cause.value.as_aggregate())
                .ok_or_else(|| unexpected(TAG_PROBLEM_CAUSE, "aggregate", cause_tag.map(|t| &t.value)))?;

            let cluster_tag = find(facts, tag.id, TAG_PROBLEM_CONTEXT);
            let cluster = cluster_tag
                .and_then(|cluster| cluster.value.as_cluster())
                .ok_or_else(|| unexpected(TAG_PROBLEM_CONTEXT, "cluster", cluster_tag.map(|t| &t.value)))?;

            let context_tag = find(facts, tag.id, TAG_GLOBAL_CONTEXT);
            let global_context = context_tag
                .and_then(|context| context.value.as_node())
                .ok_or_else(|| unexpected(TAG_GLOBAL_CONTEXT, "node", context_tag.map(|t| &t.value)))?;

            occurrences.push(ProblemOccurrence {
                id: ProblemOccurrence::next_id(),
                timestamp: root_node.timestamp,
                request_root: InvocationIdentifier::of(tree, request_root)?,
                global_context: InvocationIdentifier::of(tree, global_context)?,
                problem_context: InvocationIdentifier::of(tree, cluster.common_context())?,
                root_cause: AggregatedInvocationIdentifier::of(tree, cause)?,
                cause_structure: *structure,
                application_id: root_node.application_id,
                business_transaction_id: root_node.business_transaction_id,
            });
        }
        Ok(occurrences)
    }
}

fn find<'a>(facts: &'a FactStore<DiagnosisFact>, id: TagId, tag_type: &str) -> Option<&'a Tag<DiagnosisFact>> {
    facts.find_in_lineage(id, tag_type)
}

fn unexpected(tag: &str, expected: &'static str, found: Option<&DiagnosisFact>) -> DiagnosisError {
    DiagnosisError::UnexpectedFact {
        tag: tag.to_string(),
        expected,
        found: found.map_or("nothing", DiagnosisFact::kind),
    }
}
