use tracing::debug;

use crate::engine::{ActionResult, Rule, RuleDescriptor, RuleInput, RuleOutput};
use crate::tree::{AggregatedInvocation, InvocationTree, NodeId};

use super::{
    CauseStructure, CauseType, DiagnosisError, DiagnosisFact, DiagnosisInput, Thresholds,
    TAG_CAUSE_STRUCTURE, TAG_PROBLEM_CAUSE, TAG_PROBLEM_CAUSE_N_PLUS_ONE, TAG_PROBLEM_CONTEXT,
};

/// Classifies whether the root cause is called once, iteratively or recursively
#[derive(Debug, Clone, Default)]
pub struct CauseStructureRule {
    /// Matching calls inspected before classification stops; `None` = whole context
    call_budget: Option<usize>,
}

impl CauseStructureRule {
    pub fn new(thresholds: &Thresholds) -> Self {
        Self {
            call_budget: thresholds.recursion_call_budget,
        }
    }

    pub fn classify(
        &self,
        tree: &InvocationTree,
        problem_context: NodeId,
        cause: &AggregatedInvocation,
    ) -> Result<CauseStructure, DiagnosisError> {
        let database = cause.is_sql();
        match cause.size() {
            0 => return Err(DiagnosisError::EmptyCause),
            1 => {
                let cause_type = if database {
                    CauseType::SingleDatabase
                } else {
                    CauseType::Single
                };
                return Ok(CauseStructure::new(cause_type, 0));
            }
            _ => {}
        }

        // depths of the enclosing matches on the current path
        let mut stack: Vec<usize> = Vec::new();
        let mut max_depth = 0;
        let mut matched = 0;
        for (id, depth) in tree.iter_depth_first(problem_context) {
            if self.call_budget.is_some_and(|budget| matched >= budget) {
                break;
            }
            while stack.last().is_some_and(|top| *top >= depth) {
                stack.pop();
            }
            if cause.key().matches(tree.node(id)?) {
                stack.push(depth);
                max_depth = max_depth.max(stack.len());
                matched += 1;
            }
        }

        let cause_type = match (max_depth > 1, database) {
            (true, false) => CauseType::Recursive,
            (true, true) => CauseType::RecursiveDatabase,
            (false, false) => CauseType::Iterative,
            (false, true) => CauseType::IterativeDatabase,
        };
        Ok(CauseStructure::new(cause_type, max_depth))
    }
}

impl Rule<DiagnosisFact> for CauseStructureRule {
    fn descriptor(&self) -> RuleDescriptor {
        RuleDescriptor::new("CauseStructureRule", TAG_CAUSE_STRUCTURE)
            .input(TAG_PROBLEM_CONTEXT)
            .input(TAG_PROBLEM_CAUSE)
    }

    fn action(&self, input: &RuleInput<'_, DiagnosisFact>) -> ActionResult<DiagnosisFact> {
        let tree = input.tree()?;
        let cluster = input.cluster(TAG_PROBLEM_CONTEXT)?;
        let cause = input.aggregate(TAG_PROBLEM_CAUSE)?;

        let structure = self.classify(tree, cluster.common_context(), cause)?;
        debug!(
            cause_type = %structure.cause_type,
            depth = structure.depth,
            "Cause structure classified"
        );
        Ok(RuleOutput::Single(DiagnosisFact::Structure(structure)))
    }
}

/// Structure of an N+1 database cause
#[derive(Debug, Clone, Copy, Default)]
pub struct CauseStructureNPlusOneRule;

impl CauseStructureNPlusOneRule {
    pub fn classify(cause: &AggregatedInvocation) -> CauseStructure {
        if cause.size() > 1 {
            CauseStructure::new(CauseType::NPlusOneDatabase, 0)
        } else {
            CauseStructure::new(CauseType::SingleDatabase, 0)
        }
    }
}

impl Rule<DiagnosisFact> for CauseStructureNPlusOneRule {
    fn descriptor(&self) -> RuleDescriptor {
        RuleDescriptor::new("CauseStructureNPlusOneRule", TAG_CAUSE_STRUCTURE)
            .input(TAG_PROBLEM_CONTEXT)
            .input(TAG_PROBLEM_CAUSE_N_PLUS_ONE)
    }

    fn action(&self, input: &RuleInput<'_, DiagnosisFact>) -> ActionResult<DiagnosisFact> {
        let cause = input.aggregate(TAG_PROBLEM_CAUSE_N_PLUS_ONE)?;
        Ok(RuleOutput::Single(DiagnosisFact::Structure(Self::classify(cause))))
    }
}
