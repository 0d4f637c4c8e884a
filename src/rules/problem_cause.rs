use tracing::debug;

use crate::engine::{ActionResult, Rule, RuleDescriptor, RuleInput, RuleOutput};
use crate::tree::{AggregatedInvocation, AggregationKey, Aggregator, InvocationTree, NodeId};

use super::{
    CauseCluster, DiagnosisError, DiagnosisFact, DiagnosisInput, Thresholds, TAG_PROBLEM_CAUSE,
    TAG_PROBLEM_CAUSE_N_PLUS_ONE, TAG_PROBLEM_CONTEXT,
};

/// Greedy plus three-sigma attribution shared by both cause rules
#[derive(Debug, Clone, Copy)]
struct Attribution {
    proportion: f64,
    sigma_factor: f64,
}

impl Attribution {
    fn new(thresholds: &Thresholds) -> Self {
        Self {
            proportion: thresholds.proportion,
            sigma_factor: thresholds.sigma_factor,
        }
    }

    /// Folds candidates into one aggregate keyed by the first candidate
    ///
    /// Candidates are taken in order while their exclusive sum stays below the
    /// proportion of `context_duration`; the first one is always taken. Remaining
    /// candidates join while they stay above `mean - sigma_factor * stddev` of
    /// the ones already taken.
    fn attribute(
        &self,
        tree: &InvocationTree,
        candidates: &[NodeId],
        context_duration: f64,
    ) -> Result<AggregatedInvocation, DiagnosisError> {
        let first = candidates.first().ok_or(DiagnosisError::EmptyCause)?;
        let mut cause = AggregatedInvocation::new(AggregationKey::of(tree.node(*first)?));
        let limit = self.proportion * context_duration;

        let mut sum = 0.0;
        let mut consumed = 0;
        while consumed < candidates.len() && (consumed == 0 || sum < limit) {
            let id = candidates[consumed];
            let node = tree.node(id)?;
            if node.data.timer().is_none() {
                return Err(DiagnosisError::MissingTimingData(id));
            }
            cause.push(id, node);
            sum += node.exclusive_time();
            consumed += 1;
        }

        if consumed > 1 && consumed < candidates.len() {
            let mean = sum / consumed as f64;
            let variance = cause
                .exclusive_times()
                .iter()
                .map(|time| (time - mean).powi(2))
                .sum::<f64>()
                / consumed as f64;
            let lower = mean - self.sigma_factor * variance.sqrt();

            for id in &candidates[consumed..] {
                let node = tree.node(*id)?;
                if node.exclusive_time() <= lower {
                    break;
                }
                cause.push(*id, node);
            }
        }

        Ok(cause)
    }
}

/// True when the problem context is one single SQL invocation
fn is_single_database_call(input: &RuleInput<'_, DiagnosisFact>) -> bool {
    let Some(cluster) = input.tag(TAG_PROBLEM_CONTEXT).and_then(DiagnosisFact::as_cluster) else {
        return false;
    };
    let Ok(tree) = input.tree() else {
        return false;
    };
    match cluster.invocations() {
        [only] => tree.get(*only).is_some_and(|node| node.has_sql_data()),
        _ => false,
    }
}

/// Isolates the methods responsible within the problem context
#[derive(Debug, Clone)]
pub struct ProblemCauseRule {
    attribution: Attribution,
}

impl ProblemCauseRule {
    pub fn new(thresholds: &Thresholds) -> Self {
        Self {
            attribution: Attribution::new(thresholds),
        }
    }

    pub fn root_cause(
        &self,
        tree: &InvocationTree,
        cluster: &CauseCluster,
    ) -> Result<AggregatedInvocation, DiagnosisError> {
        let context_duration = tree.node(cluster.common_context())?.duration;
        self.attribution
            .attribute(tree, cluster.invocations(), context_duration)
    }
}

impl Rule<DiagnosisFact> for ProblemCauseRule {
    fn descriptor(&self) -> RuleDescriptor {
        RuleDescriptor::new("ProblemCauseRule", TAG_PROBLEM_CAUSE).input(TAG_PROBLEM_CONTEXT)
    }

    fn condition(&self, input: &RuleInput<'_, DiagnosisFact>) -> bool {
        !is_single_database_call(input)
    }

    fn action(&self, input: &RuleInput<'_, DiagnosisFact>) -> ActionResult<DiagnosisFact> {
        let tree = input.tree()?;
        let cluster = input.cluster(TAG_PROBLEM_CONTEXT)?;

        let cause = self.root_cause(tree, cluster)?;
        debug!(
            method_ident = cause.method_ident(),
            members = cause.size(),
            exclusive_time = cause.exclusive_time(),
            "Root cause attributed"
        );
        Ok(RuleOutput::Single(DiagnosisFact::Aggregate(cause)))
    }
}

/// Database variant: a lone expensive SQL call among many repeated statements
#[derive(Debug, Clone)]
pub struct ProblemCauseNPlusOneRule {
    attribution: Attribution,
    min_calls: usize,
}

impl ProblemCauseNPlusOneRule {
    pub fn new(thresholds: &Thresholds) -> Self {
        Self {
            attribution: Attribution::new(thresholds),
            min_calls: thresholds.min_calls_n_plus_one,
        }
    }

    /// Node whose direct children are searched for repeated statements
    ///
    /// A lone call is its own common context, so the search moves up to its caller.
    fn scope(tree: &InvocationTree, cluster: &CauseCluster) -> Result<NodeId, DiagnosisError> {
        let context = cluster.common_context();
        if cluster.invocations() == [context] {
            return Ok(tree.node(context)?.parent().unwrap_or(context));
        }
        Ok(context)
    }

    /// Members of frequently repeated statements followed by the expensive call;
    /// the cluster itself when nothing repeats often enough
    fn candidates(
        &self,
        tree: &InvocationTree,
        scope: NodeId,
        cluster: &CauseCluster,
    ) -> Result<Vec<NodeId>, DiagnosisError> {
        let children = tree.node(scope)?.children().iter().copied();
        let mut candidates: Vec<NodeId> = Aggregator::aggregate(tree, children)?
            .into_iter()
            .filter(|aggregate| aggregate.is_sql() && aggregate.size() > self.min_calls)
            .flat_map(|aggregate| aggregate.members().to_vec())
            .collect();

        if candidates.is_empty() {
            return Ok(cluster.invocations().to_vec());
        }
        for call in cluster.invocations() {
            if !candidates.contains(call) {
                candidates.push(*call);
            }
        }
        Ok(candidates)
    }

    pub fn root_cause(
        &self,
        tree: &InvocationTree,
        cluster: &CauseCluster,
    ) -> Result<AggregatedInvocation, DiagnosisError> {
        let scope = Self::scope(tree, cluster)?;
        let candidates = self.candidates(tree, scope, cluster)?;
        let scope_duration = tree.node(scope)?.duration;
        self.attribution.attribute(tree, &candidates, scope_duration)
    }
}

impl Rule<DiagnosisFact> for ProblemCauseNPlusOneRule {
    fn descriptor(&self) -> RuleDescriptor {
        RuleDescriptor::new("ProblemCauseNPlusOneRule", TAG_PROBLEM_CAUSE_N_PLUS_ONE)
            .input(TAG_PROBLEM_CONTEXT)
    }

    fn condition(&self, input: &RuleInput<'_, DiagnosisFact>) -> bool {
        is_single_database_call(input)
    }

    fn action(&self, input: &RuleInput<'_, DiagnosisFact>) -> ActionResult<DiagnosisFact> {
        let tree = input.tree()?;
        let cluster = input.cluster(TAG_PROBLEM_CONTEXT)?;

        let cause = self.root_cause(tree, cluster)?;
        debug!(
            method_ident = cause.method_ident(),
            members = cause.size(),
            "N+1 root cause attributed"
        );
        Ok(RuleOutput::Single(DiagnosisFact::Aggregate(cause)))
    }
}
