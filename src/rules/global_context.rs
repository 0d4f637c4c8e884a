use crate::common::constants::BASELINE_VARIABLE;
use crate::engine::{ActionResult, Rule, RuleDescriptor, RuleInput, RuleOutput};

use super::{DiagnosisFact, DiagnosisInput, TAG_GLOBAL_CONTEXT, TAG_ROOT};

/// Finds the most specific node still responsible for the baseline violation
///
/// Starting at the request root, descends into the longest child for as long
/// as that child alone exceeds the baseline.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalContextRule;

impl Rule<DiagnosisFact> for GlobalContextRule {
    fn descriptor(&self) -> RuleDescriptor {
        RuleDescriptor::new("GlobalContextRule", TAG_GLOBAL_CONTEXT)
            .input(TAG_ROOT)
            .variable(BASELINE_VARIABLE)
    }

    fn action(&self, input: &RuleInput<'_, DiagnosisFact>) -> ActionResult<DiagnosisFact> {
        let tree = input.tree()?;
        let baseline = input.baseline()?;

        let mut current = tree.root();
        loop {
            let mut heaviest = None;
            let mut heaviest_duration = f64::NEG_INFINITY;
            // first child wins on equal durations
            for child in tree.node(current)?.children() {
                let duration = tree.node(*child)?.duration;
                if duration > heaviest_duration {
                    heaviest = Some(*child);
                    heaviest_duration = duration;
                }
            }
            match heaviest {
                Some(child) if heaviest_duration > baseline => current = child,
                _ => break,
            }
        }

        Ok(RuleOutput::Single(DiagnosisFact::Node(current)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::rules::session_variables;
    use crate::rules::test_support::input;
    use crate::tree::{InvocationTree, NodeId, NodeSpec, TreeBuilder};

    fn three_children() -> (InvocationTree, NodeId) {
        let mut builder = TreeBuilder::new();
        let root = builder.root(NodeSpec::new(1, 4700.0).with_timer(0.0));
        builder.child(root, NodeSpec::new(2, 200.0).with_timer(200.0)).unwrap();
        let heavy = builder.child(root, NodeSpec::new(3, 4000.0).with_timer(4000.0)).unwrap();
        builder.child(root, NodeSpec::new(4, 500.0).with_timer(500.0)).unwrap();
        (builder.build().unwrap(), heavy)
    }

    fn global_context(tree: InvocationTree, baseline: f64) -> NodeId {
        let root = DiagnosisFact::Root(Arc::new(tree));
        let variables = session_variables(baseline);
        let bound = input(&root, vec![(TAG_ROOT, Some(&root))], &variables);
        match GlobalContextRule.action(&bound).unwrap() {
            RuleOutput::Single(DiagnosisFact::Node(id)) => id,
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn test_descends_into_longest_child_above_baseline() {
        let (tree, heavy) = three_children();
        assert_eq!(global_context(tree, 1000.0), heavy);
    }

    #[test]
    fn test_root_when_no_child_exceeds_baseline() {
        let (tree, _) = three_children();
        let root = tree.root();
        assert_eq!(global_context(tree, 4500.0), root);
    }

    #[test]
    fn test_descends_several_levels() {
        let mut builder = TreeBuilder::new();
        let root = builder.root(NodeSpec::new(1, 5000.0).with_timer(0.0));
        let level1 = builder.child(root, NodeSpec::new(2, 4800.0).with_timer(0.0)).unwrap();
        let level2 = builder.child(level1, NodeSpec::new(3, 4500.0).with_timer(100.0)).unwrap();
        builder.child(level2, NodeSpec::new(4, 900.0).with_timer(900.0)).unwrap();
        builder.child(level2, NodeSpec::new(5, 800.0).with_timer(800.0)).unwrap();

        assert_eq!(global_context(builder.build().unwrap(), 1000.0), level2);
    }

    #[test]
    fn test_single_node_tree_is_its_own_context() {
        let mut builder = TreeBuilder::new();
        let root = builder.root(NodeSpec::new(1, 3000.0).with_timer(3000.0));
        assert_eq!(global_context(builder.build().unwrap(), 1000.0), root);
    }
}
