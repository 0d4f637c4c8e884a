use std::sync::Arc;

use super::*;

/// Test rule over integer facts: reads its inputs, writes their sum plus an offset
struct Sum {
    descriptor: RuleDescriptor,
    offset: i64,
    fan_out: usize,
}

impl Sum {
    fn new(name: &'static str, output: &'static str, inputs: &[&'static str]) -> Self {
        let descriptor = inputs
            .iter()
            .fold(RuleDescriptor::new(name, output), |d, tag| d.input(*tag));
        Self {
            descriptor,
            offset: 0,
            fan_out: 1,
        }
    }

    fn offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    fn fan_out(mut self, fan_out: usize) -> Self {
        self.descriptor = self.descriptor.multiple();
        self.fan_out = fan_out;
        self
    }

    fn boxed(self) -> Box<dyn Rule<i64>> {
        Box::new(self)
    }
}

impl Rule<i64> for Sum {
    fn descriptor(&self) -> RuleDescriptor {
        self.descriptor.clone()
    }

    fn action(&self, input: &RuleInput<'_, i64>) -> ActionResult<i64> {
        let mut total = self.offset;
        for tag in &self.descriptor.inputs {
            total += input.require(tag.tag)?;
        }
        if self.fan_out == 1 {
            return Ok(RuleOutput::Single(total));
        }
        Ok(RuleOutput::Multiple(
            (0..self.fan_out as i64).map(|i| total * 10 + i).collect(),
        ))
    }
}

/// Writes two values while declaring a single one
struct Liar;

impl Rule<i64> for Liar {
    fn descriptor(&self) -> RuleDescriptor {
        RuleDescriptor::new("liar", "b").input("root")
    }

    fn action(&self, _input: &RuleInput<'_, i64>) -> ActionResult<i64> {
        Ok(RuleOutput::Multiple(vec![1, 2]))
    }
}

/// Scales the root by a session variable, gated on the root being positive
struct Scale;

impl Rule<i64> for Scale {
    fn descriptor(&self) -> RuleDescriptor {
        RuleDescriptor::new("scale", "scaled")
            .input("root")
            .variable("factor")
    }

    fn condition(&self, input: &RuleInput<'_, i64>) -> bool {
        *input.root() > 0
    }

    fn action(&self, input: &RuleInput<'_, i64>) -> ActionResult<i64> {
        let factor = input.require_variable("factor")?;
        Ok(RuleOutput::Single((*input.root() as f64 * factor) as i64))
    }
}

fn graph(rules: Vec<Box<dyn Rule<i64>>>) -> Arc<RuleGraph<i64>> {
    Arc::new(RuleGraph::register("root", rules).expect("rule graph should register"))
}

fn values(facts: &FactStore<i64>, tag: &str) -> Vec<i64> {
    facts.values(tag).copied().collect()
}

#[test]
fn test_execution_order_follows_dependencies() {
    // registered out of order on purpose
    let graph = graph(vec![
        Sum::new("c", "c", &["b"]).boxed(),
        Sum::new("a", "a", &["root"]).boxed(),
        Sum::new("b", "b", &["a"]).boxed(),
    ]);
    assert_eq!(graph.execution_order(), vec!["a", "b", "c"]);
}

#[test]
fn test_independent_rules_keep_registration_order() {
    let graph = graph(vec![
        Sum::new("second", "x", &["root"]).boxed(),
        Sum::new("first", "y", &["root"]).boxed(),
    ]);
    assert_eq!(graph.execution_order(), vec!["second", "first"]);
}

#[test]
fn test_cycle_is_rejected() {
    let result = RuleGraph::register(
        "root",
        vec![
            Sum::new("a", "a", &["root", "b"]).boxed(),
            Sum::new("b", "b", &["a"]).boxed(),
        ],
    );
    match result {
        Err(RuleDefinitionError::Cycle { rules }) => {
            assert!(rules.contains(&"a".to_string()));
            assert!(rules.contains(&"b".to_string()));
        }
        other => panic!("expected cycle, got {:?}", other),
    }
}

#[test]
fn test_missing_producer_is_rejected() {
    let result = RuleGraph::register("root", vec![Sum::new("a", "a", &["ghost"]).boxed()]);
    assert_eq!(
        result.unwrap_err(),
        RuleDefinitionError::MissingProducer {
            rule: "a".to_string(),
            tag: "ghost".to_string(),
        }
    );
}

#[test]
fn test_invalid_declarations_are_rejected() {
    struct Conflicting;
    impl Rule<i64> for Conflicting {
        fn descriptor(&self) -> RuleDescriptor {
            RuleDescriptor::new("conflicting", "out")
                .input("root")
                .variable("root")
        }
        fn action(&self, _input: &RuleInput<'_, i64>) -> ActionResult<i64> {
            Ok(RuleOutput::Nothing)
        }
    }

    assert!(matches!(
        RuleGraph::register("root", vec![Box::new(Conflicting) as Box<dyn Rule<i64>>]),
        Err(RuleDefinitionError::ConflictingDeclaration { .. })
    ));
    assert!(matches!(
        RuleGraph::register("root", vec![Sum::new("empty", "out", &[]).boxed()]),
        Err(RuleDefinitionError::NoInputs { .. })
    ));
    assert!(matches!(
        RuleGraph::register(
            "root",
            vec![
                Sum::new("twice", "a", &["root"]).boxed(),
                Sum::new("twice", "b", &["root"]).boxed(),
            ]
        ),
        Err(RuleDefinitionError::DuplicateRuleName(_))
    ));
    assert!(matches!(
        RuleGraph::register("root", vec![Sum::new("loop", "root", &["root"]).boxed()]),
        Err(RuleDefinitionError::WritesRootTag { .. })
    ));
}

#[test]
fn test_chain_fires_in_order() {
    let mut session = Session::new(graph(vec![
        Sum::new("a", "a", &["root"]).offset(1).boxed(),
        Sum::new("b", "b", &["a"]).offset(1).boxed(),
    ]));
    session.activate(5, &SessionVariables::default()).unwrap();
    let facts = session.call().unwrap();

    assert_eq!(values(facts, "a"), vec![6]);
    assert_eq!(values(facts, "b"), vec![7]);
}

#[test]
fn test_multiple_values_fan_out_downstream() {
    // "a" writes 3 values, each gets its own "b" and "c"
    let mut session = Session::new(graph(vec![
        Sum::new("a", "a", &["root"]).fan_out(3).boxed(),
        Sum::new("b", "b", &["a"]).boxed(),
        Sum::new("c", "c", &["root", "a", "b"]).boxed(),
    ]));
    session.activate(1, &SessionVariables::default()).unwrap();
    let facts = session.call().unwrap();

    assert_eq!(values(facts, "a"), vec![10, 11, 12]);
    assert_eq!(values(facts, "b"), vec![10, 11, 12]);
    // root + a + b along each branch, never mixed across branches
    assert_eq!(values(facts, "c"), vec![21, 23, 25]);
    for tag in facts.tags("c") {
        let lineage: Vec<_> = facts.lineage(tag.id).map(|t| t.tag_type).collect();
        assert_eq!(lineage, vec!["c", "b", "a", "root"]);
    }
}

#[test]
fn test_rule_without_bound_input_does_not_fire() {
    struct Never;
    impl Rule<i64> for Never {
        fn descriptor(&self) -> RuleDescriptor {
            RuleDescriptor::new("never", "a").input("root")
        }
        fn action(&self, _input: &RuleInput<'_, i64>) -> ActionResult<i64> {
            Ok(RuleOutput::Nothing)
        }
    }

    let mut session = Session::new(graph(vec![
        Box::new(Never) as Box<dyn Rule<i64>>,
        Sum::new("b", "b", &["a"]).boxed(),
    ]));
    session.activate(1, &SessionVariables::default()).unwrap();
    let facts = session.call().unwrap();

    assert_eq!(facts.len(), 1);
    assert!(values(facts, "b").is_empty());
}

#[test]
fn test_condition_and_session_variables() {
    let graph = graph(vec![Box::new(Scale) as Box<dyn Rule<i64>>]);
    let mut session = Session::new(graph);
    let mut variables = SessionVariables::default();
    variables.insert("factor".to_string(), 2.5);

    session.activate(4, &variables).unwrap();
    assert_eq!(values(session.call().unwrap(), "scaled"), vec![10]);
    session.passivate();

    session.activate(-4, &variables).unwrap();
    assert!(values(session.call().unwrap(), "scaled").is_empty());
    session.passivate();

    session.activate(4, &SessionVariables::default()).unwrap();
    let error = session.call().unwrap_err();
    assert_eq!(error.rule(), Some("scale"));
    assert!(error.to_string().contains("factor"));
}

#[test]
fn test_single_quantity_is_enforced() {
    let mut session = Session::new(graph(vec![Box::new(Liar) as Box<dyn Rule<i64>>]));
    session.activate(0, &SessionVariables::default()).unwrap();
    let error = session.call().unwrap_err();
    assert_eq!(error.rule(), Some("liar"));
}

#[test]
fn test_illegal_state_transitions() {
    let mut session = Session::new(graph(vec![Sum::new("a", "a", &["root"]).boxed()]));

    assert!(matches!(
        session.call(),
        Err(SessionError::IllegalState {
            operation: "call",
            state: SessionState::Idle
        })
    ));

    session.activate(1, &SessionVariables::default()).unwrap();
    assert!(matches!(
        session.activate(2, &SessionVariables::default()),
        Err(SessionError::IllegalState {
            operation: "activate",
            state: SessionState::Activated
        })
    ));

    session.call().unwrap();
    assert_eq!(session.state(), SessionState::Processed);
    assert!(session.call().is_err());
    assert!(session.activate(2, &SessionVariables::default()).is_err());

    session.passivate();
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn test_reused_session_keeps_no_facts() {
    let mut session = Session::new(graph(vec![
        Sum::new("a", "a", &["root"]).fan_out(2).boxed(),
    ]));

    session.activate(1, &SessionVariables::default()).unwrap();
    assert_eq!(values(session.call().unwrap(), "a"), vec![10, 11]);
    session.passivate();
    assert!(session.facts().is_empty());

    session.activate(2, &SessionVariables::default()).unwrap();
    let facts = session.call().unwrap();
    assert_eq!(values(facts, "a"), vec![20, 21]);
    assert_eq!(facts.len(), 3);
}

#[test]
fn test_result_collector_reads_processed_facts() {
    struct CountOf(&'static str);
    impl SessionResultCollector<i64> for CountOf {
        type Output = usize;
        fn collect(&self, facts: &FactStore<i64>) -> usize {
            facts.values(self.0).count()
        }
    }

    let mut session = Session::new(graph(vec![
        Sum::new("a", "a", &["root"]).fan_out(4).boxed(),
    ]));
    session.activate(1, &SessionVariables::default()).unwrap();
    let facts = session.call().unwrap();
    assert_eq!(CountOf("a").collect(facts), 4);
}
