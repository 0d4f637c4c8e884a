//! Rule registration and scheduling
//!
//! Rules are ordered once, at registration, by the tags they read and write.
//! The resulting plan is immutable and shared by every session.

use std::collections::{BTreeSet, HashSet};

use rustc_hash::FxHashMap;
use tracing::{debug, info};

use super::errors::RuleDefinitionError;
use super::rule::{Rule, RuleDescriptor};

/// A registered rule together with its metadata and binding anchor
pub struct ScheduledRule<V> {
    pub(super) rule: Box<dyn Rule<V>>,
    pub(super) descriptor: RuleDescriptor,
    /// Input tag whose values drive the firings; the deepest required input
    pub(super) anchor: &'static str,
}

impl<V> ScheduledRule<V> {
    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    pub fn descriptor(&self) -> &RuleDescriptor {
        &self.descriptor
    }

    pub fn anchor(&self) -> &'static str {
        self.anchor
    }
}

/// Topologically sorted rule set
pub struct RuleGraph<V> {
    root_tag: &'static str,
    rules: Vec<ScheduledRule<V>>,
}

impl<V> std::fmt::Debug for RuleGraph<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleGraph")
            .field("root_tag", &self.root_tag)
            .field("order", &self.execution_order())
            .finish()
    }
}

impl<V> RuleGraph<V> {
    /// Validates and orders `rules`; `root_tag` is the tag seeded by activation
    pub fn register(
        root_tag: &'static str,
        rules: Vec<Box<dyn Rule<V>>>,
    ) -> Result<Self, RuleDefinitionError> {
        let descriptors: Vec<RuleDescriptor> = rules.iter().map(|rule| rule.descriptor()).collect();

        validate_declarations(root_tag, &descriptors)?;

        let mut producers: FxHashMap<&'static str, Vec<usize>> = FxHashMap::default();
        for (index, descriptor) in descriptors.iter().enumerate() {
            producers.entry(descriptor.output).or_default().push(index);
        }

        for descriptor in &descriptors {
            for input in &descriptor.inputs {
                if input.tag != root_tag && !input.optional && !producers.contains_key(input.tag) {
                    return Err(RuleDefinitionError::MissingProducer {
                        rule: descriptor.name.to_string(),
                        tag: input.tag.to_string(),
                    });
                }
            }
        }

        let order = topological_order(&descriptors, &producers)?;
        let anchors = binding_anchors(root_tag, &descriptors, &order);

        let mut slots: Vec<Option<Box<dyn Rule<V>>>> = rules.into_iter().map(Some).collect();
        let mut scheduled = Vec::with_capacity(order.len());
        for index in order {
            if let Some(rule) = slots[index].take() {
                scheduled.push(ScheduledRule {
                    rule,
                    descriptor: descriptors[index].clone(),
                    anchor: anchors[index],
                });
            }
        }

        let graph = Self {
            root_tag,
            rules: scheduled,
        };
        info!(
            root_tag,
            order = ?graph.execution_order(),
            "📐 Rule graph registered with {} rules",
            graph.rules.len()
        );
        Ok(graph)
    }

    pub fn root_tag(&self) -> &'static str {
        self.root_tag
    }

    /// Rule names in firing order
    pub fn execution_order(&self) -> Vec<&'static str> {
        self.rules.iter().map(ScheduledRule::name).collect()
    }

    pub fn rules(&self) -> &[ScheduledRule<V>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn validate_declarations(
    root_tag: &'static str,
    descriptors: &[RuleDescriptor],
) -> Result<(), RuleDefinitionError> {
    let mut names = HashSet::new();
    for descriptor in descriptors {
        let rule = descriptor.name.to_string();
        if !names.insert(descriptor.name) {
            return Err(RuleDefinitionError::DuplicateRuleName(rule));
        }
        if descriptor.inputs.is_empty() {
            return Err(RuleDefinitionError::NoInputs { rule });
        }
        if descriptor.output == root_tag {
            return Err(RuleDefinitionError::WritesRootTag {
                rule,
                tag: root_tag.to_string(),
            });
        }

        let mut seen_tags = HashSet::new();
        for input in &descriptor.inputs {
            if !seen_tags.insert(input.tag) {
                return Err(RuleDefinitionError::DuplicateInput {
                    rule,
                    name: input.tag.to_string(),
                });
            }
        }
        let mut seen_variables = HashSet::new();
        for variable in &descriptor.session_variables {
            if seen_tags.contains(variable.name) {
                return Err(RuleDefinitionError::ConflictingDeclaration {
                    rule,
                    name: variable.name.to_string(),
                });
            }
            if !seen_variables.insert(variable.name) {
                return Err(RuleDefinitionError::DuplicateInput {
                    rule,
                    name: variable.name.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Kahn's algorithm; ties resolved by registration order
fn topological_order(
    descriptors: &[RuleDescriptor],
    producers: &FxHashMap<&'static str, Vec<usize>>,
) -> Result<Vec<usize>, RuleDefinitionError> {
    let count = descriptors.len();
    let mut dependents: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); count];
    let mut in_degree = vec![0usize; count];

    for (consumer, descriptor) in descriptors.iter().enumerate() {
        let mut upstream = BTreeSet::new();
        for input in &descriptor.inputs {
            if let Some(sources) = producers.get(input.tag) {
                upstream.extend(sources.iter().copied());
            }
        }
        in_degree[consumer] = upstream.len();
        for producer in upstream {
            dependents[producer].insert(consumer);
        }
    }

    let mut ready: BTreeSet<usize> = (0..count).filter(|index| in_degree[*index] == 0).collect();
    let mut order = Vec::with_capacity(count);
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for dependent in &dependents[next] {
            in_degree[*dependent] -= 1;
            if in_degree[*dependent] == 0 {
                ready.insert(*dependent);
            }
        }
    }

    if order.len() < count {
        let rules = (0..count)
            .filter(|index| in_degree[*index] > 0)
            .map(|index| descriptors[index].name.to_string())
            .collect();
        return Err(RuleDefinitionError::Cycle { rules });
    }

    debug!(?order, "Rule dependency order resolved");
    Ok(order)
}

/// Picks, per rule, the required input tag furthest from the root
fn binding_anchors(
    root_tag: &'static str,
    descriptors: &[RuleDescriptor],
    order: &[usize],
) -> Vec<&'static str> {
    let mut depth: FxHashMap<&'static str, usize> = FxHashMap::default();
    depth.insert(root_tag, 0);
    let mut anchors = vec![root_tag; descriptors.len()];

    for index in order {
        let descriptor = &descriptors[*index];
        let mut anchor = root_tag;
        let mut anchor_depth = 0;
        for input in descriptor.inputs.iter().filter(|input| !input.optional) {
            if let Some(input_depth) = depth.get(input.tag) {
                if *input_depth > anchor_depth {
                    anchor = input.tag;
                    anchor_depth = *input_depth;
                }
            }
        }
        anchors[*index] = anchor;
        let output_depth = depth.entry(descriptor.output).or_insert(0);
        *output_depth = (*output_depth).max(anchor_depth + 1);
    }
    anchors
}
