//! Generic forward-chaining rule engine
//!
//! A [`RuleGraph`] is registered once and shared; each [`Session`] owns its
//! own [`FactStore`] and is reused across activations.

pub mod errors;
pub mod facts;
pub mod graph;
pub mod rule;
pub mod session;

#[cfg(test)]
mod tests;

pub use errors::{ActionError, RuleDefinitionError, SessionError, SessionState};
pub use facts::{FactStore, Lineage, Tag, TagId};
pub use graph::{RuleGraph, ScheduledRule};
pub use rule::{
    ActionResult, Quantity, Rule, RuleDescriptor, RuleInput, RuleOutput, SessionVariables, TagInput,
    VariableInput,
};
pub use session::{Session, SessionResultCollector};
