use std::sync::Arc;

use tracing::trace;

use crate::tree::InvocationTree;

use super::diagnosis_service::DiagnosisService;

/// Entry point for a trace source: filters fast traces and forwards the rest
pub struct DiagnosisProcessor {
    service: Arc<DiagnosisService>,
    baseline: f64,
}

impl DiagnosisProcessor {
    pub fn new(service: Arc<DiagnosisService>, baseline: f64) -> Self {
        Self { service, baseline }
    }

    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    /// Only traces slower than the baseline are worth diagnosing
    pub fn can_be_processed(&self, tree: &InvocationTree) -> bool {
        tree.get(tree.root())
            .is_some_and(|root| root.duration > self.baseline)
    }

    /// Returns whether the trace was queued
    pub fn process(&self, tree: Arc<InvocationTree>) -> bool {
        if !self.can_be_processed(&tree) {
            trace!(baseline = self.baseline, "Trace below baseline, skipped");
            return false;
        }
        self.service.diagnose(tree, self.baseline)
    }
}
