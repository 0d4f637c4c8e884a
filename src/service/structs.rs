use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::constants::{
    DEFAULT_ENQUEUE_ATTEMPTS, DEFAULT_ENQUEUE_TIMEOUT_MS, DEFAULT_QUEUE_CAPACITY, DEFAULT_RESULT_CAPACITY,
};
use crate::tree::InvocationTree;

/// Worker pool and admission settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub session_workers: usize,
    pub queue_capacity: usize,
    pub enqueue_timeout_ms: u64,
    pub enqueue_attempts: u32,
    pub result_capacity: usize,
}

impl ServiceConfig {
    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            session_workers: num_cpus::get(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            enqueue_timeout_ms: DEFAULT_ENQUEUE_TIMEOUT_MS,
            enqueue_attempts: DEFAULT_ENQUEUE_ATTEMPTS,
            result_capacity: DEFAULT_RESULT_CAPACITY,
        }
    }
}

/// One queued diagnosis
#[derive(Debug, Clone)]
pub struct DiagnosisRequest {
    pub tree: Arc<InvocationTree>,
    pub baseline: f64,
}
