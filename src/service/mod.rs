//! Diagnosis worker pool
//!
//! A bounded queue of [`DiagnosisRequest`]s feeds a fixed number of worker
//! threads, each reusing one session for every request it takes.

pub mod diagnosis_service;
pub mod errors;
pub mod metrics;
pub mod processor;
pub mod structs;


pub use diagnosis_service::DiagnosisService;
pub use errors::ServiceError;
pub use metrics::{ServiceMetrics, ServiceMetricsSnapshot};
pub use processor::DiagnosisProcessor;
pub use structs::{DiagnosisRequest, ServiceConfig};
