//! Root-cause diagnosis for slow traces
//!
//! A slow call tree goes through a fixed rule chain: global context, the
//! operations wasting most time in it, the problem context grouping them,
//! the root cause, and the structure of that cause (single, iterative,
//! recursive, N+1). [`service::DiagnosisService`] runs the chain on a pool of
//! worker sessions and hands [`results::ProblemOccurrence`]s to notifiers.

pub mod common;
pub mod config;
pub mod engine;
pub mod logging;
pub mod results;
pub mod rules;
pub mod service;
pub mod trace_file;
pub mod tree;
