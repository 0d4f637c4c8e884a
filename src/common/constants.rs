//! Diagnosis thresholds and service defaults
// Rule thresholds
pub const DEFAULT_BASELINE: f64 = 1000.0;
pub const DEFAULT_PROPORTION: f64 = 0.8;
pub const DEFAULT_MIN_CALLS_TIME_WASTING: usize = 20; // N+1 style repetition
pub const DEFAULT_MIN_CALLS_N_PLUS_ONE: usize = 10;
pub const DEFAULT_SIGMA_FACTOR: f64 = 3.0;
pub const DEFAULT_MAX_MERGE_ROUNDS: usize = 1000;

// Session variables
pub const BASELINE_VARIABLE: &str = "baseline";

// Service defaults
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_ENQUEUE_TIMEOUT_MS: u64 = 50;
pub const DEFAULT_ENQUEUE_ATTEMPTS: u32 = 3;
pub const DEFAULT_RESULT_CAPACITY: usize = 1000;
pub const WORKER_THREAD_PREFIX: &str = "diagnosis-worker";

// File patterns
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_TRACE_DIR: &str = "traces";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const LOG_FILE_NAME: &str = "trace_diagnosis.log";
pub const DEFAULT_LOG_RETENTION_DAYS: u32 = 30;
pub const TRACE_FILE_EXTENSION: &str = "json";
