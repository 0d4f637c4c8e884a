//! Console and rolling-file logging
//!
//! Diagnosis workers run every request inside a `diagnosis` span carrying the
//! worker index and the request root invocation, and the JSON file layer
//! records that span on every event so a single diagnosis can be followed
//! through the file log.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Layer,
};

use crate::common::constants::{DEFAULT_LOG_DIR, DEFAULT_LOG_RETENTION_DAYS, LOG_FILE_NAME};
use crate::service::ServiceConfig;

const SECONDS_PER_DAY: u64 = 24 * 3600;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to prepare log directory: {0}")]
    Io(#[from] io::Error),

    #[error("A global subscriber is already installed: {0}")]
    Subscriber(#[from] TryInitError),
}

/// How often the file log starts a new file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Minutely => Rotation::MINUTELY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    /// `EnvFilter` directives, overridden by `RUST_LOG`
    pub level_filter: String,
    pub rotation: LogRotation,
    /// Files untouched for longer are removed at startup; 0 keeps everything
    pub retention_days: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            level_filter: "info,trace_diagnosis=info".to_string(),
            rotation: LogRotation::Daily,
            retention_days: DEFAULT_LOG_RETENTION_DAYS,
        }
    }
}

impl LoggingConfig {
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level_filter))
    }
}

/// Installs the console layer and the JSON rolling-file layer
///
/// The returned guard flushes the file writer when dropped, so keep it for
/// the lifetime of the process.
pub fn init_dual_logging(config: &LoggingConfig) -> Result<WorkerGuard, LoggingError> {
    fs::create_dir_all(&config.log_dir)?;

    let appender = RollingFileAppender::new(config.rotation.into(), &config.log_dir, LOG_FILE_NAME);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    // Worker threads are named diagnosis-worker-<n>
    let console_layer = fmt::layer()
        .with_thread_names(true)
        .with_timer(ChronoUtc::new("%H:%M:%S%.3f".to_string()))
        .with_filter(config.filter());

    let file_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_thread_names(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(file_writer)
        .with_filter(config.filter());

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    info!(
        log_dir = %config.log_dir.display(),
        rotation = ?config.rotation,
        "📁 Logging to console and {}",
        LOG_FILE_NAME
    );
    Ok(guard)
}

/// Removes diagnosis log files older than `retention_days`
pub fn cleanup_old_logs(config: &LoggingConfig) -> io::Result<usize> {
    if config.retention_days == 0 {
        return Ok(0);
    }
    let retention = Duration::from_secs(u64::from(config.retention_days) * SECONDS_PER_DAY);
    let Some(cutoff) = SystemTime::now().checked_sub(retention) else {
        return Ok(0);
    };

    let mut removed = 0;
    for (path, modified) in log_files(&config.log_dir)? {
        if modified >= cutoff {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                removed += 1;
                debug!(path = %path.display(), "Removed expired log file");
            }
            Err(e) => warn!(path = %path.display(), error = %e, "⚠️ Could not remove log file"),
        }
    }

    if removed > 0 {
        info!(removed, retention_days = config.retention_days, "🧹 Expired log files removed");
    }
    Ok(removed)
}

/// Diagnosis log files in `dir` with their modification time, by name
fn log_files(dir: &Path) -> io::Result<Vec<(PathBuf, SystemTime)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !is_log_file(&path) {
            continue;
        }
        let metadata = entry.metadata()?;
        if metadata.is_file() {
            files.push((path, metadata.modified()?));
        }
    }
    files.sort();
    Ok(files)
}

/// `trace_diagnosis.log` and its rotated `trace_diagnosis.log.<period>` files
fn is_log_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| {
            name == LOG_FILE_NAME || name.strip_prefix(LOG_FILE_NAME).is_some_and(|rest| rest.starts_with('.'))
        })
}

/// Logs the build and how the worker pool relates to the available cores
pub fn log_runtime_info(service: &ServiceConfig) {
    let cpus = num_cpus::get();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        cpus,
        workers = service.session_workers,
        queue_capacity = service.queue_capacity,
        "🖥️ Diagnosis runtime"
    );
    if service.session_workers > cpus {
        warn!(
            workers = service.session_workers,
            cpus,
            "⚠️ More session workers than cores; diagnoses will contend for CPU"
        );
    }
}
