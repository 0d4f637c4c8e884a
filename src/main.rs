use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use trace_diagnosis::common::constants::{DEFAULT_CONFIG_PATH, TRACE_FILE_EXTENSION};
use trace_diagnosis::config::DiagnosisConfig;
use trace_diagnosis::logging::{cleanup_old_logs, init_dual_logging, log_runtime_info};
use trace_diagnosis::results::{
    DiagnosisResults, NameTable, NotifierFanout, RequestRootIndex, ResultPrinter,
};
use trace_diagnosis::rules::diagnosis_rules;
use trace_diagnosis::service::{DiagnosisProcessor, DiagnosisService};
use trace_diagnosis::trace_file::TraceFile;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    // Pre-load configuration to get logging settings
    let config = match DiagnosisConfig::from_toml(&config_path) {
        Ok(config) => {
            println!("✅ Loaded configuration from {}", config_path);
            config
        }
        Err(e) => {
            println!("⚠️ Failed to load {}: {}. Using default configuration", config_path, e);
            DiagnosisConfig::default()
        }
    };

    let _logging_guard = match init_dual_logging(&config.logging) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("❌ Failed to initialize logging system: {}", e);
            let fallback = tracing_subscriber::fmt()
                .with_env_filter(config.logging.level_filter.as_str())
                .try_init();
            if fallback.is_ok() {
                error!("⚠️ Using fallback console-only logging due to error: {}", e);
            }
            None
        }
    };

    if let Err(e) = cleanup_old_logs(&config.logging) {
        warn!("⚠️ Failed to clean up old log files: {}", e);
    }
    log_runtime_info(&config.service);

    info!(
        baseline = config.baseline,
        trace_dir = %config.trace_dir.display(),
        "🔧 Diagnosis configuration loaded"
    );

    if let Err(e) = run(config).await {
        error!("💥 Diagnosis run failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: DiagnosisConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let traces = load_traces(&config.trace_dir).await?;
    info!("📂 Loaded {} trace files from {}", traces.len(), config.trace_dir.display());

    let mut names = NameTable::new();
    for (_, trace) in &traces {
        trace.add_names(&mut names);
    }

    let store = Arc::new(DiagnosisResults::new(config.service.result_capacity));
    let index = Arc::new(RequestRootIndex::new());
    let notifier = NotifierFanout::new()
        .with(Arc::new(ResultPrinter::new(Arc::new(names))))
        .with(store.clone())
        .with(index.clone());

    let service = Arc::new(DiagnosisService::start(
        config.service.clone(),
        diagnosis_rules(&config.thresholds),
        Arc::new(notifier),
    )?);
    let processor = Arc::new(DiagnosisProcessor::new(service.clone(), config.baseline));

    for (path, trace) in traces {
        let tree = match trace.to_tree() {
            Ok(tree) => Arc::new(tree),
            Err(e) => {
                warn!("⚠️ Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        if !processor.can_be_processed(&tree) {
            debug!("Trace {} is faster than the baseline", path.display());
            continue;
        }

        // Admission may block on a full queue
        let processor = processor.clone();
        let accepted = tokio::task::spawn_blocking(move || processor.process(tree)).await?;
        if !accepted {
            warn!("⚠️ Trace {} rejected by the diagnosis queue", path.display());
        }
    }

    let drained = service.clone();
    tokio::task::spawn_blocking(move || drained.shutdown()).await?;

    let metrics = service.metrics();
    info!(
        accepted = metrics.accepted,
        rejected = metrics.rejected,
        diagnosed = metrics.diagnosed,
        failed = metrics.failed,
        results = metrics.results,
        "📊 Diagnosis run finished"
    );

    for occurrence in store.all() {
        info!(
            occurrence = occurrence.id,
            request_root = occurrence.request_root.invocation_id,
            cause_type = %occurrence.cause_structure.cause_type,
            "{}",
            serde_json::to_string(&occurrence)?
        );
    }
    info!("🏁 {} request roots with problem occurrences", index.len());
    Ok(())
}

/// Reads every trace file of `dir`, in file-name order
async fn load_traces(dir: &Path) -> Result<Vec<(PathBuf, TraceFile)>, std::io::Error> {
    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == TRACE_FILE_EXTENSION) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut traces = Vec::with_capacity(paths.len());
    for path in paths {
        let content = tokio::fs::read_to_string(&path).await?;
        match TraceFile::from_json(&content) {
            Ok(trace) => traces.push((path, trace)),
            Err(e) => warn!("⚠️ Failed to parse {}: {}", path.display(), e),
        }
    }
    Ok(traces)
}
