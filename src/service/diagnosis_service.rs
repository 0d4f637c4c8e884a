use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use tracing::{debug, error, info, info_span, warn};

use crate::common::constants::WORKER_THREAD_PREFIX;
use crate::engine::{Rule, RuleGraph, Session, SessionResultCollector};
use crate::results::{DiagnosisResultNotifier, ProblemOccurrenceCollector};
use crate::rules::{root_fact, session_variables, DiagnosisFact, TAG_ROOT};
use crate::tree::InvocationTree;

use super::errors::ServiceError;
use super::metrics::{ServiceMetrics, ServiceMetricsSnapshot};
use super::structs::{DiagnosisRequest, ServiceConfig};

/// Fixed pool of diagnosis workers fed by a bounded queue
///
/// Every worker owns one [`Session`] for its whole life. Admission through
/// [`DiagnosisService::diagnose`] blocks for at most
/// `enqueue_attempts * enqueue_timeout` and reports rejection instead of
/// buffering without bound.
pub struct DiagnosisService {
    config: ServiceConfig,
    sender: RwLock<Option<Sender<DiagnosisRequest>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    metrics: Arc<ServiceMetrics>,
}

impl DiagnosisService {
    /// Registers `rules` and spawns `config.session_workers` worker threads
    pub fn start(
        config: ServiceConfig,
        rules: Vec<Box<dyn Rule<DiagnosisFact>>>,
        notifier: Arc<dyn DiagnosisResultNotifier>,
    ) -> Result<Self, ServiceError> {
        let graph = Arc::new(RuleGraph::register(TAG_ROOT, rules)?);
        let (sender, receiver) = bounded(config.queue_capacity);
        let metrics = Arc::new(ServiceMetrics::new());

        let mut workers = Vec::with_capacity(config.session_workers);
        for worker in 0..config.session_workers {
            let graph = Arc::clone(&graph);
            let receiver = receiver.clone();
            let notifier = Arc::clone(&notifier);
            let metrics = Arc::clone(&metrics);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", WORKER_THREAD_PREFIX, worker))
                .spawn(move || run_worker(worker, graph, receiver, notifier, metrics));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Closing the queue lets the workers started so far exit
                    drop(sender);
                    join_all(workers);
                    return Err(ServiceError::Spawn(e));
                }
            }
        }

        info!(
            workers = config.session_workers,
            queue_capacity = config.queue_capacity,
            "🚀 Diagnosis service started"
        );

        Ok(Self {
            config,
            sender: RwLock::new(Some(sender)),
            workers: Mutex::new(workers),
            metrics,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Queues `tree` for diagnosis; `false` when the queue stayed full or the service is shut down
    pub fn diagnose(&self, tree: Arc<InvocationTree>, baseline: f64) -> bool {
        let Some(sender) = self.sender() else {
            warn!("⚠️ Diagnosis rejected: service is shut down");
            self.metrics.record_rejected();
            return false;
        };

        let timeout = self.config.enqueue_timeout();
        let mut request = DiagnosisRequest { tree, baseline };
        for attempt in 1..=self.config.enqueue_attempts {
            match sender.send_timeout(request, timeout) {
                Ok(()) => {
                    self.metrics.record_accepted();
                    return true;
                }
                Err(SendTimeoutError::Timeout(returned)) => {
                    debug!(attempt, "Diagnosis queue full, retrying");
                    request = returned;
                }
                Err(SendTimeoutError::Disconnected(_)) => break,
            }
        }

        self.metrics.record_rejected();
        warn!(
            attempts = self.config.enqueue_attempts,
            timeout_ms = self.config.enqueue_timeout_ms,
            "⚠️ Diagnosis rejected: queue full"
        );
        false
    }

    fn sender(&self) -> Option<Sender<DiagnosisRequest>> {
        match self.sender.read() {
            Ok(sender) => sender.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Requests waiting in the queue
    pub fn queued(&self) -> usize {
        self.sender().map_or(0, |sender| sender.len())
    }

    pub fn metrics(&self) -> ServiceMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.sender().is_some()
    }

    /// Closes the queue, lets the workers drain it and joins them
    pub fn shutdown(&self) {
        let sender = match self.sender.write() {
            Ok(mut sender) => sender.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if sender.is_none() {
            return;
        }
        drop(sender);

        let workers = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        join_all(workers);

        let snapshot = self.metrics.snapshot();
        info!(
            accepted = snapshot.accepted,
            rejected = snapshot.rejected,
            diagnosed = snapshot.diagnosed,
            failed = snapshot.failed,
            results = snapshot.results,
            "🛑 Diagnosis service stopped"
        );
    }
}

impl Drop for DiagnosisService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn join_all(workers: Vec<JoinHandle<()>>) {
    for handle in workers {
        if handle.join().is_err() {
            error!("❌ Diagnosis worker panicked");
        }
    }
}

fn run_worker(
    worker: usize,
    graph: Arc<RuleGraph<DiagnosisFact>>,
    receiver: Receiver<DiagnosisRequest>,
    notifier: Arc<dyn DiagnosisResultNotifier>,
    metrics: Arc<ServiceMetrics>,
) {
    let mut session = Session::new(graph);
    debug!(worker, "Diagnosis worker started");

    // Ends once every sender is gone and the queue is drained
    for request in receiver.iter() {
        let request_root = request.tree.get(request.tree.root()).map_or(0, |root| root.invocation_id);
        let _span = info_span!("diagnosis", worker, request_root).entered();
        process_request(&mut session, request, notifier.as_ref(), &metrics);
    }

    debug!(worker, "Diagnosis worker finished");
}

/// activate -> call -> collect -> notify, and always passivate
pub(super) fn process_request(
    session: &mut Session<DiagnosisFact>,
    request: DiagnosisRequest,
    notifier: &dyn DiagnosisResultNotifier,
    metrics: &ServiceMetrics,
) {
    let variables = session_variables(request.baseline);
    let called = session
        .activate(root_fact(request.tree), &variables)
        .and_then(|()| session.call().map(|_| ()));

    match called {
        Ok(()) => match ProblemOccurrenceCollector.collect(session.facts()) {
            Ok(occurrences) => {
                metrics.record_diagnosed(occurrences.len());
                if !occurrences.is_empty() {
                    notifier.on_results(&occurrences);
                }
            }
            Err(e) => {
                metrics.record_failed();
                error!(error = %e, "❌ Failed to assemble problem occurrences");
            }
        },
        Err(e) => {
            metrics.record_failed();
            error!(rule = e.rule().unwrap_or("-"), error = %e, "❌ Diagnosis session failed");
            notifier.on_failure(&e);
        }
    }

    session.passivate();
}
