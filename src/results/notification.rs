//! Delivery of diagnosis results to interested parties
//!
//! Notifiers run synchronously on the diagnosis worker that produced the
//! result, so a slow notifier throttles that worker.

use std::fmt;
use std::sync::{Arc, RwLock};

use rustc_hash::FxHashMap;
use tracing::{error, info, warn};

use crate::engine::SessionError;

use super::structs::ProblemOccurrence;

/// Receives finished problem occurrences
pub trait DiagnosisResultNotifier: Send + Sync {
    fn on_result(&self, occurrence: &ProblemOccurrence);

    fn on_results(&self, occurrences: &[ProblemOccurrence]) {
        for occurrence in occurrences {
            self.on_result(occurrence);
        }
    }

    /// A diagnosis failed; the worker carries on with the next request
    fn on_failure(&self, _error: &SessionError) {}
}

/// Forwards every notification to several listeners, in registration order
#[derive(Default, Clone)]
pub struct NotifierFanout {
    listeners: Vec<Arc<dyn DiagnosisResultNotifier>>,
}

impl NotifierFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, listener: Arc<dyn DiagnosisResultNotifier>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn push(&mut self, listener: Arc<dyn DiagnosisResultNotifier>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl DiagnosisResultNotifier for NotifierFanout {
    fn on_result(&self, occurrence: &ProblemOccurrence) {
        for listener in &self.listeners {
            listener.on_result(occurrence);
        }
    }

    fn on_results(&self, occurrences: &[ProblemOccurrence]) {
        for listener in &self.listeners {
            listener.on_results(occurrences);
        }
    }

    fn on_failure(&self, error: &SessionError) {
        for listener in &self.listeners {
            listener.on_failure(error);
        }
    }
}

/// Maps a request root's invocation id to the first problem occurrence found for it
#[derive(Debug, Default)]
pub struct RequestRootIndex {
    occurrences: RwLock<FxHashMap<u64, u64>>,
}

impl RequestRootIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn occurrence_for(&self, invocation_id: u64) -> Option<u64> {
        match self.occurrences.read() {
            Ok(index) => index.get(&invocation_id).copied(),
            Err(poisoned) => poisoned.into_inner().get(&invocation_id).copied(),
        }
    }

    pub fn len(&self) -> usize {
        match self.occurrences.read() {
            Ok(index) => index.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosisResultNotifier for RequestRootIndex {
    fn on_result(&self, occurrence: &ProblemOccurrence) {
        let mut index = match self.occurrences.write() {
            Ok(index) => index,
            Err(poisoned) => poisoned.into_inner(),
        };
        index
            .entry(occurrence.request_root.invocation_id)
            .or_insert(occurrence.id);
    }
}

/// Resolves identifiers to display names
#[cfg_attr(test, mockall::automock)]
pub trait NameLookup: Send + Sync {
    fn method_name(&self, method_ident: u64) -> Option<String>;
    fn application_name(&self, application_id: u32) -> Option<String>;
    fn business_transaction_name(&self, application_id: u32, business_transaction_id: u32) -> Option<String>;
}

/// In-memory [`NameLookup`] filled up front
#[derive(Debug, Default, Clone)]
pub struct NameTable {
    methods: FxHashMap<u64, String>,
    applications: FxHashMap<u32, String>,
    business_transactions: FxHashMap<(u32, u32), String>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_method(&mut self, method_ident: u64, name: impl Into<String>) {
        self.methods.insert(method_ident, name.into());
    }

    pub fn insert_application(&mut self, application_id: u32, name: impl Into<String>) {
        self.applications.insert(application_id, name.into());
    }

    pub fn insert_business_transaction(
        &mut self,
        application_id: u32,
        business_transaction_id: u32,
        name: impl Into<String>,
    ) {
        self.business_transactions
            .insert((application_id, business_transaction_id), name.into());
    }

    pub fn len(&self) -> usize {
        self.methods.len() + self.applications.len() + self.business_transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NameLookup for NameTable {
    fn method_name(&self, method_ident: u64) -> Option<String> {
        self.methods.get(&method_ident).cloned()
    }

    fn application_name(&self, application_id: u32) -> Option<String> {
        self.applications.get(&application_id).cloned()
    }

    fn business_transaction_name(&self, application_id: u32, business_transaction_id: u32) -> Option<String> {
        self.business_transactions
            .get(&(application_id, business_transaction_id))
            .cloned()
    }
}

/// Logs a readable summary of each occurrence
pub struct ResultPrinter {
    names: Arc<dyn NameLookup>,
}

impl ResultPrinter {
    pub fn new(names: Arc<dyn NameLookup>) -> Self {
        Self { names }
    }

    fn method(&self, method_ident: u64) -> String {
        self.names
            .method_name(method_ident)
            .unwrap_or_else(|| format!("<method {}>", method_ident))
    }

    pub fn render(&self, occurrence: &ProblemOccurrence) -> String {
        self.display(occurrence).to_string()
    }

    /// Lazily formatted summary, rendered only if the event is logged
    pub fn display<'a>(&'a self, occurrence: &'a ProblemOccurrence) -> OccurrenceSummary<'a> {
        OccurrenceSummary {
            printer: self,
            occurrence,
        }
    }
}

pub struct OccurrenceSummary<'a> {
    printer: &'a ResultPrinter,
    occurrence: &'a ProblemOccurrence,
}

impl fmt::Display for OccurrenceSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = &self.printer.names;
        let occurrence = self.occurrence;
        let application = names
            .application_name(occurrence.application_id)
            .unwrap_or_else(|| format!("<application {}>", occurrence.application_id));
        let business_transaction = names
            .business_transaction_name(occurrence.application_id, occurrence.business_transaction_id)
            .unwrap_or_else(|| format!("<business transaction {}>", occurrence.business_transaction_id));

        writeln!(
            f,
            "Problem occurrence {} in {} / {}",
            occurrence.id, application, business_transaction
        )?;
        for (label, invocation) in [
            ("request root:   ", &occurrence.request_root),
            ("global context: ", &occurrence.global_context),
            ("problem context:", &occurrence.problem_context),
        ] {
            writeln!(
                f,
                "  {} {} ({:.1} ms)",
                label,
                self.printer.method(invocation.method_ident),
                invocation.timer.duration
            )?;
        }

        let cause = &occurrence.root_cause;
        write!(
            f,
            "  root cause:      {} x{} ({:.1} ms exclusive)",
            self.printer.method(cause.method_ident),
            cause.count,
            cause.exclusive_time
        )?;
        if let Some(sql) = &cause.sql {
            write!(f, " [{}]", sql)?;
        }
        if let Some(uri) = &cause.http_uri {
            write!(f, " [{}]", uri)?;
        }
        write!(
            f,
            "\n  structure:       {} (depth {})",
            occurrence.cause_structure.cause_type, occurrence.cause_structure.depth
        )
    }
}

impl DiagnosisResultNotifier for ResultPrinter {
    fn on_result(&self, occurrence: &ProblemOccurrence) {
        info!("🔎 {}", self.display(occurrence));
    }

    fn on_failure(&self, error: &SessionError) {
        match error.rule() {
            Some(rule) => error!(rule, "❌ Diagnosis failed: {}", error),
            None => warn!("⚠️ Diagnosis skipped: {}", error),
        }
    }
}
