//! Diagnosis results
//!
//! Problem occurrences are assembled from a processed session by
//! [`ProblemOccurrenceCollector`], handed to [`DiagnosisResultNotifier`]s and
//! optionally kept in the bounded [`DiagnosisResults`] store.

pub mod collector;
pub mod notification;
pub mod store;
pub mod structs;

pub use collector::ProblemOccurrenceCollector;
pub use notification::{
    DiagnosisResultNotifier, NameLookup, NameTable, NotifierFanout, RequestRootIndex, ResultPrinter,
};
pub use store::DiagnosisResults;
pub use structs::{
    AggregatedInvocationIdentifier, InvocationIdentifier, ProblemOccurrence, ResultQuery, TimerSummary,
};
