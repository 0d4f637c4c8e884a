use std::collections::VecDeque;
use std::sync::Mutex;

use tracing::debug;

use super::notification::DiagnosisResultNotifier;
use super::structs::{ProblemOccurrence, ResultQuery};

/// Bounded in-memory store of the most recent problem occurrences
#[derive(Debug)]
pub struct DiagnosisResults {
    capacity: usize,
    occurrences: Mutex<VecDeque<ProblemOccurrence>>,
}

impl DiagnosisResults {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            occurrences: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    fn with_occurrences<R>(&self, f: impl FnOnce(&mut VecDeque<ProblemOccurrence>) -> R) -> R {
        let mut occurrences = match self.occurrences.lock() {
            Ok(occurrences) => occurrences,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut occurrences)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.with_occurrences(|occurrences| occurrences.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Oldest first
    pub fn all(&self) -> Vec<ProblemOccurrence> {
        self.with_occurrences(|occurrences| occurrences.iter().cloned().collect())
    }

    pub fn query(&self, query: &ResultQuery) -> Vec<ProblemOccurrence> {
        self.with_occurrences(|occurrences| {
            occurrences
                .iter()
                .filter(|occurrence| query.matches(occurrence))
                .cloned()
                .collect()
        })
    }

    pub fn clear(&self) {
        self.with_occurrences(|occurrences| occurrences.clear());
    }
}

impl DiagnosisResultNotifier for DiagnosisResults {
    fn on_result(&self, occurrence: &ProblemOccurrence) {
        let capacity = self.capacity;
        self.with_occurrences(|occurrences| {
            if occurrences.len() == capacity {
                if let Some(evicted) = occurrences.pop_front() {
                    debug!(evicted = evicted.id, "Result store full, dropping oldest occurrence");
                }
            }
            occurrences.push_back(occurrence.clone());
        });
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::results::structs::{AggregatedInvocationIdentifier, InvocationIdentifier, TimerSummary};
    use crate::rules::{CauseStructure, CauseType};
    use crate::tree::NodeId;

    fn occurrence(id: u64, application_id: u32, minutes_ago: i64) -> ProblemOccurrence {
        let identifier = InvocationIdentifier {
            invocation_id: id,
            node: NodeId(0),
            method_ident: 1,
            timer: TimerSummary::default(),
        };
        ProblemOccurrence {
            id,
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
            request_root: identifier.clone(),
            global_context: identifier.clone(),
            problem_context: identifier,
            root_cause: AggregatedInvocationIdentifier {
                method_ident: 1,
                sql: None,
                http_uri: None,
                invocation_ids: vec![id],
                nodes: vec![NodeId(0)],
                exclusive_time: 10.0,
                duration: 10.0,
                count: 1,
            },
            cause_structure: CauseStructure::new(CauseType::Single, 0),
            application_id,
            business_transaction_id: 1,
        }
    }

    #[test]
    fn test_store_evicts_oldest_when_full() {
        let store = DiagnosisResults::new(2);
        store.on_results(&[occurrence(1, 1, 0), occurrence(2, 1, 0), occurrence(3, 1, 0)]);

        let ids: Vec<u64> = store.all().iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_query_by_application_and_time() {
        let store = DiagnosisResults::new(10);
        store.on_result(&occurrence(1, 1, 60));
        store.on_result(&occurrence(2, 2, 5));
        store.on_result(&occurrence(3, 1, 5));

        let recent_first_app = ResultQuery {
            application_id: Some(1),
            from: Some(Utc::now() - Duration::minutes(30)),
            ..ResultQuery::default()
        };
        let found: Vec<u64> = store.query(&recent_first_app).iter().map(|o| o.id).collect();
        assert_eq!(found, vec![3]);
        assert_eq!(store.query(&ResultQuery::default()).len(), 3);

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_zero_capacity_keeps_latest() {
        let store = DiagnosisResults::new(0);
        store.on_result(&occurrence(1, 1, 0));
        store.on_result(&occurrence(2, 1, 0));

        assert_eq!(store.capacity(), 1);
        assert_eq!(store.all()[0].id, 2);
    }
}
