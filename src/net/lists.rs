//! Allow/deny list gate.
//!
//! Runs before the classifier. Entries match as case-insensitive substrings
//! of the query; a deny match wins over an allow match.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Gate statistics, shared across threads.
#[derive(Debug, Clone, Default)]
pub struct GateStats {
    /// Queries forced through to the search page
    pub denied: Arc<AtomicUsize>,
    /// Queries forced to the answer engine
    pub allowed: Arc<AtomicUsize>,
    /// Total queries checked
    pub checked: Arc<AtomicUsize>,
}

impl GateStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_check(&self) {
        self.checked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record(&self, verdict: GateVerdict) {
        match verdict {
            GateVerdict::Deny => self.denied.fetch_add(1, Ordering::Relaxed),
            GateVerdict::Allow => self.allowed.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn snapshot(&self) -> (usize, usize, usize) {
        (
            self.denied.load(Ordering::Relaxed),
            self.allowed.load(Ordering::Relaxed),
            self.checked.load(Ordering::Relaxed),
        )
    }
}

/// Why the gate overrode the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateVerdict {
    /// Matched the deny list: never redirect.
    Deny,
    /// Matched the allow list: always redirect.
    Allow,
}

/// The list gate for one settings snapshot.
#[derive(Debug, Clone, Default)]
pub struct ListGate {
    allow: Vec<String>,
    deny: Vec<String>,
}

impl ListGate {
    pub fn new<A, D>(allow: A, deny: D) -> Self
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        let clean = |e: &str| {
            let e = e.trim().to_lowercase();
            (!e.is_empty()).then_some(e)
        };
        Self {
            allow: allow.into_iter().filter_map(|e| clean(e.as_ref())).collect(),
            deny: deny.into_iter().filter_map(|e| clean(e.as_ref())).collect(),
        }
    }

    /// Check a query. `None` leaves the decision to the classifier.
    pub fn check(&self, query: &str, stats: &GateStats) -> Option<GateVerdict> {
        stats.record_check();
        let query_lower = query.to_lowercase();

        // Deny first
        let verdict = if self.deny.iter().any(|d| query_lower.contains(d.as_str())) {
            Some(GateVerdict::Deny)
        } else if self.allow.iter().any(|a| query_lower.contains(a.as_str())) {
            Some(GateVerdict::Allow)
        } else {
            None
        };

        if let Some(v) = verdict {
            stats.record(v);
        }
        verdict
    }

    /// Number of list entries.
    pub fn rule_count(&self) -> usize {
        self.allow.len() + self.deny.len()
    }
}
