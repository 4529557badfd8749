//! Feedback events and their deduplication.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Tracked ids past which the set is trimmed.
const MAX_TRACKED_IDS: usize = 1000;
/// Ids kept (most recently seen) after a trim.
const TRIMMED_IDS: usize = 500;

/// A user signal that a query should or should not have been redirected.
///
/// Produced by an explicit button or by dwelling on the answer page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEvent {
    pub query: String,
    pub should_redirect: bool,
    #[serde(default)]
    pub feedback_id: Option<String>,
}

impl FeedbackEvent {
    pub fn new(query: impl Into<String>, should_redirect: bool) -> Self {
        Self {
            query: query.into(),
            should_redirect,
            feedback_id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.feedback_id = Some(id.into());
        self
    }
}

#[derive(Debug, Default)]
struct SeenIds {
    set: HashSet<String>,
    order: VecDeque<String>,
}

/// Process-lifetime record of handled feedback ids.
///
/// Keeps insertion order so an overflow can drop the older half. This is a
/// trim, not an LRU: re-seeing an id does not refresh it.
#[derive(Debug, Default)]
pub struct FeedbackDeduplicator {
    seen: Mutex<SeenIds>,
}

impl FeedbackDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True the first time an id is seen. Missing or empty ids always pass.
    pub fn should_process(&self, feedback_id: Option<&str>) -> bool {
        let id = match feedback_id {
            Some(id) if !id.is_empty() => id,
            _ => return true,
        };

        let mut guard = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        let seen = &mut *guard;
        if seen.set.contains(id) {
            log::debug!("Ignoring repeated feedback {}", id);
            return false;
        }
        seen.set.insert(id.to_string());
        seen.order.push_back(id.to_string());

        if seen.order.len() > MAX_TRACKED_IDS {
            let excess = seen.order.len() - TRIMMED_IDS;
            for old in seen.order.drain(..excess) {
                seen.set.remove(&old);
            }
        }
        true
    }

    /// Number of ids currently tracked.
    pub fn tracked(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .len()
    }
}
