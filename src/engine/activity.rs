//! Activity records written after each redirect: running stats, the last
//! redirect (read by the answer-page script), and a short search history.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::{self, keys, KeyValueStore, Record};

/// Estimated time a redirect saves versus reading a results page.
const SECONDS_SAVED_PER_REDIRECT: u64 = 30;
const MAX_HISTORY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub searches: u64,
    pub times_saved: String,
}

impl Default for Stats {
    fn default() -> Self {
        Self::from_searches(0)
    }
}

impl Stats {
    fn from_searches(searches: u64) -> Self {
        let minutes = searches * SECONDS_SAVED_PER_REDIRECT / 60;
        Self {
            searches,
            times_saved: format!("{}min", minutes),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastRedirect {
    pub query: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub multi_tab_used: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub query: String,
    pub url: String,
    pub timestamp: i64,
}

fn load_or_default<T: serde::de::DeserializeOwned + Default>(
    store: &dyn KeyValueStore,
    key: &str,
) -> T {
    store::load(store, key).ok().flatten().unwrap_or_default()
}

pub fn stats(store: &dyn KeyValueStore) -> Stats {
    load_or_default(store, keys::STATS)
}

pub fn last_redirect(store: &dyn KeyValueStore) -> Option<LastRedirect> {
    store::load(store, keys::LAST_REDIRECT).ok().flatten()
}

pub fn history(store: &dyn KeyValueStore) -> Vec<HistoryEntry> {
    load_or_default(store, keys::SEARCH_HISTORY)
}

/// Update stats, last redirect, and history in one write.
pub fn record_redirect(
    store: &dyn KeyValueStore,
    query: &str,
    url: &str,
    multi_tab: bool,
) -> Result<()> {
    let timestamp = Utc::now().timestamp_millis();
    let stats = Stats::from_searches(stats(store).searches + 1);

    let mut history = history(store);
    history.push(HistoryEntry {
        query: query.to_string(),
        url: url.to_string(),
        timestamp,
    });
    if history.len() > MAX_HISTORY {
        history.drain(..history.len() - MAX_HISTORY);
    }

    let last = LastRedirect {
        query: query.to_string(),
        timestamp,
        multi_tab_used: multi_tab,
    };

    let mut record = Record::new();
    record.insert(keys::STATS.into(), serde_json::to_value(&stats)?);
    record.insert(keys::LAST_REDIRECT.into(), serde_json::to_value(&last)?);
    record.insert(keys::SEARCH_HISTORY.into(), serde_json::to_value(&history)?);
    store.set(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn records_accumulate() {
        let store = MemoryStore::new();
        assert_eq!(stats(&store).times_saved, "0min");

        for i in 0..4 {
            record_redirect(&store, &format!("q{}", i), "https://x", i == 3).unwrap();
        }
        let s = stats(&store);
        assert_eq!(s.searches, 4);
        assert_eq!(s.times_saved, "2min");

        let last = last_redirect(&store).unwrap();
        assert_eq!(last.query, "q3");
        assert!(last.multi_tab_used);
        assert_eq!(history(&store).len(), 4);
    }

    #[test]
    fn history_is_bounded() {
        let store = MemoryStore::new();
        for i in 0..MAX_HISTORY + 5 {
            record_redirect(&store, &format!("q{}", i), "https://x", false).unwrap();
        }
        let h = history(&store);
        assert_eq!(h.len(), MAX_HISTORY);
        assert_eq!(h[0].query, "q5");
    }

    #[test]
    fn wire_names_match_storage_keys() {
        let json = serde_json::to_value(Stats::from_searches(2)).unwrap();
        assert_eq!(json["timesSaved"], "1min");
        let json = serde_json::to_value(LastRedirect {
            query: "q".into(),
            timestamp: 1,
            multi_tab_used: true,
        })
        .unwrap();
        assert_eq!(json["multiTabUsed"], true);
    }
}
