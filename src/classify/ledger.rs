//! Word-feedback ledger.
//!
//! A persisted word → affinity mapping. Each explicit or implicit feedback
//! event nudges the words of the query by ±1 within `[-5, 5]`, which lets a
//! correction take effect on the next search without waiting for the network
//! to retrain.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use crate::store::{self, keys, KeyValueStore};

pub const MAX_WORD_SCORE: i32 = 5;
pub const MIN_WORD_SCORE: i32 = -5;

/// Seeds below this score are raised to `MAX_WORD_SCORE` on every load.
const SEED_FLOOR: i32 = 4;

const MIN_WORD_LEN: usize = 3;

/// Interrogatives seeded as strong redirect signals.
const SEED_WORDS: &[&str] = &[
    "how", "what", "why", "when", "who", "which", "where", "does", "can", "could", "would",
    "should", "?",
];

/// Filler words that carry no signal. Must not overlap `SEED_WORDS`.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "onto", "your", "you", "yours",
    "was", "were", "has", "have", "had", "its", "but", "not", "all", "any", "our", "out",
    "about", "there", "their", "they", "them", "then", "than", "are", "been", "being", "will",
    "just", "also", "very", "some", "such", "over", "more", "most", "other", "these", "those",
    "her", "him", "his", "she", "off", "too", "per", "via",
];

pub type WordScores = BTreeMap<String, i32>;

/// Aggregate ledger view of one query, taken under a single lock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerSignal {
    /// Mean of the nonzero word scores, scaled to `[-1, 1]`. 0 when neutral.
    pub score: f64,
    /// Total words in the ledger, not just those in the query.
    pub tracked_words: usize,
}

fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Distinct words of a query that can carry feedback, in first-seen order.
///
/// Lowercases, strips punctuation, and drops short tokens and stop words.
pub fn meaningful_words(query: &str) -> Vec<String> {
    let cleaned: String = query
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();

    let mut seen = HashSet::new();
    cleaned
        .split_whitespace()
        .filter(|w| w.chars().count() >= MIN_WORD_LEN && !is_stop_word(w))
        .filter(|w| seen.insert(w.to_string()))
        .map(str::to_string)
        .collect()
}

/// Persisted per-word affinity scores with a lazily loaded session cache.
pub struct WordLedger {
    store: Arc<dyn KeyValueStore>,
    cache: Mutex<Option<WordScores>>,
}

impl WordLedger {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(None),
        }
    }

    /// Run `f` against the loaded mapping, loading it first if needed.
    fn with_scores<R>(&self, f: impl FnOnce(&mut WordScores) -> R) -> R {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let scores = cache.get_or_insert_with(|| self.load());
        f(scores)
    }

    fn load(&self) -> WordScores {
        let mut scores: WordScores = match store::load(self.store.as_ref(), keys::WORD_SCORES) {
            Ok(Some(scores)) => scores,
            Ok(None) => WordScores::new(),
            Err(e) => {
                log::warn!("Word scores unavailable, starting empty: {}", e);
                WordScores::new()
            }
        };

        for score in scores.values_mut() {
            *score = (*score).clamp(MIN_WORD_SCORE, MAX_WORD_SCORE);
        }

        let mut seeded = 0;
        for word in SEED_WORDS {
            let score = scores.entry(word.to_string()).or_insert(0);
            if *score < SEED_FLOOR {
                *score = MAX_WORD_SCORE;
                seeded += 1;
            }
        }
        if seeded > 0 {
            log::debug!("Seeded {} interrogative words", seeded);
            self.persist(&scores);
        }
        scores
    }

    fn persist(&self, scores: &WordScores) {
        if let Err(e) = store::save(self.store.as_ref(), keys::WORD_SCORES, scores) {
            log::warn!("Failed to save word scores: {}", e);
        }
    }

    /// Nudge one word toward (or away from) redirecting.
    ///
    /// Short words and stop words are ignored. The full mapping is saved after
    /// every change.
    pub fn add_feedback(&self, word: &str, should_redirect: bool) {
        let word = word.trim().to_lowercase();
        if word.chars().count() < MIN_WORD_LEN || is_stop_word(&word) {
            return;
        }
        let delta = if should_redirect { 1 } else { -1 };

        self.with_scores(|scores| {
            let score = scores.entry(word).or_insert(0);
            *score = (*score + delta).clamp(MIN_WORD_SCORE, MAX_WORD_SCORE);
            self.persist(scores);
        });
    }

    /// Score of a single word, 0 if untracked.
    pub fn word_score(&self, word: &str) -> i32 {
        let word = word.trim().to_lowercase();
        self.with_scores(|scores| scores.get(&word).copied().unwrap_or(0))
    }

    /// Aggregate score of a query in `[-1, 1]`.
    pub fn query_score(&self, query: &str) -> f64 {
        self.signal(query).score
    }

    /// Query score together with the ledger size, read atomically.
    pub fn signal(&self, query: &str) -> LedgerSignal {
        let words = meaningful_words(query);
        self.with_scores(|scores| {
            let nonzero: Vec<i32> = words
                .iter()
                .filter_map(|w| scores.get(w).copied())
                .filter(|s| *s != 0)
                .collect();

            let score = if nonzero.is_empty() {
                0.0
            } else {
                let mean = nonzero.iter().sum::<i32>() as f64 / nonzero.len() as f64;
                mean / MAX_WORD_SCORE as f64
            };

            LedgerSignal {
                score,
                tracked_words: scores.len(),
            }
        })
    }

    /// Number of words the ledger tracks.
    pub fn tracked_words(&self) -> usize {
        self.with_scores(|scores| scores.len())
    }

    /// Copy of the current mapping.
    pub fn snapshot(&self) -> WordScores {
        self.with_scores(|scores| scores.clone())
    }

    /// Clear every score and save the empty mapping.
    pub fn reset(&self) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let empty = WordScores::new();
        self.persist(&empty);
        *cache = Some(empty);
        log::info!("Word scores reset");
    }

    /// Drop the session cache. The next access reloads from the store.
    pub fn invalidate_cache(&self) {
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
