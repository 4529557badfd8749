//! Training controller.
//!
//! Turns labeled feedback into ledger updates, a deduplicated example set,
//! and periodic retrains of the network.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::classify::features::{extract_features, FeatureVector, Normalizer};
use crate::classify::ledger::{meaningful_words, WordLedger};
use crate::classify::model::{ModelContext, MIN_TRAINING_EXAMPLES};
use crate::error::Result;
use crate::store::{self, keys, KeyValueStore};

/// Oldest examples are evicted past this count.
pub const MAX_EXAMPLES: usize = 1000;

/// Cheap 32-bit rolling hash of the lowercased, trimmed query.
///
/// Only used for duplicate detection; a collision counts as a duplicate.
pub fn query_hash(query: &str) -> String {
    let normalized = query.trim().to_lowercase();
    let hash = normalized
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32));
    hash.to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    pub features: FeatureVector,
    pub label: u8,
    pub query_hash: String,
}

/// Persisted layout: three parallel arrays.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredTrainingData {
    #[serde(default)]
    features: Vec<FeatureVector>,
    #[serde(default)]
    labels: Vec<u8>,
    #[serde(default)]
    query_hashes: Vec<String>,
}

/// Retained examples, evicted together so features, labels, and hashes
/// never drift apart.
#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    examples: VecDeque<TrainingExample>,
    /// Hash → number of retained examples carrying it.
    hashes: HashMap<String, usize>,
}

impl TrainingSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_stored(stored: StoredTrainingData) -> Self {
        let n = stored
            .features
            .len()
            .min(stored.labels.len())
            .min(stored.query_hashes.len());
        if n != stored.features.len()
            || n != stored.labels.len()
            || n != stored.query_hashes.len()
        {
            log::warn!(
                "Training data arrays disagree ({} features, {} labels, {} hashes), \
                 keeping the newest {}",
                stored.features.len(),
                stored.labels.len(),
                stored.query_hashes.len(),
                n
            );
        }

        let features = &stored.features[stored.features.len() - n..];
        let labels = &stored.labels[stored.labels.len() - n..];
        let hashes = &stored.query_hashes[stored.query_hashes.len() - n..];

        let mut set = Self::new();
        for ((features, label), hash) in features.iter().zip(labels).zip(hashes) {
            set.push(TrainingExample {
                features: *features,
                label: u8::from(*label > 0),
                query_hash: hash.clone(),
            });
        }
        set
    }

    fn to_stored(&self) -> StoredTrainingData {
        StoredTrainingData {
            features: self.examples.iter().map(|e| e.features).collect(),
            labels: self.examples.iter().map(|e| e.label).collect(),
            query_hashes: self.examples.iter().map(|e| e.query_hash.clone()).collect(),
        }
    }

    /// Load from the store. Missing data is an empty set.
    pub fn load(store: &dyn KeyValueStore) -> Result<Self> {
        Ok(store::load::<StoredTrainingData>(store, keys::TRAINING_DATA)?
            .map(Self::from_stored)
            .unwrap_or_default())
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        store::save(store, keys::TRAINING_DATA, &self.to_stored())
    }

    pub fn contains_hash(&self, hash: &str) -> bool {
        self.hashes.contains_key(hash)
    }

    /// Append an example, evicting the oldest past `MAX_EXAMPLES`.
    pub fn push(&mut self, example: TrainingExample) {
        *self.hashes.entry(example.query_hash.clone()).or_insert(0) += 1;
        self.examples.push_back(example);
        while self.examples.len() > MAX_EXAMPLES {
            if let Some(old) = self.examples.pop_front() {
                self.forget_hash(&old.query_hash);
            }
        }
    }

    fn forget_hash(&mut self, hash: &str) {
        if let Some(count) = self.hashes.get_mut(hash) {
            *count -= 1;
            if *count == 0 {
                self.hashes.remove(hash);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrainingExample> {
        self.examples.iter()
    }

    pub fn features(&self) -> Vec<FeatureVector> {
        self.examples.iter().map(|e| e.features).collect()
    }

    pub fn labels(&self) -> Vec<f64> {
        self.examples.iter().map(|e| f64::from(e.label)).collect()
    }
}

/// Coarse progress label for the retained sample count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingStatus {
    CollectingData,
    BasicTraining,
    Learning,
    FullyTrained,
}

impl TrainingStatus {
    pub fn from_sample_count(count: usize) -> Self {
        match count {
            0..=9 => TrainingStatus::CollectingData,
            10..=49 => TrainingStatus::BasicTraining,
            50..=99 => TrainingStatus::Learning,
            _ => TrainingStatus::FullyTrained,
        }
    }
}

impl fmt::Display for TrainingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TrainingStatus::CollectingData => "Collecting data",
            TrainingStatus::BasicTraining => "Basic training",
            TrainingStatus::Learning => "Learning",
            TrainingStatus::FullyTrained => "Fully trained",
        };
        f.write_str(label)
    }
}

/// What `train` did with a labeled query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainOutcome {
    /// Blank query, nothing learned.
    Ignored,
    /// Ledger updated; the example was already retained.
    Duplicate,
    /// Ledger updated and the example stored.
    Stored { examples: usize, retrained: bool },
}

/// Owns the learning side: ledger updates, the example set, and the model.
pub struct TrainingController {
    store: Arc<dyn KeyValueStore>,
    ledger: Arc<WordLedger>,
    model: Arc<ModelContext>,
    /// Serializes read-modify-write of the example set.
    examples_lock: Mutex<()>,
}

impl TrainingController {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        ledger: Arc<WordLedger>,
        model: Arc<ModelContext>,
    ) -> Self {
        Self {
            store,
            ledger,
            model,
            examples_lock: Mutex::new(()),
        }
    }

    pub fn ledger(&self) -> &Arc<WordLedger> {
        &self.ledger
    }

    pub fn model(&self) -> &Arc<ModelContext> {
        &self.model
    }

    /// Learn from one labeled query.
    ///
    /// The ledger is always updated, even for a duplicate example. Store and
    /// training failures are logged; partial progress is kept.
    pub fn train(&self, query: &str, should_redirect: bool) -> TrainOutcome {
        if query.trim().is_empty() {
            return TrainOutcome::Ignored;
        }

        for word in meaningful_words(query) {
            self.ledger.add_feedback(&word, should_redirect);
        }

        let _guard = self
            .examples_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut set = TrainingSet::load(self.store.as_ref()).unwrap_or_else(|e| {
            log::warn!("Training data unavailable, starting empty: {}", e);
            TrainingSet::new()
        });

        let hash = query_hash(query);
        if set.contains_hash(&hash) {
            log::debug!("Skipping duplicate training example {}", hash);
            return TrainOutcome::Duplicate;
        }

        set.push(TrainingExample {
            features: extract_features(query),
            label: u8::from(should_redirect),
            query_hash: hash,
        });
        if let Err(e) = set.save(self.store.as_ref()) {
            log::warn!("Failed to save training data: {}", e);
        }

        let retrained = self.retrain(&set);
        TrainOutcome::Stored {
            examples: set.len(),
            retrained,
        }
    }

    /// Refit the normalizer over the whole set and, with enough examples,
    /// the network. Returns whether the network was retrained.
    fn retrain(&self, set: &TrainingSet) -> bool {
        let rows = set.features();
        let labels = set.labels();

        self.model.with_state(|state, rng| {
            state.normalizer = Normalizer::fit(&rows);
            if rows.len() < MIN_TRAINING_EXAMPLES {
                return false;
            }

            let standardized: Vec<Vec<f64>> =
                rows.iter().map(|r| state.normalizer.transform(r)).collect();
            match state.net.fit(&standardized, &labels, rng) {
                Ok(report) => {
                    log::info!(
                        "Retrained on {} examples (batch {}, loss {:.4})",
                        report.examples,
                        report.batch_size,
                        report.final_loss
                    );
                    if let Err(e) = self.model.persist(state) {
                        log::warn!("Failed to save model: {}", e);
                    }
                    true
                }
                Err(e) => {
                    log::warn!("Retraining failed: {}", e);
                    false
                }
            }
        })
    }

    /// Wipe the model, normalizer, and examples and start from fresh weights.
    ///
    /// Persisted word scores survive; only the ledger's session cache is
    /// dropped.
    pub fn reset_model(&self) {
        let _guard = self
            .examples_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Err(e) = self.store.remove(&[
            keys::MODEL_ARTIFACTS,
            keys::NORMALIZER,
            keys::TRAINING_DATA,
        ]) {
            log::warn!("Failed to clear stored model: {}", e);
        }
        self.model.reinitialize();
        self.ledger.invalidate_cache();
        log::info!("Classifier model reset");
    }

    /// Retained example count.
    pub fn sample_count(&self) -> usize {
        match TrainingSet::load(self.store.as_ref()) {
            Ok(set) => set.len(),
            Err(e) => {
                log::warn!("Training data unavailable: {}", e);
                0
            }
        }
    }

    pub fn status(&self) -> TrainingStatus {
        TrainingStatus::from_sample_count(self.sample_count())
    }
}
