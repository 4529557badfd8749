//! Binary niche classifier.
//!
//! A 2-layer dense network (5 → 10 ReLU → 1 sigmoid) trained online with
//! Adam on binary cross-entropy. Small enough to retrain from the full
//! retained example set on every new label.

use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::features::{extract_features, Normalizer, NUM_FEATURES};
use crate::error::{Error, Result};
use crate::store::{self, keys, KeyValueStore, Record};

pub const HIDDEN_SIZE: usize = 10;

/// Retraining only starts once this many examples are retained.
pub const MIN_TRAINING_EXAMPLES: usize = 10;

const EPOCHS: usize = 5;
const MAX_BATCH_SIZE: usize = 32;
const LEARNING_RATE: f64 = 0.01;
const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPSILON: f64 = 1e-7;

/// Network weights. This is the persisted model artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Params {
    pub w1: [[f64; NUM_FEATURES]; HIDDEN_SIZE],
    pub b1: [f64; HIDDEN_SIZE],
    pub w2: [f64; HIDDEN_SIZE],
    pub b2: f64,
}

impl Params {
    fn zeros() -> Self {
        Self {
            w1: [[0.0; NUM_FEATURES]; HIDDEN_SIZE],
            b1: [0.0; HIDDEN_SIZE],
            w2: [0.0; HIDDEN_SIZE],
            b2: 0.0,
        }
    }

    /// Glorot-uniform weights, zero biases.
    fn glorot<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut p = Self::zeros();
        let limit1 = (6.0 / (NUM_FEATURES + HIDDEN_SIZE) as f64).sqrt();
        let limit2 = (6.0 / (HIDDEN_SIZE + 1) as f64).sqrt();
        for w in p.w1.iter_mut().flatten() {
            *w = rng.gen_range(-limit1..limit1);
        }
        for w in &mut p.w2 {
            *w = rng.gen_range(-limit2..limit2);
        }
        p
    }

    fn values(&self) -> impl Iterator<Item = &f64> {
        self.w1
            .iter()
            .flatten()
            .chain(self.b1.iter())
            .chain(self.w2.iter())
            .chain(std::iter::once(&self.b2))
    }

    fn values_mut(&mut self) -> impl Iterator<Item = &mut f64> {
        self.w1
            .iter_mut()
            .flatten()
            .chain(self.b1.iter_mut())
            .chain(self.w2.iter_mut())
            .chain(std::iter::once(&mut self.b2))
    }

    fn accumulate(mut self, other: &Params) -> Self {
        for (a, b) in self.values_mut().zip(other.values()) {
            *a += b;
        }
        self
    }

    fn scale(&mut self, k: f64) {
        for v in self.values_mut() {
            *v *= k;
        }
    }

    fn is_finite(&self) -> bool {
        self.values().all(|v| v.is_finite())
    }
}

/// Adam moment estimates. Session-only, never persisted.
#[derive(Debug, Clone)]
struct Adam {
    m: Params,
    v: Params,
    t: i32,
}

impl Adam {
    fn new() -> Self {
        Self {
            m: Params::zeros(),
            v: Params::zeros(),
            t: 0,
        }
    }

    fn step(&mut self, params: &mut Params, grad: &Params) {
        self.t += 1;
        let bias1 = 1.0 - BETA1.powi(self.t);
        let bias2 = 1.0 - BETA2.powi(self.t);

        for (((p, g), m), v) in params
            .values_mut()
            .zip(grad.values())
            .zip(self.m.values_mut())
            .zip(self.v.values_mut())
        {
            *m = BETA1 * *m + (1.0 - BETA1) * g;
            *v = BETA2 * *v + (1.0 - BETA2) * g * g;
            let m_hat = *m / bias1;
            let v_hat = *v / bias2;
            *p -= LEARNING_RATE * m_hat / (v_hat.sqrt() + EPSILON);
        }
    }
}

/// Intermediate activations of one forward pass.
struct Forward {
    z1: [f64; HIDDEN_SIZE],
    hidden: [f64; HIDDEN_SIZE],
    output: f64,
}

/// Summary of one `fit` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitReport {
    pub examples: usize,
    pub epochs: usize,
    pub batch_size: usize,
    /// Mean binary cross-entropy over the last epoch.
    pub final_loss: f64,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn as_input(x: &[f64]) -> Result<[f64; NUM_FEATURES]> {
    let input: [f64; NUM_FEATURES] = x.try_into().map_err(|_| {
        Error::model(format!("expected {} features, got {}", NUM_FEATURES, x.len()))
    })?;
    if input.iter().any(|v| !v.is_finite()) {
        return Err(Error::model("non-finite feature value"));
    }
    Ok(input)
}

/// The niche classifier network with its optimizer state.
#[derive(Debug, Clone)]
pub struct NicheNet {
    params: Params,
    optimizer: Adam,
}

impl NicheNet {
    /// Fresh network with random weights.
    pub fn new<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::from_params(Params::glorot(rng))
    }

    /// Restore a network from persisted weights.
    pub fn from_params(params: Params) -> Self {
        Self {
            params,
            optimizer: Adam::new(),
        }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    fn forward(&self, x: &[f64; NUM_FEATURES]) -> Forward {
        let mut z1 = self.params.b1;
        for (z, row) in z1.iter_mut().zip(&self.params.w1) {
            *z += row.iter().zip(x).map(|(w, xi)| w * xi).sum::<f64>();
        }

        // Layer 1: ReLU
        let mut hidden = [0.0; HIDDEN_SIZE];
        for (h, z) in hidden.iter_mut().zip(&z1) {
            *h = z.max(0.0);
        }

        // Layer 2: sigmoid
        let z2 = self.params.b2
            + self
                .params
                .w2
                .iter()
                .zip(&hidden)
                .map(|(w, h)| w * h)
                .sum::<f64>();

        Forward {
            z1,
            hidden,
            output: sigmoid(z2),
        }
    }

    /// P(redirect) for one standardized feature vector.
    pub fn predict(&self, x: &[f64]) -> Result<f64> {
        let input = as_input(x)?;
        let p = self.forward(&input).output;
        if !p.is_finite() {
            return Err(Error::model("prediction is not finite"));
        }
        Ok(p)
    }

    /// Gradient of the cross-entropy loss for one example, plus that loss.
    fn gradient(&self, x: &[f64; NUM_FEATURES], y: f64) -> (Params, f64) {
        let fwd = self.forward(x);
        let p = fwd.output.clamp(EPSILON, 1.0 - EPSILON);
        let loss = -(y * p.ln() + (1.0 - y) * (1.0 - p).ln());

        let mut grad = Params::zeros();
        // d(loss)/d(z2) for sigmoid + BCE
        let dz2 = fwd.output - y;
        grad.b2 = dz2;
        for j in 0..HIDDEN_SIZE {
            grad.w2[j] = dz2 * fwd.hidden[j];
            let dz1 = if fwd.z1[j] > 0.0 {
                dz2 * self.params.w2[j]
            } else {
                0.0
            };
            grad.b1[j] = dz1;
            for (g, xi) in grad.w1[j].iter_mut().zip(x) {
                *g = dz1 * xi;
            }
        }
        (grad, loss)
    }

    /// Train on standardized rows with 0/1 labels.
    ///
    /// Runs a fixed number of epochs, reshuffling each time, with batches of
    /// at most 32. Per-example gradients in a batch are computed in parallel.
    pub fn fit<R: Rng + ?Sized>(
        &mut self,
        xs: &[Vec<f64>],
        ys: &[f64],
        rng: &mut R,
    ) -> Result<FitReport> {
        if xs.is_empty() {
            return Err(Error::model("no training examples"));
        }
        if xs.len() != ys.len() {
            return Err(Error::model(format!(
                "{} feature rows but {} labels",
                xs.len(),
                ys.len()
            )));
        }
        let inputs = xs
            .iter()
            .map(|x| as_input(x))
            .collect::<Result<Vec<_>>>()?;

        let batch_size = inputs.len().min(MAX_BATCH_SIZE);
        let mut order: Vec<usize> = (0..inputs.len()).collect();
        let mut final_loss = 0.0;

        for _ in 0..EPOCHS {
            order.shuffle(rng);
            let mut epoch_loss = 0.0;

            for batch in order.chunks(batch_size) {
                let (mut grad, loss) = batch
                    .par_iter()
                    .map(|&i| self.gradient(&inputs[i], ys[i]))
                    .reduce(
                        || (Params::zeros(), 0.0),
                        |(ga, la), (gb, lb)| (ga.accumulate(&gb), la + lb),
                    );
                grad.scale(1.0 / batch.len() as f64);
                self.optimizer.step(&mut self.params, &grad);
                epoch_loss += loss;
            }
            final_loss = epoch_loss / inputs.len() as f64;
        }

        if !self.params.is_finite() {
            return Err(Error::model("training diverged"));
        }

        Ok(FitReport {
            examples: inputs.len(),
            epochs: EPOCHS,
            batch_size,
            final_loss,
        })
    }
}

/// How the live model came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelOrigin {
    /// Restored from persisted artifacts.
    Loaded,
    /// Fresh weights, nothing usable was persisted.
    Created,
}

/// The network and the normalizer it was trained against.
#[derive(Debug, Clone)]
pub struct ModelState {
    pub net: NicheNet,
    pub normalizer: Normalizer,
    pub origin: ModelOrigin,
}

impl ModelState {
    fn fresh<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            net: NicheNet::new(rng),
            normalizer: Normalizer::default(),
            origin: ModelOrigin::Created,
        }
    }

    /// Standardize raw features and predict.
    pub fn predict_raw(&self, raw: &[f64]) -> Result<f64> {
        if self.normalizer.dims() != raw.len() {
            return Err(Error::model(format!(
                "normalizer has {} dims, features have {}",
                self.normalizer.dims(),
                raw.len()
            )));
        }
        self.net.predict(&self.normalizer.transform(raw))
    }
}

struct Slot {
    state: Option<ModelState>,
    rng: StdRng,
}

/// Shared owner of the live model.
///
/// The model is loaded or created on first use under the slot lock, so two
/// concurrent first requests cannot both initialize it.
pub struct ModelContext {
    store: Arc<dyn KeyValueStore>,
    slot: Mutex<Slot>,
}

impl ModelContext {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_rng(store, StdRng::from_entropy())
    }

    /// Deterministic weight init and shuffling.
    pub fn with_seed(store: Arc<dyn KeyValueStore>, seed: u64) -> Self {
        Self::with_rng(store, StdRng::seed_from_u64(seed))
    }

    fn with_rng(store: Arc<dyn KeyValueStore>, rng: StdRng) -> Self {
        Self {
            store,
            slot: Mutex::new(Slot { state: None, rng }),
        }
    }

    /// Run `f` with the live model, initializing it on first use.
    pub fn with_state<T>(&self, f: impl FnOnce(&mut ModelState, &mut StdRng) -> T) -> T {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let Slot { state, rng } = &mut *slot;
        let state = state.get_or_insert_with(|| self.load_or_create(rng));
        f(state, rng)
    }

    fn load_or_create(&self, rng: &mut StdRng) -> ModelState {
        match self.load() {
            Ok(Some(state)) => {
                log::info!("Loaded classifier model from store");
                state
            }
            Ok(None) => {
                log::info!("No stored classifier model, creating a fresh one");
                ModelState::fresh(rng)
            }
            Err(e) => {
                log::warn!("Stored classifier model unusable, creating a fresh one: {}", e);
                ModelState::fresh(rng)
            }
        }
    }

    fn load(&self) -> Result<Option<ModelState>> {
        let Some(params) = store::load::<Params>(self.store.as_ref(), keys::MODEL_ARTIFACTS)?
        else {
            return Ok(None);
        };
        if !params.is_finite() {
            return Err(Error::MalformedRecord {
                key: keys::MODEL_ARTIFACTS.to_string(),
                reason: "non-finite weights".to_string(),
            });
        }
        let normalizer = store::load::<Normalizer>(self.store.as_ref(), keys::NORMALIZER)?
            .filter(|n| n.dims() == NUM_FEATURES && n.std.len() == NUM_FEATURES)
            .unwrap_or_default();

        Ok(Some(ModelState {
            net: NicheNet::from_params(params),
            normalizer,
            origin: ModelOrigin::Loaded,
        }))
    }

    /// Save the network and normalizer in one write.
    pub fn persist(&self, state: &ModelState) -> Result<()> {
        let mut record = Record::new();
        record.insert(
            keys::MODEL_ARTIFACTS.to_string(),
            serde_json::to_value(state.net.params())?,
        );
        record.insert(
            keys::NORMALIZER.to_string(),
            serde_json::to_value(&state.normalizer)?,
        );
        self.store.set(record)
    }

    /// P(redirect) for a raw query.
    pub fn probability(&self, query: &str) -> Result<f64> {
        let raw = extract_features(query);
        self.with_state(|state, _| state.predict_raw(&raw))
    }

    /// Discard the live model in favor of fresh weights and an identity
    /// normalizer. Persisted artifacts are the caller's concern.
    pub fn reinitialize(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let Slot { state, rng } = &mut *slot;
        *state = Some(ModelState::fresh(rng));
    }

    pub fn origin(&self) -> ModelOrigin {
        self.with_state(|state, _| state.origin)
    }
}
