//! Query features and their running standardization.

use serde::{Deserialize, Serialize};

use super::keywords::is_niche_query;

pub const NUM_FEATURES: usize = 5;

pub type FeatureVector = [f64; NUM_FEATURES];

/// Extract the 5-dimensional feature vector of a query.
///
/// Features:
///  0: character length
///  1: whitespace-separated word count
///  2: has '?' (binary)
///  3: average word length (0 with no words)
///  4: contains a niche keyword (binary)
pub fn extract_features(query: &str) -> FeatureVector {
    let words: Vec<&str> = query.split_whitespace().collect();
    let word_count = words.len();

    let avg_word_len = if word_count == 0 {
        0.0
    } else {
        words.iter().map(|w| w.chars().count()).sum::<usize>() as f64 / word_count as f64
    };

    [
        query.chars().count() as f64,
        word_count as f64,
        if query.contains('?') { 1.0 } else { 0.0 },
        avg_word_len,
        if is_niche_query(query) { 1.0 } else { 0.0 },
    ]
}

/// Per-feature mean and population standard deviation.
///
/// Recomputed from scratch over the retained training set on every retrain;
/// O(N) per call, fine while the set is capped at 1000.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalizer {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::identity(NUM_FEATURES)
    }
}

impl Normalizer {
    /// Mean 0, std 1: leaves vectors unchanged.
    pub fn identity(dims: usize) -> Self {
        Self {
            mean: vec![0.0; dims],
            std: vec![1.0; dims],
        }
    }

    /// Fit over every row. An empty set yields the identity.
    pub fn fit<R: AsRef<[f64]>>(rows: &[R]) -> Self {
        let Some(first) = rows.first() else {
            return Self::default();
        };
        let dims = first.as_ref().len();
        let n = rows.len() as f64;

        let mut mean = vec![0.0; dims];
        for row in rows {
            for (m, x) in mean.iter_mut().zip(row.as_ref()) {
                *m += x;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut std = vec![0.0; dims];
        for row in rows {
            for ((s, x), m) in std.iter_mut().zip(row.as_ref()).zip(&mean) {
                *s += (x - m) * (x - m);
            }
        }
        for s in &mut std {
            *s = (*s / n).sqrt();
            if *s == 0.0 {
                *s = 1.0;
            }
        }

        Self { mean, std }
    }

    pub fn dims(&self) -> usize {
        self.mean.len()
    }

    /// `(x - mean) / std` per column.
    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(x, (m, s))| {
                let s = if *s == 0.0 { 1.0 } else { *s };
                (x - m) / s
            })
            .collect()
    }
}
