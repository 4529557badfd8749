//! Final redirect decision.
//!
//! Merges the ledger's aggregate word score, the keyword rules, and the
//! network's probability. Strong ledger signals short-circuit the network so
//! an explicit correction takes effect before any retraining.

use std::sync::Arc;

use super::keywords::is_niche_query;
use super::ledger::{LedgerSignal, WordLedger};
use super::model::ModelContext;
use crate::error::Result;

/// Ledger score above which a question-marked query redirects outright.
const QUESTION_SHORTCUT: f64 = 0.2;
/// Ledger score above which any query redirects outright.
const STRONG_POSITIVE: f64 = 0.4;
/// Ledger score below which any query passes through.
const STRONG_NEGATIVE: f64 = -0.4;

const MAX_LEDGER_WEIGHT: f64 = 0.7;
const QUESTION_WEIGHT_BONUS: f64 = 0.2;
const MAX_QUESTION_WEIGHT: f64 = 0.9;
/// Ledger size at which its weight would reach 1.0 before capping.
const WEIGHT_SATURATION_WORDS: f64 = 100.0;

const REDIRECT_THRESHOLD: f64 = 0.5;

/// Which rule produced the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionPath {
    QuestionShortcut,
    StrongPositive,
    StrongNegative,
    /// Network probability alone (neutral ledger).
    Model,
    /// Network probability interpolated with the ledger.
    Blended,
    /// The network failed; keyword rules decided.
    KeywordFallback,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub redirect: bool,
    pub path: DecisionPath,
    pub ledger_score: f64,
    /// Final probability, when the network was consulted successfully.
    pub probability: Option<f64>,
}

/// Apply the precedence rules. `model` is only called when no ledger rule
/// short-circuits; its error is absorbed into the keyword fallback.
pub fn blend(
    query: &str,
    signal: LedgerSignal,
    model: impl FnOnce() -> Result<f64>,
) -> Decision {
    let has_marker = is_niche_query(query);
    let score = signal.score;

    let short = |redirect, path| Decision {
        redirect,
        path,
        ledger_score: score,
        probability: None,
    };

    if has_marker && score > QUESTION_SHORTCUT {
        return short(true, DecisionPath::QuestionShortcut);
    }
    if score > STRONG_POSITIVE {
        return short(true, DecisionPath::StrongPositive);
    }
    if score < STRONG_NEGATIVE {
        return short(false, DecisionPath::StrongNegative);
    }

    let model_prob = match model() {
        Ok(p) => p,
        Err(e) => {
            log::warn!("Classifier failed, using keyword rules: {}", e);
            return short(has_marker, DecisionPath::KeywordFallback);
        }
    };

    let (probability, path) = if score != 0.0 {
        let mut weight =
            (signal.tracked_words as f64 / WEIGHT_SATURATION_WORDS).min(MAX_LEDGER_WEIGHT);
        if has_marker {
            weight = (weight + QUESTION_WEIGHT_BONUS).min(MAX_QUESTION_WEIGHT);
        }
        let ledger_prob = (score + 1.0) / 2.0;
        (
            model_prob * (1.0 - weight) + ledger_prob * weight,
            DecisionPath::Blended,
        )
    } else {
        (model_prob, DecisionPath::Model)
    };

    Decision {
        redirect: probability > REDIRECT_THRESHOLD,
        path,
        ledger_score: score,
        probability: Some(probability),
    }
}

/// Learned decision path: ledger + network, falling back to keywords.
pub struct DecisionBlender {
    ledger: Arc<WordLedger>,
    model: Arc<ModelContext>,
}

impl DecisionBlender {
    pub fn new(ledger: Arc<WordLedger>, model: Arc<ModelContext>) -> Self {
        Self { ledger, model }
    }

    /// Full decision with its provenance.
    pub fn evaluate(&self, query: &str) -> Decision {
        let signal = self.ledger.signal(query);
        let decision = blend(query, signal, || self.model.probability(query));
        log::debug!(
            "Decision for {:?}: redirect={} via {:?} (ledger {:.2}, p {:?})",
            query,
            decision.redirect,
            decision.path,
            decision.ledger_score,
            decision.probability
        );
        decision
    }

    pub fn decide(&self, query: &str) -> bool {
        self.evaluate(query).redirect
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn signal(score: f64, tracked_words: usize) -> LedgerSignal {
        LedgerSignal {
            score,
            tracked_words,
        }
    }

    fn never_called() -> Result<f64> {
        panic!("network must not be consulted")
    }

    #[test]
    fn question_shortcut_skips_network() {
        let d = blend("what is rust", signal(0.5, 20), never_called);
        assert!(d.redirect);
        assert_eq!(d.path, DecisionPath::QuestionShortcut);
    }

    #[test]
    fn strong_signals_skip_network() {
        let d = blend("rust lang", signal(0.41, 20), never_called);
        assert_eq!((d.redirect, d.path), (true, DecisionPath::StrongPositive));

        let d = blend("what shoes", signal(-0.6, 20), never_called);
        assert_eq!((d.redirect, d.path), (false, DecisionPath::StrongNegative));
    }

    #[test]
    fn neutral_ledger_uses_model_unchanged() {
        let d = blend("rust lang", signal(0.0, 50), || Ok(0.7));
        assert_eq!(d.path, DecisionPath::Model);
        assert_eq!(d.probability, Some(0.7));
        assert!(d.redirect);
    }

    #[test]
    fn exactly_half_does_not_redirect() {
        let d = blend("rust lang", signal(0.0, 0), || Ok(0.5));
        assert!(!d.redirect);
    }

    #[test]
    fn weak_ledger_blends() {
        // weight = min(0.7, 50/100) = 0.5, ledger01 = 0.6
        let d = blend("rust lang", signal(0.2, 50), || Ok(0.3));
        assert_eq!(d.path, DecisionPath::Blended);
        let p = d.probability.unwrap();
        assert!((p - 0.45).abs() < 1e-9);
        assert!(!d.redirect);
    }

    #[test]
    fn question_marker_raises_weight() {
        // weight = min(0.7, 3.0) = 0.7, +0.2 → 0.9; ledger01 = 0.4
        let d = blend("what rust", signal(-0.2, 300), || Ok(1.0));
        let p = d.probability.unwrap();
        assert!((p - (0.1 + 0.36)).abs() < 1e-9);
        assert!(!d.redirect);
    }

    #[test]
    fn model_error_falls_back_to_keywords() {
        let d = blend("how to bake", signal(0.1, 5), || Err(Error::model("boom")));
        assert_eq!((d.redirect, d.path), (true, DecisionPath::KeywordFallback));

        let d = blend("bake bread", signal(0.0, 5), || Err(Error::model("boom")));
        assert!(!d.redirect);
    }
}
