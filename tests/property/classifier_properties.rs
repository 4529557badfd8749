use std::sync::Arc;

use niche_router::classify::features::{extract_features, Normalizer};
use niche_router::classify::is_niche_query;
use niche_router::classify::ledger::{MAX_WORD_SCORE, MIN_WORD_SCORE};
use niche_router::classify::WordLedger;
use niche_router::settings::format_query;
use niche_router::store::MemoryStore;
use proptest::prelude::*;

fn ledger() -> WordLedger {
    WordLedger::new(Arc::new(MemoryStore::new()))
}

proptest! {
    #[test]
    fn word_scores_stay_clamped(votes in prop::collection::vec(any::<bool>(), 0..40)) {
        let ledger = ledger();
        let mut expected = 0i32;
        for vote in &votes {
            ledger.add_feedback("compiler", *vote);
            let delta = if *vote { 1 } else { -1 };
            expected = (expected + delta).clamp(MIN_WORD_SCORE, MAX_WORD_SCORE);
        }
        prop_assert_eq!(ledger.word_score("compiler"), expected);
    }

    #[test]
    fn query_score_is_bounded(
        feedback in prop::collection::vec(("[a-z]{3,8}", any::<bool>()), 0..30),
        query in "[a-z ?]{0,60}",
    ) {
        let ledger = ledger();
        for (word, vote) in &feedback {
            ledger.add_feedback(word, *vote);
        }
        let score = ledger.query_score(&query);
        prop_assert!((-1.0..=1.0).contains(&score), "score {} out of range", score);
    }

    #[test]
    fn question_mark_is_always_niche(prefix in ".{0,40}", suffix in ".{0,40}") {
        let query = format!("{}?{}", prefix, suffix);
        prop_assert!(is_niche_query(&query));
    }

    #[test]
    fn marker_free_text_is_not_niche(query in "[bfgjkmpqvxz0-9 ]{0,40}") {
        prop_assert!(!is_niche_query(&query));
    }

    #[test]
    fn formatted_query_has_no_separators(query in ".{0,80}") {
        let q = format_query(&query);
        prop_assert!(!q.chars().any(char::is_whitespace));
        prop_assert!(!q.contains('&'));
        prop_assert!(!q.contains('#'));
    }

    #[test]
    fn normalized_columns_are_centered(queries in prop::collection::vec("[a-z ?]{1,40}", 1..20)) {
        let rows: Vec<_> = queries.iter().map(|q| extract_features(q)).collect();
        let normalizer = Normalizer::fit(&rows);
        let transformed: Vec<Vec<f64>> = rows.iter().map(|r| normalizer.transform(r)).collect();
        for col in 0..normalizer.dims() {
            let mean = transformed.iter().map(|r| r[col]).sum::<f64>() / transformed.len() as f64;
            prop_assert!(mean.abs() < 1e-9, "column {} mean {}", col, mean);
        }
    }
}
