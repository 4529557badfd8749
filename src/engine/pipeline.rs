use std::sync::Arc;

use crate::classify::{
    is_niche_query, Decision, DecisionBlender, DecisionPath, ModelContext, WordLedger,
};
use crate::engine::activity;
use crate::error::Result;
use crate::feedback::{FeedbackDeduplicator, FeedbackEvent};
use crate::net::intercept::SearchRequest;
use crate::net::lists::{GateStats, GateVerdict, ListGate};
use crate::settings::Settings;
use crate::store::{keys, KeyValueStore};
use crate::training::{TrainOutcome, TrainingController, TrainingStatus};

/// What the navigation layer should do with an intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationAction {
    /// Replace the current navigation with the answer-engine URL.
    Redirect { url: String },
    /// Leave the search page alone and open the answer engine in a new tab.
    OpenTab { url: String },
    /// Let the search proceed untouched.
    PassThrough,
}

/// Why a query was or wasn't sent to the answer engine.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteReason {
    /// Matched the deny or allow list.
    List(GateVerdict),
    /// Learned path (ledger + network).
    Learned(Decision),
    /// Keyword rules only; the learned path is switched off.
    Keywords,
}

/// Routing decision for one query under the current settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub redirect: bool,
    pub reason: RouteReason,
}

/// Learning progress summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MlStats {
    pub sample_count: usize,
    pub status: TrainingStatus,
    pub tracked_words: usize,
}

/// The redirect pipeline: Intercept → Escape/Enabled → Lists → Classify → Act
pub struct RedirectEngine {
    store: Arc<dyn KeyValueStore>,
    ledger: Arc<WordLedger>,
    blender: DecisionBlender,
    trainer: TrainingController,
    dedup: FeedbackDeduplicator,
    gate_stats: GateStats,
}

impl RedirectEngine {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let model = Arc::new(ModelContext::new(store.clone()));
        Self::assemble(store, model)
    }

    /// Seed the model's random source (initial weights and shuffling).
    pub fn with_seed(self, seed: u64) -> Self {
        let model = Arc::new(ModelContext::with_seed(self.store.clone(), seed));
        Self::assemble(self.store, model)
    }

    fn assemble(store: Arc<dyn KeyValueStore>, model: Arc<ModelContext>) -> Self {
        let ledger = Arc::new(WordLedger::new(store.clone()));
        Self {
            blender: DecisionBlender::new(ledger.clone(), model.clone()),
            trainer: TrainingController::new(store.clone(), ledger.clone(), model),
            ledger,
            store,
            dedup: FeedbackDeduplicator::new(),
            gate_stats: GateStats::new(),
        }
    }

    pub fn settings(&self) -> Settings {
        Settings::load(self.store.as_ref())
    }

    pub fn update_settings(&self, settings: &Settings) -> Result<()> {
        settings.save(self.store.as_ref())
    }

    /// Route a query under `settings`, without any side effects beyond the
    /// gate counters.
    pub fn route(&self, query: &str, settings: &Settings) -> Route {
        let gate = ListGate::new(&settings.whitelist, &settings.blacklist);
        if let Some(verdict) = gate.check(query, &self.gate_stats) {
            return Route {
                redirect: verdict == GateVerdict::Allow,
                reason: RouteReason::List(verdict),
            };
        }

        if settings.ml_enabled {
            let decision = self.blender.evaluate(query);
            Route {
                redirect: decision.redirect,
                reason: RouteReason::Learned(decision),
            }
        } else {
            Route {
                redirect: is_niche_query(query),
                reason: RouteReason::Keywords,
            }
        }
    }

    /// Route a query under the stored settings.
    pub fn decide(&self, query: &str) -> Route {
        self.route(query, &self.settings())
    }

    /// Handle one navigation.
    pub fn handle_navigation(&self, url: &str) -> NavigationAction {
        let request = match SearchRequest::from_url(url) {
            Some(r) => r,
            None => return NavigationAction::PassThrough,
        };
        if request.escape {
            log::debug!("Escape requested, passing through {}", request.url);
            return NavigationAction::PassThrough;
        }

        let settings = self.settings();
        if !settings.enabled {
            return NavigationAction::PassThrough;
        }
        let query = match request.query {
            Some(q) => q,
            None => return NavigationAction::PassThrough,
        };

        let route = self.route(&query, &settings);
        if !route.redirect {
            return NavigationAction::PassThrough;
        }

        let target = settings.engine.search_url(&query);
        if let Err(e) =
            activity::record_redirect(self.store.as_ref(), &query, &target, settings.multi_tab)
        {
            log::warn!("Failed to record redirect: {}", e);
        }
        log::debug!("Routing {:?} to {}", query, settings.engine);

        if settings.multi_tab {
            NavigationAction::OpenTab { url: target }
        } else {
            NavigationAction::Redirect { url: target }
        }
    }

    /// Learn from a feedback event. Returns false when the event's id was
    /// already seen this session.
    pub fn handle_feedback(&self, event: &FeedbackEvent) -> bool {
        if !self.dedup.should_process(event.feedback_id.as_deref()) {
            log::debug!("Duplicate feedback {:?} ignored", event.feedback_id);
            return false;
        }
        let outcome = self.trainer.train(&event.query, event.should_redirect);
        log::debug!("Feedback for {:?}: {:?}", event.query, outcome);
        outcome != TrainOutcome::Ignored
    }

    /// Drop the model, normalizer, and examples. Word scores survive.
    pub fn reset_model(&self) {
        self.trainer.reset_model();
    }

    /// Drop every word score, seeds included. Seeds return on the next load.
    pub fn reset_word_scores(&self) {
        self.ledger.reset();
    }

    pub fn ml_stats(&self) -> MlStats {
        let sample_count = self.trainer.sample_count();
        MlStats {
            sample_count,
            status: TrainingStatus::from_sample_count(sample_count),
            tracked_words: self.ledger.tracked_words(),
        }
    }

    pub fn activity_stats(&self) -> activity::Stats {
        activity::stats(self.store.as_ref())
    }

    pub fn gate_stats(&self) -> &GateStats {
        &self.gate_stats
    }

    pub fn ledger(&self) -> &Arc<WordLedger> {
        &self.ledger
    }

    /// True when a trained model has been persisted.
    pub fn has_trained_model(&self) -> bool {
        self.store
            .get(&[keys::MODEL_ARTIFACTS])
            .map(|r| r.contains_key(keys::MODEL_ARTIFACTS))
            .unwrap_or(false)
    }
}

impl Route {
    /// Short label for the decision path, for display.
    pub fn label(&self) -> &'static str {
        match &self.reason {
            RouteReason::List(GateVerdict::Deny) => "deny list",
            RouteReason::List(GateVerdict::Allow) => "allow list",
            RouteReason::Keywords => "keywords",
            RouteReason::Learned(d) => match d.path {
                DecisionPath::QuestionShortcut => "question shortcut",
                DecisionPath::StrongPositive => "strong positive",
                DecisionPath::StrongNegative => "strong negative",
                DecisionPath::Model => "model",
                DecisionPath::Blended => "blended",
                DecisionPath::KeywordFallback => "keyword fallback",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SearchEngine;
    use crate::store::MemoryStore;

    fn engine_with(settings: Settings) -> RedirectEngine {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let engine = RedirectEngine::new(store).with_seed(3);
        engine.update_settings(&settings).unwrap();
        engine
    }

    fn keywords_only() -> Settings {
        Settings {
            ml_enabled: false,
            ..Settings::default()
        }
    }

    #[test]
    fn redirects_niche_query() {
        let engine = engine_with(keywords_only());
        let url = "https://www.google.com/search?q=what+is+quantum+computing%3F";
        let action = engine.handle_navigation(url);
        assert_eq!(
            action,
            NavigationAction::Redirect {
                url: "https://www.perplexity.ai/search/new?q=what+is+quantum+computing?".into()
            }
        );
        assert_eq!(engine.activity_stats().searches, 1);
    }

    #[test]
    fn disabled_passes_through() {
        let engine = engine_with(Settings {
            enabled: false,
            ..keywords_only()
        });
        let action = engine.handle_navigation("https://www.google.com/search?q=how+to+cook");
        assert_eq!(action, NavigationAction::PassThrough);
        assert_eq!(engine.activity_stats().searches, 0);
    }

    #[test]
    fn escape_and_missing_query_pass_through() {
        let engine = engine_with(keywords_only());
        assert_eq!(
            engine.handle_navigation("https://www.google.com/search?q=how+to&escape=1"),
            NavigationAction::PassThrough
        );
        assert_eq!(
            engine.handle_navigation("https://www.google.com/search?tbm=isch"),
            NavigationAction::PassThrough
        );
        assert_eq!(
            engine.handle_navigation("https://example.com/?q=how+to"),
            NavigationAction::PassThrough
        );
    }

    #[test]
    fn multi_tab_opens_chatgpt() {
        let engine = engine_with(Settings {
            multi_tab: true,
            engine: SearchEngine::ChatGpt,
            ..keywords_only()
        });
        let url = "https://www.google.com/search?q=how+do+lifetimes+work";
        let action = engine.handle_navigation(url);
        assert_eq!(
            action,
            NavigationAction::OpenTab {
                url: "https://chatgpt.com/?q=how+do+lifetimes+work".into()
            }
        );
    }

    #[test]
    fn lists_override_classifier() {
        let engine = engine_with(Settings {
            whitelist: vec!["weather".into()],
            blacklist: vec!["shoes".into()],
            ..keywords_only()
        });
        let deny = engine.decide("how to clean shoes");
        assert!(!deny.redirect);
        assert_eq!(deny.reason, RouteReason::List(GateVerdict::Deny));

        let allow = engine.decide("weather berlin");
        assert!(allow.redirect);
        assert_eq!(allow.label(), "allow list");
        assert_eq!(engine.gate_stats().snapshot(), (1, 1, 2));
    }

    #[test]
    fn learned_path_takes_question_shortcut() {
        let engine = engine_with(Settings::default());
        let route = engine.decide("why is the sky blue?");
        assert!(route.redirect);
        assert_eq!(route.label(), "question shortcut");
    }

    #[test]
    fn duplicate_feedback_id_is_processed_once() {
        let engine = engine_with(Settings::default());
        let event = FeedbackEvent::new("rust borrow checker", true).with_id("fb-1");
        assert!(engine.handle_feedback(&event));
        assert!(!engine.handle_feedback(&event));
        assert_eq!(engine.ml_stats().sample_count, 1);
        assert_eq!(engine.ledger().word_score("borrow"), 1);
    }

    #[test]
    fn resets_have_separate_scope() {
        let engine = engine_with(Settings::default());
        for i in 0..3 {
            engine.handle_feedback(&FeedbackEvent::new(format!("borrow checker {}", i), true));
        }
        assert_eq!(engine.ml_stats().sample_count, 3);

        engine.reset_model();
        assert_eq!(engine.ml_stats().sample_count, 0);
        assert_eq!(engine.ledger().word_score("borrow"), 3);

        engine.reset_word_scores();
        assert_eq!(engine.ledger().word_score("borrow"), 0);
        assert_eq!(engine.ledger().tracked_words(), 0);
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn engine_is_shareable_across_threads() {
        assert_send_sync::<RedirectEngine>();

        let engine = Arc::new(engine_with(Settings::default()));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    for i in 0..20 {
                        let query = format!("thread {} topic {} details", t, i);
                        let event = FeedbackEvent::new(query.as_str(), i % 2 == 0)
                            .with_id(format!("{}-{}", t, i));
                        assert!(engine.handle_feedback(&event));
                        engine.decide(&query);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Every example survives concurrent appends
        assert_eq!(engine.ml_stats().sample_count, 160);
        assert!(engine.has_trained_model());
    }
}
