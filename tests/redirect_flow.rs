use std::sync::Arc;

use niche_router::engine::RouteReason;
use niche_router::store::{self, keys};
use niche_router::{
    FeedbackEvent, JsonFileStore, KeyValueStore, MemoryStore, NavigationAction, RedirectEngine,
    SearchEngine, Settings,
};

fn memory_engine(settings: Settings) -> RedirectEngine {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let engine = RedirectEngine::new(store).with_seed(7);
    engine.update_settings(&settings).unwrap();
    engine
}

fn search(query: &str) -> String {
    format!("https://www.google.com/search?q={}", query.replace(' ', "+"))
}

#[test]
fn keyword_rules_redirect_questions_to_perplexity() {
    let engine = memory_engine(Settings {
        ml_enabled: false,
        ..Settings::default()
    });

    let action = engine.handle_navigation(&search("what is quantum computing?"));
    assert_eq!(
        action,
        NavigationAction::Redirect {
            url: "https://www.perplexity.ai/search/new?q=what+is+quantum+computing?".into()
        }
    );
    assert_eq!(
        engine.handle_navigation(&search("weather berlin")),
        NavigationAction::PassThrough
    );
}

#[test]
fn deny_list_beats_everything() {
    let engine = memory_engine(Settings {
        whitelist: vec!["shoes".into()],
        blacklist: vec!["shoes".into()],
        ..Settings::default()
    });
    assert_eq!(
        engine.handle_navigation(&search("how to buy shoes?")),
        NavigationAction::PassThrough
    );
}

#[test]
fn escape_parameter_skips_classification() {
    let engine = memory_engine(Settings::default());
    let url = "https://www.google.com/search?q=why+is+the+sky+blue&escape=true";
    assert_eq!(engine.handle_navigation(url), NavigationAction::PassThrough);
    assert_eq!(engine.activity_stats().searches, 0);
}

#[test]
fn negative_feedback_turns_a_query_off() {
    let engine = memory_engine(Settings::default());
    let query = "cheap running shoes";
    for i in 0..3 {
        let event = FeedbackEvent::new(query, false).with_id(format!("fb-{}", i));
        assert!(engine.handle_feedback(&event));
    }

    // One stored example, three ledger updates
    assert_eq!(engine.ml_stats().sample_count, 1);
    assert_eq!(engine.ledger().word_score("running"), -3);

    let route = engine.decide(query);
    assert!(!route.redirect);
    assert_eq!(route.label(), "strong negative");
    assert_eq!(
        engine.handle_navigation(&search(query)),
        NavigationAction::PassThrough
    );
}

#[test]
fn positive_feedback_opens_chatgpt_tab() {
    let engine = memory_engine(Settings {
        multi_tab: true,
        engine: SearchEngine::ChatGpt,
        ..Settings::default()
    });
    let query = "tokio runtime internals";
    for _ in 0..3 {
        engine.handle_feedback(&FeedbackEvent::new(query, true));
    }
    assert_eq!(
        engine.handle_navigation(&search(query)),
        NavigationAction::OpenTab {
            url: "https://chatgpt.com/?q=tokio+runtime+internals".into()
        }
    );
}

#[test]
fn enough_examples_train_and_persist_a_model() {
    let engine = memory_engine(Settings::default());
    let questions = [
        "how do lifetimes work",
        "why does rust need borrowing",
        "what is a monad",
        "how does tcp handshake",
        "why is the ocean salty",
        "what causes inflation",
    ];
    let lookups = [
        "amazon login",
        "weather paris",
        "bbc news",
        "cheap flights madrid",
        "youtube music",
        "gmail",
    ];
    for q in questions {
        engine.handle_feedback(&FeedbackEvent::new(q, true));
    }
    assert!(!engine.has_trained_model());
    for q in lookups {
        engine.handle_feedback(&FeedbackEvent::new(q, false));
    }

    assert_eq!(engine.ml_stats().sample_count, 12);
    assert!(engine.has_trained_model());

    engine.reset_model();
    assert!(!engine.has_trained_model());
    assert_eq!(engine.ml_stats().sample_count, 0);
    assert_eq!(engine.ledger().word_score("amazon"), -1);
}

#[test]
fn corrupt_model_falls_back_to_fresh_weights() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    store::save(store.as_ref(), keys::MODEL_ARTIFACTS, "not a model").unwrap();
    let engine = RedirectEngine::new(store).with_seed(1);

    let route = engine.decide("rust crates");
    match route.reason {
        RouteReason::Learned(decision) => {
            let p = decision.probability.expect("model consulted");
            assert!((0.0..=1.0).contains(&p));
        }
        other => panic!("unexpected route {:?}", other),
    }
}

#[test]
fn file_store_keeps_state_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    {
        let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::open(&path).unwrap());
        let engine = RedirectEngine::new(store).with_seed(5);
        engine
            .update_settings(&Settings {
                ml_enabled: false,
                ..Settings::default()
            })
            .unwrap();
        engine.handle_feedback(&FeedbackEvent::new("serde derive macros", true));
        engine.handle_navigation(&search("how to bake bread"));
    }

    let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::open(&path).unwrap());
    let engine = RedirectEngine::new(store);
    assert!(!engine.settings().ml_enabled);
    assert_eq!(engine.ledger().word_score("serde"), 1);
    assert_eq!(engine.ml_stats().sample_count, 1);
    let stats = engine.activity_stats();
    assert_eq!(stats.searches, 1);
    assert_eq!(stats.times_saved, "0min");
}
