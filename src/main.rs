use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use niche_router::settings::parse_list;
use niche_router::{
    FeedbackEvent, JsonFileStore, KeyValueStore, NavigationAction, RedirectEngine, Result,
    SearchEngine,
};

/// Decide whether Google searches go to an AI answer engine, and learn from
/// feedback.
#[derive(Debug, Parser)]
#[command(version, rename_all = "kebab")]
struct Cli {
    /// JSON file holding settings, scores, examples, and the model.
    #[arg(long, value_name = "FILE", default_value = "niche-router.json")]
    store: PathBuf,
    /// Seed the model's random source.
    #[arg(long, value_name = "N")]
    seed: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a navigation URL through the full pipeline.
    Navigate { url: String },
    /// Classify a query under the stored settings without recording activity.
    Decide { query: String },
    /// Label a query as one that should or should not redirect.
    Feedback {
        query: String,
        /// Should have redirected (the default).
        #[arg(long, conflicts_with = "no_redirect")]
        redirect: bool,
        #[arg(long)]
        no_redirect: bool,
        /// Event id; repeats within one run are ignored.
        #[arg(long)]
        id: Option<String>,
    },
    /// Forget the model, normalizer, and training examples.
    ResetModel,
    /// Forget learned word scores.
    ResetWords,
    /// Show activity and learning statistics.
    Stats,
    /// Show or replace the allow and deny lists (comma-separated).
    Lists {
        #[arg(long, value_name = "LIST")]
        allow: Option<String>,
        #[arg(long, value_name = "LIST")]
        deny: Option<String>,
    },
    /// Show or change settings.
    Settings {
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long)]
        ml: Option<bool>,
        #[arg(long)]
        multi_tab: Option<bool>,
        #[arg(long)]
        engine: Option<SearchEngine>,
    },
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::open(&cli.store)?);
    let mut engine = RedirectEngine::new(store);
    if let Some(seed) = cli.seed {
        engine = engine.with_seed(seed);
    }

    match cli.command {
        Command::Navigate { url } => match engine.handle_navigation(&url) {
            NavigationAction::Redirect { url } => println!("redirect {}", url),
            NavigationAction::OpenTab { url } => println!("open-tab {}", url),
            NavigationAction::PassThrough => println!("pass-through"),
        },
        Command::Decide { query } => {
            let route = engine.decide(&query);
            let verdict = if route.redirect { "redirect" } else { "pass-through" };
            println!("{} ({})", verdict, route.label());
        }
        Command::Feedback {
            query,
            redirect,
            no_redirect,
            id,
        } => {
            let should_redirect = redirect || !no_redirect;
            let mut event = FeedbackEvent::new(query, should_redirect);
            if let Some(id) = id {
                event = event.with_id(id);
            }
            if engine.handle_feedback(&event) {
                let ml = engine.ml_stats();
                println!("learned ({} examples, {})", ml.sample_count, ml.status);
            } else {
                println!("ignored");
            }
        }
        Command::ResetModel => {
            engine.reset_model();
            println!("model reset");
        }
        Command::ResetWords => {
            engine.reset_word_scores();
            println!("word scores reset");
        }
        Command::Stats => {
            let activity = engine.activity_stats();
            let ml = engine.ml_stats();
            println!("searches redirected: {}", activity.searches);
            println!("time saved: {}", activity.times_saved);
            println!("training examples: {}", ml.sample_count);
            println!("training status: {}", ml.status);
            println!("tracked words: {}", ml.tracked_words);
            println!("trained model: {}", engine.has_trained_model());
        }
        Command::Lists { allow, deny } => {
            let mut settings = engine.settings();
            if allow.is_some() || deny.is_some() {
                if let Some(allow) = allow {
                    settings.whitelist = parse_list(&allow);
                }
                if let Some(deny) = deny {
                    settings.blacklist = parse_list(&deny);
                }
                engine.update_settings(&settings)?;
            }
            println!("allow: {}", settings.whitelist.join(", "));
            println!("deny: {}", settings.blacklist.join(", "));
        }
        Command::Settings {
            enabled,
            ml,
            multi_tab,
            engine: answer_engine,
        } => {
            let mut settings = engine.settings();
            let changed = enabled.is_some()
                || ml.is_some()
                || multi_tab.is_some()
                || answer_engine.is_some();
            settings.enabled = enabled.unwrap_or(settings.enabled);
            settings.ml_enabled = ml.unwrap_or(settings.ml_enabled);
            settings.multi_tab = multi_tab.unwrap_or(settings.multi_tab);
            settings.engine = answer_engine.unwrap_or(settings.engine);
            if changed {
                engine.update_settings(&settings)?;
            }
            println!("enabled: {}", settings.enabled);
            println!("ml: {}", settings.ml_enabled);
            println!("multi-tab: {}", settings.multi_tab);
            println!("engine: {}", settings.engine);
        }
    }

    Ok(())
}
