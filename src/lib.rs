pub mod classify;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod net;
pub mod settings;
pub mod store;
pub mod training;

pub use engine::{NavigationAction, RedirectEngine};
pub use error::{Error, Result};
pub use feedback::FeedbackEvent;
pub use settings::{SearchEngine, Settings};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
