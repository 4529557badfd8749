//! Query classification: keyword rules, the word ledger, the feature
//! pipeline, the network, and the blender that combines them.

pub mod blender;
pub mod features;
pub mod keywords;
pub mod ledger;
pub mod model;

pub use blender::{Decision, DecisionBlender, DecisionPath};
pub use keywords::is_niche_query;
pub use ledger::WordLedger;
pub use model::ModelContext;
