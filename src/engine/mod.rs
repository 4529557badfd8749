pub mod activity;
pub mod pipeline;

pub use pipeline::{MlStats, NavigationAction, RedirectEngine, Route, RouteReason};
