//! User-facing settings the navigation layer consults on every search.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::{self, keys, KeyValueStore, Record};

/// Supported AI answer engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchEngine {
    #[default]
    Perplexity,
    ChatGpt,
}

impl SearchEngine {
    /// Answer-engine URL for a raw query.
    pub fn search_url(self, query: &str) -> String {
        let q = format_query(query);
        match self {
            SearchEngine::Perplexity => format!("https://www.perplexity.ai/search/new?q={}", q),
            SearchEngine::ChatGpt => format!("https://chatgpt.com/?q={}", q),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SearchEngine::Perplexity => "perplexity",
            SearchEngine::ChatGpt => "chatgpt",
        }
    }
}

impl fmt::Display for SearchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SearchEngine {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "perplexity" => Ok(SearchEngine::Perplexity),
            "chatgpt" => Ok(SearchEngine::ChatGpt),
            other => Err(format!("unknown engine: {}", other)),
        }
    }
}

/// Trim, join words with `+`, and escape characters that would break the
/// query component.
pub fn format_query(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    for (i, word) in query.split_whitespace().enumerate() {
        if i > 0 {
            out.push('+');
        }
        for c in word.chars() {
            match c {
                '&' => out.push_str("%26"),
                '#' => out.push_str("%23"),
                '+' => out.push_str("%2B"),
                '%' => out.push_str("%25"),
                c => out.push(c),
            }
        }
    }
    out
}

/// Split a comma-separated list the way the settings form saves it:
/// trimmed, lowercased, empties dropped.
pub fn parse_list(text: &str) -> Vec<String> {
    normalize_list(text.split(','))
}

fn normalize_list<I, S>(entries: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .map(|e| e.as_ref().trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Master switch. Off means every search passes through.
    pub enabled: bool,
    /// Use the learned path; off means keyword rules only.
    pub ml_enabled: bool,
    /// Open the answer engine in a new tab instead of redirecting.
    pub multi_tab: bool,
    pub engine: SearchEngine,
    /// Allow list: a matching query always redirects.
    pub whitelist: Vec<String>,
    /// Deny list: a matching query never redirects.
    pub blacklist: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            ml_enabled: true,
            multi_tab: false,
            engine: SearchEngine::default(),
            whitelist: Vec::new(),
            blacklist: Vec::new(),
        }
    }
}

fn load_or<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str, default: T) -> T {
    match store::load(store, key) {
        Ok(Some(value)) => value,
        Ok(None) => default,
        Err(e) => {
            log::warn!("Setting {} unreadable, using default: {}", key, e);
            default
        }
    }
}

impl Settings {
    /// Read every setting, defaulting any that are missing or unreadable.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let defaults = Self::default();
        Self {
            enabled: load_or(store, keys::ENABLED, defaults.enabled),
            ml_enabled: load_or(store, keys::ML_ENABLED, defaults.ml_enabled),
            multi_tab: load_or(store, keys::MULTI_TAB, defaults.multi_tab),
            engine: load_or(store, keys::ENGINE, defaults.engine),
            whitelist: normalize_list(load_or::<Vec<String>>(store, keys::WHITELIST, Vec::new())),
            blacklist: normalize_list(load_or::<Vec<String>>(store, keys::BLACKLIST, Vec::new())),
        }
    }

    /// Write every setting in one record.
    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        let mut record = Record::new();
        record.insert(keys::ENABLED.into(), serde_json::to_value(self.enabled)?);
        record.insert(keys::ML_ENABLED.into(), serde_json::to_value(self.ml_enabled)?);
        record.insert(keys::MULTI_TAB.into(), serde_json::to_value(self.multi_tab)?);
        record.insert(keys::ENGINE.into(), serde_json::to_value(self.engine)?);
        record.insert(
            keys::WHITELIST.into(),
            serde_json::to_value(normalize_list(&self.whitelist))?,
        );
        record.insert(
            keys::BLACKLIST.into(),
            serde_json::to_value(normalize_list(&self.blacklist))?,
        );
        store.set(record)
    }
}
