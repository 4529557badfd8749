//! Search request interception.
//!
//! Recognizes Google search navigations and pulls out what the classifier
//! needs: the query text and whether the user asked to skip redirection.

use url::Url;

/// Host whose searches are intercepted.
const SEARCH_HOST: &str = "www.google.com";
const SEARCH_PATH: &str = "/search";

/// Query parameters tried in order.
const QUERY_PARAMS: &[&str] = &["q", "query"];

/// Presence of this parameter bypasses the classifier entirely.
const ESCAPE_PARAM: &str = "escape";

/// A navigation that matched the search pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub url: String,
    /// Query text, if the URL carried a non-empty one.
    pub query: Option<String>,
    pub escape: bool,
}

impl SearchRequest {
    /// Parse a navigation URL. `None` when it is not a search we intercept.
    pub fn from_url(url_str: &str) -> Option<Self> {
        let parsed = Url::parse(url_str).ok()?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return None;
        }
        if parsed.host_str() != Some(SEARCH_HOST) || !parsed.path().starts_with(SEARCH_PATH) {
            return None;
        }

        let mut escape = false;
        let mut params: Vec<(String, String)> = Vec::new();
        for (k, v) in parsed.query_pairs() {
            if k == ESCAPE_PARAM {
                escape = true;
            }
            params.push((k.into_owned(), v.into_owned()));
        }

        // First param with a non-empty value wins, q before query
        let query = QUERY_PARAMS.iter().find_map(|name| {
            params
                .iter()
                .find(|(k, v)| k == name && !v.trim().is_empty())
                .map(|(_, v)| v.clone())
        });

        Some(Self {
            url: parsed.to_string(),
            query,
            escape,
        })
    }
}
