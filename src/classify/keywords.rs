/// Interrogative markers that make a query look conversational.
///
/// Matched as plain substrings, so "show" hits "how" and "island" hits "is".
/// That looseness is the baseline behavior the learned path improves on.
pub const NICHE_KEYWORDS: &[&str] = &[
    "how", "what", "why", "when", "who", "which", "where", "does", "do", "is", "are", "can",
    "could", "would", "should", "?",
];

/// Rule-based check: does the query contain any niche marker?
pub fn is_niche_query(query: &str) -> bool {
    let lower = query.to_lowercase();
    NICHE_KEYWORDS.iter().any(|k| lower.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn questions_are_niche() {
        assert!(is_niche_query("What is quantum computing?"));
        assert!(is_niche_query("HOW to tie a tie"));
        assert!(is_niche_query("rust?"));
    }

    #[test]
    fn plain_lookups_are_not() {
        assert!(!is_niche_query("buy shoes"));
        assert!(!is_niche_query("weather berlin"));
        assert!(!is_niche_query(""));
    }

    #[test]
    fn substring_matching_is_loose() {
        // "island" contains "is"
        assert!(is_niche_query("island"));
    }
}
