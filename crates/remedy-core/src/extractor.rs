//! Fix extraction
//!
//! Turns the free-text `tool_schema_patch` of a report into a field
//! mapping. [`PhraseExtractor`] accepts three phrasings, tried in order,
//! case-insensitively; the first match wins:
//!
//! 1. `a -> b` (also `a → b`, `a > b`, quoted or not)
//! 2. `rename a to b`
//! 3. `map a -> b`

use once_cell::sync::Lazy;
use regex::Regex;
use remedy_adapter::Mapping;

/// Extracts an adapter mapping from a proposed fix
pub trait FixExtractor: Send + Sync {
    /// `None` when no actionable mapping is present
    fn extract(&self, text: &str) -> Option<Mapping>;
}

const PHRASES: [&str; 3] = [
    r#"(?i)['"]?(\w+)['"]?\s*[-→>]+\s*['"]?(\w+)['"]?"#,
    r#"(?i)rename\s+['"]?(\w+)['"]?\s+to\s+['"]?(\w+)['"]?"#,
    r#"(?i)map\s+['"]?(\w+)['"]?\s*[-→>]+\s*['"]?(\w+)['"]?"#,
];

static PATTERNS: Lazy<Vec<Regex>> =
    Lazy::new(|| PHRASES.iter().filter_map(|p| Regex::new(p).ok()).collect());

/// The three-phrase regex extractor
#[derive(Debug, Clone, Copy, Default)]
pub struct PhraseExtractor;

impl FixExtractor for PhraseExtractor {
    fn extract(&self, text: &str) -> Option<Mapping> {
        PATTERNS.iter().find_map(|re| {
            re.captures(text).map(|caps| {
                Mapping::from([(caps[1].to_string(), caps[2].to_string())])
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(old: &str, new: &str) -> Option<Mapping> {
        Some(Mapping::from([(old.to_string(), new.to_string())]))
    }

    #[test]
    fn all_patterns_compile() {
        assert_eq!(PATTERNS.len(), PHRASES.len());
    }

    #[test]
    fn accepted_phrasings() {
        let extractor = PhraseExtractor;
        assert_eq!(extractor.extract("map amt->amount before Auditor"), pair("amt", "amount"));
        assert_eq!(extractor.extract("rename 'amt' to 'amount'"), pair("amt", "amount"));
        assert_eq!(extractor.extract("Add schema adapter: 'amt' → 'amount'"), pair("amt", "amount"));
        assert_eq!(extractor.extract("RENAME level TO Level"), pair("level", "Level"));
        assert_eq!(
            extractor.extract("Cached adapter: 'level' -> 'Level'"),
            pair("level", "Level")
        );
    }

    #[test]
    fn arrow_phrasing_wins_over_rename() {
        assert_eq!(
            PhraseExtractor.extract("rename a to b, or x -> y"),
            pair("x", "y")
        );
    }

    #[test]
    fn vague_text_has_no_patch() {
        assert_eq!(
            PhraseExtractor.extract("some vague description without clear field names"),
            None
        );
        assert_eq!(PhraseExtractor.extract(""), None);
    }

    #[test]
    fn heuristic_phrasing_is_understood() {
        assert_eq!(
            PhraseExtractor.extract("Add schema adapter: rename 'level' to 'Level' in fetch_log_events output"),
            pair("level", "Level")
        );
    }
}
