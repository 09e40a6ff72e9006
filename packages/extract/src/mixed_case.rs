//! Mixed-case detection.
//!
//! Retailers sell assortments ("12 Bottle Mix", "Mystery Red Case") next to
//! single wines. Bottle-level attributes (size, ABV, vintage) are meaningless
//! for those, so they are recognized by name and the per-bottle extractors
//! are skipped.

use serde::{Deserialize, Serialize};

/// Name tokens marking a product as a mixed case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixedCaseRules {
    /// Set to `false` for retailers that sell no cases.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Final name words marking a case.
    #[serde(default = "default_suffixes")]
    pub suffixes: Vec<String>,
    /// Leading name words marking a case.
    #[serde(default = "default_prefixes")]
    pub prefixes: Vec<String>,
}

const fn default_enabled() -> bool {
    true
}

fn default_suffixes() -> Vec<String> {
    vec!["mix".to_owned(), "case".to_owned()]
}

fn default_prefixes() -> Vec<String> {
    vec!["mystery".to_owned()]
}

impl Default for MixedCaseRules {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            suffixes: default_suffixes(),
            prefixes: default_prefixes(),
        }
    }
}

/// Lowercased word with surrounding punctuation removed.
fn normalize(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

/// Whether `name` describes a mixed case under `rules`: its last word is a
/// case suffix or its first word a case prefix.
#[must_use]
pub fn classify_mixed_case(name: &str, rules: &MixedCaseRules) -> bool {
    if !rules.enabled {
        return false;
    }

    let words: Vec<String> = name
        .split_whitespace()
        .map(normalize)
        .filter(|word| !word.is_empty())
        .collect();

    let matches = |candidates: &[String], word: Option<&String>| {
        word.is_some_and(|word| candidates.iter().any(|c| c.eq_ignore_ascii_case(word)))
    };

    matches(&rules.suffixes, words.last()) || matches(&rules.prefixes, words.first())
}
