//! Key patterns for store scans.
//!
//! Patterns use glob syntax: `*` matches any run of characters, `?` one
//! character and `[...]` a character class. Keys are flat strings, so
//! `*` also crosses `:` and `/`.

use glob::{MatchOptions, Pattern};

use crate::error::StoreError;

const OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// A compiled scan pattern.
///
/// # Example
///
/// ```
/// use promptflow::store::pattern::KeyPattern;
///
/// let pattern = KeyPattern::new("prompt:*").unwrap();
/// assert!(pattern.matches("prompt:hello:v1.0.0"));
/// assert!(!pattern.matches("embedding:hello:v1.0.0"));
/// ```
#[derive(Debug, Clone)]
pub struct KeyPattern(Pattern);

impl KeyPattern {
    /// Compiles `pattern`, failing on malformed classes such as `[a`.
    pub fn new(pattern: &str) -> Result<Self, StoreError> {
        Ok(Self(Pattern::new(pattern)?))
    }

    pub fn matches(&self, key: &str) -> bool {
        self.0.matches_with(key, OPTIONS)
    }
}
