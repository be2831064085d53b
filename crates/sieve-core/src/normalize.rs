//! Text normalization and cache key derivation.
//!
//! Two articles that differ only in case, punctuation or spacing are the
//! same article as far as classification is concerned. This module reduces
//! raw text to a canonical form and derives a stable [`CacheKey`] from it.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

lazy_static! {
    /// Any run of characters that are neither letters nor digits.
    ///
    /// Covers punctuation, symbols, and every flavor of Unicode whitespace,
    /// so a single replacement collapses separators and spacing together.
    static ref SEPARATOR_RUN: Regex = Regex::new(r"[^\p{L}\p{N}]+").unwrap();
}

/// Reduce raw item text to its canonical form.
///
/// Folds case, replaces every run of non-alphanumeric characters with a
/// single space, and trims the ends. Pure and total.
///
/// ```
/// use sieve_core::normalize;
///
/// assert_eq!(normalize("  Breaking: Stocks Rise!!"), "breaking stocks rise");
/// ```
pub fn normalize(text: &str) -> String {
    let folded = text.to_lowercase();
    SEPARATOR_RUN
        .replace_all(&folded, " ")
        .trim()
        .to_string()
}

/// Derive the cache key for already-normalized text.
pub fn derive_key(canonical: &str) -> CacheKey {
    let digest = Sha256::digest(canonical.as_bytes());
    CacheKey(hex::encode(digest))
}

/// Cache key for a classification result.
///
/// Hex-encoded SHA-256 of the normalized item text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Normalize raw text and derive its key in one step.
    pub fn for_text(raw: &str) -> Self {
        derive_key(&normalize(raw))
    }

    /// The hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(self.0.as_str())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_folds_case_and_punctuation() {
        assert_eq!(normalize("  Breaking: Stocks Rise!!"), "breaking stocks rise");
        assert_eq!(normalize("breaking stocks rise"), "breaking stocks rise");
        assert_eq!(normalize("BREAKING -- stocks\t\nrise."), "breaking stocks rise");
    }

    #[test]
    fn test_normalize_keeps_digits_and_unicode_letters() {
        assert_eq!(normalize("Q3 Earnings: 12% up"), "q3 earnings 12 up");
        assert_eq!(normalize("Zürich Café — Öffnung"), "zürich café öffnung");
    }

    #[test]
    fn test_normalize_empty_and_symbol_only() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("  !!! ... ???  "), "");
    }

    #[test]
    fn test_equivalent_inputs_share_key() {
        let a = CacheKey::for_text("  Breaking: Stocks Rise!!");
        let b = CacheKey::for_text("breaking stocks rise");
        assert_eq!(a, b);
        assert_ne!(a, CacheKey::for_text("breaking stocks fall"));
    }

    #[test]
    fn test_key_is_sha256_hex() {
        let key = derive_key("breaking stocks rise");
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key.short().len(), 12);
        // Known digest of the empty string
        assert_eq!(
            derive_key("").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_short_survives_foreign_keys() {
        let key: CacheKey = serde_json::from_str("\"a€€€€€\"").unwrap();
        assert_eq!(key.short(), key.as_str());
        let tiny: CacheKey = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(tiny.short(), "abc");
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(text in "\\PC{0,64}") {
            let once = normalize(&text);
            prop_assert_eq!(normalize(&once), once.clone());
        }

        #[test]
        fn prop_cosmetic_changes_keep_key(words in proptest::collection::vec("[a-z0-9]{1,8}", 1..6)) {
            let plain = words.join(" ");
            let noisy = format!("  {}!! ", words.iter().map(|w| w.to_uppercase()).collect::<Vec<_>>().join(" ,  "));
            prop_assert_eq!(CacheKey::for_text(&plain), CacheKey::for_text(&noisy));
        }

        #[test]
        fn prop_normalized_has_no_edge_or_double_spaces(text in "\\PC{0,64}") {
            let canonical = normalize(&text);
            prop_assert!(!canonical.starts_with(' '));
            prop_assert!(!canonical.ends_with(' '));
            prop_assert!(!canonical.contains("  "));
        }
    }
}
