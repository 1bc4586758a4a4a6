//! Session token generation.
//!
//! Every platform leg of one logical test run computes its token
//! independently from the same `(commit, version, registrant)` triple, so all
//! legs agree on the token without coordinating.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Correlation identifier shared by all legs of one test run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Derives the token for a commit, version qualifier and registrant slug.
    ///
    /// The token is `{commit}-{hash(version)}-{hash(slug)}`.
    ///
    /// # Example
    ///
    /// ```
    /// use sentinel_relay::dispatch::SessionToken;
    ///
    /// let a = SessionToken::generate("0567bb6", "v8.4.1", "microsoft/vscode");
    /// let b = SessionToken::generate("0567bb6", "v8.4.1", "microsoft/vscode");
    /// assert_eq!(a, b);
    /// assert!(a.as_str().starts_with("0567bb6-"));
    /// ```
    pub fn generate(commit_hash: &str, version_qualifier: &str, registrant_slug: &str) -> Self {
        Self(format!(
            "{}-{}-{}",
            commit_hash,
            string_hash(version_qualifier),
            string_hash(registrant_slug)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// djb2-xor string hash over UTF-16 code units, walked from the end.
///
/// Matches the widely deployed `string-hash` routine so tokens stay stable
/// for receivers that already correlate on them.
pub fn string_hash(value: &str) -> u32 {
    let units: Vec<u16> = value.encode_utf16().collect();
    units
        .iter()
        .rev()
        .fold(5381u32, |hash, &unit| hash.wrapping_mul(33) ^ u32::from(unit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_hash_known_values() {
        assert_eq!(string_hash(""), 5381);
        assert_eq!(string_hash("a"), 177604);
        assert_eq!(string_hash("v8.4.1"), 3805225070);
        assert_eq!(string_hash("microsoft/vscode"), 1463593302);
        assert_eq!(string_hash("12.0.0-nightly.20200717"), 4126225133);
    }

    #[test]
    fn test_token_shape() {
        let token = SessionToken::generate("0567bb6", "v8.4.1", "microsoft/vscode");
        assert_eq!(token.as_str(), "0567bb6-3805225070-1463593302");

        let parts: Vec<&str> = token.as_str().splitn(3, '-').collect();
        assert_eq!(parts[0], "0567bb6");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert!(parts[2].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_token_is_repeatable() {
        let first = SessionToken::generate("abc123", "9.0.0-beta.1", "electron/fiddle");
        for _ in 0..10 {
            assert_eq!(
                SessionToken::generate("abc123", "9.0.0-beta.1", "electron/fiddle"),
                first
            );
        }
    }

    #[test]
    fn test_token_varies_with_each_input() {
        let base = SessionToken::generate("abc123", "9.0.0", "electron/fiddle");
        assert_ne!(base, SessionToken::generate("abc124", "9.0.0", "electron/fiddle"));
        assert_ne!(base, SessionToken::generate("abc123", "9.0.1", "electron/fiddle"));
        assert_ne!(base, SessionToken::generate("abc123", "9.0.0", "electron/forge"));
    }

    #[test]
    fn test_token_serializes_as_string() {
        let token = SessionToken::generate("abc", "1.0.0", "a/b");
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json, serde_json::Value::String(token.to_string()));
    }
}
