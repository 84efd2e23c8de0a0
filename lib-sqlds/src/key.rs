//! Datastore key type

use serde::{Deserialize, Serialize};
use std::fmt;

/// Owned datastore key.
///
/// Keys are opaque strings compared byte-wise. They are stored verbatim in
/// the `key` column of the backing table.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    /// Create a key from any string-like value.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert into the owned key text.
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Whether the key starts with `prefix`.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl From<String> for Key {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ordering_is_bytewise() {
        let mut keys = vec![Key::from("b/1"), Key::from("a/2"), Key::from("a/10")];
        keys.sort();
        assert_eq!(keys, vec![Key::from("a/10"), Key::from("a/2"), Key::from("b/1")]);
    }

    #[test]
    fn test_has_prefix() {
        let key = Key::new("providers/abc");
        assert!(key.has_prefix("providers/"));
        assert!(key.has_prefix(""));
        assert!(!key.has_prefix("peers/"));
    }
}
