//! Canonical label sets.
//!
//! A [`LabelSet`] is immutable and cheap to clone. Its identity is the
//! canonical encoding computed once at construction: entries sorted by key and
//! rendered as `key=value` joined by `,`. Equality, hashing and `Display` all
//! use that encoding, so insertion order never matters.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::MetricsError;

/// Format constraints applied while building a [`LabelSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelLimits {
    #[serde(default = "default_max_key_len")]
    pub max_key_len: usize,
    #[serde(default = "default_max_value_len")]
    pub max_value_len: usize,
    #[serde(default = "default_max_labels")]
    pub max_labels: usize,
}

fn default_max_key_len() -> usize {
    255
}

fn default_max_value_len() -> usize {
    1024
}

fn default_max_labels() -> usize {
    128
}

impl Default for LabelLimits {
    fn default() -> Self {
        Self {
            max_key_len: default_max_key_len(),
            max_value_len: default_max_value_len(),
            max_labels: default_max_labels(),
        }
    }
}

impl LabelLimits {
    /// Check one entry against the limits.
    pub fn check(&self, key: &str, value: &str) -> Result<(), MetricsError> {
        if key.is_empty() {
            return Err(MetricsError::InvalidLabel {
                key: key.to_string(),
                reason: "empty key".into(),
            });
        }
        if key.len() > self.max_key_len {
            return Err(MetricsError::InvalidLabel {
                key: key.to_string(),
                reason: format!("key longer than {} bytes", self.max_key_len),
            });
        }
        if key.chars().any(char::is_control) {
            return Err(MetricsError::InvalidLabel {
                key: key.to_string(),
                reason: "key contains control characters".into(),
            });
        }
        if value.len() > self.max_value_len {
            return Err(MetricsError::InvalidLabel {
                key: key.to_string(),
                reason: format!("value longer than {} bytes", self.max_value_len),
            });
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Inner {
    labels: BTreeMap<String, String>,
    encoded: String,
}

#[derive(Clone)]
pub struct LabelSet {
    inner: Arc<Inner>,
}

impl LabelSet {
    /// The empty ("default") label set.
    pub fn empty() -> Self {
        Self::from_map(BTreeMap::new())
    }

    /// Build a label set with the default [`LabelLimits`].
    pub fn new<I, K, V>(labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::with_limits(labels, &LabelLimits::default())
    }

    /// Build a label set, dropping entries that violate `limits`.
    ///
    /// Rejected entries are logged and skipped; construction itself never
    /// fails. A repeated key keeps its last value.
    pub fn with_limits<I, K, V>(labels: I, limits: &LabelLimits) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (key, value) in labels {
            let (key, value) = (key.into(), value.into());
            if let Err(e) = limits.check(&key, &value) {
                tracing::warn!(error = %e, "dropping label");
                continue;
            }
            if !map.contains_key(&key) && map.len() >= limits.max_labels {
                tracing::warn!(key = %key, max = limits.max_labels, "dropping label over limit");
                continue;
            }
            map.insert(key, value);
        }
        Self::from_map(map)
    }

    fn from_map(labels: BTreeMap<String, String>) -> Self {
        let mut encoded = String::new();
        for (i, (key, value)) in labels.iter().enumerate() {
            if i > 0 {
                encoded.push(',');
            }
            escape_into(&mut encoded, key);
            encoded.push('=');
            escape_into(&mut encoded, value);
        }
        Self {
            inner: Arc::new(Inner { labels, encoded }),
        }
    }

    /// The canonical `k=v,k=v` encoding.
    pub fn encoded(&self) -> &str {
        &self.inner.encoded
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.labels.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner
            .labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.inner.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.labels.is_empty()
    }
}

// `,` `=` and `\` in keys or values are backslash-escaped so distinct maps
// never share an encoding.
fn escape_into(out: &mut String, s: &str) {
    for c in s.chars() {
        if matches!(c, ',' | '=' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for LabelSet {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner.encoded == other.inner.encoded
    }
}

impl Eq for LabelSet {}

impl Hash for LabelSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.encoded.hash(state);
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.encoded)
    }
}

impl fmt::Debug for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LabelSet({})", self.inner.encoded)
    }
}

impl Serialize for LabelSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(labels: &LabelSet) -> u64 {
        let mut hasher = DefaultHasher::new();
        labels.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_order_independent_identity() {
        let a = LabelSet::new([("method", "GET"), ("code", "200"), ("host", "a")]);
        let b = LabelSet::new([("host", "a"), ("method", "GET"), ("code", "200")]);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(a.encoded(), "code=200,host=a,method=GET");
    }

    #[test]
    fn test_different_values_differ() {
        let a = LabelSet::new([("code", "200")]);
        let b = LabelSet::new([("code", "500")]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_is_default() {
        let empty = LabelSet::new(Vec::<(String, String)>::new());
        assert_eq!(empty, LabelSet::default());
        assert!(empty.is_empty());
        assert_eq!(empty.encoded(), "");
    }

    #[test]
    fn test_separators_are_escaped() {
        let joined = LabelSet::new([("a", "1,b=2")]);
        let split = LabelSet::new([("a", "1"), ("b", "2")]);
        assert_ne!(joined, split);
        assert_eq!(joined.encoded(), "a=1\\,b\\=2");
    }

    #[test]
    fn test_invalid_entries_dropped() {
        let limits = LabelLimits {
            max_key_len: 4,
            max_value_len: 3,
            max_labels: 2,
        };
        let labels = LabelSet::with_limits(
            [
                ("", "x"),
                ("toolong", "x"),
                ("ok", "abcd"),
                ("a", "1"),
                ("b", "2"),
                ("c", "3"),
            ],
            &limits,
        );
        assert_eq!(labels.encoded(), "a=1,b=2");
    }

    #[test]
    fn test_serialize_as_map() {
        let labels = LabelSet::new([("zone", "eu"), ("app", "web")]);
        let json = serde_json::to_string(&labels).unwrap();
        assert_eq!(json, r#"{"app":"web","zone":"eu"}"#);
    }
}
