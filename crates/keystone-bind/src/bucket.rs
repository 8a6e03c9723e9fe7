//! Parameter buckets.
//!
//! A [`Bucket`] is an ordered multi-map of string parameters from one HTTP
//! location. [`Buckets`] groups them by name (`url`, `query`, `form`).
//! Buckets are filled once per request and only read while binding.

use std::collections::HashMap;

/// Ordered multi-map from parameter name to values.
///
/// # Example
///
/// ```
/// use keystone_bind::Bucket;
///
/// let bucket = Bucket::from_pairs([("tag", "a"), ("page", "2"), ("tag", "b")]);
/// assert_eq!(bucket.first("page"), Some("2"));
/// assert_eq!(bucket.all("tag"), vec!["a", "b"]);
/// assert!(!bucket.contains("missing"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bucket {
    pairs: Vec<(String, String)>,
}

impl Bucket {
    /// Creates an empty bucket.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a bucket from key/value pairs, keeping their order.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Appends a value for `key`.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Returns `true` if `key` was supplied at all, even with an empty value.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Returns the first value for `key`.
    #[must_use]
    pub fn first(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns every value for `key`, in insertion order.
    #[must_use]
    pub fn all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Iterates over all pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns `true` if the bucket has no pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Bucket {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

/// Buckets keyed by source name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buckets {
    buckets: HashMap<String, Bucket>,
}

impl Buckets {
    /// Bucket name for path template variables.
    pub const URL: &'static str = "url";
    /// Bucket name for the query string.
    pub const QUERY: &'static str = "query";
    /// Bucket name for body fields.
    pub const FORM: &'static str = "form";

    /// Creates an empty set with no buckets registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set with empty `url`, `query` and `form` buckets.
    #[must_use]
    pub fn standard() -> Self {
        let mut buckets = Self::new();
        for name in [Self::URL, Self::QUERY, Self::FORM] {
            buckets.insert(name, Bucket::new());
        }
        buckets
    }

    /// Registers or replaces a bucket.
    pub fn insert(&mut self, name: impl Into<String>, bucket: Bucket) {
        self.buckets.insert(name.into(), bucket);
    }

    /// Builder-style [`Buckets::insert`].
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, bucket: Bucket) -> Self {
        self.insert(name, bucket);
        self
    }

    /// Returns the named bucket, if registered.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Bucket> {
        self.buckets.get(name)
    }

    /// Returns the named bucket for modification, registering it if needed.
    pub fn entry(&mut self, name: &str) -> &mut Bucket {
        self.buckets.entry(name.to_string()).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_but_empty() {
        let bucket = Bucket::from_pairs([("q", "")]);
        assert!(bucket.contains("q"));
        assert_eq!(bucket.first("q"), Some(""));
    }

    #[test]
    fn test_standard_buckets() {
        let buckets = Buckets::standard();
        assert!(buckets.get("url").is_some());
        assert!(buckets.get("query").is_some());
        assert!(buckets.get("form").is_some());
        assert!(buckets.get("header").is_none());
    }

    #[test]
    fn test_entry_registers_bucket() {
        let mut buckets = Buckets::new();
        buckets.entry("query").push("page", "3");
        assert_eq!(buckets.get("query").unwrap().first("page"), Some("3"));
    }
}
