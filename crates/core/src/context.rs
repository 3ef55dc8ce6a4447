//! Context store - the key/value blackboard tests use to hand data downstream.

use serde_json::Value;
use std::collections::HashMap;

/// Errors raised by test bodies reading their context view.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// Key was not part of the expected context
    #[error("context key '{0}' is not available")]
    Missing(String),

    /// Key is present but holds a different kind of value
    #[error("context key '{key}' is not a {expected}")]
    WrongType {
        /// The key that was read
        key: String,
        /// The kind of value the reader asked for
        expected: &'static str,
    },
}

/// The shared store for one run.
///
/// Only the execution engine writes to it: it copies required keys into a
/// test's [`TestContext`] before the run and merges provided keys back after
/// a successful run.
#[derive(Debug, Clone, Default)]
pub struct ContextStore {
    values: HashMap<String, Value>,
}

impl ContextStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Merge a set of provided values, replacing existing keys.
    pub fn merge(&mut self, provided: HashMap<String, Value>) {
        self.values.extend(provided);
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A single test's view of the context.
///
/// `expects` is filled by the engine before the body runs; the body fills
/// `provides`, which the engine merges into the store afterwards.
#[derive(Debug, Clone, Default)]
pub struct TestContext {
    expects: HashMap<String, Value>,
    provides: HashMap<String, Value>,
}

impl TestContext {
    /// Create an empty view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an expected value.
    pub fn with_expected(mut self, key: impl Into<String>, value: Value) -> Self {
        self.set_expected(key, value);
        self
    }

    /// Seed an expected value in place.
    pub fn set_expected(&mut self, key: impl Into<String>, value: Value) {
        self.expects.insert(key.into(), value);
    }

    /// Read an expected value.
    pub fn expected(&self, key: &str) -> Option<&Value> {
        self.expects.get(key)
    }

    /// Read an expected value, failing if it is absent.
    pub fn require(&self, key: &str) -> Result<&Value, ContextError> {
        self.expects
            .get(key)
            .ok_or_else(|| ContextError::Missing(key.to_string()))
    }

    /// Read an expected string value.
    pub fn require_str(&self, key: &str) -> Result<&str, ContextError> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| ContextError::WrongType {
                key: key.to_string(),
                expected: "string",
            })
    }

    /// Provide a value for downstream tests.
    pub fn provide(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.provides.insert(key.into(), value.into());
    }

    /// Read a value this test has provided so far.
    pub fn provided(&self, key: &str) -> Option<&Value> {
        self.provides.get(key)
    }

    /// Consume the view, keeping the provided values.
    pub fn into_provided(self) -> HashMap<String, Value> {
        self.provides
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_require_str() {
        let ctx = TestContext::new()
            .with_expected("endpoint", json!("https://auth.test"))
            .with_expected("count", json!(3));

        assert_eq!(ctx.require_str("endpoint").unwrap(), "https://auth.test");
        assert!(matches!(ctx.require_str("count"), Err(ContextError::WrongType { .. })));
        assert!(matches!(ctx.require("token"), Err(ContextError::Missing(_))));
    }

    #[test]
    fn test_store_merge_replaces() {
        let mut store = ContextStore::new();
        store.insert("token", json!("old"));

        let mut ctx = TestContext::new();
        ctx.provide("token", "new");
        ctx.provide("account", "GABC");
        store.merge(ctx.into_provided());

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("token"), Some(&json!("new")));
        assert!(store.contains("account"));
    }
}
