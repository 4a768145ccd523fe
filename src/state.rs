//! Run state threaded through a graph execution (v0.1)
//!
//! State is an ordered map of string keys to JSON values. The executor owns
//! the live state for the whole run; steps see a read-only borrow and return
//! a [`StateDelta`] that the executor merges by key overwrite.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Partial update returned by a step
///
/// Keys absent from the delta are untouched by the merge.
pub type StateDelta = State;

/// Ordered key → value mapping shared across a whole run
///
/// Backed by `serde_json::Map` with `preserve_order`, so keys iterate in
/// insertion order and snapshots serialize deterministically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State {
    entries: Map<String, Value>,
}

impl State {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key, replacing any existing value
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Check whether a key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the state holds no keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge a delta by shallow key overwrite
    ///
    /// Every key in the delta replaces the current value (last writer wins
    /// per key); all other keys are preserved. No deep merging of nested
    /// structures: a step that appends to a nested container reads the
    /// current value and returns the whole replacement.
    pub fn merge(&mut self, delta: StateDelta) {
        for (key, value) in delta.entries {
            self.entries.insert(key, value);
        }
    }

    /// Owned snapshot of the key set, for hook payloads
    pub fn key_snapshot(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Serialize the state to a JSON object
    pub fn to_value(&self) -> Value {
        Value::Object(self.entries.clone())
    }
}

impl From<Map<String, Value>> for State {
    fn from(entries: Map<String, Value>) -> Self {
        Self { entries }
    }
}

impl FromIterator<(String, Value)> for State {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a State {
    type Item = (&'a String, &'a Value);
    type IntoIter = serde_json::map::Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_and_get() {
        let mut state = State::new();
        state.insert("raw", json!("<html></html>"));

        assert_eq!(state.get("raw"), Some(&json!("<html></html>")));
        assert_eq!(state.get("missing"), None);
    }

    #[test]
    fn merge_overwrites_only_delta_keys() {
        let mut state = State::new();
        state.insert("raw", json!("<html></html>"));
        state.insert("url", json!("https://example.com"));

        let mut delta = StateDelta::new();
        delta.insert("raw", json!("replaced"));
        delta.insert("text", json!("hello"));
        state.merge(delta);

        assert_eq!(state.get("raw"), Some(&json!("replaced")));
        assert_eq!(state.get("url"), Some(&json!("https://example.com")));
        assert_eq!(state.get("text"), Some(&json!("hello")));
    }

    #[test]
    fn merge_is_overwrite_idempotent() {
        let mut once = State::new();
        once.insert("a", json!(1));

        let mut delta = StateDelta::new();
        delta.insert("a", json!(2));
        delta.insert("b", json!([1, 2, 3]));

        let mut twice = once.clone();
        once.merge(delta.clone());
        twice.merge(delta.clone());
        twice.merge(delta);

        assert_eq!(once, twice);
    }

    #[test]
    fn keys_preserve_insertion_order() {
        let mut state = State::new();
        state.insert("zebra", json!(1));
        state.insert("apple", json!(2));
        state.insert("mango", json!(3));

        let keys: Vec<&str> = state.keys().collect();
        assert_eq!(keys, vec!["zebra", "apple", "mango"]);
    }

    #[test]
    fn to_value_round_trips() {
        let mut state = State::new();
        state.insert("n", json!(42));
        state.insert("nested", json!({"k": "v"}));

        let value = state.to_value();
        assert_eq!(value["n"], 42);
        assert_eq!(value["nested"]["k"], "v");

        let back: State = serde_json::from_value(value).unwrap();
        assert_eq!(back, state);
    }
}
