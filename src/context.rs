//! The accumulating run context: node-produced artifacts keyed by name.
//!
//! Execution nodes return a [`ContextPatch`] that is merged into the run's
//! context atomically with the persisted transition. Keys are added (or
//! overwritten by later producers), never removed.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A partial context update produced by one execution node or one decision.
pub type ContextPatch = FxHashMap<String, Value>;

/// Convenience constructor for an empty patch.
#[must_use]
pub fn new_patch() -> ContextPatch {
    FxHashMap::default()
}

/// Accumulating key→artifact mapping consumed by later nodes and external
/// collaborators.
///
/// Merge semantics are last-write-wins per key, matching how upstream
/// recommendation artifacts get refreshed on a rework cycle.
///
/// # Examples
///
/// ```rust
/// use stageloop::context::{RunContext, new_patch};
/// use serde_json::json;
///
/// let mut ctx = RunContext::default();
/// let mut patch = new_patch();
/// patch.insert("supervised".to_string(), json!(true));
/// patch.insert("category".to_string(), json!("classification"));
/// ctx.merge(patch);
///
/// assert_eq!(ctx.flag("supervised"), Some(true));
/// assert_eq!(ctx.str_value("category"), Some("classification"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunContext {
    entries: FxHashMap<String, Value>,
}

impl RunContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a single initial input value.
    ///
    /// JSON objects are merged key-by-key; any other value is stored under
    /// `"prompt"` (the conventional key the entry node reads).
    #[must_use]
    pub fn from_initial_input(input: Value) -> Self {
        let mut ctx = Self::default();
        match input {
            Value::Object(map) => {
                for (k, v) in map {
                    ctx.entries.insert(k, v);
                }
            }
            Value::Null => {}
            other => {
                ctx.entries.insert("prompt".to_string(), other);
            }
        }
        ctx
    }

    /// Merge a patch into the context, last write wins per key.
    pub fn merge(&mut self, patch: ContextPatch) {
        for (k, v) in patch {
            self.entries.insert(k, v);
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Typed accessor for boolean flags (e.g. `supervised`).
    #[must_use]
    pub fn flag(&self, key: &str) -> Option<bool> {
        self.entries.get(key).and_then(Value::as_bool)
    }

    /// Typed accessor for string artifacts (e.g. `category`).
    #[must_use]
    pub fn str_value(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Sorted key set, used for computing transition diffs in the audit log.
    #[must_use]
    pub fn sorted_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_adds_and_overwrites_but_never_removes() {
        let mut ctx = RunContext::default();
        ctx.insert("a", json!(1));
        ctx.insert("b", json!("x"));

        let mut patch = new_patch();
        patch.insert("b".to_string(), json!("y"));
        patch.insert("c".to_string(), json!(true));
        ctx.merge(patch);

        assert_eq!(ctx.get("a"), Some(&json!(1)));
        assert_eq!(ctx.get("b"), Some(&json!("y")));
        assert_eq!(ctx.flag("c"), Some(true));
        assert_eq!(ctx.len(), 3);
    }

    #[test]
    fn initial_input_object_is_merged_scalar_becomes_prompt() {
        let ctx = RunContext::from_initial_input(json!({"prompt": "train a model", "supervised": false}));
        assert_eq!(ctx.str_value("prompt"), Some("train a model"));
        assert_eq!(ctx.flag("supervised"), Some(false));

        let ctx = RunContext::from_initial_input(json!("just a prompt"));
        assert_eq!(ctx.str_value("prompt"), Some("just a prompt"));
    }
}
