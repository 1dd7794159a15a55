//! Client-held projection of the server's player state.
//!
//! Pushes are partial: a push may carry any subset of the fields of
//! [`PlayerState`]. Merging sets the keys that are present and recurses into
//! nested objects; arrays and scalars are replaced. Keys that are absent from a
//! push are never touched.

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::error::Result;
use crate::player::PlayerState;

/// A key of a push that could not be merged and was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot merge key `{key}`: {reason}")]
pub struct MergeError {
    pub key: String,
    pub reason: String,
}

/// Merged player state for one surface.
#[derive(Debug, Clone)]
pub struct Projection {
    /// Merged wire document; always a JSON object
    raw: Value,
    /// Typed view of `raw`
    state: PlayerState,
}

impl Default for Projection {
    fn default() -> Self {
        Self::new()
    }
}

impl Projection {
    /// Create an empty projection.
    #[must_use]
    pub fn new() -> Self {
        Self { raw: Value::Object(Map::new()), state: PlayerState::default() }
    }

    /// Current typed state.
    #[must_use]
    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    /// Merge a partial push into the projection.
    ///
    /// Each top-level key is checked against the state schema after it is
    /// merged. A key that breaks the schema is rolled back and reported; the
    /// remaining keys are still applied.
    pub fn apply_push(&mut self, push: &Value) -> Vec<MergeError> {
        let Some(fields) = push.as_object() else {
            let error = MergeError { key: String::new(), reason: "push is not an object".into() };
            warn!(%error, "Dropping player push");
            return vec![error];
        };

        let mut errors = Vec::new();
        for (key, incoming) in fields {
            let Some(raw) = self.raw.as_object_mut() else {
                break;
            };
            let previous = raw.get(key).cloned();
            merge_value(raw.entry(key.clone()).or_insert(Value::Null), incoming);

            match PlayerState::deserialize(&self.raw) {
                Ok(state) => self.state = state,
                Err(e) => {
                    if let Some(raw) = self.raw.as_object_mut() {
                        match previous {
                            Some(value) => {
                                raw.insert(key.clone(), value);
                            }
                            None => {
                                raw.remove(key);
                            }
                        }
                    }
                    let error = MergeError { key: key.clone(), reason: e.to_string() };
                    warn!(%error, "Dropping key from player push");
                    errors.push(error);
                }
            }
        }
        errors
    }

    /// Replace the projection with a full snapshot.
    ///
    /// # Errors
    /// Returns an error if the snapshot does not match the state schema; the
    /// projection is left unchanged in that case.
    pub fn reset(&mut self, snapshot: &Value) -> Result<()> {
        let state = PlayerState::deserialize(snapshot)?;
        self.raw = serde_json::to_value(&state)?;
        self.state = state;
        Ok(())
    }
}

/// Recursively merge `incoming` into `target`.
///
/// Objects merge key by key; any other value, arrays included, replaces the
/// target outright.
pub fn merge_value(target: &mut Value, incoming: &Value) {
    match (target, incoming) {
        (Value::Object(target), Value::Object(incoming)) => {
            for (key, value) in incoming {
                merge_value(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (target, incoming) => *target = incoming.clone(),
    }
}
