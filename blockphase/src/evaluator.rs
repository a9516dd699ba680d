//! Script evaluation boundary
//!
//! The phase machine never interprets scripts itself. It hands compiled text
//! and the mutable game state to a [`ScriptEvaluator`] and reads back a
//! value. Any closure of the right shape is an evaluator:
//!
//! ```
//! use blockphase::evaluator::{GameState, ScriptEvaluator};
//! use blockphase::error::EvalError;
//! use serde_json::Value;
//!
//! let mut calls = Vec::new();
//! let mut evaluator = |source: &str, _state: &mut GameState| -> Result<Value, EvalError> {
//!     calls.push(source.to_string());
//!     Ok(Value::Bool(true))
//! };
//! let mut state = GameState::default();
//! assert_eq!(evaluator.evaluate("return true\n", &mut state), Ok(Value::Bool(true)));
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use crate::error::EvalError;

/// Runs script text against the game state.
pub trait ScriptEvaluator {
    /// Evaluates `source`, possibly mutating `state`, and returns the
    /// script's result.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError`] when the script cannot be parsed or fails while
    /// running.
    fn evaluate(&mut self, source: &str, state: &mut GameState) -> Result<Value, EvalError>;
}

impl<F> ScriptEvaluator for F
where
    F: FnMut(&str, &mut GameState) -> Result<Value, EvalError>,
{
    fn evaluate(&mut self, source: &str, state: &mut GameState) -> Result<Value, EvalError> {
        self(source, state)
    }
}

/// Variables visible to guard and exec scripts.
///
/// Keys keep insertion order, so the state serializes deterministically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameState {
    vars: IndexMap<String, Value>,
}

impl GameState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a variable.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Sets a variable, returning its previous value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.vars.insert(name.into(), value)
    }

    /// Removes a variable.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.vars.shift_remove(name)
    }

    /// Iterates over variables in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns `true` if no variable is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Consumes the state, returning its variables.
    #[must_use]
    pub fn into_inner(self) -> IndexMap<String, Value> {
        self.vars
    }
}

impl From<IndexMap<String, Value>> for GameState {
    fn from(vars: IndexMap<String, Value>) -> Self {
        Self { vars }
    }
}

/// Decides whether a guard result lets a transition fire.
///
/// `null` and `false` fail; numbers pass when non-zero; strings, arrays and
/// objects pass when non-empty.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}
