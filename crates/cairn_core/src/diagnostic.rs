use std::fmt;

use crate::key::Key;

/// Terminal failures recorded in the node graph and surfaced to callers.
///
/// There is intentionally no missing-dependency variant: "not yet
/// available" is an internal restart signal inside the evaluator, never an
/// error.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum EvalError {
  /// A computation reported failure for its key. Propagates to dependents
  /// unless they explicitly catch errors from this dependency.
  #[error("computation for {key} failed: {message}")]
  Computation { key: Key, message: String },

  /// A dependency cycle among the listed keys. Every key in the cycle
  /// fails with the same error.
  #[error("dependency cycle detected: {}", KeyList(keys))]
  Cycle { keys: Vec<Key> },

  /// A violated engine invariant. This is a bug in the evaluator or in a
  /// computation breaking its contract, not a recoverable condition.
  #[error("inconsistent evaluator state: {0}")]
  InconsistentState(String),
}

impl EvalError {
  pub fn is_cycle(&self) -> bool {
    matches!(self, EvalError::Cycle { .. })
  }
}

struct KeyList<'a>(&'a [Key]);

impl fmt::Display for KeyList<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, key) in self.0.iter().enumerate() {
      if i > 0 {
        f.write_str(" -> ")?;
      }
      write!(f, "{key}")?;
    }
    Ok(())
  }
}
