use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::RwLock;

use cairn_core::{EvalError, Key};

use crate::computations::Value;

use super::{NodeGraph, NodeState};

enum Lookup {
  Done(Arc<Value>),
  Error(EvalError),
  Missing,
}

/// The only channel through which a computation may read other values.
///
/// Every requested key is recorded as a dependency of the computation that
/// holds this environment, whether or not the value was available, so the
/// dependency edge exists even while unsatisfied. One environment is
/// created per attempt; the evaluator consumes it when the attempt ends.
pub struct Environment {
  key: Key,
  graph: Arc<RwLock<NodeGraph>>,
  deps: IndexSet<Key>,
  missing: IndexSet<Key>,
}

impl Environment {
  pub(crate) fn new(key: Key, graph: Arc<RwLock<NodeGraph>>) -> Self {
    Self {
      key,
      graph,
      deps: IndexSet::new(),
      missing: IndexSet::new(),
    }
  }

  /// Requests the value for `key`, recording it as a dependency.
  ///
  /// `Ok(None)` means the value is not available yet: the computation must
  /// stop and return [`Computed::Incomplete`](super::Computed) for this
  /// attempt. `Err` means the dependency failed; propagating it with `?`
  /// fails this computation too. Use [`request_catching`] to tolerate and
  /// inspect dependency errors instead.
  ///
  /// [`request_catching`]: Environment::request_catching
  pub fn request(&mut self, key: &Key) -> Result<Option<Arc<Value>>, EvalError> {
    match self.lookup(key) {
      Lookup::Done(value) => Ok(Some(value)),
      Lookup::Error(error) => Err(error),
      Lookup::Missing => Ok(None),
    }
  }

  /// The error-tolerant form of [`request`](Environment::request): a failed
  /// dependency is handed to the computation as a value-level `Err` rather
  /// than failing the computation. `None` still means not available yet.
  pub fn request_catching(
    &mut self,
    key: &Key,
  ) -> Option<Result<Arc<Value>, EvalError>> {
    match self.lookup(key) {
      Lookup::Done(value) => Some(Ok(value)),
      Lookup::Error(error) => Some(Err(error)),
      Lookup::Missing => None,
    }
  }

  /// Batch form of [`request`](Environment::request). Does not short-circuit
  /// on the first missing key: every key is registered as a dependency and
  /// scheduled in the same pass, so several independent missing
  /// dependencies cost one restart round instead of one each.
  pub fn request_all(
    &mut self,
    keys: &[Key],
  ) -> Result<Option<Vec<Arc<Value>>>, EvalError> {
    let mut values = Vec::with_capacity(keys.len());
    let mut first_error = None;
    let mut missing = false;

    for key in keys {
      match self.lookup(key) {
        Lookup::Done(value) => values.push(value),
        Lookup::Error(error) => {
          first_error.get_or_insert(error);
        }
        Lookup::Missing => missing = true,
      }
    }

    if let Some(error) = first_error {
      return Err(error);
    }
    if missing {
      return Ok(None);
    }
    Ok(Some(values))
  }

  /// Whether any request so far found its value unavailable. Mirrors the
  /// check computations make before concluding an attempt that gathered
  /// results through [`request_catching`](Environment::request_catching).
  pub fn values_missing(&self) -> bool {
    !self.missing.is_empty()
  }

  fn lookup(&mut self, key: &Key) -> Lookup {
    self.deps.insert(key.clone());

    let graph = self.graph.read();
    match graph.state_of(key) {
      Some(NodeState::Done(cached)) => Lookup::Done(cached.value.clone()),
      Some(NodeState::Error(error)) => Lookup::Error(error.clone()),
      // Dirty entries must be revalidated before they may be observed.
      _ => {
        drop(graph);
        tracing::trace!(parent = %self.key, dependency = %key, "dependency not yet available");
        self.missing.insert(key.clone());
        Lookup::Missing
      }
    }
  }

  /// Consumes the recorder: ordered dependency set and the subset that was
  /// unavailable during this attempt.
  pub(crate) fn finish(self) -> (Vec<Key>, Vec<Key>) {
    (
      self.deps.into_iter().collect(),
      self.missing.into_iter().collect(),
    )
  }
}
