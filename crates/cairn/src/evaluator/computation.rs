use async_trait::async_trait;

use cairn_core::Key;

use crate::computations::Value;

use super::Environment;

/// Errors reported by computations themselves, as opposed to the engine's
/// own [`EvalError`](cairn_core::EvalError) taxonomy.
pub type ComputationError = anyhow::Error;

/// What a single computation attempt produced.
#[derive(Debug)]
pub enum Computed {
  /// Every requested dependency was available and a final value was
  /// derived.
  Value(Value),
  /// At least one requested dependency was not available yet. The
  /// evaluator re-runs the computation from the top once the outstanding
  /// dependencies reach a terminal state.
  Incomplete,
}

/// A computation derives the value for every key of one [`KeyKind`].
///
/// The same logical evaluation may invoke `compute` several times: once
/// per restart, each time with a fresh [`Environment`]. Nothing carries
/// over between attempts except the values that became available in the
/// graph, so the body must be free of external side effects (or idempotent)
/// up to the point where it observes a missing dependency.
///
/// [`KeyKind`]: cairn_core::KeyKind
#[async_trait]
pub trait Computation: Send + Sync + 'static {
  async fn compute(
    &self,
    key: &Key,
    env: &mut Environment,
  ) -> Result<Computed, ComputationError>;
}
