//! Incremental evaluation core for the cairn build tool.
//!
//! Build-relevant facts ("does this directory start a package", "which
//! package contains this file") are computed as values keyed by typed
//! [`Key`]s, memoized in a node graph, and recomputed only when something
//! they transitively depended on is invalidated.
//!
//! A computation reads other values exclusively through the
//! [`Environment`](evaluator::Environment) handed to it, which records
//! every requested key as a dependency edge. When a requested value is not
//! available yet the computation returns
//! [`Computed::Incomplete`](evaluator::Computed) and is re-run from the top
//! once its outstanding dependencies resolve; it never blocks a worker
//! waiting for them.

pub use cairn_core::{EvalError, Key, KeyArg, KeyKind};
pub use cairn_filesystem as file_system;
pub use computations::Value;
pub use evaluator::{Computation, Computed, Environment, Evaluator};

pub mod computations;
pub mod evaluator;

#[cfg(test)]
mod test_utils;
