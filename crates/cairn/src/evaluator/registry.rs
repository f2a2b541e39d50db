use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;

use cairn_core::KeyKind;

use super::Computation;

/// Maps each key kind to the computation responsible for it.
#[derive(Default)]
pub struct Registry {
  computations: HashMap<KeyKind, Arc<dyn Computation>>,
}

impl Registry {
  /// Binds a kind to its computation. Re-registration of a kind is an
  /// error: exactly one computation may produce values of a given kind.
  pub fn register(
    &mut self,
    kind: KeyKind,
    computation: Arc<dyn Computation>,
  ) -> anyhow::Result<()> {
    if self.computations.contains_key(&kind) {
      return Err(anyhow!("a computation is already registered for kind {kind}"));
    }
    self.computations.insert(kind, computation);
    Ok(())
  }

  pub fn get(&self, kind: KeyKind) -> Option<Arc<dyn Computation>> {
    self.computations.get(&kind).cloned()
  }
}
