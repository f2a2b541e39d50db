use std::path::PathBuf;

use anyhow::anyhow;
use async_trait::async_trait;

use cairn_core::{Key, KeyArg, KeyKind};

use crate::evaluator::{Computation, ComputationError, Computed, Environment};

use super::{package_lookup_key, PackageLookupValue, Value};

pub const CONTAINING_PACKAGE: KeyKind = KeyKind::new("containing_package");

/// Key for "which package contains this directory". `dir` is relative to
/// the configured package roots; the empty path is the workspace root
/// directory.
pub fn containing_package_key(dir: impl Into<PathBuf>) -> Key {
  Key::new(CONTAINING_PACKAGE, KeyArg::Path(dir.into()))
}

#[derive(Clone, Debug, PartialEq)]
pub enum ContainingPackageValue {
  /// The closest enclosing package directory and the root it lives under.
  Package { package: PathBuf, root: PathBuf },
  NoPackage,
}

/// Finds the closest enclosing package for a directory by checking the
/// directory itself and recursing, one key per ancestor, toward the
/// workspace root.
///
/// A hit several levels up is returned unchanged through every
/// intermediate directory's node. That keeps the chain's values equal, so
/// an invalidation near the root stops propagating at the first directory
/// whose answer did not actually change.
#[derive(Debug, Default)]
pub struct ContainingPackageComputation;

#[async_trait]
impl Computation for ContainingPackageComputation {
  #[tracing::instrument(level = "info", skip_all)]
  async fn compute(
    &self,
    key: &Key,
    env: &mut Environment,
  ) -> Result<Computed, ComputationError> {
    let dir = key
      .path()
      .ok_or_else(|| anyhow!("containing package key {key} has no directory argument"))?;

    let Some(lookup) = env.request(&package_lookup_key(dir))? else {
      return Ok(Computed::Incomplete);
    };
    let lookup = lookup
      .as_package_lookup()
      .ok_or_else(|| anyhow!("package lookup for {dir:?} returned a foreign value"))?;

    if let PackageLookupValue::Package { root } = lookup {
      return Ok(Computed::Value(Value::ContainingPackage(
        ContainingPackageValue::Package {
          package: dir.to_path_buf(),
          root: root.clone(),
        },
      )));
    }

    // Path::parent yields the empty path before giving up, so the
    // workspace root directory itself gets checked last.
    let Some(parent) = dir.parent() else {
      return Ok(Computed::Value(Value::ContainingPackage(
        ContainingPackageValue::NoPackage,
      )));
    };

    let Some(ancestor) = env.request(&containing_package_key(parent))? else {
      return Ok(Computed::Incomplete);
    };
    Ok(Computed::Value((*ancestor).clone()))
  }
}

#[cfg(test)]
mod test {
  use std::sync::Arc;

  use parking_lot::RwLock;

  use crate::evaluator::{CachedValue, NodeGraph, NodeState};

  use super::*;

  fn graph_with(entries: &[(Key, Value)]) -> Arc<RwLock<NodeGraph>> {
    let mut graph = NodeGraph::new();
    for (key, value) in entries {
      let ix = graph.get_or_create(key);
      *graph.state_mut(ix) = NodeState::Done(CachedValue {
        value: Arc::new(value.clone()),
        changed_at: 0,
        verified_at: 0,
      });
    }
    Arc::new(RwLock::new(graph))
  }

  async fn run(graph: Arc<RwLock<NodeGraph>>, dir: &str) -> Computed {
    let key = containing_package_key(dir);
    let mut env = Environment::new(key.clone(), graph);
    ContainingPackageComputation
      .compute(&key, &mut env)
      .await
      .unwrap()
  }

  #[tokio::test]
  async fn returns_the_directory_itself_when_it_is_a_package() {
    let graph = graph_with(&[(
      package_lookup_key("a/b"),
      Value::PackageLookup(PackageLookupValue::Package {
        root: PathBuf::from("/main"),
      }),
    )]);

    let computed = run(graph, "a/b").await;
    let Computed::Value(value) = computed else {
      panic!("expected a value");
    };
    assert_eq!(
      value.as_containing_package(),
      Some(&ContainingPackageValue::Package {
        package: PathBuf::from("a/b"),
        root: PathBuf::from("/main"),
      })
    );
  }

  #[tokio::test]
  async fn propagates_the_ancestor_answer_unchanged() {
    let ancestor = Value::ContainingPackage(ContainingPackageValue::Package {
      package: PathBuf::from("a"),
      root: PathBuf::from("/main"),
    });
    let graph = graph_with(&[
      (
        package_lookup_key("a/b"),
        Value::PackageLookup(PackageLookupValue::NoPackage),
      ),
      (containing_package_key("a"), ancestor.clone()),
    ]);

    let computed = run(graph, "a/b").await;
    let Computed::Value(value) = computed else {
      panic!("expected a value");
    };
    assert_eq!(value, ancestor);
  }

  #[tokio::test]
  async fn restarts_until_the_lookup_is_available() {
    let graph = graph_with(&[]);
    assert!(matches!(
      run(graph, "a/b").await,
      Computed::Incomplete
    ));
  }

  #[tokio::test]
  async fn gives_up_above_the_workspace_root() {
    let graph = graph_with(&[(
      package_lookup_key(""),
      Value::PackageLookup(PackageLookupValue::NoPackage),
    )]);

    let computed = run(graph, "").await;
    let Computed::Value(value) = computed else {
      panic!("expected a value");
    };
    assert_eq!(
      value.as_containing_package(),
      Some(&ContainingPackageValue::NoPackage)
    );
  }
}
