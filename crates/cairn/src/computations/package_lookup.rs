use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;

use cairn_core::{Key, KeyArg, KeyKind};
use cairn_filesystem::FileSystemRef;

use crate::evaluator::{Computation, ComputationError, Computed, Environment};

use super::Value;

pub const PACKAGE_LOOKUP: KeyKind = KeyKind::new("package_lookup");

/// Key for "does this directory start a package". `dir` is relative to the
/// configured package roots.
pub fn package_lookup_key(dir: impl Into<PathBuf>) -> Key {
  Key::new(PACKAGE_LOOKUP, KeyArg::Path(dir.into()))
}

#[derive(Clone, Debug, PartialEq)]
pub enum PackageLookupValue {
  /// The directory holds a package marker file under this package root.
  Package { root: PathBuf },
  NoPackage,
}

/// Answers whether a directory starts a package by probing the package
/// roots, in configuration order, for a marker file. The first root with a
/// marker wins, so the same relative directory existing under several roots
/// resolves deterministically.
///
/// This is a leaf: it reads the file system directly and requests no other
/// values.
#[derive(Debug)]
pub struct PackageLookupComputation {
  file_system: FileSystemRef,
  package_roots: Arc<Vec<PathBuf>>,
  build_file_name: String,
}

impl PackageLookupComputation {
  pub fn new(
    file_system: FileSystemRef,
    package_roots: Arc<Vec<PathBuf>>,
    build_file_name: impl Into<String>,
  ) -> Self {
    Self {
      file_system,
      package_roots,
      build_file_name: build_file_name.into(),
    }
  }
}

#[async_trait]
impl Computation for PackageLookupComputation {
  #[tracing::instrument(level = "info", skip_all)]
  async fn compute(
    &self,
    key: &Key,
    _env: &mut Environment,
  ) -> Result<Computed, ComputationError> {
    let dir = key
      .path()
      .ok_or_else(|| anyhow!("package lookup key {key} has no directory argument"))?;

    for root in self.package_roots.iter() {
      if self.marker_exists(root, dir) {
        tracing::trace!(?dir, ?root, "package marker found");
        return Ok(Computed::Value(Value::PackageLookup(
          PackageLookupValue::Package { root: root.clone() },
        )));
      }
    }

    Ok(Computed::Value(Value::PackageLookup(
      PackageLookupValue::NoPackage,
    )))
  }
}

impl PackageLookupComputation {
  fn marker_exists(&self, root: &Path, dir: &Path) -> bool {
    let marker = root.join(dir).join(&self.build_file_name);
    self.file_system.is_file(&marker)
  }
}
