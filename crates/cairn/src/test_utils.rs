use std::path::PathBuf;
use std::sync::Arc;

use cairn_filesystem::{in_memory_file_system::InMemoryFileSystem, FileSystemRef};

use crate::computations::{
  ContainingPackageComputation, PackageLookupComputation, CONTAINING_PACKAGE, PACKAGE_LOOKUP,
};
use crate::evaluator::Evaluator;

pub struct EvaluatorTestOptions {
  pub fs: FileSystemRef,
  pub package_roots: Vec<PathBuf>,
  pub build_file_name: String,
}

impl Default for EvaluatorTestOptions {
  fn default() -> Self {
    Self {
      fs: Arc::new(InMemoryFileSystem::default()),
      package_roots: vec![PathBuf::from("/main")],
      build_file_name: String::from("BUILD"),
    }
  }
}

/// An evaluator with the package computations wired up against an
/// in-memory file system.
pub(crate) fn evaluator(options: EvaluatorTestOptions) -> Evaluator {
  let EvaluatorTestOptions {
    fs,
    package_roots,
    build_file_name,
  } = options;

  let mut evaluator = Evaluator::new();
  evaluator
    .register(
      PACKAGE_LOOKUP,
      Arc::new(PackageLookupComputation::new(
        fs,
        Arc::new(package_roots),
        build_file_name,
      )),
    )
    .unwrap();
  evaluator
    .register(
      CONTAINING_PACKAGE,
      Arc::new(ContainingPackageComputation),
    )
    .unwrap();
  evaluator
}
