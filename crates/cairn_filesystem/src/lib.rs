use std::path::{Path, PathBuf};
use std::sync::Arc;

/// In-memory file-system for testing
pub mod in_memory_file_system;

/// File-system implementation backed by std::fs
pub mod os_file_system;

pub use in_memory_file_system::InMemoryFileSystem;
pub use os_file_system::OsFileSystem;

/// FileSystem abstraction instance
///
/// This should be `OsFileSystem` for non-testing environments and
/// `InMemoryFileSystem` for testing.
pub type FileSystemRef = Arc<dyn FileSystem + Send + Sync>;

/// Trait abstracting the file-system operations leaf computations need.
///
/// The evaluator core never touches the file system itself; it only hands
/// this service to computations. Watching for changes is out of scope, the
/// surrounding system invalidates keys when files change.
#[mockall::automock]
pub trait FileSystem: std::fmt::Debug {
  fn is_file(&self, path: &Path) -> bool;
  fn is_dir(&self, path: &Path) -> bool;
  fn read_to_string(&self, path: &Path) -> std::io::Result<String>;

  fn read_dir(&self, _path: &Path) -> std::io::Result<Vec<PathBuf>> {
    Err(std::io::Error::new(
      std::io::ErrorKind::Other,
      "Not implemented: FileSystem::read_dir",
    ))
  }
}
