use std::path::{Path, PathBuf};

use crate::FileSystem;

#[derive(Clone, Debug, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
  fn is_file(&self, path: &Path) -> bool {
    path.is_file()
  }

  fn is_dir(&self, path: &Path) -> bool {
    path.is_dir()
  }

  fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
    std::fs::read_to_string(path)
  }

  fn read_dir(&self, path: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(path)? {
      entries.push(entry?.path());
    }
    entries.sort();
    Ok(entries)
  }
}
