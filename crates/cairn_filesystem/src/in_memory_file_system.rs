use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::FileSystem;

/// In memory implementation of a file-system entry
#[derive(Debug)]
enum InMemoryFileSystemEntry {
  File { contents: String },
  Directory,
}

/// In memory implementation of the `FileSystem` trait, for testing purposes.
#[derive(Debug, Default)]
pub struct InMemoryFileSystem {
  files: RwLock<HashMap<PathBuf, InMemoryFileSystemEntry>>,
}

impl InMemoryFileSystem {
  /// Writes a file and creates directory entries for every ancestor.
  pub fn write_file(&self, path: &Path, contents: String) {
    let mut files = self.files.write();
    files.insert(path.to_path_buf(), InMemoryFileSystemEntry::File { contents });

    let mut dir = path.parent();
    while let Some(path) = dir {
      files
        .entry(path.to_path_buf())
        .or_insert(InMemoryFileSystemEntry::Directory);
      dir = path.parent();
    }
  }

  pub fn create_dir_all(&self, path: &Path) {
    let mut files = self.files.write();
    let mut dir = Some(path);
    while let Some(path) = dir {
      files
        .entry(path.to_path_buf())
        .or_insert(InMemoryFileSystemEntry::Directory);
      dir = path.parent();
    }
  }

  pub fn remove_file(&self, path: &Path) {
    self.files.write().remove(path);
  }
}

impl FileSystem for InMemoryFileSystem {
  fn is_file(&self, path: &Path) -> bool {
    matches!(
      self.files.read().get(path),
      Some(InMemoryFileSystemEntry::File { .. })
    )
  }

  fn is_dir(&self, path: &Path) -> bool {
    matches!(
      self.files.read().get(path),
      Some(InMemoryFileSystemEntry::Directory)
    )
  }

  fn read_to_string(&self, path: &Path) -> io::Result<String> {
    match self.files.read().get(path) {
      Some(InMemoryFileSystemEntry::File { contents }) => Ok(contents.clone()),
      Some(InMemoryFileSystemEntry::Directory) => Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        "Path is a directory",
      )),
      None => Err(io::Error::new(io::ErrorKind::NotFound, "File not found")),
    }
  }

  fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
    let files = self.files.read();
    if !matches!(files.get(path), Some(InMemoryFileSystemEntry::Directory)) {
      return Err(io::Error::new(io::ErrorKind::NotFound, "Directory not found"));
    }

    let mut entries: Vec<PathBuf> = files
      .keys()
      .filter(|candidate| candidate.parent() == Some(path))
      .cloned()
      .collect();
    entries.sort();
    Ok(entries)
  }
}
