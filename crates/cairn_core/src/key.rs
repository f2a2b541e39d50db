use std::fmt;
use std::path::{Path, PathBuf};

/// The kind tag of a [`Key`].
///
/// Each kind maps to exactly one registered computation. Kinds are plain
/// static names rather than a closed enum so the rule layer can introduce
/// new ones without touching the evaluator.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyKind(&'static str);

impl KeyKind {
  pub const fn new(name: &'static str) -> Self {
    Self(name)
  }

  pub fn name(&self) -> &'static str {
    self.0
  }
}

impl fmt::Display for KeyKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.0)
  }
}

impl fmt::Debug for KeyKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "KeyKind({})", self.0)
  }
}

/// Kind-specific argument data carried by a [`Key`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyArg {
  None,
  Path(PathBuf),
  Text(String),
  Index(u64),
}

impl fmt::Display for KeyArg {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      KeyArg::None => Ok(()),
      KeyArg::Path(path) => write!(f, "{}", path.display()),
      KeyArg::Text(text) => f.write_str(text),
      KeyArg::Index(index) => write!(f, "{index}"),
    }
  }
}

/// Identifies one requestable value in the node graph.
///
/// Two keys are equal iff they have the same kind and the same argument.
/// Values must reference other values through keys, never through direct
/// object links, so the graph stays the single source of truth for
/// dependency edges.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
  kind: KeyKind,
  arg: KeyArg,
}

impl Key {
  pub fn new(kind: KeyKind, arg: KeyArg) -> Self {
    Self { kind, arg }
  }

  pub fn kind(&self) -> KeyKind {
    self.kind
  }

  pub fn arg(&self) -> &KeyArg {
    &self.arg
  }

  /// The path payload, for kinds keyed on a path.
  pub fn path(&self) -> Option<&Path> {
    match &self.arg {
      KeyArg::Path(path) => Some(path),
      _ => None,
    }
  }
}

impl fmt::Display for Key {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}({})", self.kind, self.arg)
  }
}
