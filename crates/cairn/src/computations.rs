pub use containing_package::*;
pub use package_lookup::*;

mod containing_package;
mod package_lookup;

/// Union of all computation values
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
  ContainingPackage(ContainingPackageValue),
  PackageLookup(PackageLookupValue),
  // The following are test value types only used in the test build
  #[cfg(test)]
  TestText(String),
  #[cfg(test)]
  TestList(Vec<String>),
}

impl Value {
  pub fn as_containing_package(&self) -> Option<&ContainingPackageValue> {
    match self {
      Value::ContainingPackage(value) => Some(value),
      _ => None,
    }
  }

  pub fn as_package_lookup(&self) -> Option<&PackageLookupValue> {
    match self {
      Value::PackageLookup(value) => Some(value),
      _ => None,
    }
  }
}
