pub mod diagnostic;
pub mod key;

pub use diagnostic::EvalError;
pub use key::{Key, KeyArg, KeyKind};
