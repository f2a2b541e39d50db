pub use self::computation::*;
pub use self::environment::*;
pub use self::evaluator::*;
pub use self::node_graph::*;
pub use self::registry::*;

mod computation;
mod environment;
mod node_graph;
mod registry;

#[allow(clippy::module_inception)]
mod evaluator;
