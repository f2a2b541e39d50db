use std::collections::HashMap;
use std::sync::Arc;

use petgraph::Direction;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::{Dfs, EdgeRef, NodeFiltered, Reversed};

use cairn_core::{EvalError, Key};

use crate::computations::Value;

/// Monotonic counter bumped once per invalidation batch. Used for
/// change-pruning: a dependent re-runs only if some dependency's value
/// changed after the dependent was last verified.
pub type Version = u64;

/// A memoized value together with its version bookkeeping.
#[derive(Clone, Debug)]
pub struct CachedValue {
  pub value: Arc<Value>,
  /// Version at which the value last actually changed.
  pub changed_at: Version,
  /// Version at which the value was last computed or verified clean.
  pub verified_at: Version,
}

/// Evaluation state of one graph entry.
#[derive(Debug)]
pub enum NodeState {
  /// Created lazily on first reference, never dispatched.
  NotStarted,
  /// An attempt is running (`pending_deps == 0`) or parked until that many
  /// dependencies reach a terminal state. `previous` keeps the last cached
  /// value across restarts so change detection survives re-runs.
  Building {
    pending_deps: usize,
    /// Parked for dirty revalidation rather than for a fresh attempt: once
    /// the dependencies settle, compare versions instead of re-running.
    verifying: bool,
    previous: Option<CachedValue>,
  },
  Done(CachedValue),
  Error(EvalError),
  /// Upstream inputs changed since this value was computed. `forced`
  /// entries were invalidated directly and always re-run; the rest
  /// revalidate against their dependencies first.
  Dirty { previous: CachedValue, forced: bool },
}

impl NodeState {
  /// Terminal states resolve dependents' pending counts. Errors count:
  /// a dependent sees either a value or an error for each requested key.
  pub fn is_terminal(&self) -> bool {
    matches!(self, NodeState::Done(_) | NodeState::Error(_))
  }
}

#[derive(Debug)]
pub struct Node {
  pub key: Key,
  pub state: NodeState,
}

#[derive(Debug)]
pub enum EdgeKind {
  Dependency,
}

/// The memoization table: one entry per key that has ever been requested,
/// with dependency edges pointing at the keys each entry's current value
/// was derived from. Reverse-dependency edges are the same edges walked
/// backwards.
#[derive(Debug, Default)]
pub struct NodeGraph {
  graph: StableDiGraph<Node, EdgeKind>,
  index: HashMap<Key, NodeIndex>,
  version: Version,
}

impl NodeGraph {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn version(&self) -> Version {
    self.version
  }

  pub fn index_of(&self, key: &Key) -> Option<NodeIndex> {
    self.index.get(key).copied()
  }

  pub fn key_of(&self, ix: NodeIndex) -> &Key {
    &self.graph[ix].key
  }

  pub fn state(&self, ix: NodeIndex) -> &NodeState {
    &self.graph[ix].state
  }

  pub fn state_of(&self, key: &Key) -> Option<&NodeState> {
    self.index_of(key).map(|ix| self.state(ix))
  }

  pub(crate) fn state_mut(&mut self, ix: NodeIndex) -> &mut NodeState {
    &mut self.graph[ix].state
  }

  pub(crate) fn get_or_create(&mut self, key: &Key) -> NodeIndex {
    if let Some(ix) = self.index.get(key) {
      return *ix;
    }
    let ix = self.graph.add_node(Node {
      key: key.clone(),
      state: NodeState::NotStarted,
    });
    self.index.insert(key.clone(), ix);
    ix
  }

  /// Replaces the node's dependency edges with the deps recorded by the
  /// attempt that just committed. Stale edges from earlier attempts are
  /// discarded wholesale; dependency nodes are created as needed.
  pub(crate) fn replace_deps(&mut self, ix: NodeIndex, deps: &[Key]) -> Vec<NodeIndex> {
    let stale: Vec<_> = self.graph.edges(ix).map(|edge| edge.id()).collect();
    for edge in stale {
      self.graph.remove_edge(edge);
    }

    let mut dep_indices = Vec::with_capacity(deps.len());
    for dep in deps {
      let dep_ix = self.get_or_create(dep);
      self.graph.add_edge(ix, dep_ix, EdgeKind::Dependency);
      dep_indices.push(dep_ix);
    }
    dep_indices
  }

  pub fn deps(&self, ix: NodeIndex) -> Vec<NodeIndex> {
    self.graph.neighbors_directed(ix, Direction::Outgoing).collect()
  }

  pub fn dependents(&self, ix: NodeIndex) -> Vec<NodeIndex> {
    self.graph.neighbors_directed(ix, Direction::Incoming).collect()
  }

  /// External invalidation entry point: directly invalidated entries are
  /// forced to recompute, and everything transitively depending on them is
  /// marked for revalidation by walking the reverse edges.
  pub(crate) fn invalidate(&mut self, keys: &[Key]) {
    self.version += 1;

    let targets: Vec<NodeIndex> = keys
      .iter()
      .filter_map(|key| self.index.get(key).copied())
      .collect();

    let mut affected = Vec::new();
    {
      let reversed = Reversed(&self.graph);
      for &target in &targets {
        let mut dfs = Dfs::new(reversed, target);
        while let Some(ix) = dfs.next(reversed) {
          affected.push(ix);
        }
      }
    }

    for ix in affected {
      let state = &mut self.graph[ix].state;
      match std::mem::replace(state, NodeState::NotStarted) {
        NodeState::Done(previous) => {
          *state = NodeState::Dirty {
            previous,
            forced: false,
          };
        }
        dirty @ NodeState::Dirty { .. } => *state = dirty,
        // Errors carry no value to prune against; recompute from scratch.
        // Aborted attempts likewise start over.
        NodeState::Error(_) | NodeState::Building { .. } | NodeState::NotStarted => {}
      }
    }

    for target in targets {
      let state = &mut self.graph[target].state;
      match std::mem::replace(state, NodeState::NotStarted) {
        NodeState::Done(previous) | NodeState::Dirty { previous, .. } => {
          *state = NodeState::Dirty {
            previous,
            forced: true,
          };
        }
        NodeState::Error(_) | NodeState::Building { .. } | NodeState::NotStarted => {}
      }
    }
  }

  /// Strongly-connected sets among parked nodes. Called when evaluation
  /// stalls with nothing in flight: any remaining wait must be mutual.
  pub(crate) fn parked_cycles(&self) -> Vec<Vec<NodeIndex>> {
    let parked = |ix: NodeIndex| {
      matches!(
        self.graph[ix].state,
        NodeState::Building { pending_deps, .. } if pending_deps > 0
      )
    };
    let filtered = NodeFiltered::from_fn(&self.graph, parked);

    petgraph::algo::tarjan_scc(&filtered)
      .into_iter()
      .filter(|scc| scc.len() > 1 || self.graph.find_edge(scc[0], scc[0]).is_some())
      .collect()
  }

  /// Every node currently parked or mid-attempt. Used for stall checks and
  /// abort cleanup.
  pub(crate) fn building_nodes(&self) -> Vec<NodeIndex> {
    self
      .graph
      .node_indices()
      .filter(|&ix| matches!(self.graph[ix].state, NodeState::Building { .. }))
      .collect()
  }
}
