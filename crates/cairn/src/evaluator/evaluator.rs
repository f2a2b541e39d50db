use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use petgraph::graph::NodeIndex;
use tokio::sync::mpsc;

use cairn_core::{EvalError, Key, KeyKind};

use crate::computations::Value;

use super::{
  CachedValue, Computation, ComputationError, Computed, Environment, NodeGraph, NodeState,
  Registry,
};

/// Per-key outcome of a batch evaluation.
pub type EvalResults = HashMap<Key, Result<Arc<Value>, EvalError>>;

/// Drives requested keys to a terminal state, running independent pending
/// work in parallel.
///
/// The evaluator owns the node graph behind a lock: the evaluation loop is
/// the single writer, while each in-flight attempt reads terminal values
/// through its [`Environment`]. An attempt that observes a missing
/// dependency returns [`Computed::Incomplete`] and is parked; it is
/// re-dispatched as a fresh attempt once its last outstanding dependency
/// reaches a terminal state. Parking and wake-up counts are updated in the
/// same critical section as the dependency's own transition, so wake-ups
/// cannot be missed.
///
/// Evaluators are ordinary values with no process-global state; independent
/// instances (one per test, say) do not observe each other.
pub struct Evaluator {
  registry: Registry,
  graph: Arc<RwLock<NodeGraph>>,
}

enum AttemptMessage {
  Finished {
    key: Key,
    outcome: Result<Computed, ComputationError>,
    deps: Vec<Key>,
    missing: Vec<Key>,
  },
}

/// Graph maintenance steps processed under a single write-lock scope.
enum Work {
  /// Make sure the node is terminal, running or parked.
  Prepare(NodeIndex),
  /// All of a revalidating node's deps are terminal: decide rerun vs clean.
  Verify(NodeIndex),
  /// The node reached a terminal state: resolve dependents' pending counts.
  Settled(NodeIndex),
}

impl Default for Evaluator {
  fn default() -> Self {
    Self::new()
  }
}

impl Evaluator {
  pub fn new() -> Self {
    Self {
      registry: Registry::default(),
      graph: Arc::new(RwLock::new(NodeGraph::new())),
    }
  }

  /// Binds a key kind to its computation. Must happen before the kind is
  /// first requested; re-registration is an error.
  pub fn register(
    &mut self,
    kind: KeyKind,
    computation: Arc<dyn Computation>,
  ) -> anyhow::Result<()> {
    self.registry.register(kind, computation)
  }

  /// Marks the given keys as changed: they will be recomputed on the next
  /// evaluation, and everything transitively depending on them will be
  /// revalidated (and recomputed only where a dependency value actually
  /// changed). Must be called between evaluations.
  pub fn invalidate(&mut self, keys: &[Key]) {
    tracing::debug!(count = keys.len(), "invalidate");
    self.graph.write().invalidate(keys);
  }

  /// Discards the entire node graph. Registrations survive.
  pub fn reset(&mut self) {
    *self.graph.write() = NodeGraph::new();
  }

  /// Evaluates the requested keys with failure isolation: an error in one
  /// subgraph does not stop evaluation of unrelated keys. Returns a value
  /// or error per requested key.
  #[tracing::instrument(level = "info", skip_all)]
  pub async fn evaluate(&mut self, keys: &[Key]) -> anyhow::Result<EvalResults> {
    self.run(keys, false).await
  }

  /// Like [`evaluate`](Evaluator::evaluate), but aborts the whole batch on
  /// the first failing key. In-flight attempts are abandoned; their
  /// partially recorded dependencies are never committed.
  #[tracing::instrument(level = "info", skip_all)]
  pub async fn evaluate_fail_fast(&mut self, keys: &[Key]) -> anyhow::Result<EvalResults> {
    self.run(keys, true).await
  }

  async fn run(&mut self, keys: &[Key], fail_fast: bool) -> anyhow::Result<EvalResults> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut in_flight = 0usize;

    {
      let mut graph = self.graph.write();
      // Attempts abandoned by a previously aborted batch are discarded
      // here rather than committed.
      Self::reset_stale_attempts(&mut graph);

      let seeds = keys
        .iter()
        .map(|key| Work::Prepare(graph.get_or_create(key)))
        .collect();
      let ready = self.pump(&mut graph, seeds);
      drop(graph);

      self.dispatch_all(ready, &tx, &mut in_flight);
    }

    loop {
      if in_flight == 0 {
        let mut graph = self.graph.write();
        if graph.building_nodes().is_empty() {
          break;
        }

        // Nothing is running yet parked nodes remain: the remaining waits
        // are mutual. Fail each strongly-connected set with a cycle error;
        // dependents outside the sets observe it through normal
        // propagation.
        let cycles = graph.parked_cycles();
        if cycles.is_empty() {
          return Err(
            EvalError::InconsistentState(
              "evaluation stalled with parked nodes but no dependency cycle".into(),
            )
            .into(),
          );
        }

        let mut work = Vec::new();
        let mut first_cycle = None;
        for scc in cycles {
          let cycle_keys: Vec<Key> =
            scc.iter().map(|&ix| graph.key_of(ix).clone()).collect();
          tracing::debug!(keys = ?cycle_keys, "dependency cycle detected");
          let error = EvalError::Cycle { keys: cycle_keys };
          first_cycle.get_or_insert_with(|| error.clone());
          for &ix in &scc {
            *graph.state_mut(ix) = NodeState::Error(error.clone());
          }
          work.extend(scc.into_iter().map(Work::Settled));
        }

        if fail_fast {
          Self::reset_stale_attempts(&mut graph);
          let error = first_cycle.unwrap_or_else(|| {
            EvalError::InconsistentState("fail-fast abort without a failed key".into())
          });
          return Err(error.into());
        }

        let ready = self.pump(&mut graph, work);
        drop(graph);
        self.dispatch_all(ready, &tx, &mut in_flight);
        continue;
      }

      let Some(AttemptMessage::Finished {
        key,
        outcome,
        deps,
        missing,
      }) = rx.recv().await
      else {
        // We hold a sender, so the channel cannot close while attempts are
        // in flight.
        return Err(
          EvalError::InconsistentState("attempt channel closed mid-evaluation".into()).into(),
        );
      };

      in_flight -= 1;

      let mut graph = self.graph.write();
      let failed = self.commit(&mut graph, key, outcome, deps, missing, &tx, &mut in_flight)?;

      if fail_fast {
        if let Some(error) = failed {
          Self::reset_stale_attempts(&mut graph);
          return Err(error.into());
        }
      }
    }

    let graph = self.graph.read();
    keys
      .iter()
      .map(|key| {
        let result = match graph.state_of(key) {
          Some(NodeState::Done(cached)) => Ok(cached.value.clone()),
          Some(NodeState::Error(error)) => Err(error.clone()),
          _ => {
            return Err(anyhow::Error::from(EvalError::InconsistentState(format!(
              "requested key {key} did not reach a terminal state"
            ))));
          }
        };
        Ok((key.clone(), result))
      })
      .collect()
  }

  /// Applies one finished attempt to the graph. Returns the node's error,
  /// if it failed, for fail-fast handling.
  #[allow(clippy::too_many_arguments)]
  fn commit(
    &self,
    graph: &mut NodeGraph,
    key: Key,
    outcome: Result<Computed, ComputationError>,
    deps: Vec<Key>,
    missing: Vec<Key>,
    tx: &mpsc::UnboundedSender<AttemptMessage>,
    in_flight: &mut usize,
  ) -> anyhow::Result<Option<EvalError>> {
    let Some(ix) = graph.index_of(&key) else {
      return Err(
        EvalError::InconsistentState(format!("finished attempt for unknown key {key}")).into(),
      );
    };
    let NodeState::Building {
      pending_deps: 0,
      previous,
      ..
    } = std::mem::replace(graph.state_mut(ix), NodeState::NotStarted)
    else {
      return Err(
        EvalError::InconsistentState(format!("finished attempt for non-running key {key}"))
          .into(),
      );
    };

    // The dependencies recorded by this attempt replace whatever an
    // earlier attempt left behind.
    let dep_ixs = graph.replace_deps(ix, &deps);

    let mut failed = None;
    let work = match outcome {
      Ok(Computed::Value(value)) if missing.is_empty() => {
        let version = graph.version();
        let changed_at = match &previous {
          Some(prev) if *prev.value == value => prev.changed_at,
          _ => version,
        };
        tracing::trace!(%key, changed = changed_at == version, "done");
        *graph.state_mut(ix) = NodeState::Done(CachedValue {
          value: Arc::new(value),
          changed_at,
          verified_at: version,
        });
        vec![Work::Settled(ix)]
      }
      Ok(Computed::Value(_)) => {
        // Contract violation: a computation must stop at the first missing
        // dependency, not conclude with partial information.
        let error = EvalError::InconsistentState(format!(
          "computation for {key} returned a value despite unresolved dependencies"
        ));
        failed = Some(error.clone());
        *graph.state_mut(ix) = NodeState::Error(error);
        vec![Work::Settled(ix)]
      }
      Ok(Computed::Incomplete) => {
        if missing.is_empty() {
          let error = EvalError::InconsistentState(format!(
            "computation for {key} reported incomplete without missing dependencies"
          ));
          failed = Some(error.clone());
          *graph.state_mut(ix) = NodeState::Error(error);
          vec![Work::Settled(ix)]
        } else {
          let unresolved: Vec<NodeIndex> = dep_ixs
            .iter()
            .copied()
            .filter(|&dep| !graph.state(dep).is_terminal())
            .collect();
          if unresolved.is_empty() {
            // Every missing dependency resolved while the attempt was
            // concluding; go straight into a fresh attempt.
            *graph.state_mut(ix) = NodeState::Building {
              pending_deps: 0,
              verifying: false,
              previous,
            };
            let ready = vec![(key.clone(), ix)];
            let ready = self.resolve_computations(graph, ready);
            self.dispatch_all(ready, tx, in_flight);
            vec![]
          } else {
            tracing::trace!(%key, pending = unresolved.len(), "parked");
            *graph.state_mut(ix) = NodeState::Building {
              pending_deps: unresolved.len(),
              verifying: false,
              previous,
            };
            unresolved.into_iter().map(Work::Prepare).collect()
          }
        }
      }
      Err(error) => {
        let error = Self::as_eval_error(&key, error);
        tracing::debug!(%key, %error, "computation failed");
        failed = Some(error.clone());
        *graph.state_mut(ix) = NodeState::Error(error);
        vec![Work::Settled(ix)]
      }
    };

    let ready = self.pump(graph, work);
    self.dispatch_all(ready, tx, in_flight);
    Ok(failed)
  }

  /// Converts a computation failure into the engine taxonomy. Structured
  /// engine errors thrown through `anyhow` (a propagated cycle, say) are
  /// recovered by downcast so they stay structured at the top level.
  fn as_eval_error(key: &Key, error: ComputationError) -> EvalError {
    match error.downcast::<EvalError>() {
      Ok(EvalError::Computation { key: dep, message }) => EvalError::Computation {
        key: key.clone(),
        message: format!("dependency {dep} failed: {message}"),
      },
      Ok(error) => error,
      Err(other) => EvalError::Computation {
        key: key.clone(),
        message: format!("{other:#}"),
      },
    }
  }

  /// Works through graph maintenance items until none remain, collecting
  /// the keys that became ready to run. Worklist-based: depth is bounded by
  /// the number of distinct nodes, not by dependency-chain length.
  fn pump(&self, graph: &mut NodeGraph, mut work: Vec<Work>) -> Vec<(Key, Arc<dyn Computation>)> {
    let mut ready = Vec::new();

    while let Some(item) = work.pop() {
      match item {
        Work::Prepare(ix) => match graph.state(ix) {
          NodeState::NotStarted => {
            *graph.state_mut(ix) = NodeState::Building {
              pending_deps: 0,
              verifying: false,
              previous: None,
            };
            ready.push((graph.key_of(ix).clone(), ix));
          }
          NodeState::Dirty { forced: true, .. } => {
            let NodeState::Dirty { previous, .. } =
              std::mem::replace(graph.state_mut(ix), NodeState::NotStarted)
            else {
              unreachable!();
            };
            *graph.state_mut(ix) = NodeState::Building {
              pending_deps: 0,
              verifying: false,
              previous: Some(previous),
            };
            ready.push((graph.key_of(ix).clone(), ix));
          }
          NodeState::Dirty { forced: false, .. } => {
            let unresolved: Vec<NodeIndex> = graph
              .deps(ix)
              .into_iter()
              .filter(|&dep| !graph.state(dep).is_terminal())
              .collect();
            if unresolved.is_empty() {
              work.push(Work::Verify(ix));
            } else {
              let NodeState::Dirty { previous, .. } =
                std::mem::replace(graph.state_mut(ix), NodeState::NotStarted)
              else {
                unreachable!();
              };
              *graph.state_mut(ix) = NodeState::Building {
                pending_deps: unresolved.len(),
                verifying: true,
                previous: Some(previous),
              };
              work.extend(unresolved.into_iter().map(Work::Prepare));
            }
          }
          // Already running, parked or terminal.
          NodeState::Building { .. } | NodeState::Done(_) | NodeState::Error(_) => {}
        },

        Work::Verify(ix) => {
          let previous = match std::mem::replace(graph.state_mut(ix), NodeState::NotStarted) {
            NodeState::Dirty {
              previous,
              forced: false,
            } => previous,
            NodeState::Building {
              previous: Some(previous),
              verifying: true,
              ..
            } => previous,
            other => {
              *graph.state_mut(ix) = other;
              continue;
            }
          };

          // Re-run only if some dependency's value actually changed after
          // this node was last verified, or a dependency failed. Otherwise
          // the entry is re-marked clean without disturbing dependents.
          let rerun = graph.deps(ix).into_iter().any(|dep| match graph.state(dep) {
            NodeState::Done(cached) => cached.changed_at > previous.verified_at,
            _ => true,
          });

          if rerun {
            *graph.state_mut(ix) = NodeState::Building {
              pending_deps: 0,
              verifying: false,
              previous: Some(previous),
            };
            ready.push((graph.key_of(ix).clone(), ix));
          } else {
            tracing::trace!(key = %graph.key_of(ix), "revalidated clean");
            let version = graph.version();
            *graph.state_mut(ix) = NodeState::Done(CachedValue {
              value: previous.value,
              changed_at: previous.changed_at,
              verified_at: version,
            });
            work.push(Work::Settled(ix));
          }
        }

        Work::Settled(ix) => {
          for parent in graph.dependents(ix) {
            let NodeState::Building {
              pending_deps,
              verifying,
              ..
            } = graph.state_mut(parent)
            else {
              continue;
            };
            if *pending_deps == 0 {
              // An attempt is already running; it commits on its own.
              continue;
            }
            *pending_deps -= 1;
            if *pending_deps > 0 {
              continue;
            }
            if *verifying {
              work.push(Work::Verify(parent));
            } else {
              let NodeState::Building { previous, .. } =
                std::mem::replace(graph.state_mut(parent), NodeState::NotStarted)
              else {
                unreachable!();
              };
              *graph.state_mut(parent) = NodeState::Building {
                pending_deps: 0,
                verifying: false,
                previous,
              };
              ready.push((graph.key_of(parent).clone(), parent));
            }
          }
        }
      }
    }

    self.resolve_computations(graph, ready)
  }

  /// Looks up the registered computation for each ready key. A kind with
  /// no registration fails its node on the spot.
  fn resolve_computations(
    &self,
    graph: &mut NodeGraph,
    ready: Vec<(Key, NodeIndex)>,
  ) -> Vec<(Key, Arc<dyn Computation>)> {
    let mut dispatchable = Vec::with_capacity(ready.len());
    for (key, ix) in ready {
      match self.registry.get(key.kind()) {
        Some(computation) => dispatchable.push((key, computation)),
        None => {
          let error = EvalError::Computation {
            key: key.clone(),
            message: format!("no computation registered for kind {}", key.kind()),
          };
          tracing::debug!(%key, "unregistered kind");
          *graph.state_mut(ix) = NodeState::Error(error);
          let settled = self.pump(graph, vec![Work::Settled(ix)]);
          dispatchable.extend(settled);
        }
      }
    }
    dispatchable
  }

  fn dispatch_all(
    &self,
    ready: Vec<(Key, Arc<dyn Computation>)>,
    tx: &mpsc::UnboundedSender<AttemptMessage>,
    in_flight: &mut usize,
  ) {
    for (key, computation) in ready {
      *in_flight += 1;
      tracing::trace!(%key, "dispatch");

      let graph = self.graph.clone();
      let tx = tx.clone();
      tokio::spawn(async move {
        let mut env = Environment::new(key.clone(), graph);
        let outcome = computation.compute(&key, &mut env).await;
        let (deps, missing) = env.finish();
        // Receiver dropped means the batch was aborted; this attempt's
        // result is discarded, never committed.
        let _ = tx.send(AttemptMessage::Finished {
          key,
          outcome,
          deps,
          missing,
        });
      });
    }
  }

  /// Resets nodes left mid-attempt by an aborted batch. Their partially
  /// recorded dependencies were never committed; entries that had a value
  /// before go back to dirty so the next evaluation picks them up.
  fn reset_stale_attempts(graph: &mut NodeGraph) {
    for ix in graph.building_nodes() {
      let state = graph.state_mut(ix);
      if let NodeState::Building {
        previous: Some(previous),
        verifying,
        ..
      } = std::mem::replace(state, NodeState::NotStarted)
      {
        *state = NodeState::Dirty {
          previous,
          forced: !verifying,
        };
      }
    }
  }
}
