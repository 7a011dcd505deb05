//! The `State` node: a live sub-view of the tree at one path.
//!
//! Nodes are cheap clonable handles over the shared bus. They hold no value
//! of their own: reads pluck from the retained root, writes become traced
//! changes pushed upstream, and subscriptions filter the shared downstream
//! by comparing the node's path against each change's trace.

use crate::change::Change;
use crate::error::{StateError, StateResult};
use crate::relay::{Callback, Stream, Subscription};
use crate::root::{opt_eq, Bus, Equality};
use crate::tree::pluck;
use crate::{Key, Path, Trace};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// A node of the state tree.
///
/// Created by [`root`](crate::root) or [`sub`](State::sub). Sibling handles
/// for the same path are interchangeable: all state lives on the shared bus.
#[derive(Clone)]
pub struct State {
    bus: Arc<Bus>,
    path: Path,
}

impl State {
    pub(crate) fn from_bus(bus: Arc<Bus>) -> State {
        State {
            bus,
            path: Path::root(),
        }
    }

    /// The address of this node.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The current value at this node, or `Ok(None)` when the location is
    /// absent from the tree.
    ///
    /// Fails with [`StateError::TypeMismatch`] when the path descends
    /// through a leaf (or otherwise crosses a value of the wrong shape);
    /// absence and a bad address are distinct outcomes.
    pub fn get(&self) -> StateResult<Option<Value>> {
        self.bus
            .with_value(|root| pluck(root, &self.path).map(|value| value.cloned()))
    }

    /// Write a new value at this node.
    ///
    /// The write is pushed upstream as a traced change; this node's own
    /// view updates only when the change returns on the downstream, so a
    /// `get` immediately after `set` inside a broadcast still observes the
    /// pre-change value until the root has applied the write.
    pub fn set(&self, to: Value) {
        self.push_change(self.make_change(to));
    }

    /// Read-modify-write convenience: compute the new value from the
    /// current one, then [`set`](Self::set) it.
    ///
    /// Fails like [`get`](Self::get) when this node's address cannot be
    /// read; nothing is written in that case.
    pub fn update(&self, f: impl FnOnce(Option<&Value>) -> Value) -> StateResult<()> {
        let current = self.get()?;
        self.set(f(current.as_ref()));
        Ok(())
    }

    /// The child node under `key`. Cheap; safe to call repeatedly.
    pub fn sub(&self, key: impl Into<Key>) -> State {
        State {
            bus: Arc::clone(&self.bus),
            path: self.path.child(key.into()),
        }
    }

    /// Subscribe to this node's values.
    ///
    /// The sink receives the current value immediately, then every
    /// subsequent distinct value produced by changes that overlap this
    /// node's path. `None` means the location is absent. An emission whose
    /// address cannot be plucked (the path descends through a leaf) is
    /// skipped here and surfaced on [`diagnostics`](Self::diagnostics).
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(Option<&Value>) + Send + Sync + 'static,
    {
        let path = self.path.clone();
        let eq = Arc::clone(&self.bus.equality);
        let last: Mutex<Option<Option<Value>>> = Mutex::new(None);
        self.bus
            .subscribe_downstream(Arc::new(move |change: &Change| {
                if !overlaps(change, &path) {
                    return;
                }
                let next = match change.value.as_ref() {
                    None => None,
                    Some(root) => match pluck(root, &path) {
                        Ok(value) => value.cloned(),
                        Err(err) => {
                            warn!(node = %path, %err, "skipping emission over bad address");
                            return;
                        }
                    },
                };
                {
                    let mut guard = last.lock().unwrap();
                    match &*guard {
                        Some(prev) if opt_eq(&eq, prev.as_ref(), next.as_ref()) => return,
                        _ => *guard = Some(next.clone()),
                    }
                }
                f(next.as_ref());
            }))
    }

    /// The change stream observed by this node, for introspection, logging,
    /// and bridging.
    ///
    /// Changes are filtered to those overlapping this node's path, with
    /// `value` rebound to the node's plucked value. No deduplication is
    /// applied; the first delivery is the bootstrap change.
    pub fn changes(&self) -> Stream<Change> {
        let bus = Arc::clone(&self.bus);
        let path = self.path.clone();
        Stream::new(move |callback: Callback<Change>| {
            let path = path.clone();
            bus.subscribe_downstream(Arc::new(move |change: &Change| {
                if !overlaps(change, &path) {
                    return;
                }
                let value = change
                    .value
                    .as_ref()
                    .and_then(|root| pluck(root, &path).ok().flatten())
                    .cloned();
                callback(&change.clone().with_value(value));
            }))
        })
    }

    /// Addressing errors raised at this node.
    ///
    /// A change that overlaps this node but whose post-change root cannot
    /// be plucked through the node's path (the path descends through a
    /// leaf) emits the error here, including the immediate delivery for
    /// the current root on subscribe. Errors stay local to this node:
    /// value subscribers skip the emission and ancestors continue
    /// unaffected.
    pub fn diagnostics(&self) -> Stream<StateError> {
        let bus = Arc::clone(&self.bus);
        let path = self.path.clone();
        Stream::new(move |callback: Callback<StateError>| {
            let path = path.clone();
            bus.subscribe_downstream(Arc::new(move |change: &Change| {
                if !overlaps(change, &path) {
                    return;
                }
                if let Some(root) = change.value.as_ref() {
                    if let Err(err) = pluck(root, &path) {
                        callback(&err);
                    }
                }
            }))
        })
    }

    /// The sink this node writes into, for bridging changes from an
    /// external source.
    ///
    /// Pushed changes must carry root-rooted traces (or none, for a root
    /// replacement); they flow through the same FIFO queue as node writes.
    pub fn upstream(&self) -> Upstream {
        Upstream {
            bus: Arc::clone(&self.bus),
        }
    }

    /// Build the traced change a write of `to` at this node produces.
    ///
    /// `from` is best-effort: a write over a bad address carries no
    /// pre-change value and is rejected when the root applies it.
    pub(crate) fn make_change(&self, to: Value) -> Change {
        Change::write(
            self.get().unwrap_or_default(),
            to,
            Trace::from_path(&self.path),
        )
    }

    /// Push a change into the shared upstream queue.
    pub(crate) fn push_change(&self, change: Change) {
        self.bus.push(change);
    }

    pub(crate) fn equality(&self) -> Equality {
        Arc::clone(&self.bus.equality)
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State").field("path", &self.path).finish()
    }
}

/// Does `change` overlap the node at `path`?
///
/// A trace-less change is a root replacement and overlaps every node; the
/// per-node dedup suppresses the resulting no-ops on untouched subtrees.
fn overlaps(change: &Change, path: &Path) -> bool {
    match &change.trace {
        None => true,
        Some(trace) => trace.matches(path).affects_node(),
    }
}

/// Bridge handle into a tree's upstream queue.
#[derive(Clone)]
pub struct Upstream {
    bus: Arc<Bus>,
}

impl Upstream {
    /// Push a change into the tree, FIFO with node writes.
    pub fn push(&self, change: Change) {
        self.bus.push(change);
    }
}
