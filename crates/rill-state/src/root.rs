//! The root binding: retained value, upstream queue, shared downstream.
//!
//! Exactly one `Bus` exists per tree. It owns the retained root value,
//! serializes upstream pushes through a FIFO queue, and rebroadcasts each
//! applied change on the shared downstream relay that every node filters.

use crate::change::Change;
use crate::relay::{Callback, Relay, Subscription};
use crate::state::State;
use crate::tree::graft;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Value equality used to suppress no-op emissions.
///
/// Supplied at root construction and inherited by every node. The default
/// is structural equality on `serde_json::Value`.
pub type Equality = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

/// Equality lifted over possibly-absent values.
pub(crate) fn opt_eq(eq: &Equality, a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => eq(a, b),
        _ => false,
    }
}

struct UpstreamQueue {
    pending: VecDeque<Change>,
    draining: bool,
}

/// Shared plumbing behind every node of one tree.
pub(crate) struct Bus {
    value: Mutex<Value>,
    queue: Mutex<UpstreamQueue>,
    downstream: Relay<Change>,
    pub(crate) equality: Equality,
}

impl Bus {
    pub(crate) fn new(initial: Value, equality: Equality) -> Arc<Bus> {
        Arc::new(Bus {
            value: Mutex::new(initial),
            queue: Mutex::new(UpstreamQueue {
                pending: VecDeque::new(),
                draining: false,
            }),
            downstream: Relay::new(),
            equality,
        })
    }

    /// Clone of the retained root value.
    pub(crate) fn snapshot(&self) -> Value {
        self.value.lock().unwrap().clone()
    }

    /// Read through the retained root value without cloning it.
    pub(crate) fn with_value<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.value.lock().unwrap())
    }

    /// Enqueue an upstream change and drain the queue unless a drain is
    /// already running higher in the call stack.
    ///
    /// Re-entrant pushes (a subscriber writing during a broadcast) land in
    /// the queue and are applied in FIFO order by the outer drain.
    pub(crate) fn push(&self, change: Change) {
        {
            let mut queue = self.queue.lock().unwrap();
            queue.pending.push_back(change);
            if queue.draining {
                return;
            }
            queue.draining = true;
        }
        self.drain();
    }

    fn drain(&self) {
        loop {
            let change = {
                let mut queue = self.queue.lock().unwrap();
                match queue.pending.pop_front() {
                    Some(change) => change,
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };
            self.apply_and_broadcast(change);
        }
    }

    fn apply_and_broadcast(&self, change: Change) {
        let applied = {
            let current = self.value.lock().unwrap();
            graft(&current, change.trace.as_ref(), change.to.clone())
        };
        let next = match applied {
            Ok(next) => next,
            Err(err) => {
                // Errors are local to the change; propagation continues.
                warn!(origin = %change.origin_path(), %err, "dropping change that failed to apply");
                return;
            }
        };
        *self.value.lock().unwrap() = next.clone();
        debug!(origin = %change.origin_path(), "applied change");
        self.downstream.emit(&change.with_value(Some(next)));
    }

    /// Attach a downstream subscriber and bootstrap it with a synthetic
    /// trace-less change carrying the current root value.
    ///
    /// Registration happens before the bootstrap delivery so a write issued
    /// from inside the bootstrap still reaches the new subscriber.
    pub(crate) fn subscribe_downstream(&self, callback: Callback<Change>) -> Subscription {
        let subscription = self.downstream.subscribe_callback(Arc::clone(&callback));
        callback(&Change::bootstrap(self.snapshot()));
        subscription
    }
}

/// Construct the root node of a new state tree.
///
/// # Examples
///
/// ```
/// use rill_state::root;
/// use serde_json::json;
///
/// let tree = root(json!({"count": 0}));
/// tree.sub("count").set(json!(1));
/// assert_eq!(tree.get().unwrap(), Some(json!({"count": 1})));
/// ```
pub fn root(initial: Value) -> State {
    root_with_equality(initial, Arc::new(|a: &Value, b: &Value| a == b))
}

/// Construct the root node with a caller-supplied equality predicate.
///
/// The predicate decides which emissions are no-ops; it is inherited by
/// every node of the tree.
pub fn root_with_equality(initial: Value, equality: Equality) -> State {
    State::from_bus(Bus::new(initial, equality))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{path, Trace};
    use serde_json::json;

    #[test]
    fn test_bootstrap_on_subscribe() {
        let bus = Bus::new(json!({"a": 1}), Arc::new(|a: &Value, b: &Value| a == b));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe_downstream(Arc::new(move |change: &Change| {
            sink.lock().unwrap().push(change.clone());
        }));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].is_root_origin());
        assert_eq!(seen[0].value, Some(json!({"a": 1})));
    }

    #[test]
    fn test_failed_apply_is_dropped_and_queue_continues() {
        let bus = Bus::new(json!({"items": [1]}), Arc::new(|a: &Value, b: &Value| a == b));
        // Out-of-bounds write, then a valid one.
        bus.push(Change::write(
            None,
            json!(9),
            Trace::from_path(&path!("items", 5)),
        ));
        bus.push(Change::write(
            Some(json!(1)),
            json!(2),
            Trace::from_path(&path!("items", 0)),
        ));
        assert_eq!(bus.snapshot(), json!({"items": [2]}));
    }

    #[test]
    fn test_opt_eq() {
        let eq: Equality = Arc::new(|a: &Value, b: &Value| a == b);
        assert!(opt_eq(&eq, None, None));
        assert!(opt_eq(&eq, Some(&json!(1)), Some(&json!(1))));
        assert!(!opt_eq(&eq, Some(&json!(1)), None));
        assert!(!opt_eq(&eq, Some(&json!(1)), Some(&json!(2))));
    }
}
