//! Predicate-gated nodes.
//!
//! A [`VerifiedState`] interposes a pure predicate between a node (and its
//! descendants) and the shared upstream. Accepted changes flow upward
//! unchanged; rejected changes are dropped before they reach the root.
//!
//! Nodes never emit optimistically: a write becomes observable only after
//! its round trip through the root. Rejection therefore needs no rollback,
//! since no subscriber ever saw the rejected value, and every view stays
//! consistent with the root by construction.

use crate::change::Change;
use crate::error::{StateError, StateResult};
use crate::relay::{Stream, Subscription};
use crate::state::{State, Upstream};
use crate::{Key, Path};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Decides whether a change may pass upstream.
///
/// The predicate sees the change as built at its origin (`from`, `to`,
/// `value`, `trace`) and must be pure and side-effect-free.
pub type Predicate = Arc<dyn Fn(&Change) -> bool + Send + Sync>;

/// Gate a node and its descendants behind a change predicate.
pub fn verified<F>(state: State, predicate: F) -> VerifiedState
where
    F: Fn(&Change) -> bool + Send + Sync + 'static,
{
    VerifiedState {
        inner: state,
        predicate: Arc::new(predicate),
    }
}

/// A node whose writes must satisfy a predicate before reaching the root.
///
/// Carries the same surface as [`State`]; reads and subscriptions are
/// unaffected by the gate.
#[derive(Clone)]
pub struct VerifiedState {
    inner: State,
    predicate: Predicate,
}

impl VerifiedState {
    /// The wrapped node.
    pub fn state(&self) -> &State {
        &self.inner
    }

    /// The address of this node.
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// The current value at this node; see [`State::get`].
    pub fn get(&self) -> StateResult<Option<Value>> {
        self.inner.get()
    }

    /// Write a new value, if the predicate accepts the resulting change.
    ///
    /// A rejected change is dropped silently: it never reaches the root,
    /// and subscribers see nothing.
    pub fn set(&self, to: Value) {
        let change = self.inner.make_change(to);
        if (self.predicate)(&change) {
            self.inner.push_change(change);
        } else {
            debug!(origin = %change.origin_path(), "verification rejected change");
        }
    }

    /// Read-modify-write convenience over [`set`](Self::set).
    pub fn update(&self, f: impl FnOnce(Option<&Value>) -> Value) -> StateResult<()> {
        let current = self.get()?;
        self.set(f(current.as_ref()));
        Ok(())
    }

    /// The child node under `key`, gated by the same predicate.
    pub fn sub(&self, key: impl Into<Key>) -> VerifiedState {
        VerifiedState {
            inner: self.inner.sub(key),
            predicate: Arc::clone(&self.predicate),
        }
    }

    /// Subscribe to this node's values; see [`State::subscribe`].
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(Option<&Value>) + Send + Sync + 'static,
    {
        self.inner.subscribe(f)
    }

    /// The change stream observed by this node; see [`State::changes`].
    pub fn changes(&self) -> Stream<Change> {
        self.inner.changes()
    }

    /// Addressing errors raised at this node; see [`State::diagnostics`].
    pub fn diagnostics(&self) -> Stream<StateError> {
        self.inner.diagnostics()
    }

    /// A gated bridge into the upstream queue: bridged changes must pass
    /// the predicate like any other write through this node.
    pub fn upstream(&self) -> GatedUpstream {
        GatedUpstream {
            upstream: self.inner.upstream(),
            predicate: Arc::clone(&self.predicate),
        }
    }
}

/// Bridge handle that applies a [`VerifiedState`]'s predicate before
/// forwarding a change upstream.
#[derive(Clone)]
pub struct GatedUpstream {
    upstream: Upstream,
    predicate: Predicate,
}

impl GatedUpstream {
    /// Push a change upstream if the predicate accepts it.
    pub fn push(&self, change: Change) {
        if (self.predicate)(&change) {
            self.upstream.push(change);
        } else {
            debug!(origin = %change.origin_path(), "verification rejected bridged change");
        }
    }
}

impl std::fmt::Debug for VerifiedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifiedState")
            .field("path", self.inner.path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::root;
    use serde_json::json;

    #[test]
    fn test_accepted_change_flows_upstream() {
        let tree = root(json!(12));
        let gated = verified(tree.clone(), |c: &Change| {
            c.from.as_ref().and_then(Value::as_i64) < c.to.as_i64()
        });
        gated.set(json!(14));
        assert_eq!(tree.get().unwrap(), Some(json!(14)));
    }

    #[test]
    fn test_rejected_change_leaves_root_untouched() {
        let tree = root(json!(12));
        let gated = verified(tree.clone(), |c: &Change| {
            c.from.as_ref().and_then(Value::as_i64) < c.to.as_i64()
        });
        gated.set(json!(10));
        assert_eq!(tree.get().unwrap(), Some(json!(12)));
        assert_eq!(gated.get().unwrap(), Some(json!(12)));
    }

    #[test]
    fn test_descendant_writes_are_gated() {
        let tree = root(json!({"score": 5, "label": "a"}));
        // Only numeric writes pass.
        let gated = verified(tree.clone(), |c: &Change| c.to.is_number());
        gated.sub("score").set(json!(6));
        gated.sub("label").set(json!("b"));
        assert_eq!(
            tree.get().unwrap(),
            Some(json!({"score": 6, "label": "a"}))
        );
    }

    #[test]
    fn test_predicate_sees_origin_values_and_trace() {
        let tree = root(json!({"n": 1}));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let gated = verified(tree, move |c: &Change| {
            sink.lock()
                .unwrap()
                .push((c.from.clone(), c.to.clone(), c.origin_path()));
            true
        });
        gated.sub("n").set(json!(2));

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![(Some(json!(1)), json!(2), crate::path!("n"))]
        );
    }

    #[test]
    fn test_rejection_emits_nothing_to_subscribers() {
        let tree = root(json!(12));
        let gated = verified(tree, |c: &Change| {
            c.from.as_ref().and_then(Value::as_i64) < c.to.as_i64()
        });
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = gated.subscribe(move |v| sink.lock().unwrap().push(v.cloned()));

        gated.set(json!(10));
        gated.set(json!(14));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some(json!(12)), Some(json!(14))]
        );
    }
}
