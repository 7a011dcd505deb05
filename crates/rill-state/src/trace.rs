//! Change traces and the trace-matching algebra.
//!
//! A trace is the address a change carries: a chain of hops oriented from
//! the root down to the change's origin. Every live node compares its own
//! path against arriving traces to decide whether the change can touch its
//! subtree.

use crate::{Key, Path};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Key→index snapshot stamped on a sequence hop by a keyed view.
///
/// Item keys are canonicalized to their JSON text (see [`crate::item_key`]).
pub type KeyIndexMap = BTreeMap<String, usize>;

/// One hop of a trace.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    /// The key this hop descends through.
    pub key: Key,
    /// For hops into a keyed sequence: the post-change key→index map,
    /// snapshotted when the change was emitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<KeyIndexMap>,
}

impl TraceStep {
    /// Create a plain hop.
    #[inline]
    pub fn new(key: Key) -> Self {
        TraceStep { key, keys: None }
    }
}

impl From<Key> for TraceStep {
    fn from(key: Key) -> Self {
        TraceStep::new(key)
    }
}

/// Where a change originated, relative to an observing node.
///
/// Produced by [`Trace::matches`]; the first three verdicts mean the node's
/// value may have changed and it must re-pluck, the last means the change is
/// confined to a disjoint subtree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceMatch {
    /// The change originated exactly at the observing node.
    AtNode,
    /// The change originated at an ancestor of the observing node; the
    /// node's value was replaced along with the ancestor's.
    AtAncestor,
    /// The change originated somewhere below the observing node; the node's
    /// value necessarily changed at a lower address.
    AtDescendant,
    /// The change is confined to a sibling subtree and cannot have touched
    /// the observing node.
    Disjoint,
}

impl TraceMatch {
    /// True unless the change is confined to a disjoint subtree.
    #[inline]
    pub fn affects_node(self) -> bool {
        !matches!(self, TraceMatch::Disjoint)
    }
}

/// Result of narrowing a trace by one hop; see [`Trace::narrow`].
#[derive(Clone, Debug, PartialEq)]
pub enum Narrowed {
    /// The trace descends through the given key. `None` means the trace is
    /// exhausted: the change applies at this node or anywhere below it.
    Into(Option<Trace>),
    /// The trace descends through a different key at this level.
    Sibling,
}

/// The address carried by a change: a non-empty chain of hops from the
/// root's first-level key down to the change's origin.
///
/// A change with *no* trace (`Option<Trace>::None`) originated at the root
/// itself; that case is represented outside this type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trace(Vec<TraceStep>);

impl Trace {
    /// Create a single-hop trace.
    #[inline]
    pub fn single(key: Key) -> Self {
        Trace(vec![TraceStep::new(key)])
    }

    /// Build the trace addressing `path`, or `None` for the root path.
    pub fn from_path(path: &Path) -> Option<Self> {
        if path.is_empty() {
            return None;
        }
        Some(Trace(
            path.iter().cloned().map(TraceStep::new).collect(),
        ))
    }

    /// The hops of this trace, outermost first.
    #[inline]
    pub fn steps(&self) -> &[TraceStep] {
        &self.0
    }

    /// The outermost hop.
    #[inline]
    pub fn head(&self) -> &TraceStep {
        &self.0[0]
    }

    /// The number of hops.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; a trace has at least one hop.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The path this trace addresses.
    pub fn to_path(&self) -> Path {
        self.0.iter().map(|step| step.key.clone()).collect()
    }

    /// Extend this trace with a new outermost hop.
    ///
    /// This is the inverse of [`narrow`](Self::narrow): a change traced from
    /// a subtree is re-rooted one level up by prepending the key under which
    /// that subtree hangs.
    pub fn extend(self, key: Key) -> Trace {
        let mut steps = Vec::with_capacity(self.0.len() + 1);
        steps.push(TraceStep::new(key));
        steps.extend(self.0);
        Trace(steps)
    }

    /// Narrow this trace to the view of the child at `key`.
    ///
    /// If the outermost hop descends through `key`, the remainder of the
    /// trace (if any) is the child's view of the change. Otherwise the
    /// change belongs to a sibling subtree.
    pub fn narrow(&self, key: &Key) -> Narrowed {
        if &self.0[0].key != key {
            return Narrowed::Sibling;
        }
        if self.0.len() == 1 {
            Narrowed::Into(None)
        } else {
            Narrowed::Into(Some(Trace(self.0[1..].to_vec())))
        }
    }

    /// Walk this trace and `path` in lockstep and report where the change
    /// originated relative to the node at `path`.
    pub fn matches(&self, path: &Path) -> TraceMatch {
        let keys = path.keys();
        for (i, step) in self.0.iter().enumerate() {
            match keys.get(i) {
                // Path exhausted: the change descends below the node.
                None => return TraceMatch::AtDescendant,
                Some(key) if *key == step.key => continue,
                Some(_) => return TraceMatch::Disjoint,
            }
        }
        if self.0.len() == keys.len() {
            TraceMatch::AtNode
        } else {
            // Trace exhausted above the node: an ancestor was replaced.
            TraceMatch::AtAncestor
        }
    }

    /// Stamp the hop at `depth` with a key→index map.
    ///
    /// Keyed views use this to annotate the hop descending into their
    /// sequence so listeners can correlate indices to item keys without
    /// recomputing the map.
    pub fn annotate_keys(&mut self, depth: usize, keys: KeyIndexMap) {
        if let Some(step) = self.0.get_mut(depth) {
            step.keys = Some(keys);
        }
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_path())
    }
}
