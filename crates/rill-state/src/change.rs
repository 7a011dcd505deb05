//! The typed change record that flows on the bus.

use crate::{Path, Trace};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single change flowing between nodes and the root.
///
/// `from` and `to` describe the change at its origin (the deepest addressed
/// location). `value` is perspective-dependent: on the shared root
/// downstream it is the post-change root value; on a node-scoped change
/// stream it is rebound to the node's own plucked value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Post-change value at the observing node; `None` when the node's
    /// location is absent from the tree.
    pub value: Option<Value>,
    /// Pre-change value at the origin; `None` when the location was absent
    /// (or for the root's synthetic bootstrap change).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Value>,
    /// Post-change value at the origin.
    pub to: Value,
    /// Address of the origin, oriented from the root downward; `None` for
    /// a change at the root itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Trace>,
}

impl Change {
    /// A write: `from` → `to` at the location addressed by `trace`.
    ///
    /// At the origin the observed value equals `to`; the root binding
    /// rebinds `value` when it rebroadcasts.
    pub fn write(from: Option<Value>, to: Value, trace: Option<Trace>) -> Self {
        Change {
            value: Some(to.clone()),
            from,
            to,
            trace,
        }
    }

    /// The synthetic change the root replays to bootstrap new downstream
    /// subscribers: no trace, no `from`, current root value throughout.
    pub fn bootstrap(root: Value) -> Self {
        Change {
            value: Some(root.clone()),
            from: None,
            to: root,
            trace: None,
        }
    }

    /// Rebind the observer-perspective `value` field.
    pub fn with_value(mut self, value: Option<Value>) -> Self {
        self.value = value;
        self
    }

    /// True when the change originated at the root (no trace).
    #[inline]
    pub fn is_root_origin(&self) -> bool {
        self.trace.is_none()
    }

    /// The path of the change's origin.
    pub fn origin_path(&self) -> Path {
        self.trace
            .as_ref()
            .map(Trace::to_path)
            .unwrap_or_else(Path::root)
    }
}
