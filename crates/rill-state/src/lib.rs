//! Reactive state tree with bidirectional change propagation.
//!
//! `rill-state` holds one hierarchical JSON value and lets consumers
//! subscribe to any sub-location of it, write to any sub-location, and have
//! every write propagate both up (into the retained root value) and down
//! (to all overlapping subscribers), with no central dispatcher and no
//! redundant emissions.
//!
//! # Core Concepts
//!
//! - **State**: a live node at one path of the tree; reads pluck from the
//!   root, writes become traced changes
//! - **Change**: the typed record flowing on the bus, addressed by a
//!   **Trace** oriented from the root downward
//! - **Root binding**: owns the retained root value; applies each upstream
//!   change and rebroadcasts it on the shared downstream
//! - **KeyedState**: indexes a sequence by item identity and diffs each
//!   replacement into additions, deletions, and moves
//! - **VerifiedState**: gates a subtree's writes behind a pure predicate
//!
//! Every node is an independent filter over the same broadcast: a node
//! emits only when an arriving change's trace overlaps its path, and a
//! configurable equality predicate suppresses no-ops.
//!
//! # Propagation
//!
//! ```text
//! node.set(v) ──► upstream queue ──► root: R' = graft(R, trace, v)
//!                                      │
//!                     downstream ◄─────┘  (change, value = R')
//!                         │
//!        every node: trace ∩ path? ──► pluck ──► dedup ──► subscribers
//! ```
//!
//! Scheduling is single-threaded, cooperative, and synchronous: emissions
//! run on the writing thread, and a write issued from inside a subscriber
//! is queued and observed in FIFO order with all other writes.
//!
//! # Quick Start
//!
//! ```
//! use rill_state::root;
//! use serde_json::json;
//!
//! let tree = root(json!({"users": [{"name": "Jack"}]}));
//! let name = tree.sub("users").sub(0).sub("name");
//!
//! let sub = name.subscribe(|v| println!("name is now {v:?}"));
//! name.set(json!("Jill"));
//! assert_eq!(name.get().unwrap(), Some(json!("Jill")));
//! sub.cancel();
//! ```
//!
//! # Keyed sequences
//!
//! ```
//! use rill_state::{keyed, root};
//! use serde_json::json;
//!
//! let tree = root(json!([
//!     {"id": 101, "name": "Jill"},
//!     {"id": 102, "name": "Jack"},
//! ]));
//! let people = keyed(tree.clone(), |p| p["id"].clone());
//!
//! // Addressed by identity: follows the item across reorders.
//! let jill = people.key(101).sub("name");
//! assert_eq!(jill.get().unwrap(), Some(json!("Jill")));
//! ```
//!
//! # Immutability contract
//!
//! Callers must treat values as immutable: change a location only by
//! setting a new value, never by mutating a container in place. The engine
//! relies on this discipline for its freshness guarantees and does not
//! detect violations.

mod change;
mod error;
mod keyed;
mod path;
mod relay;
mod root;
mod state;
mod trace;
mod tree;
mod verified;

pub use change::Change;
pub use error::{value_type_name, StateError, StateResult};
pub use keyed::{
    item_key, keyed, Addition, Deletion, ItemState, KeyFn, KeyedDiagnostic, KeyedState,
    ListChanges, Move,
};
pub use path::{Key, Path};
pub use relay::{Relay, Stream, Subscription};
pub use root::{root, root_with_equality, Equality};
pub use state::{State, Upstream};
pub use trace::{KeyIndexMap, Narrowed, Trace, TraceMatch, TraceStep};
pub use tree::{graft, pluck};
pub use verified::{verified, GatedUpstream, Predicate, VerifiedState};
