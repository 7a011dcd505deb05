//! Keyed views over sequence-valued nodes.
//!
//! A [`KeyedState`] indexes a sequence by a caller-supplied key function and
//! tracks items by identity instead of position: [`key`](KeyedState::key)
//! addresses an item wherever it currently sits, [`index`](KeyedState::index)
//! reports where it sits, and [`changes`](KeyedState::changes) reports each
//! sequence replacement as a structural edit list.
//!
//! The differ runs once per sequence emission; its result and the key→index
//! map are memoized and multicast to every derivation of the view.

use crate::error::{value_type_name, StateError, StateResult};
use crate::relay::{Relay, Stream, Subscription};
use crate::root::opt_eq;
use crate::state::State;
use crate::trace::KeyIndexMap;
use crate::tree::pluck;
use crate::{Key, Path};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Extracts a stable identity from a sequence item.
pub type KeyFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Canonical form of an item key: the JSON text of the key value.
///
/// JSON values are neither `Hash` nor `Ord`; their serialized text is both
/// and is stable across equal values.
pub fn item_key(key: &Value) -> String {
    key.to_string()
}

/// An item that appeared in the sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Addition {
    /// Index of the item in the new sequence.
    pub index: usize,
    /// The item itself.
    pub item: Value,
}

/// An item that disappeared from the sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Deletion {
    /// Index the item held in the previous sequence.
    pub index: usize,
    /// The item as it was before deletion.
    pub item: Value,
}

/// An item whose index changed between two sequences.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Move {
    /// Index in the previous sequence.
    pub old_index: usize,
    /// Index in the new sequence.
    pub new_index: usize,
    /// The item after the change.
    pub item: Value,
}

/// Structural edits between two consecutive sequence values.
///
/// An item whose content changed but whose key and index did not appears in
/// none of the lists; it surfaces only as a value emission on
/// [`KeyedState::key`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ListChanges {
    /// Keys present only in the new sequence.
    pub additions: Vec<Addition>,
    /// Keys present only in the previous sequence.
    pub deletions: Vec<Deletion>,
    /// Keys present in both, at different indices.
    pub moves: Vec<Move>,
}

impl ListChanges {
    /// True when the sequences are structurally identical.
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.deletions.is_empty() && self.moves.is_empty()
    }
}

/// Non-fatal conditions reported on the keyed view's side channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum KeyedDiagnostic {
    /// A later occurrence of an already-seen key. The first occurrence
    /// keeps the key; the duplicate stays in the sequence but cannot be
    /// addressed through the keyed view.
    DuplicateKey {
        /// Canonical form of the duplicated key.
        key: String,
        /// Index of the ignored duplicate.
        index: usize,
        /// Index of the occurrence that keeps the key.
        kept_index: usize,
    },
    /// The wrapped node's value is not a sequence; the view treats it as
    /// an empty one until a sequence appears.
    NotASequence {
        /// Path of the wrapped node.
        path: Path,
        /// Shape actually found.
        found: String,
    },
}

/// Memoized snapshot multicast to the view's derivations.
#[derive(Clone)]
struct SeqUpdate {
    seq: Option<Vec<Value>>,
    index: KeyIndexMap,
}

struct CoreState {
    seq: Option<Vec<Value>>,
    index: KeyIndexMap,
    primed: bool,
}

struct CoreShared {
    state: State,
    key_fn: KeyFn,
    inner: Mutex<CoreState>,
    updates: Relay<SeqUpdate>,
    changes: Relay<ListChanges>,
    diagnostics: Relay<KeyedDiagnostic>,
}

impl CoreShared {
    fn on_sequence(&self, value: Option<&Value>) {
        let mut diagnostics = Vec::new();
        let new_seq = match value {
            None => None,
            Some(Value::Array(items)) => Some(items.clone()),
            Some(other) => {
                diagnostics.push(KeyedDiagnostic::NotASequence {
                    path: self.state.path().clone(),
                    found: value_type_name(other).to_owned(),
                });
                None
            }
        };
        let new_index = build_index(
            new_seq.as_deref().unwrap_or_default(),
            &self.key_fn,
            &mut diagnostics,
        );

        let (diff, primed) = {
            let mut inner = self.inner.lock().unwrap();
            let prev_seq = inner.seq.take();
            let prev_index = std::mem::take(&mut inner.index);
            let diff = diff_keyed(
                &prev_index,
                prev_seq.as_deref().unwrap_or_default(),
                &new_index,
                new_seq.as_deref().unwrap_or_default(),
            );
            let primed = inner.primed;
            inner.seq = new_seq.clone();
            inner.index = new_index.clone();
            inner.primed = true;
            (diff, primed)
        };

        self.updates.emit(&SeqUpdate {
            seq: new_seq,
            index: new_index,
        });
        if primed {
            self.changes.emit(&diff);
        }
        for diagnostic in diagnostics {
            warn!(path = %self.state.path(), ?diagnostic, "keyed view diagnostic");
            self.diagnostics.emit(&diagnostic);
        }
    }
}

/// Cancels the core's sequence subscription when the last handle drops.
struct CoreGuard {
    subscription: Subscription,
}

impl Drop for CoreGuard {
    fn drop(&mut self) {
        self.subscription.cancel();
    }
}

/// Index a sequence-valued node by item identity.
pub fn keyed<F>(state: State, key_fn: F) -> KeyedState
where
    F: Fn(&Value) -> Value + Send + Sync + 'static,
{
    KeyedState::new(state, Arc::new(key_fn))
}

/// A keyed view over a sequence-valued [`State`].
#[derive(Clone)]
pub struct KeyedState {
    shared: Arc<CoreShared>,
    guard: Arc<CoreGuard>,
}

impl KeyedState {
    fn new(state: State, key_fn: KeyFn) -> KeyedState {
        let shared = Arc::new(CoreShared {
            state: state.clone(),
            key_fn,
            inner: Mutex::new(CoreState {
                seq: None,
                index: KeyIndexMap::new(),
                primed: false,
            }),
            updates: Relay::replay_latest(),
            changes: Relay::new(),
            diagnostics: Relay::new(),
        });
        let core = Arc::clone(&shared);
        let subscription = state.subscribe(move |value| core.on_sequence(value));
        KeyedState {
            shared,
            guard: Arc::new(CoreGuard { subscription }),
        }
    }

    /// The wrapped sequence-valued node.
    pub fn state(&self) -> &State {
        &self.shared.state
    }

    /// The sub-state of the item with identity `key`, wherever it sits.
    pub fn key(&self, key: impl Into<Value>) -> ItemState {
        ItemState {
            shared: Arc::clone(&self.shared),
            guard: Arc::clone(&self.guard),
            canon: item_key(&key.into()),
            rel: Path::root(),
        }
    }

    /// The current index of the item with identity `key`; `None` while the
    /// item is absent. Replays the current index on subscribe and emits on
    /// every index change.
    pub fn index(&self, key: impl Into<Value>) -> Stream<Option<usize>> {
        let canon = item_key(&key.into());
        let shared = Arc::clone(&self.shared);
        let guard = Arc::clone(&self.guard);
        Stream::new(move |callback| {
            let guard = Arc::clone(&guard);
            let canon = canon.clone();
            let last: Mutex<Option<Option<usize>>> = Mutex::new(None);
            shared.updates.subscribe(move |update: &SeqUpdate| {
                let _ = &guard;
                let next = update.index.get(&canon).copied();
                {
                    let mut seen = last.lock().unwrap();
                    if *seen == Some(next) {
                        return;
                    }
                    *seen = Some(next);
                }
                callback(&next);
            })
        })
    }

    /// Structural edits, one [`ListChanges`] per sequence replacement that
    /// reaches the wrapped node (a deep write inside an item yields an
    /// empty edit list).
    pub fn changes(&self) -> Stream<ListChanges> {
        let relay = self.shared.changes.clone();
        let guard = Arc::clone(&self.guard);
        Stream::new(move |callback| {
            let guard = Arc::clone(&guard);
            relay.subscribe(move |changes: &ListChanges| {
                let _ = &guard;
                callback(changes);
            })
        })
    }

    /// Duplicate-key warnings and addressing errors; see
    /// [`KeyedDiagnostic`]. The differ proceeds past every condition
    /// reported here.
    pub fn diagnostics(&self) -> Stream<KeyedDiagnostic> {
        let relay = self.shared.diagnostics.clone();
        let guard = Arc::clone(&self.guard);
        Stream::new(move |callback| {
            let guard = Arc::clone(&guard);
            relay.subscribe(move |diagnostic: &KeyedDiagnostic| {
                let _ = &guard;
                callback(diagnostic);
            })
        })
    }
}

impl std::fmt::Debug for KeyedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedState")
            .field("path", self.shared.state.path())
            .finish()
    }
}

/// A node addressed by item identity instead of position.
///
/// Carries the full node surface; reads and subscriptions chase the item
/// across reorders, and writes are traced through the item's current index
/// with the key→index map stamped on the sequence hop.
#[derive(Clone)]
pub struct ItemState {
    shared: Arc<CoreShared>,
    guard: Arc<CoreGuard>,
    canon: String,
    rel: Path,
}

impl ItemState {
    /// Canonical form of the item key this state tracks.
    pub fn item_key(&self) -> &str {
        &self.canon
    }

    /// The current value, or `Ok(None)` while the item (or the addressed
    /// location inside it) is absent.
    ///
    /// Fails like [`State::get`](crate::State::get) when the item-relative
    /// path descends through a leaf.
    pub fn get(&self) -> StateResult<Option<Value>> {
        let inner = self.shared.inner.lock().unwrap();
        let Some(&index) = inner.index.get(&self.canon) else {
            return Ok(None);
        };
        let Some(item) = inner.seq.as_ref().and_then(|seq| seq.get(index)) else {
            return Ok(None);
        };
        pluck(item, &self.rel).map(|value| value.cloned())
    }

    /// The child of this item state under `key`.
    pub fn sub(&self, key: impl Into<Key>) -> ItemState {
        ItemState {
            shared: Arc::clone(&self.shared),
            guard: Arc::clone(&self.guard),
            canon: self.canon.clone(),
            rel: self.rel.child(key.into()),
        }
    }

    /// Subscribe to this item location's values.
    ///
    /// Replays the current value immediately; after the item is deleted the
    /// sink receives `None` once and stays quiet until the key reappears.
    /// An emission whose item-relative address cannot be plucked (the path
    /// descends through a leaf inside the item) is skipped with a warning.
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(Option<&Value>) + Send + Sync + 'static,
    {
        let canon = self.canon.clone();
        let rel = self.rel.clone();
        let eq = self.shared.state.equality();
        let guard = Arc::clone(&self.guard);
        let last: Mutex<Option<Option<Value>>> = Mutex::new(None);
        self.shared.updates.subscribe(move |update: &SeqUpdate| {
            let _ = &guard;
            let next = match item_value(update, &canon, &rel) {
                Ok(value) => value,
                Err(err) => {
                    warn!(key = %canon, %err, "skipping item emission over bad address");
                    return;
                }
            };
            {
                let mut seen = last.lock().unwrap();
                match &*seen {
                    Some(prev) if opt_eq(&eq, prev.as_ref(), next.as_ref()) => return,
                    _ => *seen = Some(next.clone()),
                }
            }
            f(next.as_ref());
        })
    }

    /// Write a new value at this item location.
    ///
    /// Fails with [`StateError::UnknownItemKey`] when no item currently
    /// carries the key, or [`StateError::NotASequence`] when the wrapped
    /// node does not hold a sequence at all. The emitted trace descends
    /// through the item's current index, with the key→index map stamped on
    /// the sequence hop.
    pub fn set(&self, to: Value) -> StateResult<()> {
        let (index, keys) = {
            let inner = self.shared.inner.lock().unwrap();
            (inner.index.get(&self.canon).copied(), inner.index.clone())
        };
        let Some(index) = index else {
            let path = self.shared.state.path().clone();
            return Err(match self.shared.state.get() {
                Ok(Some(value)) if !value.is_array() => {
                    StateError::not_a_sequence(path, value_type_name(&value))
                }
                _ => StateError::unknown_item_key(path, self.canon.clone()),
            });
        };

        let mut node = self.shared.state.sub(Key::Index(index));
        for key in &self.rel {
            node = node.sub(key.clone());
        }
        let mut change = node.make_change(to);
        if let Some(trace) = change.trace.as_mut() {
            trace.annotate_keys(self.shared.state.path().len(), keys);
        }
        node.push_change(change);
        Ok(())
    }

    /// Read-modify-write convenience over [`set`](Self::set).
    pub fn update(&self, f: impl FnOnce(Option<&Value>) -> Value) -> StateResult<()> {
        let current = self.get()?;
        self.set(f(current.as_ref()))
    }
}

impl std::fmt::Debug for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemState")
            .field("path", self.shared.state.path())
            .field("key", &self.canon)
            .field("rel", &self.rel)
            .finish()
    }
}

fn item_value(update: &SeqUpdate, canon: &str, rel: &Path) -> StateResult<Option<Value>> {
    let Some(&index) = update.index.get(canon) else {
        return Ok(None);
    };
    let Some(item) = update.seq.as_ref().and_then(|seq| seq.get(index)) else {
        return Ok(None);
    };
    pluck(item, rel).map(|value| value.cloned())
}

fn build_index(
    items: &[Value],
    key_fn: &KeyFn,
    diagnostics: &mut Vec<KeyedDiagnostic>,
) -> KeyIndexMap {
    let mut index = KeyIndexMap::new();
    for (i, item) in items.iter().enumerate() {
        let key = item_key(&key_fn(item));
        match index.get(&key) {
            Some(&kept_index) => diagnostics.push(KeyedDiagnostic::DuplicateKey {
                key,
                index: i,
                kept_index,
            }),
            None => {
                index.insert(key, i);
            }
        }
    }
    index
}

fn diff_keyed(
    prev_index: &KeyIndexMap,
    prev_items: &[Value],
    next_index: &KeyIndexMap,
    next_items: &[Value],
) -> ListChanges {
    let mut changes = ListChanges::default();
    for (key, &old_index) in prev_index {
        if !next_index.contains_key(key) {
            changes.deletions.push(Deletion {
                index: old_index,
                item: prev_items[old_index].clone(),
            });
        }
    }
    for (key, &new_index) in next_index {
        match prev_index.get(key) {
            None => changes.additions.push(Addition {
                index: new_index,
                item: next_items[new_index].clone(),
            }),
            Some(&old_index) if old_index != new_index => changes.moves.push(Move {
                old_index,
                new_index,
                item: next_items[new_index].clone(),
            }),
            Some(_) => {}
        }
    }
    changes.deletions.sort_by_key(|d| d.index);
    changes.additions.sort_by_key(|a| a.index);
    changes.moves.sort_by_key(|m| m.old_index);
    changes
}
