//! Reading and immutably rewriting the value tree.
//!
//! `pluck` reads the value at a path; `graft` produces a fresh root with
//! the location addressed by a trace replaced. Neither mutates its input.
//!
//! The two sides classify addresses the same way: a hop errors on read
//! exactly where it would error on write (descending through a value of
//! the wrong shape), and reads as absent where a write would create the
//! field or miss it. The one exception is an out-of-range index, which
//! reads as absent but is rejected on write.

use crate::error::{value_type_name, StateError, StateResult};
use crate::{Key, Path, Trace, TraceStep};
use serde_json::{Map, Value};

/// Read the value at `path` within `root`.
///
/// Returns `Ok(None)` when a hop addresses a missing field, an
/// out-of-range index, or a field of `null`. Returns
/// [`StateError::TypeMismatch`] when a hop descends through a leaf (or
/// indexes a mapping, or names a field of a sequence); the error carries
/// the path of the wrongly-shaped value.
pub fn pluck<'a>(root: &'a Value, path: &Path) -> StateResult<Option<&'a Value>> {
    let mut current = root;
    for (depth, key) in path.iter().enumerate() {
        let next = match (key, current) {
            (Key::Field(name), Value::Object(map)) => map.get(name),
            (Key::Field(_), Value::Null) => None,
            (Key::Field(_), _) => {
                return Err(StateError::type_mismatch(
                    prefix_path(path, depth),
                    "mapping",
                    value_type_name(current),
                ));
            }
            (Key::Index(i), Value::Array(items)) => items.get(*i),
            (Key::Index(_), _) => {
                return Err(StateError::type_mismatch(
                    prefix_path(path, depth),
                    "sequence",
                    value_type_name(current),
                ));
            }
        };
        match next {
            Some(value) => current = value,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

fn prefix_path(path: &Path, depth: usize) -> Path {
    path.keys()[..depth].iter().cloned().collect()
}

/// Produce a new root in which the location addressed by `trace` is
/// replaced with `to`.
///
/// An absent trace replaces the root wholesale. Mapping hops create the
/// addressed field (and intermediate mappings over `null`) when missing;
/// sequence hops never grow the sequence. The input root is not modified.
pub fn graft(root: &Value, trace: Option<&Trace>, to: Value) -> StateResult<Value> {
    let Some(trace) = trace else {
        return Ok(to);
    };
    let mut next = root.clone();
    graft_at(&mut next, trace.steps(), to, trace)?;
    Ok(next)
}

fn graft_at(
    current: &mut Value,
    steps: &[TraceStep],
    to: Value,
    full: &Trace,
) -> StateResult<()> {
    match steps {
        [] => {
            *current = to;
            Ok(())
        }
        [step, rest @ ..] => match &step.key {
            Key::Field(name) => {
                if !current.is_object() {
                    if !current.is_null() {
                        return Err(StateError::type_mismatch(
                            full.to_path(),
                            "mapping",
                            value_type_name(current),
                        ));
                    }
                    *current = Value::Object(Map::new());
                }
                let obj = current.as_object_mut().unwrap();
                if rest.is_empty() {
                    obj.insert(name.clone(), to);
                } else {
                    let entry = obj.entry(name.clone()).or_insert(Value::Null);
                    graft_at(entry, rest, to, full)?;
                }
                Ok(())
            }
            Key::Index(idx) => {
                if !current.is_array() {
                    return Err(StateError::type_mismatch(
                        full.to_path(),
                        "sequence",
                        value_type_name(current),
                    ));
                }
                let arr = current.as_array_mut().unwrap();
                if *idx >= arr.len() {
                    return Err(StateError::index_out_of_bounds(
                        full.to_path(),
                        *idx,
                        arr.len(),
                    ));
                }
                if rest.is_empty() {
                    arr[*idx] = to;
                } else {
                    graft_at(&mut arr[*idx], rest, to, full)?;
                }
                Ok(())
            }
        },
    }
}
