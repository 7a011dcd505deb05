//! End-to-end propagation through the root binding.

use rill_state::{path, pluck, root, root_with_equality, State, StateError, Subscription};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

fn record(state: &State) -> (Arc<Mutex<Vec<Option<Value>>>>, Subscription) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let sub = state.subscribe(move |v| sink.lock().unwrap().push(v.cloned()));
    (seen, sub)
}

#[test]
fn sub_subscription_survives_root_replacement() {
    let tree = root(json!([
        {"name": "John"},
        {"name": "Jack"},
        {"name": "Jill"},
    ]));
    let name = tree.sub(1).sub("name");
    let (seen, _sub) = record(&name);
    assert_eq!(*seen.lock().unwrap(), vec![Some(json!("Jack"))]);

    // Prepend an item: index 1 now holds what index 0 held.
    let mut next = vec![json!({"name": "Julia"})];
    next.extend(tree.get().unwrap().unwrap().as_array().unwrap().clone());
    tree.set(Value::Array(next));

    assert_eq!(
        *seen.lock().unwrap(),
        vec![Some(json!("Jack")), Some(json!("John"))]
    );
}

#[test]
fn mid_level_write_reaches_leaf_subscription() {
    let tree = root(json!([
        {"name": "John"},
        {"name": "Jack"},
    ]));
    let (seen, _sub) = record(&tree.sub(1).sub("name"));

    tree.sub(1).set(json!({"name": "Josef"}));

    assert_eq!(
        *seen.lock().unwrap(),
        vec![Some(json!("Jack")), Some(json!("Josef"))]
    );
}

#[test]
fn every_emission_equals_pluck_of_root() {
    let tree = root(json!({"a": {"b": 1}, "c": 2}));
    let node = tree.sub("a").sub("b");
    let probe = tree.clone();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _sub = node.subscribe(move |v| {
        let root_value = probe.get().unwrap().unwrap();
        let plucked = pluck(&root_value, &path!("a", "b")).unwrap().cloned();
        sink.lock().unwrap().push((v.cloned(), plucked));
    });

    node.set(json!(2));
    tree.sub("a").set(json!({"b": 3}));
    tree.set(json!({"a": {"b": 4}}));

    for (observed, plucked) in seen.lock().unwrap().iter() {
        assert_eq!(observed, plucked);
    }
    assert_eq!(seen.lock().unwrap().len(), 4);
}

#[test]
fn disjoint_writes_do_not_emit() {
    let tree = root(json!({"p": {"x": 1}, "q": {"y": 2}}));
    let (seen, _sub) = record(&tree.sub("p").sub("x"));

    tree.sub("q").sub("y").set(json!(3));
    tree.sub("q").set(json!({"y": 4}));

    assert_eq!(*seen.lock().unwrap(), vec![Some(json!(1))]);
}

#[test]
fn root_set_round_trip() {
    let tree = root(json!({"a": 1}));
    tree.set(json!({"b": 2}));
    assert_eq!(tree.get().unwrap(), Some(json!({"b": 2})));
}

#[test]
fn deep_set_round_trip() {
    let tree = root(json!({"users": [{"name": "Jack"}]}));
    let node = tree.sub("users").sub(0).sub("name");
    node.set(json!("Jill"));
    let root_value = tree.get().unwrap().unwrap();
    assert_eq!(
        pluck(&root_value, &path!("users", 0, "name")).unwrap(),
        Some(&json!("Jill"))
    );
}

#[test]
fn observed_values_are_a_subsequence_of_root_values() {
    let tree = root(json!({"n": 0, "other": 0}));
    let n = tree.sub("n");
    let (seen, _sub) = record(&n);

    // Interleave relevant and irrelevant writes, including a no-op.
    n.set(json!(1));
    tree.sub("other").set(json!(1));
    n.set(json!(1));
    n.set(json!(2));

    assert_eq!(
        *seen.lock().unwrap(),
        vec![Some(json!(0)), Some(json!(1)), Some(json!(2))]
    );
}

#[test]
fn wholesale_root_replacement_filters_unchanged_subtrees() {
    let tree = root(json!({"a": 1, "b": 2}));
    let (seen_a, _sa) = record(&tree.sub("a"));
    let (seen_b, _sb) = record(&tree.sub("b"));

    // Replace the root with a value that only changes `b`.
    tree.set(json!({"a": 1, "b": 3}));

    assert_eq!(*seen_a.lock().unwrap(), vec![Some(json!(1))]);
    assert_eq!(
        *seen_b.lock().unwrap(),
        vec![Some(json!(2)), Some(json!(3))]
    );
}

#[test]
fn custom_equality_controls_dedup() {
    // Numbers compare equal modulo 10.
    let tree = root_with_equality(
        json!(1),
        Arc::new(|a: &Value, b: &Value| {
            a.as_i64().map(|n| n % 10) == b.as_i64().map(|n| n % 10)
        }),
    );
    let (seen, _sub) = record(&tree);

    tree.set(json!(11)); // equal mod 10: suppressed
    tree.set(json!(12)); // distinct: emitted

    assert_eq!(*seen.lock().unwrap(), vec![Some(json!(1)), Some(json!(12))]);
    // The retained root still took the suppressed write.
    assert_eq!(tree.get().unwrap(), Some(json!(12)));
}

#[test]
fn failed_apply_is_local_and_later_writes_proceed() {
    let tree = root(json!({"items": [1, 2]}));
    let (seen, _sub) = record(&tree.sub("items").sub(0));

    // Out of bounds: dropped at the root, nothing observed anywhere.
    tree.sub("items").sub(9).set(json!(0));
    tree.sub("items").sub(0).set(json!(7));

    assert_eq!(
        *seen.lock().unwrap(),
        vec![Some(json!(1)), Some(json!(7))]
    );
    assert_eq!(tree.get().unwrap(), Some(json!({"items": [7, 2]})));
}

#[test]
fn addressing_error_is_surfaced_on_the_offending_node() {
    let tree = root(json!({"count": 7, "other": 1}));
    let bad = tree.sub("count").sub("nested");

    // The offending sub-node reads as an error, not as absence.
    assert!(matches!(
        bad.get(),
        Err(StateError::TypeMismatch { .. })
    ));
    // A sibling address that is merely missing reads as absent.
    assert_eq!(tree.sub("missing").get().unwrap(), None);

    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let _diag = bad
        .diagnostics()
        .subscribe(move |e: &StateError| sink.lock().unwrap().push(e.clone()));
    let (bad_seen, _bs) = record(&bad);
    let (parent_seen, _ps) = record(&tree.sub("count"));

    tree.sub("count").set(json!(8));

    // Subscribe-time delivery and the write each raised the error.
    assert_eq!(errors.lock().unwrap().len(), 2);
    // The error stayed local: no value emission on the bad node, while the
    // parent kept emitting normally.
    assert!(bad_seen.lock().unwrap().is_empty());
    assert_eq!(
        *parent_seen.lock().unwrap(),
        vec![Some(json!(7)), Some(json!(8))]
    );
}
