//! End-to-end properties of keyed and positional containers.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use rustc_hash::FxHasher;
use tessel_runtime::object::Regime;
use tessel_runtime::{ArrayValue, AttributeList, ObjectValue, Symbol, TupleValue, Value, intern, shape_trie};

fn threshold() -> usize {
    shape_trie().config().packed_threshold
}

fn key_names(obj: &ObjectValue) -> Vec<String> {
    obj.keys().map(|k| k.as_str().to_owned()).collect()
}

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

fn numbered_keys(prefix: &str, count: usize) -> Vec<Symbol> {
    (0..count).map(|i| intern(&format!("{prefix}{i}"))).collect()
}

// =============================================================================
// Shape Sharing
// =============================================================================

#[test]
fn same_insertion_order_shares_shape() {
    let mut a = ObjectValue::new();
    let mut b = AttributeList::new();
    for (i, key) in numbered_keys("share", 5).into_iter().enumerate() {
        a.put(key.clone(), Value::Int(i as i64)).unwrap();
        b.put(key, Value::Bool(true)).unwrap();
    }
    assert!(Arc::ptr_eq(a.shape(), b.shape()));
}

#[test]
fn persistent_and_in_place_growth_share_shape() {
    let mut in_place = ObjectValue::new();
    in_place.put("p", Value::Int(1)).unwrap();
    in_place.put("q", Value::Int(2)).unwrap();

    let persistent = ObjectValue::new()
        .updated("p", Value::Int(1))
        .updated("q", Value::Int(2));

    assert!(Arc::ptr_eq(in_place.shape(), persistent.shape()));
}

// =============================================================================
// Regime Transitions
// =============================================================================

#[test]
fn concrete_scenario_xyzw() {
    let mut obj = ObjectValue::new();
    for (key, value) in [("x", 1), ("y", 2), ("z", 3), ("w", 4)] {
        obj.put(key, Value::Int(value)).unwrap();
    }

    assert_eq!(obj.len(), 4);
    assert_eq!(obj.get_named("w"), Some(&Value::Int(4)));
    assert_eq!(key_names(&obj), ["x", "y", "z", "w"]);

    obj.remove(&intern("y")).unwrap();
    assert_eq!(key_names(&obj), ["x", "z", "w"]);
    assert_eq!(obj.len(), 3);
}

#[test]
fn insertion_order_survives_every_regime() {
    let keys = numbered_keys("order", threshold() + 6);
    let mut obj = ObjectValue::new();
    let mut regimes = Vec::new();

    for (i, key) in keys.iter().enumerate() {
        obj.put(key.clone(), Value::Int(i as i64)).unwrap();
        if regimes.last() != Some(&obj.regime()) {
            regimes.push(obj.regime());
        }
        let seen: Vec<&Symbol> = obj.keys().collect();
        assert_eq!(seen, keys[..=i].iter().collect::<Vec<_>>());
    }

    assert_eq!(regimes, [Regime::Inline, Regime::Packed, Regime::Dictionary]);
}

#[test]
fn size_tracks_shape_until_dictionary() {
    let mut obj = ObjectValue::new();
    for (i, key) in numbered_keys("size", threshold() + 2).into_iter().enumerate() {
        obj.put(key, Value::Nothing).unwrap();
        assert_eq!(obj.len(), i + 1);
        if obj.regime() != Regime::Dictionary {
            assert_eq!(obj.shape().len(), obj.len());
        } else {
            assert!(obj.shape().is_dictionary());
        }
    }
}

// =============================================================================
// Copy-on-Write Isolation
// =============================================================================

#[test]
fn clone_isolation_is_symmetric() {
    for count in [3, 6, threshold() + 3] {
        let keys = numbered_keys("iso", count);
        let original: ObjectValue = keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.clone(), Value::Int(i as i64)))
            .collect();
        let snapshot: Vec<(Symbol, Value)> =
            original.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

        let mut a = original.clone();
        let mut b = a.clone();

        b.put(keys[0].clone(), Value::from("changed")).unwrap();
        b.put("iso_extra", Value::Nothing).unwrap();
        b.remove(&keys[1]).unwrap();
        let a_pairs: Vec<(Symbol, Value)> =
            a.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        assert_eq!(a_pairs, snapshot);

        a.put(keys[0].clone(), Value::Bool(false)).unwrap();
        assert_eq!(b.get(&keys[0]), Some(&Value::from("changed")));
        assert_eq!(b.get(&keys[count - 1]), Some(&Value::Int(count as i64 - 1)));
        assert_eq!(original, snapshot.into_iter().collect::<ObjectValue>());
    }
}

#[test]
fn nested_clone_isolation() {
    let mut inner = ObjectValue::new();
    inner.put("n", Value::Int(1)).unwrap();
    let mut outer = ArrayValue::new();
    outer.add(Value::from(inner)).unwrap();

    let copy = outer.clone();
    let Value::Object(mut nested) = outer.get(0).unwrap().clone() else {
        panic!("expected object");
    };
    nested.put("n", Value::Int(2)).unwrap();
    outer.set(0, Value::Object(nested)).unwrap();

    assert_eq!(copy.get(0).unwrap().as_object().unwrap().get_named("n"), Some(&Value::Int(1)));
    assert_eq!(outer.get(0).unwrap().as_object().unwrap().get_named("n"), Some(&Value::Int(2)));
}

// =============================================================================
// Persistent API
// =============================================================================

#[test]
fn persistent_api_never_mutates_receiver() {
    for count in [1, 3, 5, threshold() + 2] {
        let obj: ObjectValue = numbered_keys("pers", count)
            .into_iter()
            .map(|k| (k, Value::Int(0)))
            .collect();
        let before = format!("{obj}");

        let _ = obj.updated("pers0", Value::Int(1));
        let _ = obj.updated("pers_new", Value::Int(1));
        let _ = obj.removed(&intern("pers0"));
        let _ = obj.updated_all([(intern("pers_bulk"), Value::Nothing)]);

        assert_eq!(format!("{obj}"), before);
    }

    let array: ArrayValue = (0..4).map(Value::Int).collect();
    let _ = array.appended(Value::Nothing);
    let _ = array.removed(0).unwrap();
    assert_eq!(array.len(), 4);

    let tuple: TupleValue = [Value::Int(1)].into_iter().collect();
    let _ = tuple.appended_named(intern("t"), Value::Int(2)).unwrap();
    assert_eq!(tuple.len(), 1);
}

#[test]
fn round_trip_through_dictionary_to_empty() {
    let keys = numbered_keys("trip", threshold() + 4);
    let mut obj = ObjectValue::new();
    for key in &keys {
        obj = obj.updated(key.clone(), Value::Int(1));
    }
    assert_eq!(obj.regime(), Regime::Dictionary);

    let mut regimes = Vec::new();
    for key in &keys {
        obj = obj.removed(key);
        regimes.push(obj.regime());
    }

    assert!(obj.is_empty());
    assert_eq!(obj, ObjectValue::new());
    assert!(regimes.contains(&Regime::Packed));
    assert_eq!(regimes.last(), Some(&Regime::Inline));
}

// =============================================================================
// Equality and Hashing
// =============================================================================

#[test]
fn equality_ignores_shape_and_regime() {
    let mut inline = ObjectValue::new();
    inline.put("a", Value::Int(1)).unwrap();
    inline.put("b", Value::Int(2)).unwrap();

    let extras = numbered_keys("seed", threshold() + 1);
    let mut dictionary = ObjectValue::new();
    for key in &extras {
        dictionary.put(key.clone(), Value::Nothing).unwrap();
    }
    dictionary.put("b", Value::Int(2)).unwrap();
    dictionary.put("a", Value::Int(1)).unwrap();
    for key in &extras {
        dictionary.remove(key).unwrap();
    }

    assert_eq!(inline.regime(), Regime::Inline);
    assert_eq!(dictionary.regime(), Regime::Dictionary);
    assert_eq!(inline, dictionary);
    assert_eq!(hash_of(&inline), hash_of(&dictionary));
    assert_eq!(hash_of(&Value::from(inline)), hash_of(&Value::from(dictionary)));
}

// =============================================================================
// Commit
// =============================================================================

#[test]
fn commit_freezes_reachable_values() {
    let mut inner = ArrayValue::new();
    inner.add(Value::Int(1)).unwrap();
    let mut tuple = TupleValue::new();
    tuple.add_named(intern("list"), Value::Array(inner)).unwrap();
    let mut obj = ObjectValue::new();
    obj.put("tuple", Value::Tuple(tuple)).unwrap();

    let value = Value::from(obj);
    value.commit();

    let tuple = value.as_object().unwrap().get_named("tuple").unwrap().as_tuple().unwrap();
    assert!(tuple.is_committed());
    assert!(tuple.get_by_name(&intern("list")).unwrap().is_committed());

    let mut editable = value.as_object().unwrap().mutable_copy();
    editable.put("added", Value::Nothing).unwrap();
    assert!(value.as_object().unwrap().get_named("added").is_none());
}

#[test]
fn errors_carry_taxonomy() {
    let mut obj = ObjectValue::new();
    obj.commit();
    assert_eq!(obj.put("x", Value::Nothing).unwrap_err().category(), "ImmutabilityViolation");

    let mut array = ArrayValue::new();
    assert_eq!(array.remove(0).unwrap_err().category(), "BoundsViolation");
    assert_eq!(array.subrange(1, 0).unwrap_err().category(), "InvalidArgument");
}

#[test]
fn notation_renders_nested_values() {
    let mut obj = ObjectValue::new();
    obj.put("x", Value::Int(1)).unwrap();
    obj.put("list", Value::Array((1..=2).map(Value::Int).collect())).unwrap();
    obj.put(
        "pair",
        Value::Tuple(
            TupleValue::from_entries([(None, Value::Float(0.5)), (Some(intern("s")), Value::from("t"))])
                .unwrap(),
        ),
    )
    .unwrap();

    assert_eq!(
        obj.to_string(),
        "Object(x = 1, list = Array(1, 2), pair = Tuple(0.5, s = \"t\"))"
    );
}
