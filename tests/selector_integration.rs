//! Integration tests for selector caching behavior.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use selcache::types::config::SelectorConfig;
use selcache::{EqualityPolicy, FieldMap, SelcacheError, SelectorBuilder, Value};

fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let runs = Arc::new(AtomicUsize::new(0));
    (runs.clone(), runs)
}

fn doubler(runs: Arc<AtomicUsize>) -> SelectorBuilder<i64, i64> {
    SelectorBuilder::<i64>::new()
        .field("value", |x: &i64, _| Value::Int(*x))
        .result(move |fields: &FieldMap, _| {
            runs.fetch_add(1, Ordering::SeqCst);
            fields.int("value").unwrap_or_default() * 2
        })
}

#[test]
fn test_worked_example() {
    let (runs, transforms) = counter();
    let selector = doubler(runs).build().unwrap();

    let first = selector.call(&1);
    let again = selector.call(&1);
    assert_eq!(*first, 2);
    assert!(Arc::ptr_eq(&first, &again));

    let two = selector.call(&2);
    assert_eq!(*two, 4);

    let third = selector.call(&1);
    assert_eq!(*third, 2);
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(transforms.load(Ordering::SeqCst), 3);
}

#[test]
fn test_idempotent_with_constant_input() {
    let (runs, transforms) = counter();
    let selector = doubler(runs).build().unwrap();

    let first = selector.call(&21);
    for _ in 0..10 {
        assert!(Arc::ptr_eq(&first, &selector.call(&21)));
    }

    assert_eq!(transforms.load(Ordering::SeqCst), 1);
    let stats = selector.stats();
    assert_eq!((stats.calls, stats.hits, stats.misses), (11, 10, 1));
}

#[test]
fn test_eviction_order() {
    let (runs, transforms) = counter();
    let selector = doubler(runs).capacity(3).build().unwrap();

    let first = selector.call(&1);
    selector.call(&2);
    selector.call(&3);
    // most recent three still cached
    assert!(Arc::ptr_eq(&first, &selector.call(&1)));

    selector.call(&4);
    selector.call(&5);
    selector.call(&6);
    assert_eq!(selector.len(), 3);

    let recomputed = selector.call(&1);
    assert!(!Arc::ptr_eq(&first, &recomputed));
    assert_eq!(transforms.load(Ordering::SeqCst), 7);
    assert_eq!(selector.stats().evictions, 4);
}

#[test]
fn test_unbounded_capacity_keeps_every_input() {
    let (runs, transforms) = counter();
    let selector = doubler(runs).capacity(0).build().unwrap();

    let results: Vec<_> = (0..50).map(|i| selector.call(&i)).collect();
    for (i, result) in results.iter().enumerate() {
        assert!(Arc::ptr_eq(result, &selector.call(&(i as i64))));
    }

    assert_eq!(transforms.load(Ordering::SeqCst), 50);
    assert_eq!(selector.stats().evictions, 0);
}

#[test]
fn test_keyed_isolation_and_clear() {
    let (runs, transforms) = counter();
    let selector = doubler(runs)
        .build_keyed(|list: &String| vec![Value::from(list.as_str())])
        .unwrap();

    let inbox = selector.call(&"inbox".to_string(), &1).unwrap();
    let sent = selector.call(&"sent".to_string(), &1).unwrap();
    // same input under another key never shares a slot
    assert!(!Arc::ptr_eq(&inbox, &sent));
    assert!(Arc::ptr_eq(
        &inbox,
        &selector.call(&"inbox".to_string(), &1).unwrap()
    ));
    assert_eq!(transforms.load(Ordering::SeqCst), 2);

    selector.clear();
    assert_eq!(selector.key_count(), 0);

    let after = selector.call(&"inbox".to_string(), &1).unwrap();
    assert!(!Arc::ptr_eq(&inbox, &after));
    assert_eq!(transforms.load(Ordering::SeqCst), 3);
}

#[test]
fn test_key_elements_reach_field_and_result_functions() {
    let selector = SelectorBuilder::<Vec<i64>>::with_equality(EqualityPolicy::by_value())
        .field("offset", |_: &Vec<i64>, key| key[0].clone())
        .field("sum", |items: &Vec<i64>, _| Value::Int(items.iter().sum()))
        .result(|fields: &FieldMap, key| {
            let label = key[1].as_str().unwrap_or_default().to_string();
            let total = fields.int("sum").unwrap_or_default() + fields.int("offset").unwrap_or_default();
            format!("{}={}", label, total)
        })
        .build_keyed(|args: &(i64, &'static str)| vec![Value::Int(args.0), Value::from(args.1)])
        .unwrap();

    let result = selector.call(&(10, "total"), &vec![1, 2, 3]).unwrap();
    assert_eq!(result.as_str(), "total=16");

    let err = selector
        .key_tuple(vec![Value::Int(10)])
        .unwrap_err();
    assert!(matches!(
        err,
        SelcacheError::KeyArity {
            expected: 2,
            actual: 1
        }
    ));
}

#[test]
fn test_field_gating() {
    let (runs, transforms) = counter();
    // every input maps to the same slot; only fields decide
    let selector = SelectorBuilder::<(i64, i64)>::new()
        .equality(|_, _| true)
        .field("a", |input: &(i64, i64), _| Value::Int(input.0))
        .field("b", |input: &(i64, i64), _| Value::Int(input.1))
        .result(move |fields: &FieldMap, _| {
            runs.fetch_add(1, Ordering::SeqCst);
            fields.int("a").unwrap_or_default() + fields.int("b").unwrap_or_default()
        })
        .build()
        .unwrap();

    let first = selector.call(&(1, 1));
    let changed_a = selector.call(&(2, 1));
    assert!(!Arc::ptr_eq(&first, &changed_a));
    assert_eq!(transforms.load(Ordering::SeqCst), 2);

    let unchanged = selector.call(&(2, 1));
    assert!(Arc::ptr_eq(&changed_a, &unchanged));
    assert_eq!(transforms.load(Ordering::SeqCst), 2);
}

#[test]
fn test_shared_references_compare_by_identity() {
    let (runs, transforms) = counter();
    let selector = SelectorBuilder::<Arc<Vec<i64>>>::new()
        .field("items", |items: &Arc<Vec<i64>>, _| Value::from_arc(items.clone()))
        .result(move |fields: &FieldMap, _| {
            runs.fetch_add(1, Ordering::SeqCst);
            fields.downcast::<Vec<i64>>("items").map_or(0, Vec::len)
        })
        .build()
        .unwrap();

    let items = Arc::new(vec![1, 2, 3]);
    let first = selector.call(&items);
    assert!(Arc::ptr_eq(&first, &selector.call(&items.clone())));

    // equal content, new allocation: a change
    let copy = Arc::new(vec![1, 2, 3]);
    let second = selector.call(&copy);
    assert_eq!(*second, 3);
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(transforms.load(Ordering::SeqCst), 2);
}

#[test]
fn test_by_value_equality_is_opt_in() {
    let identity = SelectorBuilder::<Arc<String>>::new()
        .field("len", |s: &Arc<String>, _| Value::Int(s.len() as i64))
        .build()
        .unwrap();
    identity.call(&Arc::new("abc".to_string()));
    identity.call(&Arc::new("abc".to_string()));
    assert_eq!(identity.stats().misses, 2);

    let by_value = SelectorBuilder::<Arc<String>>::new()
        .equality_policy(EqualityPolicy::by_value())
        .field("len", |s: &Arc<String>, _| Value::Int(s.len() as i64))
        .build()
        .unwrap();
    let first = by_value.call(&Arc::new("abc".to_string()));
    let second = by_value.call(&Arc::new("abc".to_string()));
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.int("len"), Some(3));
}

#[test]
fn test_panic_leaves_cache_consistent() {
    let explode = Arc::new(AtomicBool::new(false));
    let trigger = explode.clone();
    let selector = SelectorBuilder::<i64>::new()
        .field("value", |x: &i64, _| Value::Int(*x))
        .result(move |fields: &FieldMap, _| {
            if trigger.load(Ordering::SeqCst) {
                panic!("transform failed");
            }
            fields.int("value").unwrap_or_default()
        })
        .capacity(2)
        .build()
        .unwrap();

    let first = selector.call(&1);

    explode.store(true, Ordering::SeqCst);
    let outcome = catch_unwind(AssertUnwindSafe(|| selector.call(&2)));
    assert!(outcome.is_err());
    explode.store(false, Ordering::SeqCst);

    assert!(Arc::ptr_eq(&first, &selector.call(&1)));
    assert_eq!(*selector.call(&2), 2);
}

#[test]
fn test_build_validation() {
    assert!(matches!(
        SelectorBuilder::<i64>::new().build(),
        Err(SelcacheError::Config(_))
    ));

    let duplicate = SelectorBuilder::<i64>::new()
        .field("v", |x: &i64, _| Value::Int(*x))
        .field_group(|x: &i64, _| FieldMap::new().with("w", *x))
        .field("v", |x: &i64, _| Value::Int(*x))
        .build();
    assert!(matches!(duplicate, Err(SelcacheError::Config(_))));
}

#[test]
fn test_profile_from_config() {
    let (runs, transforms) = counter();
    let profile = SelectorConfig {
        capacity: 2,
        ttl_ms: None,
        max_keys: Some(1),
    };
    let selector = doubler(runs)
        .config(&profile)
        .build_keyed(|id: &i64| vec![Value::Int(*id)])
        .unwrap();

    let a = selector.call(&1, &5).unwrap();
    selector.call(&1, &6).unwrap();
    assert!(Arc::ptr_eq(&a, &selector.call(&1, &5).unwrap()));

    // second key exceeds max_keys and resets the tree
    selector.call(&2, &5).unwrap();
    assert_eq!(selector.key_count(), 1);
    assert_eq!(selector.stats().key_resets, 1);
    assert!(!Arc::ptr_eq(&a, &selector.call(&1, &5).unwrap()));
    assert_eq!(transforms.load(Ordering::SeqCst), 4);
}

#[test]
fn test_field_group_entries_diffed_individually() {
    let (runs, transforms) = counter();
    let stable = Value::shared(vec![1, 2, 3]);
    // one slot for every input; the group alone decides
    let selector = SelectorBuilder::<i64>::new()
        .equality(|_, _| true)
        .field_group(move |x: &i64, _| {
            FieldMap::new()
                .with("b", stable.clone())
                .with("c", *x)
        })
        .result(move |fields: &FieldMap, _| {
            runs.fetch_add(1, Ordering::SeqCst);
            let len = fields.downcast::<Vec<i32>>("b").map_or(0, Vec::len) as i64;
            len + fields.int("c").unwrap_or_default()
        })
        .build()
        .unwrap();

    let first = selector.call(&1);
    assert_eq!(*first, 4);
    assert!(Arc::ptr_eq(&first, &selector.call(&1)));
    assert_eq!(transforms.load(Ordering::SeqCst), 1);

    // `b` keeps its identity, `c` changes
    let changed = selector.call(&2);
    assert_eq!(*changed, 5);
    assert!(!Arc::ptr_eq(&first, &changed));
    assert_eq!(transforms.load(Ordering::SeqCst), 2);

    assert!(Arc::ptr_eq(&changed, &selector.call(&2)));
    assert_eq!(transforms.load(Ordering::SeqCst), 2);
}
