//! Integration tests for TTL expiry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use selcache::{ExpiryScheduler, FieldMap, ManualClock, SelectorBuilder, Value};

fn ttl_selector(
    ttl_ms: u64,
    scheduler: ExpiryScheduler,
    runs: Arc<AtomicUsize>,
) -> SelectorBuilder<i64, i64> {
    SelectorBuilder::<i64>::new()
        .name("ttl")
        .field("value", |x: &i64, _| Value::Int(*x))
        .result(move |fields: &FieldMap, _| {
            runs.fetch_add(1, Ordering::SeqCst);
            fields.int("value").unwrap_or_default()
        })
        .capacity(0)
        .ttl(Duration::from_millis(ttl_ms))
        .scheduler(scheduler)
}

#[tokio::test(start_paused = true)]
async fn test_ttl_scenario_with_tokio_timer() {
    let runs = Arc::new(AtomicUsize::new(0));
    let selector = ttl_selector(50, ExpiryScheduler::tokio(), runs.clone())
        .build()
        .unwrap();

    let first = selector.call(&7);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(Arc::ptr_eq(&first, &selector.call(&7)));
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(41)).await;
    // the reap already emptied the whole cache
    assert!(selector.is_empty());

    let second = selector.call(&7);
    assert_eq!(*second, 7);
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(selector.stats().expirations, 1);
}

#[tokio::test(start_paused = true)]
async fn test_expiry_clears_every_slot() {
    let runs = Arc::new(AtomicUsize::new(0));
    let selector = ttl_selector(50, ExpiryScheduler::tokio(), runs)
        .build()
        .unwrap();

    selector.call(&1);
    tokio::time::sleep(Duration::from_millis(30)).await;
    selector.call(&2);
    assert_eq!(selector.len(), 2);

    // first entry is due at 50; slot 2 would live until 80
    tokio::time::sleep(Duration::from_millis(25)).await;
    assert!(selector.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_keyed_expiry_is_per_instance() {
    let runs = Arc::new(AtomicUsize::new(0));
    let selector = ttl_selector(20, ExpiryScheduler::tokio(), runs)
        .build_keyed(|id: &i64| vec![Value::Int(*id)])
        .unwrap();

    let a = selector.key(&1).unwrap();
    a.call(&1);
    tokio::time::sleep(Duration::from_millis(10)).await;
    let b = selector.key(&2).unwrap();
    b.call(&1);

    tokio::time::sleep(Duration::from_millis(15)).await;
    assert!(a.is_empty());
    assert!(!b.is_empty());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(b.is_empty());
    assert_eq!(selector.key_count(), 2);
}

#[test]
fn test_manual_scheduler_is_deterministic() {
    let clock = ManualClock::new();
    let scheduler = ExpiryScheduler::manual(clock.clone());
    let runs = Arc::new(AtomicUsize::new(0));
    let selector = ttl_selector(50, scheduler.clone(), runs.clone())
        .build()
        .unwrap();

    let first = selector.call(&3);
    assert_eq!(scheduler.pending(), 0);
    assert_eq!(scheduler.flush(), 1);

    clock.advance(Duration::from_millis(10));
    assert_eq!(scheduler.run_due(), 0);
    assert!(Arc::ptr_eq(&first, &selector.call(&3)));

    clock.set_ms(51);
    assert_eq!(scheduler.run_due(), 1);
    assert!(selector.is_empty());

    let second = selector.call(&3);
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_lazy_expiry_without_reap() {
    let clock = ManualClock::new();
    let scheduler = ExpiryScheduler::manual(clock.clone());
    let runs = Arc::new(AtomicUsize::new(0));
    let selector = ttl_selector(50, scheduler, runs.clone())
        .build()
        .unwrap();

    let first = selector.call(&3);
    clock.set_ms(60);
    // no run_due: the slot is still rejected on access
    let second = selector.call(&3);
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_stale_reap_after_manual_clear_is_noop() {
    let clock = ManualClock::new();
    let scheduler = ExpiryScheduler::manual(clock.clone());
    let runs = Arc::new(AtomicUsize::new(0));
    let selector = ttl_selector(50, scheduler.clone(), runs)
        .build()
        .unwrap();

    selector.call(&1);
    selector.clear();

    clock.set_ms(50);
    assert_eq!(scheduler.run_due(), 1);
    assert!(selector.is_empty());
    assert_eq!(selector.stats().expirations, 0);
}

#[test]
fn test_reap_after_selector_dropped_is_noop() {
    let clock = ManualClock::new();
    let scheduler = ExpiryScheduler::manual(clock.clone());
    let runs = Arc::new(AtomicUsize::new(0));
    let selector = ttl_selector(5, scheduler.clone(), runs)
        .build()
        .unwrap();

    selector.call(&1);
    drop(selector);

    clock.set_ms(5);
    assert_eq!(scheduler.run_due(), 1);
}

#[test]
fn test_earlier_entry_clears_repopulated_cache() {
    let clock = ManualClock::new();
    let scheduler = ExpiryScheduler::manual(clock.clone());
    let runs = Arc::new(AtomicUsize::new(0));
    let selector = ttl_selector(50, scheduler.clone(), runs)
        .capacity(1)
        .build()
        .unwrap();

    selector.call(&1);
    clock.set_ms(40);
    // new input replaces the slot and arms a later entry
    selector.call(&2);

    clock.set_ms(50);
    assert_eq!(scheduler.run_due(), 1);
    assert!(selector.is_empty());
    assert_eq!(scheduler.pending(), 1);
}

fn current_thread_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

#[test]
fn test_scheduler_outlives_the_runtime_that_armed_it() {
    let scheduler = ExpiryScheduler::tokio();

    let first = current_thread_runtime();
    first.block_on(async {
        let runs = Arc::new(AtomicUsize::new(0));
        let short_lived = ttl_selector(20, scheduler.clone(), runs).build().unwrap();
        short_lived.call(&1);
        tokio::time::sleep(Duration::from_millis(1)).await;
    });
    drop(first);

    let second = current_thread_runtime();
    let runs = Arc::new(AtomicUsize::new(0));
    let selector = ttl_selector(20, scheduler.clone(), runs)
        .build()
        .unwrap();
    second.block_on(async {
        selector.call(&1);
        tokio::time::sleep(Duration::from_millis(10)).await;
        selector.call(&2);
        tokio::time::sleep(Duration::from_millis(60)).await;
    });

    assert!(selector.is_empty());
    assert!(selector.stats().expirations >= 1);
    assert_eq!(scheduler.pending(), 0);
}
