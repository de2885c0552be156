//! End-to-end scenarios for eviction, expiration, single-flight loading,
//! and refresh-ahead, driven through a `ManualTicker` for deterministic
//! time control.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use talon_cache::{Cache, DirectExecutor, Error, FnLoader, ManualTicker, RemovalCause, WeakKey, WeakRef};

fn keys(mut v: Vec<u64>) -> Vec<u64> {
    v.sort_unstable();
    v
}

#[test]
fn size_eviction_order() {
    let cache: Cache<u64, char> = Cache::builder()
        .max_size(3)
        .executor(DirectExecutor)
        .build()
        .unwrap();

    cache.insert(1, 'a');
    cache.insert(2, 'b');
    cache.insert(3, 'c');
    assert_eq!(cache.get(&1), Some(Arc::new('a')));
    cache.insert(4, 'd');
    cache.clean_up();

    assert!(cache.get(&2).is_none(), "key 2 should have been evicted");
    assert_eq!(keys(cache.as_map().into_keys().collect()), vec![1, 3, 4]);
}

#[test]
fn write_expiry() {
    let ticker = Arc::new(ManualTicker::new());
    let cache: Cache<&'static str, u32> = Cache::builder()
        .max_size(100)
        .expire_after_write(Duration::from_nanos(10))
        .ticker(Arc::clone(&ticker))
        .executor(DirectExecutor)
        .build()
        .unwrap();

    cache.insert("k", 1);

    ticker.set(9);
    assert_eq!(cache.get(&"k"), Some(Arc::new(1)));

    ticker.set(11);
    assert!(cache.get(&"k").is_none());
}

#[test]
fn access_expiry_resets_on_read() {
    let ticker = Arc::new(ManualTicker::new());
    let cache: Cache<&'static str, u32> = Cache::builder()
        .max_size(100)
        .expire_after_access(Duration::from_nanos(10))
        .ticker(Arc::clone(&ticker))
        .executor(DirectExecutor)
        .build()
        .unwrap();

    cache.insert("k", 1);

    ticker.set(5);
    assert_eq!(cache.get(&"k"), Some(Arc::new(1)));

    // Deadline is now 5 + 10 = 15.
    ticker.set(12);
    assert_eq!(cache.get(&"k"), Some(Arc::new(1)));

    ticker.set(16);
    assert!(cache.get(&"k").is_none());
}

#[test]
fn single_flight_load_runs_once() {
    let cache: Arc<Cache<&'static str, u32>> =
        Arc::new(Cache::builder().max_size(100).build().unwrap());
    let invocations = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let loader = Arc::new(FnLoader({
        let invocations = Arc::clone(&invocations);
        move |_key: &&'static str| -> Result<u32, Error> {
            invocations.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            Ok(42)
        }
    }));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let cache = Arc::clone(&cache);
        let loader = Arc::clone(&loader);
        handles.push(std::thread::spawn(move || cache.get_with(&"x", loader.as_ref())));
    }

    for handle in handles {
        let value = handle.join().unwrap().unwrap();
        assert_eq!(*value, 42);
    }

    assert_eq!(invocations.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn refresh_ahead_eventually_sees_new_value() {
    let ticker = Arc::new(ManualTicker::new());
    let generation = Arc::new(std::sync::atomic::AtomicU32::new(1));

    let loader = {
        let generation = Arc::clone(&generation);
        FnLoader(move |_key: &&'static str| -> Result<u32, Error> {
            Ok(generation.load(std::sync::atomic::Ordering::SeqCst))
        })
    };

    let cache: Cache<&'static str, u32> = Cache::builder()
        .max_size(100)
        .refresh_after_write(Duration::from_nanos(10))
        .ticker(Arc::clone(&ticker))
        .loader(loader)
        .record_stats()
        .build()
        .unwrap();

    // Seed the entry directly; the initial `insert` must not count as a
    // loader invocation.
    cache.insert("k", 1);
    assert_eq!(cache.stats().load_success_count, 0);

    generation.store(2, std::sync::atomic::Ordering::SeqCst);
    ticker.set(11);

    // May still observe the stale value immediately; poll until the
    // background refresh has landed.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        if cache.get(&"k").as_deref() == Some(&2) {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "refresh never completed");
        std::thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(cache.stats().load_success_count, 1);
}

#[test]
fn weighted_eviction() {
    let cache: Cache<char, u64> = Cache::builder()
        .max_weight(10)
        .weigher(|_k: &char, v: &u64| *v)
        .executor(DirectExecutor)
        .build()
        .unwrap();

    cache.insert('a', 3);
    cache.insert('b', 4);
    cache.insert('c', 2);
    cache.insert('d', 5);
    cache.clean_up();

    let remaining = cache.as_map();
    assert!(!remaining.contains_key(&'a'));
    assert!(!remaining.contains_key(&'b'));
    assert!(remaining.contains_key(&'c'));
    assert!(remaining.contains_key(&'d'));
}

#[test]
fn invalidate_is_idempotent() {
    let notifications = Arc::new(Mutex::new(Vec::new()));
    let cache: Cache<&'static str, u32> = Cache::builder()
        .max_size(10)
        .executor(DirectExecutor)
        .removal_listener({
            let notifications = Arc::clone(&notifications);
            move |key: &&'static str, value: &u32, cause: RemovalCause| {
                notifications.lock().unwrap().push((*key, *value, cause));
            }
        })
        .build()
        .unwrap();

    cache.insert("k", 1);
    cache.invalidate(&"k");
    cache.invalidate(&"k");
    cache.clean_up();

    let fired = notifications.lock().unwrap();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0], ("k", 1, RemovalCause::Explicit));
}

#[test]
fn weak_values_are_reclaimed_once_external_strong_ref_drops() {
    let notifications = Arc::new(Mutex::new(Vec::new()));
    let cache: Cache<&'static str, WeakRef<String>> = Cache::builder()
        .max_size(100)
        .weak_values()
        .executor(DirectExecutor)
        .removal_listener({
            let notifications = Arc::clone(&notifications);
            move |key: &&'static str, _value: &WeakRef<String>, cause: RemovalCause| {
                notifications.lock().unwrap().push((*key, cause));
            }
        })
        .build()
        .unwrap();

    let strong = Arc::new(String::from("value"));
    cache.insert("k", WeakRef::new(&strong));
    assert!(cache.get(&"k").is_some(), "entry should be alive while `strong` is held");

    drop(strong);
    cache.clean_up();

    assert!(cache.get(&"k").is_none(), "entry should be gone once its only strong ref dropped");
    let fired = notifications.lock().unwrap();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0], ("k", RemovalCause::Collected));
}

#[test]
fn weak_keys_use_identity_not_value_equality() {
    let cache: Cache<WeakKey<u32>, &'static str> = Cache::builder()
        .max_size(100)
        .weak_keys()
        .executor(DirectExecutor)
        .build()
        .unwrap();

    let strong_a = Arc::new(5_u32);
    let key_a = WeakKey::new(&strong_a);
    cache.insert(key_a.clone(), "a");

    // Same value, different allocation: must not be treated as the same key.
    let strong_b = Arc::new(5_u32);
    let key_b = WeakKey::new(&strong_b);

    assert!(cache.get(&key_a).is_some(), "lookup by the original key must still hit");
    assert!(cache.get(&key_b).is_none(), "a distinct allocation with an equal value must miss");
}

#[test]
fn zero_duration_expiry_collapses_to_empty_cache() {
    let cache: Cache<&'static str, u32> = Cache::builder()
        .max_size(100)
        .expire_after_write(Duration::ZERO)
        .executor(DirectExecutor)
        .build()
        .unwrap();

    cache.insert("k", 1);
    cache.clean_up();
    assert!(cache.as_map().is_empty());
}
