//! Resolver caching, read-only loads and sync/async dispatch

use std::sync::{Arc, atomic::Ordering};

use bagtree::{
    AsyncFnResolver, Bag, BagConfig, FnResolver, Item, ResolverHandle, Value,
    bag::Access,
};

use crate::helpers::{ManualClock, counting_resolver};

fn bag_with_clock() -> (Bag, Arc<ManualClock>) {
    let clock = ManualClock::new(1_000_000);
    let bag = Bag::new().with_clock(clock.clone());
    (bag, clock)
}

#[test]
fn test_cache_time_zero_loads_every_time() {
    let (mut bag, _clock) = bag_with_clock();
    let (handle, calls) = counting_resolver(&bag, 0);
    bag.set_item("lazy", handle).unwrap();

    for _ in 0..100 {
        bag.get_item("lazy").unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 100);
}

#[test]
fn test_cache_time_ttl() {
    let (mut bag, clock) = bag_with_clock();
    let (handle, calls) = counting_resolver(&bag, 60);
    bag.set_item("lazy", handle).unwrap();

    assert_eq!(bag.get_item("lazy").unwrap(), Some(Value::Int(1)));
    clock.advance_secs(30);
    assert_eq!(bag.get_item("lazy").unwrap(), Some(Value::Int(1)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    clock.advance_secs(31);
    assert_eq!(bag.get_item("lazy").unwrap(), Some(Value::Int(2)));

    // Reset forces a reload regardless of elapsed time
    assert!(bag.reset_resolver("lazy"));
    assert_eq!(bag.get_item("lazy").unwrap(), Some(Value::Int(3)));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_negative_cache_time_waits_for_reset() {
    let (mut bag, clock) = bag_with_clock();
    let (handle, calls) = counting_resolver(&bag, -1);
    bag.set_item("lazy", handle).unwrap();

    bag.get_item("lazy").unwrap();
    clock.advance_secs(365 * 24 * 3600);
    assert_eq!(bag.get_item("lazy").unwrap(), Some(Value::Int(1)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    bag.reset_resolver("lazy");
    assert_eq!(bag.get_item("lazy").unwrap(), Some(Value::Int(2)));
}

#[test]
fn test_default_cache_time_from_config() {
    let mut bag = Bag::with_config(BagConfig::default().with_default_cache_time(-1));
    let (handle, calls) = counting_resolver(&bag, -1);
    assert_eq!(handle.cache_time(), -1);
    bag.set_item("lazy", handle).unwrap();
    bag.get_item("lazy").unwrap();
    bag.get_item("lazy").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let configured = bag.resolver("plain", |_| Ok(Item::from(0)));
    assert_eq!(configured.cache_time(), -1);
}

#[test]
fn test_resolver_containers_are_traversable() {
    let mut bag = Bag::new();
    let loader = FnResolver::new("settings", |ctx| {
        let mut settings = Bag::new();
        let env = ctx.param("env").and_then(|v| v.as_str()).unwrap_or("dev");
        settings.set_item("env", env)?;
        settings.set_item("db.port", 5432)?;
        Ok(Item::Bag(settings))
    })
    .with_default("env", "prod");
    bag.set_item("settings", ResolverHandle::new(loader).with_cache_time(-1))
        .unwrap();

    assert_eq!(bag.get_item("settings.env").unwrap(), Some(Value::from("prod")));
    assert_eq!(bag.get_item("settings.db.port").unwrap(), Some(Value::Int(5432)));
    assert_eq!(bag.keys_at("settings"), vec!["env", "db"]);
}

#[test]
fn test_read_only_resolver_never_fills_the_slot() {
    let mut bag = Bag::new();
    let (handle, calls) = counting_resolver(&bag, 60);
    bag.set_item("live", handle.read_only(true)).unwrap();

    assert_eq!(bag.get_item("live").unwrap(), Some(Value::Int(1)));
    assert_eq!(bag.get_item("live").unwrap(), Some(Value::Int(2)));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(bag.get_value("live", Access::Static).unwrap(), Some(Value::Null));
}

#[test]
fn test_loader_errors_surface() {
    let mut bag = Bag::new();
    let failing = bag.resolver("failing", |_| Err("backend down".into()));
    bag.set_item("broken", failing).unwrap();

    let err = bag.get_item("broken").unwrap_err();
    assert!(err.is_load_error());
    assert!(err.is_resolver_error());
    assert_eq!(err.module(), "resolver");
    // Static access never runs the loader
    assert_eq!(bag.get_static("broken"), Some(Value::Null));
}

#[test]
fn test_async_loader_from_sync_caller() {
    let mut bag = Bag::new();
    let loader = AsyncFnResolver::new("remote", |_| async { Ok(Item::from("fetched")) });
    bag.set_item("remote", ResolverHandle::new(loader)).unwrap();
    assert_eq!(bag.get_item("remote").unwrap(), Some(Value::from("fetched")));
}

#[tokio::test]
async fn test_async_caller_with_both_loader_kinds() {
    let mut bag = Bag::new();
    let remote = AsyncFnResolver::new("remote", |ctx| async move {
        let n = ctx.arg(0).and_then(|v| v.as_i64()).unwrap_or(0);
        Ok(Item::from(n * 2))
    });
    bag.set_item("remote", ResolverHandle::new(remote).with_args([21]))
        .unwrap();
    let local = bag.resolver("local", |_| Ok(Item::from("sync")));
    bag.set_item("local", local).unwrap();

    assert_eq!(bag.get_item_async("remote").await.unwrap(), Some(Value::Int(42)));
    assert_eq!(bag.get_item_async("local").await.unwrap(), Some(Value::from("sync")));
    assert_eq!(bag.get_item_async("missing.path").await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sync_read_inside_runtime_blocks_in_place() {
    let mut bag = Bag::new();
    let loader = AsyncFnResolver::new("remote", |_| async { Ok(Item::from(7)) });
    bag.set_item("remote", ResolverHandle::new(loader)).unwrap();
    assert_eq!(bag.get_item("remote").unwrap(), Some(Value::Int(7)));
}
