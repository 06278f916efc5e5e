//! Container and node subscriptions

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use bagtree::{
    Bag, Subscription, Value, attrs,
    bag::{EventKind, NodeEventKind, SetOptions, SubscriberKind, UpdateKind},
};

use crate::helpers::{Recorded, Recorder};

fn strings(labels: &[&str]) -> Vec<String> {
    labels.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_update_and_delete_bubble_to_root() {
    let mut bag = Bag::new();
    bag.set_item("child.item", 1).unwrap();
    let recorder = Recorder::default();
    bag.subscribe("root", recorder.subscription());

    bag.set_item("child.item", 2).unwrap();
    let events = recorder.take();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Update(UpdateKind::Value));
    assert_eq!(events[0].path, strings(&["child", "item"]));

    assert!(bag.delete("child.item").unwrap());
    assert_eq!(
        recorder.take(),
        vec![Recorded {
            kind: EventKind::Delete,
            path: strings(&["child"]),
            labels: strings(&["item"]),
            index: Some(0),
        }]
    );
}

#[test]
fn test_same_value_does_not_notify() {
    let mut bag = Bag::new();
    let recorder = Recorder::default();
    bag.subscribe("root", recorder.subscription());

    bag.set_item("a", 1).unwrap();
    assert_eq!(recorder.take().len(), 1);
    bag.set_item("a", 1).unwrap();
    assert!(recorder.take().is_empty());

    // Same value, new attributes: only an attribute update
    bag.set_item_with("a", 1, SetOptions::new().with_attr("unit", "s"))
        .unwrap();
    let events = recorder.take();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Update(UpdateKind::Attrs));
}

#[test]
fn test_insert_events_and_autocreation() {
    let mut bag = Bag::new();
    let recorder = Recorder::default();
    bag.subscribe("root", recorder.subscription());

    bag.set_item("a.b", 1).unwrap();
    let events = recorder.take();
    let kinds: Vec<_> = events.iter().map(|e| (e.kind, e.path.clone())).collect();
    assert_eq!(
        kinds,
        vec![
            (EventKind::Insert, strings(&["a"])),
            (EventKind::Insert, strings(&["a", "b"])),
        ]
    );
}

#[test]
fn test_trigger_false_is_silent() {
    let mut bag = Bag::new();
    let recorder = Recorder::default();
    bag.subscribe("root", recorder.subscription());

    bag.set_item_with("quiet", 1, SetOptions::new().with_trigger(false))
        .unwrap();
    assert!(recorder.take().is_empty());
    assert_eq!(bag.get_static("quiet"), Some(Value::Int(1)));
}

#[test]
fn test_unsubscribe_by_kind() {
    let mut bag = Bag::new();
    let recorder = Recorder::default();
    bag.subscribe("root", recorder.subscription());
    bag.set_item("a", 1).unwrap();
    recorder.take();

    assert!(bag.unsubscribe("root", SubscriberKind::Update));
    bag.set_item("a", 2).unwrap();
    assert!(recorder.take().is_empty());
    bag.delete("a").unwrap();
    assert_eq!(recorder.take().len(), 1);

    assert!(bag.unsubscribe("root", SubscriberKind::Any));
    assert!(!bag.unsubscribe("nobody", SubscriberKind::Any));
}

#[test]
fn test_nested_subscription_and_move() {
    let mut bag = Bag::new();
    bag.set_item("list.a", 1).unwrap();
    bag.set_item("list.b", 2).unwrap();
    let recorder = Recorder::default();
    assert!(bag.subscribe_at("list", "list", recorder.subscription()));
    assert!(!bag.subscribe_at("list.a", "leaf", Subscription::new()));

    bag.move_nodes_at("list", &["b"], "<", true).unwrap();
    let events = recorder.take();
    assert_eq!(events.len(), 2);
    assert_eq!((events[0].kind, events[0].index), (EventKind::Delete, Some(1)));
    assert_eq!((events[1].kind, events[1].index), (EventKind::Insert, Some(0)));
    assert_eq!(bag.keys_at("list"), vec!["b", "a"]);
}

#[test]
fn test_fired_signal_resets_silently() {
    let mut bag = Bag::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bag.subscribe(
        "root",
        Subscription::new().on_any(move |event| {
            let value = event.node().map(|n| n.value().clone());
            sink.lock().unwrap().push((event.kind(), value));
            Ok(())
        }),
    );

    bag.set_item("signal", ()).unwrap();
    seen.lock().unwrap().clear();

    bag.set_item_with("signal", "go", SetOptions::new().with_fired(true))
        .unwrap();
    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![(EventKind::Update(UpdateKind::Value), Some(Value::from("go")))]
    );
    assert_eq!(bag.get_static("signal"), Some(Value::Null));
}

#[test]
fn test_callback_errors_reach_the_caller() {
    let mut bag = Bag::new();
    bag.subscribe(
        "strict",
        Subscription::new().on_insert(|event| {
            if event.node().is_some_and(|n| n.label().starts_with('_')) {
                return Err("private labels are not allowed".into());
            }
            Ok(())
        }),
    );

    bag.set_item("ok", 1).unwrap();
    let err = bag.set_item("_hidden", 1).unwrap_err();
    assert!(err.is_callback_error());
    // The mutation itself happened before the callback ran
    assert!(bag.contains("_hidden"));
}

#[test]
fn test_node_subscribers() {
    let mut bag = Bag::new();
    bag.set_item("temp", 20).unwrap();
    let kinds = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&kinds);
    assert!(bag.subscribe_node("temp", "watch", move |event| {
        sink.lock()
            .unwrap()
            .push((event.kind(), event.changed_attrs().to_vec()));
        Ok(())
    }));
    assert!(!bag.subscribe_node("missing", "watch", |_| Ok(())));

    bag.set_item("temp", 21).unwrap();
    bag.set_attr("temp", attrs([("unit", "C")])).unwrap();
    assert_eq!(
        *kinds.lock().unwrap(),
        vec![
            (NodeEventKind::UpdateValue, Vec::new()),
            (NodeEventKind::UpdateAttrs, strings(&["unit"])),
        ]
    );

    assert!(bag.unsubscribe_node("temp", "watch"));
    bag.set_item("temp", 22).unwrap();
    assert_eq!(kinds.lock().unwrap().len(), 2);
}

#[test]
fn test_clear_reports_all_nodes_once() {
    let mut bag = Bag::new();
    for label in ["a", "b", "c"] {
        bag.set_item(label, 1).unwrap();
    }
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    bag.subscribe(
        "root",
        Subscription::new().on_delete(move |event| {
            assert_eq!(event.nodes().len(), 3);
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );
    bag.clear().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
