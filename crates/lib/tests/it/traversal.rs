//! walk, traverse, digest and display

use std::ops::ControlFlow;

use bagtree::{
    Bag, Item, Value,
    bag::{DigestField, DigestValue, SetOptions},
};

use crate::helpers::counting_resolver;

fn inventory() -> Bag {
    let mut bag = Bag::new();
    for (label, qty, kind) in [("bolt", 40, "metal"), ("nut", 0, "metal"), ("gear", 3, "plastic")] {
        bag.set_item_with(
            format!("items.{label}"),
            Bag::new(),
            SetOptions::new().with_attr("kind", kind),
        )
        .unwrap();
        bag.set_item(format!("items.{label}.qty"), qty).unwrap();
    }
    bag
}

#[test]
fn test_walk_finds_first_match() {
    let bag = inventory();
    let found = bag.walk(|path, node| match node.value() {
        Value::Int(0) => ControlFlow::Break(path.join(".")),
        _ => ControlFlow::Continue(()),
    });
    assert_eq!(found.as_deref(), Some("items.nut.qty"));
}

#[test]
fn test_walk_resolved_loads_before_visiting() {
    let mut bag = Bag::new();
    let (handle, calls) = counting_resolver(&bag, -1);
    bag.set_item("lazy", handle).unwrap();
    bag.set_item("plain", 1).unwrap();

    let mut seen = Vec::new();
    let result: Option<()> = bag
        .walk_resolved(|path, node| {
            seen.push((path.join("."), node.value().clone()));
            ControlFlow::Continue(())
        })
        .unwrap();
    assert!(result.is_none());
    assert_eq!(
        seen,
        vec![
            ("lazy".to_string(), Value::Int(1)),
            ("plain".to_string(), Value::Int(1)),
        ]
    );
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    // The plain walk never runs loaders
    bag.reset_resolver("lazy");
    let values: Vec<Value> = bag.traverse().map(|n| n.value().clone()).collect();
    assert_eq!(values, vec![Value::Int(1), Value::Int(1)]);
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn test_traverse_counts_every_node() {
    let bag = inventory();
    assert_eq!(bag.traverse().count(), 7);
    let labels: Vec<&str> = bag.traverse().take(3).map(|n| n.label()).collect();
    assert_eq!(labels, vec!["items", "bolt", "qty"]);
}

#[test]
fn test_digest_projections() {
    let bag = inventory();
    let metal = |node: bagtree::NodeRef<'_>| node.attr("kind").is_some_and(|k| k == "metal");
    let digest = bag
        .digest_with(
            "items",
            &DigestField::parse_spec("#k,#v.qty,kind"),
            Some(&metal),
        )
        .unwrap();
    assert_eq!(digest.len(), 2);
    assert_eq!(
        digest.rows()[0],
        vec![
            DigestValue::Value(Value::from("bolt")),
            DigestValue::Value(Value::Int(40)),
            DigestValue::Value(Value::from("metal")),
        ]
    );
    let labels = &digest.columns()[0];
    assert_eq!(labels[1], DigestValue::Value(Value::from("nut")));

    assert_eq!(bag.digest("#k").len(), 1);
    assert!(bag.digest_with("missing", &[DigestField::Label], None).is_none());
}

#[test]
fn test_display_and_diff() {
    let mut bag = Bag::new();
    bag.set_item_with("a", Bag::new(), SetOptions::new().with_attr("kind", "group"))
        .unwrap();
    bag.set_item("a.b", 1).unwrap();
    bag.set_item("c", "x").unwrap();
    assert_eq!(bag.to_string(), "a [kind=group]\n  b = 1\nc = x\n");

    let mut other = bag.clone();
    assert_eq!(bag.diff(&other), None);
    other.set_item("a.b", 2).unwrap();
    assert!(bag.diff(&other).is_some());
    assert_ne!(bag, other);
}

#[test]
fn test_owned_copies() {
    let bag = inventory();
    let Some(Item::Bag(items)) = bag.get_owned("items") else {
        panic!("expected a container");
    };
    assert_eq!(items.keys(), vec!["bolt", "nut", "gear"]);
    let owned = bag.items_owned();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].0, "items");
}
