//! merge/update/filtered across trees

use bagtree::{
    Bag, Node, Scalar, Value,
    bag::{MergeOptions, Selector, SetOptions, UpdateOptions},
};

use crate::helpers::Recorder;

fn pairs(items: &[(&str, i64)]) -> Bag {
    let mut bag = Bag::new();
    for (label, value) in items {
        bag.set_item(*label, *value).unwrap();
    }
    bag
}

#[test]
fn test_merge_keeps_left_order_and_appends() {
    let left = pairs(&[("a", 0), ("c", 3)]);
    let right = pairs(&[("a", 1), ("b", 2)]);

    let mut merged = left.merge(&right, MergeOptions::default());
    assert_eq!(merged.keys(), vec!["a", "c", "b"]);
    assert_eq!(merged.get_item("a").unwrap(), Some(Value::Int(1)));
    assert_eq!(merged.get_item("c").unwrap(), Some(Value::Int(3)));
    assert_eq!(merged.get_item("b").unwrap(), Some(Value::Int(2)));
}

#[test]
fn test_merge_option_matrix() {
    let left = pairs(&[("a", 0), ("c", 3)]);
    let right = pairs(&[("a", 1), ("b", 2)]);

    let no_updates = left.merge(
        &right,
        MergeOptions {
            upd_values: false,
            ..Default::default()
        },
    );
    assert_eq!(no_updates.get_static("a"), Some(Value::Int(0)));
    assert_eq!(no_updates.keys(), vec!["a", "c", "b"]);

    let no_additions = left.merge(
        &right,
        MergeOptions {
            add_values: false,
            ..Default::default()
        },
    );
    assert_eq!(no_additions.keys(), vec!["a", "c"]);
    assert_eq!(no_additions.get_static("a"), Some(Value::Int(1)));
}

#[test]
fn test_merge_nested_containers_are_independent() {
    let mut left = Bag::new();
    left.set_item("db.host", "localhost").unwrap();
    let mut right = Bag::new();
    right.set_item("db.port", 5432).unwrap();
    right.set_item("cache.size", 10).unwrap();

    let mut merged = left.merge(&right, MergeOptions::default());
    assert_eq!(merged.keys_at("db"), vec!["host", "port"]);

    // Editing the result leaves both inputs alone
    merged.set_item("cache.size", 20).unwrap();
    assert_eq!(right.get_static("cache.size"), Some(Value::Int(10)));
    assert!(!left.contains("cache"));
}

#[test]
fn test_merge_attribute_flags() {
    let mut left = Bag::new();
    left.set_item_with("n", 1, SetOptions::new().with_attr("keep", "left"))
        .unwrap();
    let mut right = Bag::new();
    right
        .set_item_with(
            "n",
            1,
            SetOptions::new().with_attr("keep", "right").with_attr("new", 1),
        )
        .unwrap();

    let merged = left.merge(
        &right,
        MergeOptions {
            upd_attrs: false,
            add_attrs: false,
            ..Default::default()
        },
    );
    assert_eq!(merged.get_attr("n", "keep"), Some(Scalar::from("left")));
    assert_eq!(merged.get_attr("n", "new"), None);

    let merged = left.merge(&right, MergeOptions::default());
    assert_eq!(merged.get_attr("n", "keep"), Some(Scalar::from("right")));
    assert_eq!(merged.get_attr("n", "new"), Some(Scalar::Int(1)));
}

#[test]
fn test_update_notifies_subscribers() {
    let mut target = pairs(&[("a", 0), ("c", 3)]);
    let recorder = Recorder::default();
    target.subscribe("watch", recorder.subscription());

    let mut source = pairs(&[("a", 1), ("b", 2), ("c", 3)]);
    target.update(&mut source, UpdateOptions::default()).unwrap();
    assert_eq!(target.keys(), vec!["a", "c", "b"]);

    let events: Vec<String> = recorder
        .take()
        .into_iter()
        .map(|e| format!("{} {}", e.kind, e.path.join(".")))
        .collect();
    assert_eq!(events, vec!["upd_value a", "ins b"]);
}

#[test]
fn test_filtered_copies() {
    let mut bag = Bag::new();
    bag.set_item_with("x", 1, SetOptions::new().with_attr("kind", "num"))
        .unwrap();
    bag.set_item_with("y", "s", SetOptions::new().with_attr("kind", "text"))
        .unwrap();
    bag.set_item("z.inner", 3).unwrap();

    let numbers = bag.filtered(Selector::refs(["?kind=num", "z"]));
    assert_eq!(numbers.keys(), vec!["x", "z"]);
    assert_eq!(numbers.get_static("z.inner"), Some(Value::Int(3)));

    let texts = bag.filtered(Selector::predicate(|node: &Node| {
        node.attr("kind") == Some(&Scalar::from("text"))
    }));
    assert_eq!(texts.keys(), vec!["y"]);

    let everything = bag.filtered(Selector::All);
    assert_eq!(everything, bag);
}
