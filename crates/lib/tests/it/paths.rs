//! Path grammar, positions and autocreation through the public API

use bagtree::{
    Bag, BagConfig, Scalar, Value,
    bag::{DetachedNode, Position, SetOptions},
};

use crate::helpers::abc;

#[test]
fn test_insertion_order_is_kept() {
    let mut bag = Bag::new();
    for label in ["zeta", "alpha", "mid", "beta"] {
        bag.set_item(label, label).unwrap();
    }
    assert_eq!(bag.keys(), vec!["zeta", "alpha", "mid", "beta"]);

    // Updating in place keeps the position
    bag.set_item("alpha", "again").unwrap();
    assert_eq!(bag.keys(), vec!["zeta", "alpha", "mid", "beta"]);
}

#[test]
fn test_insert_positions() {
    let cases = [
        (Position::from("#1"), vec!["a", "mid", "b", "c"]),
        (Position::from(">a"), vec!["a", "mid", "b", "c"]),
        (Position::from("<c"), vec!["a", "b", "mid", "c"]),
        (Position::from(">missing"), vec!["a", "b", "c", "mid"]),
        (Position::from("<"), vec!["mid", "a", "b", "c"]),
        (Position::from(">"), vec!["a", "b", "c", "mid"]),
        (Position::from("b"), vec!["a", "mid", "b", "c"]),
        (Position::from(">#0"), vec!["a", "mid", "b", "c"]),
        (Position::from(99), vec!["a", "b", "c", "mid"]),
    ];
    for (position, expected) in cases {
        let mut bag = abc();
        bag.set_item_with("mid", 0, SetOptions::new().with_position(position.clone()))
            .unwrap();
        assert_eq!(bag.keys(), expected, "position {position:?}");
    }
}

#[test]
fn test_references_in_paths() {
    let mut bag = Bag::new();
    bag.set_item_with(
        "rows.r1",
        Bag::new(),
        SetOptions::new().with_attr("id", 7).with_attr("color", "red"),
    )
    .unwrap();
    bag.set_item("rows.r1.name", "first").unwrap();
    bag.set_item_with("rows.r2", Bag::new(), SetOptions::new().with_attr("id", 9))
        .unwrap();
    bag.set_item("rows.r2.name", "second").unwrap();

    assert_eq!(bag.get_item("rows.#1.name").unwrap(), Some(Value::from("second")));
    assert_eq!(bag.get_item("rows.?id=7.name").unwrap(), Some(Value::from("first")));
    assert_eq!(bag.get_item("rows.#5.name").unwrap(), None);
    assert_eq!(bag.get_item("rows.?id=1.name").unwrap(), None);

    // A final lookup segment can still carry an attribute suffix
    assert_eq!(bag.get_item("rows.?id=7?color").unwrap(), Some(Value::from("red")));
    assert_eq!(bag.get_item("rows.?id=9?color").unwrap(), None);

    // Writes through an existing reference are fine
    bag.set_item("rows.#0.name", "renamed").unwrap();
    assert_eq!(bag.get_static("rows.r1.name"), Some(Value::from("renamed")));
}

#[test]
fn test_autocreation_refuses_references() {
    let mut bag = Bag::new();
    let err = bag.set_item("rows.#3.name", "x").unwrap_err();
    assert!(err.is_structural_error());
    assert_eq!(err.module(), "bag");

    // The intermediate container was still created before the failure point
    assert!(bag.contains("rows"));
    assert!(bag.keys_at("rows").is_empty());
}

#[test]
fn test_escaped_separators() {
    let mut bag = Bag::new();
    bag.set_item("hosts.example\\.com", 443).unwrap();
    assert_eq!(bag.keys_at("hosts"), vec!["example.com"]);
    assert_eq!(bag.get_item("hosts.example\\.com").unwrap(), Some(Value::Int(443)));
}

#[test]
fn test_attribute_paths() {
    let mut bag = Bag::new();
    bag.set_item("server?color", "red").unwrap();
    assert!(bag.contains("server"));
    assert_eq!(bag.get_attr("server", "color"), Some(Scalar::from("red")));
    assert_eq!(bag.get_item("server?color").unwrap(), Some(Value::from("red")));
    assert_eq!(bag.get_static("server"), Some(Value::Null));

    assert!(bag.del_attr("server", "color").unwrap());
    assert_eq!(bag.get_item("server?color").unwrap(), None);
}

#[test]
fn test_parent_segments_need_backref() {
    let mut bag = Bag::new();
    bag.set_item("a.b.c", 1).unwrap();
    bag.set_item("a.x", 2).unwrap();
    assert_eq!(bag.get_item("a.b.#^.x").unwrap(), None);

    let mut linked = Bag::with_config(BagConfig::default().with_backref(true));
    linked.set_item("a.b.c", 1).unwrap();
    linked.set_item("a.x", 2).unwrap();
    assert_eq!(linked.get_item("a.b.#^.x").unwrap(), Some(Value::Int(2)));
    assert!(linked.set_item("#^.nope", 1).unwrap_err().is_path_error());
}

#[test]
fn test_pop_node_and_adopt() {
    let mut bag = Bag::new();
    bag.set_item_with("a", 1, SetOptions::new().with_attr("unit", "kg"))
        .unwrap();
    bag.set_item("b", 2).unwrap();

    let node = bag.pop_node("a").unwrap().unwrap();
    assert_eq!(node.label, "a");
    assert_eq!(bag.keys(), vec!["b"]);
    assert!(bag.pop_node("a").unwrap().is_none());

    // Assigning a detached node adopts its value and attributes
    assert!(bag.set_value("b", node).unwrap());
    assert_eq!(bag.get_static("b"), Some(Value::Int(1)));
    assert_eq!(bag.get_attr("b", "unit"), Some(Scalar::from("kg")));

    let tagged = DetachedNode::new("ignored", 5).with_tag("t");
    bag.set_value("b", tagged).unwrap();
    assert_eq!(bag.get_static("b"), Some(Value::Int(5)));
}

#[test]
fn test_duplicates_and_moves() {
    let mut bag = abc();
    bag.set_item_with("a", 10, SetOptions::new().with_duplicate(true))
        .unwrap();
    assert_eq!(bag.keys(), vec!["a", "b", "c", "a"]);
    // Label references find the first node
    assert_eq!(bag.get_item("a").unwrap(), Some(Value::Int(1)));
    assert_eq!(bag.get_item("#3").unwrap(), Some(Value::Int(10)));

    let moved = bag.move_nodes(&["c", "#0"], "<").unwrap();
    assert_eq!(moved.len(), 2);
    assert_eq!(bag.keys(), vec!["a", "c", "b", "a"]);

    // Unresolvable destinations move nothing
    assert!(bag.move_nodes(&["b"], "<missing").unwrap().is_empty());
    assert_eq!(bag.keys(), vec!["a", "c", "b", "a"]);
}

#[test]
fn test_delete_and_clear() {
    let mut bag = Bag::new();
    bag.set_item("a.b.c", 1).unwrap();
    bag.set_item("a.d", 2).unwrap();
    let before = bag.container_count();

    assert!(bag.delete("a.b").unwrap());
    assert!(!bag.delete("a.b").unwrap());
    assert!(bag.container_count() < before);
    assert_eq!(bag.keys_at("a"), vec!["d"]);

    assert!(bag.clear_at("a").unwrap());
    assert!(bag.keys_at("a").is_empty());
    assert!(!bag.clear_at("a.d").unwrap());

    bag.clear().unwrap();
    assert!(bag.is_empty());
    assert_eq!(bag.container_count(), 1);
}
