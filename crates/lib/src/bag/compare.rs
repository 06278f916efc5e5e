//! Structural equality and textual diffs between nodes and containers,
//! possibly living in different trees.

use super::{Bag, BagId, node::Node, value::Value};

pub(crate) fn value_eq(a_bag: &Bag, a: &Value, b_bag: &Bag, b: &Value) -> bool {
    match (a, b) {
        (Value::Bag(a_id), Value::Bag(b_id)) => container_eq(a_bag, *a_id, b_bag, *b_id),
        (a, b) => a == b,
    }
}

pub(crate) fn node_eq(a_bag: &Bag, a: &Node, b_bag: &Bag, b: &Node) -> bool {
    if a.attrs() != b.attrs() {
        return false;
    }
    match (a.resolver(), b.resolver()) {
        (Some(ra), Some(rb)) => ra == rb,
        (None, None) => value_eq(a_bag, a.value(), b_bag, b.value()),
        _ => false,
    }
}

pub(crate) fn container_eq(a_bag: &Bag, a: BagId, b_bag: &Bag, b: BagId) -> bool {
    match (a_bag.container(a), b_bag.container(b)) {
        (Some(ca), Some(cb)) => {
            ca.nodes.len() == cb.nodes.len()
                && ca
                    .nodes
                    .iter()
                    .zip(cb.nodes.iter())
                    .all(|(na, nb)| na.label() == nb.label() && node_eq(a_bag, na, b_bag, nb))
        }
        (None, None) => true,
        _ => false,
    }
}

pub(crate) fn node_diff(a_bag: &Bag, a: &Node, b_bag: &Bag, b: &Node) -> Option<String> {
    let mut lines = Vec::new();
    if a.label() != b.label() {
        lines.push(format!("label: {} != {}", a.label(), b.label()));
    }
    if a.attrs() != b.attrs() {
        lines.push(format!("attrs: {:?} != {:?}", a.attrs(), b.attrs()));
    }
    match (a.resolver(), b.resolver()) {
        (Some(ra), Some(rb)) if ra != rb => {
            lines.push(format!("resolver: {} != {}", ra.type_name(), rb.type_name()));
        }
        (Some(ra), None) => lines.push(format!("resolver: {} != none", ra.type_name())),
        (None, Some(rb)) => lines.push(format!("resolver: none != {}", rb.type_name())),
        (Some(_), Some(_)) => {}
        (None, None) => match (a.value(), b.value()) {
            (Value::Bag(a_id), Value::Bag(b_id)) => {
                if let Some(inner) = container_diff(a_bag, *a_id, b_bag, *b_id) {
                    lines.extend(inner.lines().map(|l| format!("  {l}")));
                }
            }
            (va, vb) if va != vb => lines.push(format!("value: {va} != {vb}")),
            _ => {}
        },
    }
    (!lines.is_empty()).then(|| lines.join("\n"))
}

pub(crate) fn container_diff(a_bag: &Bag, a: BagId, b_bag: &Bag, b: BagId) -> Option<String> {
    let (Some(ca), Some(cb)) = (a_bag.container(a), b_bag.container(b)) else {
        return (a_bag.contains_id(a) != b_bag.contains_id(b))
            .then(|| "container missing on one side".to_string());
    };
    let mut lines = Vec::new();
    if ca.nodes.len() != cb.nodes.len() {
        lines.push(format!("length: {} != {}", ca.nodes.len(), cb.nodes.len()));
    }
    for (i, (na, nb)) in ca.nodes.iter().zip(cb.nodes.iter()).enumerate() {
        if let Some(diff) = node_diff(a_bag, na, b_bag, nb) {
            lines.push(format!("#{i} {}:", na.label()));
            lines.extend(diff.lines().map(|l| format!("  {l}")));
        }
    }
    (!lines.is_empty()).then(|| lines.join("\n"))
}
