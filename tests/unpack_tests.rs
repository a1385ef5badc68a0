mod common;

use common::{batch, edge, node, reference};
use serde_json::{Value, json};
use viewgraph::{Cardinality, Direction, Instance, QueryPlan, Step, Through, unpack};

fn load(plan: &mut QueryPlan, name: &str, records: Vec<Instance>) {
    plan.step_mut(name).unwrap().record_batch(batch(records, None));
}

#[test]
fn test_root_documents_carry_identity_and_properties() {
    let mut plan = QueryPlan::with_steps([Step::nodes("0", None)]).unwrap();
    load(
        &mut plan,
        "0",
        vec![
            node("a", json!({ "name": "first" })),
            node("b", json!({ "name": "second" })),
        ],
    );
    let unpacked = unpack(&plan);
    assert_eq!(unpacked.items.len(), 2);
    assert_eq!(unpacked.items[0]["externalId"], "a");
    assert_eq!(unpacked.items[0]["space"], common::SPACE);
    assert_eq!(unpacked.items[0]["instanceType"], "node");
    assert_eq!(unpacked.items[1]["name"], "second");
    assert!(unpacked.warnings.is_empty());
}

#[test]
fn test_duplicate_records_keep_latest_version() {
    let mut plan = QueryPlan::with_steps([Step::nodes("0", None)]).unwrap();
    load(
        &mut plan,
        "0",
        vec![
            node("a", json!({ "name": "old" })),
            node("b", json!({})),
            node("a", json!({ "name": "new" })),
        ],
    );
    let items = unpack(&plan).items;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["externalId"], "a");
    assert_eq!(items[0]["name"], "new");
}

#[test]
fn test_selected_properties_limit_document_fields() {
    let mut plan =
        QueryPlan::with_steps([Step::nodes("0", None).keep_properties(&["name"])]).unwrap();
    load(
        &mut plan,
        "0",
        vec![node("a", json!({ "name": "pump", "secret": 1 }))],
    );
    let item = &unpack(&plan).items[0];
    assert_eq!(item["name"], "pump");
    assert!(item.get("secret").is_none());
    assert_eq!(item["externalId"], "a");
}

#[test]
fn test_reverse_relation_nests_children_as_list() {
    let mut plan = QueryPlan::with_steps([
        Step::nodes("0", None),
        Step::nodes("0_1", None)
            .from("0")
            .through(Direction::Inwards, Through::single("parent"))
            .nest_as("children", Cardinality::List),
    ])
    .unwrap();
    load(&mut plan, "0", vec![node("a", json!({})), node("b", json!({}))]);
    load(
        &mut plan,
        "0_1",
        vec![
            node("x", json!({ "parent": reference("a") })),
            node("y", json!({ "parent": reference("a") })),
        ],
    );
    let items = unpack(&plan).items;
    let children: Vec<&Value> = items[0]["children"]
        .as_array()
        .unwrap()
        .iter()
        .map(|child| &child["externalId"])
        .collect();
    assert_eq!(children, [&json!("x"), &json!("y")]);
    assert_eq!(items[1]["children"], json!([]));
}

#[test]
fn test_reverse_list_fans_out_to_every_referenced_parent() {
    let mut plan = QueryPlan::with_steps([
        Step::nodes("0", None),
        Step::nodes("0_1", None)
            .from("0")
            .through(Direction::Inwards, Through::list("assets"))
            .reverse_list()
            .nest_as("events", Cardinality::List),
    ])
    .unwrap();
    load(&mut plan, "0", vec![node("a", json!({})), node("b", json!({}))]);
    load(
        &mut plan,
        "0_1",
        vec![node(
            "ev",
            json!({ "assets": [reference("a"), reference("b")] }),
        )],
    );
    let items = unpack(&plan).items;
    assert_eq!(items[0]["events"][0]["externalId"], "ev");
    assert_eq!(items[1]["events"][0]["externalId"], "ev");
}

#[test]
fn test_outward_relation_is_dereferenced() {
    let mut plan = QueryPlan::with_steps([
        Step::nodes("0", None),
        Step::nodes("0_1", None)
            .from("0")
            .through(Direction::Outwards, Through::single("parent")),
    ])
    .unwrap();
    load(
        &mut plan,
        "0",
        vec![
            node("a", json!({ "parent": reference("p") })),
            node("b", json!({ "parent": reference("missing") })),
            node("c", json!({ "parent": null })),
        ],
    );
    load(&mut plan, "0_1", vec![node("p", json!({ "name": "plant" }))]);
    let unpacked = unpack(&plan);
    let items = &unpacked.items;
    assert_eq!(items[0]["parent"]["name"], "plant");
    assert!(items[1].get("parent").is_none());
    assert_eq!(items[2]["parent"], Value::Null);
    assert_eq!(unpacked.warnings.len(), 1);
    assert!(unpacked.warnings[0].contains("missing"));
}

#[test]
fn test_outward_list_keeps_resolved_entries() {
    let mut plan = QueryPlan::with_steps([
        Step::nodes("0", None),
        Step::nodes("0_1", None)
            .from("0")
            .through(Direction::Outwards, Through::list("links")),
    ])
    .unwrap();
    load(
        &mut plan,
        "0",
        vec![node(
            "a",
            json!({ "links": [reference("t1"), reference("gone"), reference("t2")] }),
        )],
    );
    load(
        &mut plan,
        "0_1",
        vec![node("t1", json!({})), node("t2", json!({}))],
    );
    let unpacked = unpack(&plan);
    let links = unpacked.items[0]["links"].as_array().unwrap();
    assert_eq!(links.len(), 2);
    assert_eq!(links[1]["externalId"], "t2");
    assert_eq!(unpacked.warnings.len(), 1);
}

#[test]
fn test_edge_without_properties_flattens_to_target() {
    let mut plan = QueryPlan::with_steps([
        Step::nodes("0", None),
        Step::edges("0_1", Direction::Outwards, None)
            .from("0")
            .keep_properties(&[])
            .nest_as("linked", Cardinality::List),
        Step::nodes("0_1_2", None).from("0_1"),
    ])
    .unwrap();
    load(&mut plan, "0", vec![node("a", json!({}))]);
    load(
        &mut plan,
        "0_1",
        vec![edge("e1", "a", "t1"), edge("e2", "a", "t2")],
    );
    load(
        &mut plan,
        "0_1_2",
        vec![node("t1", json!({ "n": 1 })), node("t2", json!({ "n": 2 }))],
    );
    let items = unpack(&plan).items;
    let linked = items[0]["linked"].as_array().unwrap();
    assert_eq!(linked.len(), 2);
    assert_eq!(linked[0]["externalId"], "t1");
    assert_eq!(linked[1]["n"], 2);
}

#[test]
fn test_edge_with_properties_embeds_target() {
    let mut plan = QueryPlan::with_steps([
        Step::nodes("0", None),
        Step::edges("0_1", Direction::Inwards, None)
            .from("0")
            .nest_as("sources", Cardinality::List),
        Step::nodes("0_1_2", None).from("0_1"),
    ])
    .unwrap();
    load(&mut plan, "0", vec![node("a", json!({}))]);
    load(&mut plan, "0_1", vec![edge("e1", "s1", "a")]);
    load(&mut plan, "0_1_2", vec![node("s1", json!({ "n": 1 }))]);
    let items = unpack(&plan).items;
    let edge_document = &items[0]["sources"][0];
    assert_eq!(edge_document["instanceType"], "edge");
    assert_eq!(edge_document["externalId"], "e1");
    assert_eq!(edge_document["startNode"]["externalId"], "s1");
    assert_eq!(edge_document["startNode"]["n"], 1);
}
