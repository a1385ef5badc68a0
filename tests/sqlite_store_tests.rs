mod common;

use common::{id, reference, view};
use serde_json::json;
use viewgraph::{
    Cardinality, Direction, EdgeRecord, EngineConfig, Filter, GraphQueryError, NodeRecord,
    NoopObserver, PAYLOAD_TOO_LARGE, QueryBackend, QueryExecutor, QueryPlan, SqliteStore,
    Step, StoreCall, Through, ViewId,
    dataset::{Dataset, DatasetShape, generate_dataset},
    store::FaultPoint,
    unpack,
};

fn seeded_store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().expect("store");
    let view = view();
    for idx in 0..10 {
        let parent = if idx == 0 {
            json!(null)
        } else {
            reference("n0")
        };
        store
            .insert_node(
                Some(&view),
                &NodeRecord::new(
                    id(&format!("n{idx}")),
                    json!({ "name": format!("node{idx}"), "idx": idx, "parent": parent }),
                ),
            )
            .expect("node");
    }
    store
        .insert_edge(&EdgeRecord::new(
            id("e1"),
            id("linksTo"),
            id("n1"),
            id("n2"),
            json!({ "weight": 3 }),
        ))
        .expect("edge");
    store
}

fn events_view() -> ViewId {
    ViewId::new(common::SPACE, "Event", "v1")
}

fn root_ids(plan: &QueryPlan) -> Vec<String> {
    plan.root()
        .unwrap()
        .results()
        .iter()
        .map(|record| record.id().external_id.clone())
        .collect()
}

#[test]
fn test_store_pages_with_offset_cursors() {
    let store = seeded_store().with_page_size(4);
    let mut plan = QueryPlan::with_steps([Step::nodes("0", Some(view())).limit(-1)]).unwrap();
    let summary = QueryExecutor::new(&store, EngineConfig::default())
        .execute_with_observer(&mut plan, &mut NoopObserver)
        .unwrap();
    assert_eq!(summary.rounds, 3);
    assert_eq!(root_ids(&plan).len(), 10);
    assert_eq!(root_ids(&plan)[9], "n9");

    let cursors: Vec<Option<String>> = store
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            StoreCall::Query { cursors, .. } => Some(cursors.get("0").cloned()),
            _ => None,
        })
        .collect();
    assert_eq!(
        cursors,
        [None, Some("4".to_string()), Some("8".to_string())]
    );
}

#[test]
fn test_limit_of_ten_in_pages_of_seven_and_three() {
    let store = seeded_store().with_page_size(7);
    let mut plan = QueryPlan::with_steps([Step::nodes("0", Some(view())).limit(10)]).unwrap();
    let summary = QueryExecutor::new(&store, EngineConfig::default())
        .execute_with_observer(&mut plan, &mut NoopObserver)
        .unwrap();
    assert_eq!(summary.rounds, 2);
    assert_eq!(plan.root().unwrap().total_retrieved(), 10);
}

#[test]
fn test_payload_limit_triggers_adaptive_batches() {
    let store = seeded_store().with_payload_limit(3000);
    let mut plan = QueryPlan::with_steps([Step::nodes("0", Some(view())).limit(-1)]).unwrap();
    let summary = QueryExecutor::new(&store, EngineConfig::default().max_batch_limit(10_000))
        .execute_with_observer(&mut plan, &mut NoopObserver)
        .unwrap();
    assert_eq!(summary.batch_reductions, 2);
    assert_eq!(plan.root().unwrap().max_batch_limit(), 2500);
    assert_eq!(root_ids(&plan).len(), 10);
}

#[test]
fn test_injected_fault_propagates() {
    let store = seeded_store();
    store.fail_next(FaultPoint::Query, 1, 503);
    let mut plan = QueryPlan::with_steps([Step::nodes("0", Some(view()))]).unwrap();
    let err = QueryExecutor::new(&store, EngineConfig::default())
        .execute_with_observer(&mut plan, &mut NoopObserver)
        .unwrap_err();
    assert_eq!(err.code(), Some(503));

    store.fail_next(FaultPoint::Query, 1, PAYLOAD_TOO_LARGE);
    let summary = QueryExecutor::new(&store, EngineConfig::default())
        .execute_with_observer(&mut plan, &mut NoopObserver)
        .unwrap();
    assert_eq!(summary.attempts, 2);
    assert_eq!(root_ids(&plan).len(), 10);
}

#[test]
fn test_invalid_cursor_is_rejected() {
    let store = seeded_store();
    let plan = QueryPlan::with_steps([Step::nodes("0", Some(view()))]).unwrap();
    let mut request = viewgraph::compile(&plan).unwrap().request;
    request.cursors.insert("0".to_string(), "not-a-number".to_string());
    let err = store.query(&request).unwrap_err();
    assert!(matches!(err, GraphQueryError::Store { code: 400, .. }));
}

#[test]
fn test_inward_and_outward_relations_end_to_end() {
    let store = seeded_store();
    let mut plan = QueryPlan::with_steps([
        Step::nodes("0", Some(view())).filter(Filter::equals("idx", 0)),
        Step::nodes("0_1", Some(view()))
            .from("0")
            .through(Direction::Inwards, Through::single("parent"))
            .nest_as("children", Cardinality::List),
    ])
    .unwrap();
    QueryExecutor::new(&store, EngineConfig::default())
        .execute_with_observer(&mut plan, &mut NoopObserver)
        .unwrap();
    let items = unpack(&plan).items;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["children"].as_array().unwrap().len(), 9);

    let mut plan = QueryPlan::with_steps([
        Step::nodes("0", Some(view())).filter(Filter::equals("idx", 5)),
        Step::nodes("0_1", Some(view()))
            .from("0")
            .through(Direction::Outwards, Through::single("parent")),
    ])
    .unwrap();
    QueryExecutor::new(&store, EngineConfig::default())
        .execute_with_observer(&mut plan, &mut NoopObserver)
        .unwrap();
    let items = unpack(&plan).items;
    assert_eq!(items[0]["parent"]["externalId"], "n0");
}

#[test]
fn test_edge_traversal_end_to_end() {
    let store = seeded_store();
    let mut plan = QueryPlan::with_steps([
        Step::nodes("0", Some(view())),
        Step::edges("0_1", Direction::Outwards, Some(id("linksTo"))).from("0"),
        Step::nodes("0_1_2", Some(view())).from("0_1"),
    ])
    .unwrap();
    QueryExecutor::new(&store, EngineConfig::default().remove_not_connected(true))
        .execute_with_observer(&mut plan, &mut NoopObserver)
        .unwrap();
    assert_eq!(root_ids(&plan), ["n1"]);
    let items = unpack(&plan).items;
    assert_eq!(items[0]["0_1"][0]["endNode"]["externalId"], "n2");
    assert_eq!(items[0]["0_1"][0]["weight"], 3);
}

#[test]
fn test_reverse_list_uses_search() {
    let store = seeded_store();
    let events = events_view();
    for (idx, assets) in [vec!["n1", "n2"], vec!["n2"], vec!["n7"]].into_iter().enumerate() {
        let refs: Vec<_> = assets.iter().map(|xid| reference(xid)).collect();
        store
            .insert_node(
                Some(&events),
                &NodeRecord::new(id(&format!("ev{idx}")), json!({ "assets": refs })),
            )
            .unwrap();
    }
    let mut plan = QueryPlan::with_steps([
        Step::nodes("0", Some(view())).filter(Filter::in_values(
            "idx",
            vec![json!(1), json!(2)],
        )),
        Step::nodes("0_1", Some(events))
            .from("0")
            .through(Direction::Inwards, Through::list("assets"))
            .reverse_list()
            .nest_as("events", Cardinality::List),
    ])
    .unwrap();
    let summary = QueryExecutor::new(&store, EngineConfig::default())
        .execute_with_observer(&mut plan, &mut NoopObserver)
        .unwrap();
    assert_eq!(summary.side_channel_calls, 1);
    assert!(
        store
            .calls()
            .iter()
            .any(|call| matches!(call, StoreCall::Search { .. }))
    );
    let items = unpack(&plan).items;
    assert_eq!(items[0]["events"].as_array().unwrap().len(), 1);
    assert_eq!(items[1]["events"].as_array().unwrap().len(), 2);
}

#[test]
fn test_count_respects_view_and_filter() {
    let store = seeded_store();
    assert_eq!(store.count_nodes(Some(&view()), None).unwrap(), 10);
    let filter = Filter::Range {
        property: "idx".to_string(),
        gte: Some(3.0),
        lte: Some(5.0),
    };
    assert_eq!(store.count_nodes(None, Some(&filter)).unwrap(), 3);
    store.fail_next(FaultPoint::Count, 1, 500);
    assert!(store.count_nodes(None, None).is_err());
    assert_eq!(store.count_nodes(None, None).unwrap(), 10);

    store.fail_next(FaultPoint::Search, 5, 500);
    store.faults().reset();
    assert_eq!(
        store
            .search_nodes(None, &Filter::exists("name"), 4)
            .unwrap()
            .len(),
        4
    );
    store.clear_calls();
    assert!(store.calls().is_empty());
}

#[test]
fn test_generated_hierarchy_round_trips_through_store() {
    let dataset = generate_dataset(DatasetShape::Hierarchy { roots: 3 }, 200, 0x5EED);
    let store = SqliteStore::open_in_memory().unwrap().with_page_size(64);
    dataset.load_into(&store).unwrap();
    assert_eq!(store.node_count().unwrap(), 200);

    let mut plan = QueryPlan::with_steps([
        Step::nodes("0", Some(dataset.view.clone())).filter(Filter::equals("idx", 0)),
        Step::nodes("0_1", Some(dataset.view.clone()))
            .from("0")
            .through(Direction::Inwards, Through::single("parent"))
            .limit(-1),
    ])
    .unwrap();
    QueryExecutor::new(&store, EngineConfig::default())
        .execute_with_observer(&mut plan, &mut NoopObserver)
        .unwrap();
    let children = plan.step("0_1").unwrap().results().len();
    assert_eq!(children, dataset.child_count(0));
    assert_eq!(Dataset::node_id(0), plan.root().unwrap().results()[0].id().clone());
}


#[test]
fn test_child_cursor_restarts_when_parent_page_moves() {
    let store = SqliteStore::open_in_memory().unwrap().with_page_size(4);
    for root in 0..6 {
        store
            .insert_node(Some(&view()), &NodeRecord::new(id(&format!("r{root}")), json!({})))
            .unwrap();
    }
    for root in 0..6 {
        for child in 0..3 {
            store
                .insert_node(
                    Some(&events_view()),
                    &NodeRecord::new(
                        id(&format!("c{root}_{child}")),
                        json!({ "parent": reference(&format!("r{root}")) }),
                    ),
                )
                .unwrap();
        }
    }
    let mut plan = QueryPlan::with_steps([
        Step::nodes("0", Some(view())).limit(-1),
        Step::nodes("0_1", Some(events_view()))
            .from("0")
            .through(Direction::Inwards, Through::single("parent"))
            .limit(-1),
    ])
    .unwrap();
    let summary = QueryExecutor::new(&store, EngineConfig::default())
        .execute_with_observer(&mut plan, &mut NoopObserver)
        .unwrap();
    assert_eq!(summary.rounds, 2);
    let kids: Vec<String> = plan
        .step("0_1")
        .unwrap()
        .results()
        .iter()
        .map(|record| record.id().external_id.clone())
        .collect();
    assert_eq!(
        kids,
        ["c0_0", "c0_1", "c0_2", "c1_0", "c4_0", "c4_1", "c4_2", "c5_0"]
    );
}
