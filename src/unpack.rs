//! Rebuilds nested documents from the flat per-step result lists. Steps are visited in
//! reverse plan order so every child is unpacked before its parent splices it in.

use ahash::AHashMap;
use serde_json::{Map, Value};
use tracing::warn;

use crate::{
    instance::{EdgeRecord, Instance, InstanceId, NodeRecord},
    plan::{PlanTree, QueryPlan},
    step::{Cardinality, Direction, EdgeTraversal, Step, StepExpression},
};

pub type Document = Map<String, Value>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Unpacked {
    pub items: Vec<Document>,
    /// One entry per nested reference that could not be resolved.
    pub warnings: Vec<String>,
}

/// Documents of one step, grouped by the key its parent looks them up with.
#[derive(Debug, Default)]
struct Grouped {
    order: Vec<InstanceId>,
    by_key: AHashMap<InstanceId, Vec<Document>>,
}

impl Grouped {
    fn push(&mut self, key: InstanceId, document: Document) {
        let entry = self.by_key.entry(key.clone()).or_insert_with(|| {
            self.order.push(key);
            Vec::new()
        });
        entry.push(document);
    }

    fn get(&self, key: &InstanceId) -> &[Document] {
        self.by_key.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    fn into_items(mut self) -> Vec<Document> {
        let mut items = Vec::new();
        for key in &self.order {
            if let Some(documents) = self.by_key.remove(key) {
                items.extend(documents);
            }
        }
        items
    }
}

pub fn unpack(plan: &QueryPlan) -> Unpacked {
    let tree = plan.tree();
    let mut unpacked: AHashMap<String, Grouped> = AHashMap::new();
    let mut warnings = Vec::new();

    for step in plan.iter().rev() {
        let grouped = match &step.expression {
            StepExpression::Nodes(_) => {
                unpack_nodes(plan, &tree, step, &unpacked, &mut warnings)
            }
            StepExpression::Edges(edges) => unpack_edges(&tree, step, edges, &unpacked),
        };
        unpacked.insert(step.name.clone(), grouped);
    }

    let items = plan
        .root()
        .and_then(|root| unpacked.remove(&root.name))
        .map(Grouped::into_items)
        .unwrap_or_default();
    Unpacked { items, warnings }
}

fn unpack_nodes(
    plan: &QueryPlan,
    tree: &PlanTree,
    step: &Step,
    unpacked: &AHashMap<String, Grouped>,
    warnings: &mut Vec<String>,
) -> Grouped {
    let mut latest: AHashMap<&InstanceId, &NodeRecord> = AHashMap::new();
    let mut order = Vec::new();
    for node in step.results().iter().filter_map(Instance::as_node) {
        if latest.insert(&node.id, node).is_none() {
            order.push(&node.id);
        }
    }

    let reverse_through = match step.through_relation() {
        Some((through, Direction::Inwards)) => Some(through.property.as_str()),
        _ => None,
    };
    let mut grouped = Grouped::default();
    for id in order {
        let node = latest[id];
        let mut document = node_document(node, step.selected_properties.as_deref());
        for child_name in tree.children(&step.name) {
            let (Some(child), Some(contribution)) =
                (plan.step(child_name), unpacked.get(child_name))
            else {
                continue;
            };
            splice_child(&mut document, node, child, contribution, warnings);
        }
        match reverse_through {
            Some(property) => {
                for foreign in node.relation_ids(property) {
                    grouped.push(foreign, document.clone());
                }
            }
            None => grouped.push(node.id.clone(), document),
        }
    }
    grouped
}

fn splice_child(
    document: &mut Document,
    node: &NodeRecord,
    child: &Step,
    contribution: &Grouped,
    warnings: &mut Vec<String>,
) {
    let field = child.nesting_property().to_string();
    if let Some((through, Direction::Outwards)) = child.through_relation() {
        let Some(raw) = node.properties.get(&through.property) else {
            return;
        };
        let mut resolve = |id: InstanceId| match contribution.get(&id).first() {
            Some(target) => Some(Value::Object(target.clone())),
            None => {
                let message = format!("{} on {} references unknown {id}", field, node.id);
                warn!("{message}");
                warnings.push(message);
                None
            }
        };
        match raw {
            Value::Null => {}
            Value::Array(items) => {
                let resolved = items
                    .iter()
                    .filter_map(InstanceId::from_value)
                    .filter_map(&mut resolve)
                    .collect();
                document.insert(field, Value::Array(resolved));
            }
            scalar => match InstanceId::from_value(scalar).and_then(resolve) {
                Some(target) => {
                    document.insert(field, target);
                }
                None => {
                    document.remove(&field);
                }
            },
        }
        return;
    }

    let nested = contribution.get(&node.id);
    let value = match child.nesting_cardinality() {
        Cardinality::List => Value::Array(nested.iter().cloned().map(Value::Object).collect()),
        Cardinality::Single => nested
            .first()
            .cloned()
            .map(Value::Object)
            .unwrap_or(Value::Null),
    };
    document.insert(field, value);
}

fn unpack_edges(
    tree: &PlanTree,
    step: &Step,
    edges: &EdgeTraversal,
    unpacked: &AHashMap<String, Grouped>,
) -> Grouped {
    let targets: Vec<&Grouped> = tree
        .children(&step.name)
        .iter()
        .filter_map(|child| unpacked.get(child))
        .collect();
    // Edges carrying no caller-visible properties nest their target node directly.
    let flatten = step
        .selected_properties
        .as_ref()
        .is_some_and(|properties| properties.is_empty());
    let endpoint_field = match edges.direction {
        Direction::Outwards => "endNode",
        Direction::Inwards => "startNode",
    };

    let mut grouped = Grouped::default();
    for edge in step.results().iter().filter_map(Instance::as_edge) {
        let (source, target) = edges.endpoints(&edge.start_node, &edge.end_node);
        let target_document = targets
            .iter()
            .find_map(|grouped| grouped.get(target).first())
            .cloned();
        let document = match (flatten, target_document) {
            (true, Some(target_document)) => target_document,
            (_, target_document) => {
                let mut document = edge_document(edge, step.selected_properties.as_deref());
                if let Some(target_document) = target_document {
                    document.insert(endpoint_field.to_string(), Value::Object(target_document));
                }
                document
            }
        };
        grouped.push(source.clone(), document);
    }
    grouped
}

fn node_document(node: &NodeRecord, keep: Option<&[String]>) -> Document {
    let mut document = Document::new();
    document.insert("space".into(), Value::String(node.id.space.clone()));
    document.insert(
        "externalId".into(),
        Value::String(node.id.external_id.clone()),
    );
    document.insert("instanceType".into(), Value::String("node".into()));
    copy_properties(&mut document, &node.properties, keep);
    document
}

fn edge_document(edge: &EdgeRecord, keep: Option<&[String]>) -> Document {
    let mut document = Document::new();
    document.insert("space".into(), Value::String(edge.id.space.clone()));
    document.insert(
        "externalId".into(),
        Value::String(edge.id.external_id.clone()),
    );
    document.insert("instanceType".into(), Value::String("edge".into()));
    document.insert("type".into(), edge.edge_type.to_value());
    document.insert("startNode".into(), edge.start_node.to_value());
    document.insert("endNode".into(), edge.end_node.to_value());
    copy_properties(&mut document, &edge.properties, keep);
    document
}

fn copy_properties(
    document: &mut Document,
    properties: &Map<String, Value>,
    keep: Option<&[String]>,
) {
    for (key, value) in properties {
        if keep.is_none_or(|keep| keep.iter().any(|k| k == key)) {
            document.insert(key.clone(), value.clone());
        }
    }
}
