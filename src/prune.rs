//! Inner-join pruning. The store evaluates every branch of a plan as an independent left
//! join; this pass walks the plan tree bottom-up and drops records that no child branch
//! connects to.

use ahash::{AHashMap, AHashSet};

use crate::{
    errors::GraphQueryError,
    instance::{Instance, InstanceId},
    plan::{PlanTree, QueryPlan},
    step::{Direction, Step, StepExpression},
};

/// Identifiers a child contributes, keyed by how the parent must match them:
/// `None` compares the parent's identity, `Some(property)` the parent's relation value.
type ExpectedIds = AHashMap<Option<String>, AHashSet<InstanceId>>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub removed: AHashMap<String, usize>,
}

impl PruneReport {
    pub fn total_removed(&self) -> usize {
        self.removed.values().sum()
    }
}

pub fn remove_not_connected(plan: &mut QueryPlan) -> Result<PruneReport, GraphQueryError> {
    let tree = plan.tree();
    let mut report = PruneReport::default();
    if let Some(root) = tree.root().map(str::to_string) {
        expected_ids(plan, &tree, &root, &mut report)?;
    }
    Ok(report)
}

fn expected_ids(
    plan: &mut QueryPlan,
    tree: &PlanTree,
    name: &str,
    report: &mut PruneReport,
) -> Result<(AHashSet<InstanceId>, Option<String>), GraphQueryError> {
    let mut expected: ExpectedIds = AHashMap::new();
    for child in tree.children(name) {
        let (ids, tag) = expected_ids(plan, tree, child, report)?;
        // A child that returned nothing imposes no constraint.
        if !ids.is_empty() {
            expected.entry(tag).or_default().extend(ids);
        }
    }
    let step = plan
        .step_mut(name)
        .ok_or_else(|| GraphQueryError::internal(format!("step {name} missing from plan")))?;
    let before = step.results().len();

    let contribution = match step.expression.clone() {
        StepExpression::Nodes(_) => {
            if !expected.is_empty() {
                step.retain_results(|record| is_connected_node(record, &expected));
            }
            node_contribution(step)
        }
        StepExpression::Edges(edges) => {
            if !expected.is_empty() {
                if expected.len() > 1 || !expected.contains_key(&None::<String>) {
                    return Err(GraphQueryError::internal(format!(
                        "edge step {name} can only be joined on node identity"
                    )));
                }
                let targets = expected.remove(&None::<String>).unwrap_or_default();
                step.retain_results(|record| {
                    record.as_edge().is_some_and(|edge| {
                        let (_, target) = edges.endpoints(&edge.start_node, &edge.end_node);
                        targets.contains(target)
                    })
                });
            }
            let sources = step
                .results()
                .iter()
                .filter_map(Instance::as_edge)
                .map(|edge| edges.endpoints(&edge.start_node, &edge.end_node).0.clone())
                .collect();
            (sources, None)
        }
    };

    let removed = before - step.results().len();
    if removed > 0 {
        report.removed.insert(name.to_string(), removed);
    }
    Ok(contribution)
}

fn node_contribution(step: &Step) -> (AHashSet<InstanceId>, Option<String>) {
    match step.through_relation() {
        Some((through, Direction::Inwards)) => {
            let referenced = step
                .results()
                .iter()
                .filter_map(Instance::as_node)
                .flat_map(|node| node.relation_ids(&through.property))
                .collect();
            (referenced, None)
        }
        Some((through, Direction::Outwards)) => (own_ids(step), Some(through.property.clone())),
        None => (own_ids(step), None),
    }
}

fn own_ids(step: &Step) -> AHashSet<InstanceId> {
    step.results()
        .iter()
        .map(|record| record.id().clone())
        .collect()
}

fn is_connected_node(record: &Instance, expected: &ExpectedIds) -> bool {
    if expected
        .get(&None::<String>)
        .is_some_and(|ids| ids.contains(record.id()))
    {
        return true;
    }
    let Some(node) = record.as_node() else {
        return false;
    };
    expected.iter().any(|(tag, ids)| match tag {
        Some(property) => node
            .relation_ids(property)
            .iter()
            .any(|id| ids.contains(id)),
        None => false,
    })
}
