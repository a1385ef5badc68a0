use serde::{Deserialize, Serialize};

use crate::{
    filter::Filter,
    instance::{Instance, InstanceId, ViewId},
    query::ResultBatch,
};

/// Hard per-request record limit enforced by the store.
pub const ACTUAL_INSTANCE_QUERY_LIMIT: u64 = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outwards,
    Inwards,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    Single,
    List,
}

/// Direct-relation property a node traversal follows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Through {
    pub view: Option<ViewId>,
    pub property: String,
    pub cardinality: Cardinality,
}

impl Through {
    pub fn single(property: &str) -> Self {
        Self {
            view: None,
            property: property.to_string(),
            cardinality: Cardinality::Single,
        }
    }

    pub fn list(property: &str) -> Self {
        Self {
            view: None,
            property: property.to_string(),
            cardinality: Cardinality::List,
        }
    }

    pub fn in_view(mut self, view: ViewId) -> Self {
        self.view = Some(view);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeTraversal {
    pub direction: Direction,
    pub through: Option<Through>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeTraversal {
    pub direction: Direction,
    pub edge_type: Option<InstanceId>,
}

impl EdgeTraversal {
    /// `(source, target)` endpoints of an edge as seen from the traversal's origin.
    pub fn endpoints<'a>(
        &self,
        start: &'a InstanceId,
        end: &'a InstanceId,
    ) -> (&'a InstanceId, &'a InstanceId) {
        match self.direction {
            Direction::Outwards => (start, end),
            Direction::Inwards => (end, start),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StepExpression {
    Nodes(NodeTraversal),
    Edges(EdgeTraversal),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionKind {
    #[default]
    Ordinary,
    /// One-to-many reverse direct relation; resolved through search calls.
    ReverseList,
}

/// What a step asks the store to return.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Selection {
    /// Traversal only; the store returns no records for the step.
    Unselected,
    #[default]
    AllProperties,
    Properties(Vec<String>),
}

#[derive(Clone, Debug)]
pub struct Step {
    pub name: String,
    pub expression: StepExpression,
    pub parent_name: Option<String>,
    pub view_id: Option<ViewId>,
    pub max_retrieve_limit: Option<u64>,
    pub selection: Selection,
    pub raw_filter: Option<Filter>,
    pub connection_kind: ConnectionKind,
    /// Field under which this step's records nest into the parent's documents.
    pub connection_property: Option<String>,
    pub connection_cardinality: Option<Cardinality>,
    /// Properties the caller wants in the unpacked documents; `None` keeps all.
    pub selected_properties: Option<Vec<String>>,
    cursor: Option<String>,
    total_retrieved: u64,
    last_batch_count: usize,
    results: Vec<Instance>,
    max_batch_limit: u64,
    request_limit: u64,
}

impl Step {
    pub fn new(name: &str, expression: StepExpression) -> Self {
        Self {
            name: name.to_string(),
            expression,
            parent_name: None,
            view_id: None,
            max_retrieve_limit: None,
            selection: Selection::default(),
            raw_filter: None,
            connection_kind: ConnectionKind::Ordinary,
            connection_property: None,
            connection_cardinality: None,
            selected_properties: None,
            cursor: None,
            total_retrieved: 0,
            last_batch_count: 0,
            results: Vec::new(),
            max_batch_limit: ACTUAL_INSTANCE_QUERY_LIMIT,
            request_limit: ACTUAL_INSTANCE_QUERY_LIMIT,
        }
    }

    pub fn nodes(name: &str, view: Option<ViewId>) -> Self {
        let mut step = Self::new(
            name,
            StepExpression::Nodes(NodeTraversal {
                direction: Direction::Outwards,
                through: None,
            }),
        );
        step.view_id = view;
        step
    }

    pub fn edges(name: &str, direction: Direction, edge_type: Option<InstanceId>) -> Self {
        Self::new(
            name,
            StepExpression::Edges(EdgeTraversal {
                direction,
                edge_type,
            }),
        )
    }

    pub fn from(mut self, parent: &str) -> Self {
        self.parent_name = Some(parent.to_string());
        self
    }

    /// Follows a direct relation; only meaningful for node steps.
    pub fn through(mut self, direction: Direction, through: Through) -> Self {
        if let StepExpression::Nodes(nodes) = &mut self.expression {
            nodes.direction = direction;
            nodes.through = Some(through);
        }
        self
    }

    /// Negative limits mean unlimited.
    pub fn limit(mut self, limit: i64) -> Self {
        self.max_retrieve_limit = u64::try_from(limit).ok();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.raw_filter = Some(filter);
        self
    }

    pub fn select(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn reverse_list(mut self) -> Self {
        self.connection_kind = ConnectionKind::ReverseList;
        self
    }

    pub fn nest_as(mut self, property: &str, cardinality: Cardinality) -> Self {
        self.connection_property = Some(property.to_string());
        self.connection_cardinality = Some(cardinality);
        self
    }

    pub fn keep_properties(mut self, properties: &[&str]) -> Self {
        self.selected_properties = Some(properties.iter().map(|p| p.to_string()).collect());
        self
    }
}

impl Step {
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn total_retrieved(&self) -> u64 {
        self.total_retrieved
    }

    pub fn last_batch_count(&self) -> usize {
        self.last_batch_count
    }

    pub fn results(&self) -> &[Instance] {
        &self.results
    }

    pub fn max_batch_limit(&self) -> u64 {
        self.max_batch_limit
    }

    pub fn request_limit(&self) -> u64 {
        self.request_limit
    }

    pub fn through_relation(&self) -> Option<(&Through, Direction)> {
        match &self.expression {
            StepExpression::Nodes(nodes) => nodes.through.as_ref().map(|t| (t, nodes.direction)),
            StepExpression::Edges(_) => None,
        }
    }

    pub fn is_natively_queryable(&self) -> bool {
        self.connection_kind != ConnectionKind::ReverseList
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_retrieve_limit.is_none()
    }

    /// An outward single-valued direct relation yields at most one record per parent
    /// record, so it never paginates on its own.
    pub fn is_single_direct_relation(&self) -> bool {
        matches!(
            self.through_relation(),
            Some((through, Direction::Outwards)) if through.cardinality == Cardinality::Single
        )
    }

    pub fn is_finished(&self) -> bool {
        let limit_reached = self
            .max_retrieve_limit
            .is_some_and(|limit| self.total_retrieved >= limit);
        limit_reached
            || self.cursor.is_none()
            || self.last_batch_count == 0
            || self.is_single_direct_relation()
    }

    pub fn remaining(&self) -> Option<u64> {
        self.max_retrieve_limit
            .map(|limit| limit.saturating_sub(self.total_retrieved))
    }

    pub fn update_limit_for_round(&mut self) {
        self.request_limit = match self.remaining() {
            Some(remaining) => remaining.min(self.max_batch_limit),
            None => self.max_batch_limit,
        };
    }

    /// Halves the adaptive cap (floor 1). Returns whether the cap is still above the floor.
    pub fn reduce_batch_cap(&mut self) -> bool {
        self.max_batch_limit = (self.max_batch_limit / 2).max(1);
        self.max_batch_limit > 1
    }

    /// Lowers the adaptive cap to `limit` if it is currently higher.
    pub fn clamp_batch_limit(&mut self, limit: u64) {
        self.max_batch_limit = self.max_batch_limit.min(limit.max(1));
    }

    /// Clears pagination state. The adaptive cap survives across executions.
    pub fn reset(&mut self) {
        self.cursor = None;
        self.total_retrieved = 0;
        self.last_batch_count = 0;
        self.results.clear();
        self.request_limit = self.max_batch_limit;
    }

    pub fn record_batch(&mut self, batch: ResultBatch) {
        self.advance(&batch);
        self.results.extend(batch.records);
    }

    /// Advances pagination without keeping the records, for steps selected only so a
    /// side-channel child could read their identifiers.
    pub fn skip_batch(&mut self, batch: ResultBatch) {
        self.advance(&batch);
    }

    fn advance(&mut self, batch: &ResultBatch) {
        self.last_batch_count = batch.records.len();
        self.total_retrieved += batch.records.len() as u64;
        self.cursor = batch.cursor.clone();
    }

    pub fn retain_results<F>(&mut self, keep: F)
    where
        F: FnMut(&Instance) -> bool,
    {
        self.results.retain(keep);
    }

    /// Field name used when nesting this step under its parent.
    pub fn nesting_property(&self) -> &str {
        if let Some(property) = self.connection_property.as_deref() {
            return property;
        }
        match self.through_relation() {
            Some((through, Direction::Outwards)) => &through.property,
            _ => &self.name,
        }
    }

    pub fn nesting_cardinality(&self) -> Cardinality {
        if let Some(cardinality) = self.connection_cardinality {
            return cardinality;
        }
        match self.through_relation() {
            Some((through, Direction::Outwards)) => through.cardinality,
            _ => Cardinality::List,
        }
    }
}
