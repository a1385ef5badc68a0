use ahash::AHashSet;

use crate::{
    errors::GraphQueryError,
    plan::QueryPlan,
    query::{QueryRequest, ResultSetExpression, WithClause},
    step::Selection,
};

#[derive(Clone, Debug, Default)]
pub struct CompiledQuery {
    pub request: QueryRequest,
    /// Steps the store cannot traverse natively, in plan order.
    pub side_channel: Vec<String>,
    /// Parents selected only so side-channel steps can read their identifiers.
    pub temporary_selects: AHashSet<String>,
}

pub fn compile(plan: &QueryPlan) -> Result<CompiledQuery, GraphQueryError> {
    let mut compiled = CompiledQuery::default();
    for step in plan {
        if !step.is_natively_queryable() {
            compiled.side_channel.push(step.name.clone());
            continue;
        }
        if let Some(parent) = step.parent_name.as_deref() {
            let native_parent = plan.step(parent).is_some_and(|p| p.is_natively_queryable());
            if !native_parent {
                return Err(GraphQueryError::invalid_plan(format!(
                    "step {} cannot traverse natively from side-channel step {parent}",
                    step.name
                )));
            }
        }
        compiled.request.with.push(WithClause {
            name: step.name.clone(),
            expression: ResultSetExpression {
                from: step.parent_name.clone(),
                traversal: step.expression.clone(),
                view: step.view_id.clone(),
                filter: step.raw_filter.clone(),
                limit: step.request_limit(),
            },
        });
        if step.selection != Selection::Unselected {
            compiled
                .request
                .select
                .insert(step.name.clone(), step.selection.clone());
        }
        if let Some(cursor) = step.cursor() {
            compiled
                .request
                .cursors
                .insert(step.name.clone(), cursor.to_string());
        }
    }

    for name in &compiled.side_channel {
        let Some(parent) = plan.step(name).and_then(|step| step.parent_name.as_deref()) else {
            continue;
        };
        let native_parent = plan.step(parent).is_some_and(|p| p.is_natively_queryable());
        if native_parent && !compiled.request.select.contains_key(parent) {
            compiled
                .request
                .select
                .insert(parent.to_string(), Selection::AllProperties);
            compiled.temporary_selects.insert(parent.to_string());
        }
    }

    // Only selected steps get a cursor back, so an unselected root could never page.
    if let Some(root) = plan.root() {
        if !compiled.request.select.contains_key(&root.name) {
            return Err(GraphQueryError::invalid_plan(format!(
                "root step {} must be selected",
                root.name
            )));
        }
    }
    Ok(compiled)
}
