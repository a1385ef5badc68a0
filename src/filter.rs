use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::instance::{Instance, InstanceId};

/// Predicate over instance properties, evaluated by the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Filter {
    Equals { property: String, value: Value },
    /// Matches a scalar value in `values`, or a list value sharing any element with `values`.
    In { property: String, values: Vec<Value> },
    Prefix { property: String, value: String },
    Range {
        property: String,
        gte: Option<f64>,
        lte: Option<f64>,
    },
    Exists { property: String },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn equals(property: &str, value: impl Into<Value>) -> Self {
        Filter::Equals {
            property: property.to_string(),
            value: value.into(),
        }
    }

    pub fn in_values(property: &str, values: Vec<Value>) -> Self {
        Filter::In {
            property: property.to_string(),
            values,
        }
    }

    /// `property` references one of `ids` (scalar or list-valued direct relation).
    pub fn references_any(property: &str, ids: &[InstanceId]) -> Self {
        Self::in_values(property, ids.iter().map(InstanceId::to_value).collect())
    }

    pub fn prefix(property: &str, value: &str) -> Self {
        Filter::Prefix {
            property: property.to_string(),
            value: value.to_string(),
        }
    }

    pub fn exists(property: &str) -> Self {
        Filter::Exists {
            property: property.to_string(),
        }
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    pub fn matches(&self, instance: &Instance) -> bool {
        match self {
            Filter::Equals { property, value } => instance.lookup(property).as_ref() == Some(value),
            Filter::In { property, values } => match instance.lookup(property) {
                Some(Value::Array(items)) => items.iter().any(|item| values.contains(item)),
                Some(value) => values.contains(&value),
                None => false,
            },
            Filter::Prefix { property, value } => instance
                .lookup(property)
                .as_ref()
                .and_then(Value::as_str)
                .is_some_and(|text| text.starts_with(value.as_str())),
            Filter::Range { property, gte, lte } => {
                let Some(number) = instance.lookup(property).as_ref().and_then(Value::as_f64)
                else {
                    return false;
                };
                gte.is_none_or(|low| number >= low) && lte.is_none_or(|high| number <= high)
            }
            Filter::Exists { property } => instance
                .lookup(property)
                .is_some_and(|value| !value.is_null()),
            Filter::And(parts) => parts.iter().all(|part| part.matches(instance)),
            Filter::Or(parts) => parts.iter().any(|part| part.matches(instance)),
            Filter::Not(inner) => !inner.matches(instance),
        }
    }
}
