use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId {
    pub space: String,
    #[serde(rename = "externalId")]
    pub external_id: String,
}

impl InstanceId {
    pub fn new(space: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            space: space.into(),
            external_id: external_id.into(),
        }
    }

    /// Direct-relation reference form: `{"space": .., "externalId": ..}`.
    pub fn to_value(&self) -> Value {
        json!({ "space": self.space, "externalId": self.external_id })
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let space = object.get("space")?.as_str()?;
        let external_id = object.get("externalId")?.as_str()?;
        Some(Self::new(space, external_id))
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.space, self.external_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewId {
    pub space: String,
    #[serde(rename = "externalId")]
    pub external_id: String,
    pub version: String,
}

impl ViewId {
    pub fn new(
        space: impl Into<String>,
        external_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            space: space.into(),
            external_id: external_id.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.space, self.external_id, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: InstanceId,
    pub properties: Map<String, Value>,
}

impl NodeRecord {
    pub fn new(id: InstanceId, properties: Value) -> Self {
        Self {
            id,
            properties: into_map(properties),
        }
    }

    pub fn relation_ids(&self, property: &str) -> Vec<InstanceId> {
        self.properties
            .get(property)
            .map(direct_relation_ids)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: InstanceId,
    #[serde(rename = "type")]
    pub edge_type: InstanceId,
    #[serde(rename = "startNode")]
    pub start_node: InstanceId,
    #[serde(rename = "endNode")]
    pub end_node: InstanceId,
    pub properties: Map<String, Value>,
}

impl EdgeRecord {
    pub fn new(
        id: InstanceId,
        edge_type: InstanceId,
        start_node: InstanceId,
        end_node: InstanceId,
        properties: Value,
    ) -> Self {
        Self {
            id,
            edge_type,
            start_node,
            end_node,
            properties: into_map(properties),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "instanceType", rename_all = "lowercase")]
pub enum Instance {
    Node(NodeRecord),
    Edge(EdgeRecord),
}

impl Instance {
    pub fn id(&self) -> &InstanceId {
        match self {
            Instance::Node(node) => &node.id,
            Instance::Edge(edge) => &edge.id,
        }
    }

    pub fn properties(&self) -> &Map<String, Value> {
        match self {
            Instance::Node(node) => &node.properties,
            Instance::Edge(edge) => &edge.properties,
        }
    }

    pub fn as_node(&self) -> Option<&NodeRecord> {
        match self {
            Instance::Node(node) => Some(node),
            Instance::Edge(_) => None,
        }
    }

    pub fn as_edge(&self) -> Option<&EdgeRecord> {
        match self {
            Instance::Edge(edge) => Some(edge),
            Instance::Node(_) => None,
        }
    }

    /// Resolves a property, including the identity and endpoint pseudo-properties.
    pub fn lookup(&self, property: &str) -> Option<Value> {
        match (property, self) {
            ("space", _) => Some(Value::String(self.id().space.clone())),
            ("externalId", _) => Some(Value::String(self.id().external_id.clone())),
            ("type", Instance::Edge(edge)) => Some(edge.edge_type.to_value()),
            ("startNode", Instance::Edge(edge)) => Some(edge.start_node.to_value()),
            ("endNode", Instance::Edge(edge)) => Some(edge.end_node.to_value()),
            _ => self.properties().get(property).cloned(),
        }
    }
}

impl From<NodeRecord> for Instance {
    fn from(node: NodeRecord) -> Self {
        Instance::Node(node)
    }
}

impl From<EdgeRecord> for Instance {
    fn from(edge: EdgeRecord) -> Self {
        Instance::Edge(edge)
    }
}

/// Decodes a scalar or list-valued direct relation into identifiers.
/// Entries that are not references are skipped.
pub fn direct_relation_ids(value: &Value) -> Vec<InstanceId> {
    match value {
        Value::Array(items) => items.iter().filter_map(InstanceId::from_value).collect(),
        other => InstanceId::from_value(other).into_iter().collect(),
    }
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
