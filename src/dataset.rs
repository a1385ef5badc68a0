//! Seeded synthetic instance graphs for benches and end-to-end tests.

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde_json::{Value, json};

use crate::instance::{EdgeRecord, InstanceId, NodeRecord, ViewId};

pub const DATASET_SPACE: &str = "synthetic";
pub const LINK_EDGE_TYPE: &str = "linksTo";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatasetShape {
    /// Forest of `roots` trees; every other node points at an earlier node via `parent`.
    Hierarchy { roots: usize },
    /// Every node references `fanout` random other nodes via the list relation `links`.
    Linked { fanout: usize },
    /// Every node starts `edges_per_node` typed edges to random other nodes.
    EdgeNetwork { edges_per_node: usize },
}

#[derive(Clone, Debug)]
pub struct Dataset {
    pub view: ViewId,
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

impl Dataset {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn node_id(idx: usize) -> InstanceId {
        InstanceId::new(DATASET_SPACE, format!("asset-{idx}"))
    }

    pub fn edge_type() -> InstanceId {
        InstanceId::new(DATASET_SPACE, LINK_EDGE_TYPE)
    }

    /// Number of nodes whose `parent` is the node at `idx`.
    pub fn child_count(&self, idx: usize) -> usize {
        let id = Self::node_id(idx);
        self.nodes
            .iter()
            .filter(|node| node.relation_ids("parent").contains(&id))
            .count()
    }

    #[cfg(feature = "sqlite-store")]
    pub fn load_into(
        &self,
        store: &crate::store::SqliteStore,
    ) -> Result<(), crate::errors::GraphQueryError> {
        for node in &self.nodes {
            store.insert_node(Some(&self.view), node)?;
        }
        for edge in &self.edges {
            store.insert_edge(edge)?;
        }
        Ok(())
    }
}

pub fn asset_view() -> ViewId {
    ViewId::new(DATASET_SPACE, "Asset", "v1")
}

pub fn generate_dataset(shape: DatasetShape, node_count: usize, seed: u64) -> Dataset {
    assert!(node_count > 1, "node_count must exceed 1");
    let mut rng = StdRng::seed_from_u64(seed);
    let mut parents: Vec<Option<usize>> = vec![None; node_count];
    let mut links: Vec<Vec<usize>> = vec![Vec::new(); node_count];
    let mut edges = Vec::new();

    match shape {
        DatasetShape::Hierarchy { roots } => {
            let roots = roots.clamp(1, node_count);
            for (idx, parent) in parents.iter_mut().enumerate().skip(roots) {
                *parent = Some(rng.gen_range(0..idx));
            }
        }
        DatasetShape::Linked { fanout } => {
            let fanout = fanout.min(node_count - 1);
            for (idx, targets) in links.iter_mut().enumerate() {
                while targets.len() < fanout {
                    let pick = rng.gen_range(0..node_count);
                    if pick != idx && !targets.contains(&pick) {
                        targets.push(pick);
                    }
                }
                targets.sort_unstable();
            }
        }
        DatasetShape::EdgeNetwork { edges_per_node } => {
            for from in 0..node_count {
                for slot in 0..edges_per_node {
                    let mut to = rng.gen_range(0..node_count);
                    if to == from {
                        to = (to + 1) % node_count;
                    }
                    edges.push(new_edge(from, to, slot));
                }
            }
        }
    }

    let nodes = (0..node_count)
        .map(|idx| new_node(idx, parents[idx], &links[idx]))
        .collect();
    Dataset {
        view: asset_view(),
        nodes,
        edges,
    }
}

fn new_node(idx: usize, parent: Option<usize>, links: &[usize]) -> NodeRecord {
    let parent = parent.map_or(Value::Null, |p| Dataset::node_id(p).to_value());
    let links: Vec<Value> = links
        .iter()
        .map(|&target| Dataset::node_id(target).to_value())
        .collect();
    NodeRecord::new(
        Dataset::node_id(idx),
        json!({
            "name": format!("Asset{idx}"),
            "idx": idx,
            "parent": parent,
            "links": links,
        }),
    )
}

fn new_edge(from: usize, to: usize, slot: usize) -> EdgeRecord {
    EdgeRecord::new(
        InstanceId::new(DATASET_SPACE, format!("link-{from}-{slot}")),
        Dataset::edge_type(),
        Dataset::node_id(from),
        Dataset::node_id(to),
        json!({ "weight": slot + 1 }),
    )
}
