//! CRUSH topology resolution.
//!
//! `osd tree` returns a flat node list where containers point down at their
//! children. Every OSD leaf is resolved to its nearest host, rack and root
//! ancestor so per-OSD series can carry placement labels.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use crate::error::{ExporterError, Result};

/// `osd tree` payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OsdTree {
    #[serde(default)]
    pub nodes: Vec<TreeNode>,
    #[serde(default)]
    pub stray: Vec<TreeNode>,
}

impl OsdTree {
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(ExporterError::parse("osd tree"))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TreeNode {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub device_class: String,
    #[serde(default)]
    pub crush_weight: f64,
    #[serde(default)]
    pub children: Vec<i64>,
}

/// Placement labels of one OSD
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsdLabels {
    pub osd: String,
    pub device_class: String,
    pub host: String,
    pub rack: String,
    pub root: String,
}

impl OsdLabels {
    /// Label values in [`OSD_LABELS`] order
    pub fn values(&self) -> [&str; 5] {
        [
            &self.osd,
            &self.device_class,
            &self.host,
            &self.rack,
            &self.root,
        ]
    }
}

/// Label names carried by every per-OSD family
pub const OSD_LABELS: [&str; 5] = ["osd", "device_class", "host", "rack", "root"];

/// Resolved label table, keyed by OSD id
#[derive(Debug, Clone, Default)]
pub struct Topology {
    osds: HashMap<i64, OsdLabels>,
}

impl Topology {
    pub fn from_tree(tree: &OsdTree) -> Self {
        let mut topology = resolve(&tree.nodes);

        for node in tree.stray.iter().filter(|n| n.kind == "osd") {
            topology
                .osds
                .entry(node.id)
                .or_insert_with(|| OsdLabels {
                    osd: node.name.clone(),
                    device_class: node.device_class.clone(),
                    ..OsdLabels::default()
                });
        }

        topology
    }

    /// Labels for an OSD; ids missing from the tree get empty placement labels.
    pub fn labels(&self, id: i64) -> OsdLabels {
        self.osds.get(&id).cloned().unwrap_or_else(|| OsdLabels {
            osd: format!("osd.{id}"),
            ..OsdLabels::default()
        })
    }

    pub fn get(&self, id: i64) -> Option<&OsdLabels> {
        self.osds.get(&id)
    }

    pub fn len(&self) -> usize {
        self.osds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.osds.is_empty()
    }
}

/// Resolve every `osd` node of a flat tree to its host, rack and root.
///
/// A child listed by several containers keeps the last one seen. Ancestry
/// that cannot be found resolves to an empty string.
pub fn resolve(nodes: &[TreeNode]) -> Topology {
    let by_id: HashMap<i64, &TreeNode> = nodes.iter().map(|n| (n.id, n)).collect();

    let mut parents: HashMap<i64, i64> = HashMap::with_capacity(nodes.len());
    for node in nodes {
        for child in &node.children {
            parents.insert(*child, node.id);
        }
    }

    let ancestor = |id: i64, kind: &str| -> String {
        let mut seen = HashSet::new();
        let mut current = parents.get(&id).copied();

        while let Some(parent_id) = current {
            if !seen.insert(parent_id) {
                break;
            }
            let Some(parent) = by_id.get(&parent_id) else {
                break;
            };
            if parent.kind == kind {
                return parent.name.clone();
            }
            current = parents.get(&parent_id).copied();
        }

        String::new()
    };

    let osds = nodes
        .iter()
        .filter(|n| n.kind == "osd")
        .map(|n| {
            let labels = OsdLabels {
                osd: n.name.clone(),
                device_class: n.device_class.clone(),
                host: ancestor(n.id, "host"),
                rack: ancestor(n.id, "rack"),
                root: ancestor(n.id, "root"),
            };
            (n.id, labels)
        })
        .collect();

    Topology { osds }
}

/// Last successfully resolved topology, swapped whole on every refresh
#[derive(Debug, Default)]
pub struct TopologyCache {
    current: Option<Arc<Topology>>,
}

impl TopologyCache {
    pub fn refresh(&mut self, resolved: Result<Topology>) -> Arc<Topology> {
        match resolved {
            Ok(topology) => {
                let topology = Arc::new(topology);
                self.current = Some(Arc::clone(&topology));
                topology
            }
            Err(e) => {
                warn!(error = %e, "Failed to resolve topology, keeping previous labels");
                self.current.clone().unwrap_or_default()
            }
        }
    }

    pub fn current(&self) -> Option<Arc<Topology>> {
        self.current.clone()
    }
}
