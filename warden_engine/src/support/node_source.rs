//! In-memory permission-node registry.

use dashmap::DashMap;
use warden_core::traits::{NodeSource, PermissionNode};

/// An in-memory [`NodeSource`], keyed case-insensitively by node name.
#[derive(Debug, Default)]
pub struct MemoryNodeSource {
    nodes: DashMap<String, PermissionNode>,
}

impl MemoryNodeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, node: PermissionNode) {
        self.nodes.insert(node.name().to_ascii_lowercase(), node);
    }
}

impl NodeSource for MemoryNodeSource {
    fn lookup(&self, name: &str) -> Option<PermissionNode> {
        self.nodes.get(&name.to_ascii_lowercase()).map(|entry| entry.clone())
    }
}
