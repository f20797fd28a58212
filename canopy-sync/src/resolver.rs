//! Parent-held reverse lookup from child node to relation key.
//!
//! Filled when a child is wired under an attribute; only wired children are
//! ever found. A miss is a normal outcome: collection elements and nodes
//! built with a parent but never related resolve to nothing.

use canopy_types::NodeId;
use std::collections::HashMap;

use crate::node::{Hierarchical, Node};

#[derive(Default)]
pub(crate) struct RelationMap {
    keys: HashMap<NodeId, String>,
    children: Vec<(String, Node)>,
}

impl RelationMap {
    /// Registers `child` under `attr`, replacing whatever was there.
    pub(crate) fn insert(&mut self, attr: String, child: Node) {
        if let Some(index) = self.children.iter().position(|(name, _)| *name == attr) {
            let (_, previous) = self.children.remove(index);
            self.keys.remove(&previous.id());
        }
        self.keys.insert(child.id(), attr.clone());
        self.children.push((attr, child));
    }

    pub(crate) fn key_of(&self, id: NodeId) -> Option<String> {
        self.keys.get(&id).cloned()
    }

    pub(crate) fn child(&self, attr: &str) -> Option<Node> {
        self.children
            .iter()
            .find(|(name, _)| name == attr)
            .map(|(_, child)| child.clone())
    }

    pub(crate) fn children(&self) -> Vec<(String, Node)> {
        self.children.clone()
    }
}
