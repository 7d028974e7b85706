//! Where a session currently is.

use std::path::{Path, PathBuf};

use crate::vfs::tree::{NodeId, VirtualTree};

/// Physical half of a [`NavigationState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhysicalDir {
    /// Exactly at the node's own directory (or at an unbound node).
    AtNode,
    /// A canonical directory strictly below the node's physical directory.
    Within(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationState {
    pub node: NodeId,
    pub physical: PhysicalDir,
}

impl NavigationState {
    pub fn root() -> Self {
        Self::at_node(NodeId::ROOT)
    }

    pub fn at_node(node: NodeId) -> Self {
        Self {
            node,
            physical: PhysicalDir::AtNode,
        }
    }

    pub fn is_at_node(&self) -> bool {
        self.physical == PhysicalDir::AtNode
    }

    /// Directory an OS call made from here would operate in. `None` at an
    /// unbound node.
    pub fn physical_dir<'a>(&'a self, tree: &'a VirtualTree) -> Option<&'a Path> {
        match &self.physical {
            PhysicalDir::AtNode => tree.node(self.node).physical(),
            PhysicalDir::Within(path) => Some(path),
        }
    }

    /// Absolute client-visible path of this location.
    pub fn virtual_dir(&self, tree: &VirtualTree) -> String {
        let base = tree.full_virtual_path(self.node);
        let PhysicalDir::Within(path) = &self.physical else {
            return base;
        };
        let relative = tree
            .node(self.node)
            .physical()
            .and_then(|mount| path.strip_prefix(mount).ok())
            .map(|rel| rel.display().to_string())
            .unwrap_or_default();

        match (base.as_str(), relative.is_empty()) {
            (_, true) => base,
            ("/", false) => format!("/{relative}"),
            (_, false) => format!("{base}/{relative}"),
        }
    }
}
