//! Virtual directory tree
//!
//! An arena of named nodes. Each node may be bound to a physical directory
//! and carries its own owner and rights. Parents are stored as indices and
//! children as index lists, in insertion order.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::vfs::rights::{Actor, Ownership, RightsMask};

/// Index of a node inside its [`VirtualTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);
}

#[derive(Debug, Clone)]
pub struct VirtualNode {
    pub virtual_name: String,
    /// Canonical physical directory; `None` while unbound.
    physical: Option<PathBuf>,
    pub ownership: Ownership,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl VirtualNode {
    pub fn physical(&self) -> Option<&Path> {
        self.physical.as_deref()
    }

    pub fn is_bound(&self) -> bool {
        self.physical.is_some()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn allows(&self, actor: &Actor, cap: RightsMask) -> bool {
        self.ownership.allows(actor, cap)
    }
}

#[derive(Debug, Clone)]
pub struct VirtualTree {
    nodes: Vec<VirtualNode>,
}

impl VirtualTree {
    /// Tree holding only the root "/".
    pub fn new_root(physical: Option<PathBuf>, ownership: Ownership) -> Self {
        Self {
            nodes: vec![VirtualNode {
                virtual_name: "/".to_string(),
                physical,
                ownership,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> &VirtualNode {
        &self.nodes[id.0]
    }

    /// Appends a child under `parent`. Sibling uniqueness is the caller's job.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        physical: Option<PathBuf>,
        ownership: Ownership,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(VirtualNode {
            virtual_name: name.into(),
            physical,
            ownership,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Binds an unbound node, which keeps the owner and rights it was
    /// created with. A bound node keeps its directory and the call returns
    /// `false` unless the paths are identical.
    pub fn bind(&mut self, id: NodeId, physical: PathBuf) -> bool {
        let node = &mut self.nodes[id.0];
        match &node.physical {
            Some(existing) => existing == &physical,
            None => {
                node.physical = Some(physical);
                true
            }
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn find_child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .find(|child| self.nodes[child.0].virtual_name == name)
    }

    pub fn full_virtual_path(&self, id: NodeId) -> String {
        let mut names = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let node = &self.nodes[current.0];
            if node.parent.is_some() {
                names.push(node.virtual_name.as_str());
            }
            cursor = node.parent;
        }

        if names.is_empty() {
            return "/".to_string();
        }
        names.iter().rev().fold(String::new(), |mut path, name| {
            path.push('/');
            path.push_str(name);
            path
        })
    }

    /// Node bound to exactly `physical`.
    pub fn find_by_physical(&self, physical: &Path) -> Option<NodeId> {
        self.preorder()
            .into_iter()
            .map(|(id, _)| id)
            .find(|id| self.nodes[id.0].physical() == Some(physical))
    }

    /// Deepest bound node whose directory contains `physical`.
    pub fn find_containing(&self, physical: &Path) -> Option<NodeId> {
        self.bound_nodes()
            .into_iter()
            .filter_map(|id| {
                self.nodes[id.0]
                    .physical()
                    .filter(|dir| physical.starts_with(dir))
                    .map(|dir| (id, dir.components().count()))
            })
            .max_by_key(|(_, depth)| *depth)
            .map(|(id, _)| id)
    }

    /// Depth-first, parents before children, siblings in insertion order.
    pub fn preorder(&self) -> Vec<(NodeId, usize)> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(NodeId::ROOT, 0)];
        while let Some((id, depth)) = stack.pop() {
            order.push((id, depth));
            for child in self.nodes[id.0].children.iter().rev() {
                stack.push((*child, depth + 1));
            }
        }
        order
    }

    pub fn bound_nodes(&self) -> Vec<NodeId> {
        self.preorder()
            .into_iter()
            .map(|(id, _)| id)
            .filter(|id| self.nodes[id.0].is_bound())
            .collect()
    }

    /// Indented dump for debug logging.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (id, depth) in self.preorder() {
            let node = &self.nodes[id.0];
            let target = node
                .physical()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                "{:indent$}{} -> {} [{} {} {}]",
                "",
                node.virtual_name,
                target,
                node.ownership.owner,
                node.ownership.owner_rights,
                node.ownership.others_rights,
                indent = depth * 2
            );
        }
        out
    }
}
