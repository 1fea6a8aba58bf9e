use serde::{Deserialize, Serialize};

use crate::node::{NodeClass, NodeType};

/// Declarative, owned description of a tree.
///
/// This is the shape the structural encoding carries: no addresses, no
/// parent links, no values. It is also what `treelink pack` reads from JSON.
///
/// ```json
/// {"type": "PLAIN", "name": "ADMIN", "children": [
///     {"type": "U32", "name": "CRC32"},
///     {"type": "LINK", "path": "CH1:RANGE"}
/// ]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDef {
    #[serde(rename = "type")]
    pub ntype: NodeType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeDef>,
}

impl NodeDef {
    /// Informational group.
    pub fn plain(name: impl Into<String>, children: Vec<NodeDef>) -> Self {
        Self::structural(NodeType::Plain, name, children)
    }

    /// Mutually exclusive selector over `children`.
    pub fn chooser(name: impl Into<String>, children: Vec<NodeDef>) -> Self {
        Self::structural(NodeType::Chooser, name, children)
    }

    /// Typed leaf. `ntype` should be one of the value types.
    pub fn value(ntype: NodeType, name: impl Into<String>) -> Self {
        Self {
            ntype,
            name: name.into(),
            path: None,
            children: Vec::new(),
        }
    }

    /// Alias for the node at `path`.
    pub fn link(path: impl Into<String>) -> Self {
        Self::reference(NodeType::Link, path)
    }

    /// Splice instruction; only meaningful on the wire.
    pub fn copy(path: impl Into<String>) -> Self {
        Self::reference(NodeType::Copy, path)
    }

    pub(crate) fn structural(
        ntype: NodeType,
        name: impl Into<String>,
        children: Vec<NodeDef>,
    ) -> Self {
        Self {
            ntype,
            name: name.into(),
            path: None,
            children,
        }
    }

    fn reference(ntype: NodeType, path: impl Into<String>) -> Self {
        Self {
            ntype,
            name: String::new(),
            path: Some(path.into()),
            children: Vec::new(),
        }
    }

    /// Number of fields this node contributes to its enclosing array.
    pub(crate) fn field_count(&self) -> u32 {
        match self.ntype.class() {
            NodeClass::Structural => 3,
            NodeClass::Reference | NodeClass::Value => 2,
        }
    }

    /// Total node count, this node included.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(NodeDef::node_count).sum::<usize>()
    }
}
