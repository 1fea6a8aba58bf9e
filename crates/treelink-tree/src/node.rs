use std::cell::OnceCell;

use serde::{Deserialize, Serialize};

use crate::observer::ObserverList;
use crate::value::Value;

/// Declared type of a node, as carried in the structural encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum NodeType {
    /// Informational grouping node, or one choice under a chooser.
    Plain = 0,
    /// Selects exactly one of its children; the selection index is its value.
    Chooser = 1,
    /// Alias for another node, resolved by long name.
    Link = 2,
    /// Inflation instruction; never present in an inflated tree.
    Copy = 3,
    U8 = 4,
    U16 = 5,
    U32 = 6,
    S8 = 7,
    S16 = 8,
    S32 = 9,
    Str = 10,
    Bin = 11,
    Flt = 12,
}

/// The three node variants the encoding distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    /// `PLAIN` or `CHOOSER`: named, owns children.
    Structural,
    /// `LINK` or `COPY`: carries a path instead of a name.
    Reference,
    /// Named leaf with a typed value.
    Value,
}

impl NodeType {
    /// Map a wire tag to a node type.
    pub fn from_tag(tag: u8) -> Option<Self> {
        let ntype = match tag {
            0 => Self::Plain,
            1 => Self::Chooser,
            2 => Self::Link,
            3 => Self::Copy,
            4 => Self::U8,
            5 => Self::U16,
            6 => Self::U32,
            7 => Self::S8,
            8 => Self::S16,
            9 => Self::S32,
            10 => Self::Str,
            11 => Self::Bin,
            12 => Self::Flt,
            _ => return None,
        };
        Some(ntype)
    }

    /// Wire tag of this type.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Which variant decoder handles this type.
    pub fn class(self) -> NodeClass {
        match self {
            Self::Plain | Self::Chooser => NodeClass::Structural,
            Self::Link | Self::Copy => NodeClass::Reference,
            _ => NodeClass::Value,
        }
    }

    /// Only choosers and value leaves receive a short address.
    pub fn is_addressable(self) -> bool {
        matches!(self, Self::Chooser) || self.class() == NodeClass::Value
    }

    /// Upper-case name used in listings and JSON.
    pub fn name(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Chooser => "CHOOSER",
            Self::Link => "LINK",
            Self::Copy => "COPY",
            Self::U8 => "U8",
            Self::U16 => "U16",
            Self::U32 => "U32",
            Self::S8 => "S8",
            Self::S16 => "S16",
            Self::S32 => "S32",
            Self::Str => "STR",
            Self::Bin => "BIN",
            Self::Flt => "FLT",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Index of a node inside its [`ConfigTree`](crate::ConfigTree) arena.
///
/// Ids are only meaningful for the tree that produced them; a rebuilt tree
/// hands out fresh ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position of the node in depth-first order.
    pub fn index(self) -> usize {
        self.0
    }
}

/// One node of an inflated tree.
pub struct Node {
    pub(crate) ntype: NodeType,
    pub(crate) name: String,
    pub(crate) path: Option<String>,
    pub(crate) address: Option<u8>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) value: Option<Value>,
    pub(crate) observers: ObserverList,
    pub(crate) long_name: OnceCell<String>,
}

impl Node {
    pub(crate) fn new(ntype: NodeType, name: String, path: Option<String>) -> Self {
        Self {
            ntype,
            name,
            path,
            address: None,
            parent: None,
            children: Vec::new(),
            value: None,
            observers: ObserverList::default(),
            long_name: OnceCell::new(),
        }
    }

    pub fn ntype(&self) -> NodeType {
        self.ntype
    }

    /// Name among siblings. Links are unnamed and return `""`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target long name of a link.
    pub fn link_path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Short address, or `None` for informational nodes.
    pub fn address(&self) -> Option<u8> {
        self.address
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Last value pushed into this node.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.ntype, self.address) {
            (NodeType::Link | NodeType::Copy, _) => {
                write!(f, "{}:{}", self.ntype, self.path.as_deref().unwrap_or(""))
            }
            (_, Some(address)) => write!(f, "{address}:{}", self.name),
            (_, None) => f.write_str(&self.name),
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("ntype", &self.ntype)
            .field("name", &self.name)
            .field("path", &self.path)
            .field("address", &self.address)
            .field("children", &self.children.len())
            .field("value", &self.value)
            .field("observers", &self.observers.len())
            .finish()
    }
}
