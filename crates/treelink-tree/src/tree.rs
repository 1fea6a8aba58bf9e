use std::collections::HashSet;
use std::fmt::Write as _;
use std::time::SystemTime;

use serde::Serialize;
use tracing::debug;

use crate::address::{self, AddressMap};
use crate::def::NodeDef;
use crate::error::{Result, TreeError};
use crate::node::{Node, NodeClass, NodeId, NodeType};
use crate::observer::{Handler, ObserverId};
use crate::value::Value;

/// Separator between names in a long name.
pub const SEPARATOR: &str = ":";

/// Name of the bootstrap root.
pub const ADMIN: &str = "ADMIN";
/// Checksum of the compressed full tree.
pub const CRC32_PATH: &str = "ADMIN:CRC32";
/// Compressed full tree.
pub const TREE_PATH: &str = "ADMIN:TREE";
/// Free-form diagnostic text from the instrument.
pub const DIAGNOSTIC_PATH: &str = "ADMIN:DIAGNOSTIC";

/// One row of [`ConfigTree::address_table`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressEntry {
    pub address: u8,
    pub long_name: String,
    #[serde(rename = "type")]
    pub ntype: NodeType,
}

/// An inflated configuration tree.
///
/// Nodes live in an arena in depth-first order; [`NodeId`]s index into it.
/// The shape is fixed once built. Only cached values and observer lists
/// change afterwards, and replacing the tree means building a new one.
pub struct ConfigTree {
    nodes: Vec<Node>,
    root: NodeId,
    addresses: AddressMap,
}

impl ConfigTree {
    /// Build and address a tree from its description.
    ///
    /// Rejects `COPY` nodes, duplicate sibling names, empty or
    /// separator-bearing names below the root, children under leaves, and
    /// non-structural roots.
    pub fn build(def: &NodeDef) -> Result<Self> {
        if def.ntype.class() != NodeClass::Structural {
            return Err(TreeError::TypeMismatch {
                expected: "structural root",
                found: def.ntype.to_string(),
            });
        }

        let mut nodes = Vec::with_capacity(def.node_count());
        let root = push_node(&mut nodes, def, true)?;
        let addresses = address::assign(&mut nodes, root)?;
        debug!(
            nodes = nodes.len(),
            addresses = addresses.len(),
            "built config tree"
        );

        Ok(Self {
            nodes,
            root,
            addresses,
        })
    }

    /// The minimal tree every session starts from: enough to fetch the real one.
    pub fn bootstrap() -> Self {
        match Self::build(&bootstrap_def()) {
            Ok(tree) => tree,
            Err(err) => unreachable!("bootstrap layout is well formed: {err}"),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Borrow a node.
    ///
    /// # Panics
    ///
    /// Panics if `id` did not come from this tree.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Short address table for this tree.
    pub fn address_map(&self) -> &AddressMap {
        &self.addresses
    }

    /// Node holding short address `address`.
    pub fn node_at_address(&self, address: u8) -> Option<NodeId> {
        self.addresses.get(address).map(|slot| slot.node)
    }

    /// Resolve a colon-joined long name.
    ///
    /// A named root is the first segment (`ADMIN:TREE`); an unnamed root is
    /// implicit (`CH1:RANGE`).
    pub fn resolve(&self, long_name: &str) -> Option<NodeId> {
        let root_name = self.node(self.root).name();
        if long_name.is_empty() {
            return root_name.is_empty().then_some(self.root);
        }

        let mut tokens = long_name.split(SEPARATOR);
        if !root_name.is_empty() && tokens.next()? != root_name {
            return None;
        }

        let mut current = self.root;
        for token in tokens {
            current = self.child_by_name(current, token)?;
        }
        Some(current)
    }

    /// Named child of `parent`. Links are unnamed and never match.
    pub fn child_by_name(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.node(parent)
            .children
            .iter()
            .copied()
            .find(|child| {
                let node = self.node(*child);
                !node.name.is_empty() && node.name == name
            })
    }

    /// Resolve a positional path of child indices from the root.
    pub fn resolve_index_path(&self, path: &[usize]) -> Option<NodeId> {
        path.iter().try_fold(self.root, |current, index| {
            self.node(current).children.get(*index).copied()
        })
    }

    /// Positional path of child indices from the root to `id`.
    pub fn index_path(&self, id: NodeId) -> Vec<usize> {
        let mut path = Vec::new();
        let mut current = id;
        while let Some(parent) = self.node(current).parent {
            let index = self
                .node(parent)
                .children
                .iter()
                .position(|child| *child == current)
                .unwrap_or_default();
            path.push(index);
            current = parent;
        }
        path.reverse();
        path
    }

    /// Colon-joined names from the root to `id`, skipping unnamed nodes.
    ///
    /// Computed once per node and cached.
    pub fn long_name(&self, id: NodeId) -> &str {
        self.node(id).long_name.get_or_init(|| {
            let mut names = Vec::new();
            let mut cursor = Some(id);
            while let Some(current) = cursor {
                let node = self.node(current);
                if !node.name.is_empty() {
                    names.push(node.name.as_str());
                }
                cursor = node.parent;
            }
            names.reverse();
            names.join(SEPARATOR)
        })
    }

    /// Follow a link to its target. Any other node resolves to itself.
    pub fn resolve_link(&self, id: NodeId) -> Result<NodeId> {
        match self.node(id).link_path() {
            Some(path) if self.node(id).ntype == NodeType::Link => self
                .resolve(path)
                .ok_or_else(|| TreeError::NodeNotFound(path.to_string())),
            _ => Ok(id),
        }
    }

    /// Cached value of `id`.
    pub fn value(&self, id: NodeId) -> Option<&Value> {
        self.node(id).value.as_ref()
    }

    /// Cached value of the node at `long_name`.
    pub fn value_at(&self, long_name: &str) -> Option<&Value> {
        self.resolve(long_name).and_then(|id| self.value(id))
    }

    /// Store `value` on the node and run its observers in registration order.
    pub fn notify(&mut self, id: NodeId, value: Value, timestamp: Option<SystemTime>) {
        let node = &mut self.nodes[id.0];
        debug!(name = %node.name, %value, "notify");
        node.value = Some(value);
        if let Some(value) = &node.value {
            node.observers.fire(timestamp, value);
        }
    }

    /// Register an observer on `id`.
    pub fn add_observer(&mut self, id: NodeId, handler: Handler) -> ObserverId {
        self.nodes[id.0].observers.add(handler)
    }

    /// Register an observer on `id` under an id issued earlier.
    pub fn insert_observer(&mut self, id: NodeId, observer: ObserverId, handler: Handler) {
        self.nodes[id.0].observers.insert(observer, handler);
    }

    /// Remove one observer from `id`.
    pub fn remove_observer(&mut self, id: NodeId, observer: ObserverId) -> bool {
        self.nodes[id.0].observers.remove(observer)
    }

    /// Remove every observer from `id`.
    pub fn clear_observers(&mut self, id: NodeId) {
        self.nodes[id.0].observers.clear();
    }

    /// Child currently selected by the chooser at `long_name`.
    pub fn chosen_child(&self, long_name: &str) -> Result<NodeId> {
        let id = self
            .resolve(long_name)
            .ok_or_else(|| TreeError::NodeNotFound(long_name.to_string()))?;
        self.chosen_child_of(id)
    }

    /// Child currently selected by chooser `id`. An unset selection means 0.
    pub fn chosen_child_of(&self, id: NodeId) -> Result<NodeId> {
        let node = self.node(id);
        if node.ntype != NodeType::Chooser {
            return Err(TreeError::NotAChooser(self.long_name(id).to_string()));
        }

        let corrupted = |index: usize| TreeError::CorruptedState {
            path: self.long_name(id).to_string(),
            index,
            children: node.children.len(),
        };
        let index = match &node.value {
            None => 0,
            Some(value) => value
                .as_u64()
                .and_then(|raw| usize::try_from(raw).ok())
                .ok_or_else(|| corrupted(usize::MAX))?,
        };
        node.children.get(index).copied().ok_or_else(|| corrupted(index))
    }

    /// Name of the child selected by the chooser at `long_name`.
    pub fn chosen_name(&self, long_name: &str) -> Result<&str> {
        let id = self.chosen_child(long_name)?;
        Ok(self.node(id).name())
    }

    /// Visit every node depth-first, left to right, with its depth.
    pub fn walk(&self, mut visit: impl FnMut(NodeId, usize)) {
        let mut stack = vec![(self.root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            visit(id, depth);
            stack.extend(
                self.node(id)
                    .children
                    .iter()
                    .rev()
                    .map(|child| (*child, depth + 1)),
            );
        }
    }

    /// Indented listing of the subtree under `id`.
    pub fn enumerate(&self, id: NodeId) -> String {
        let mut out = String::new();
        let mut stack = vec![(id, 0usize)];
        while let Some((current, depth)) = stack.pop() {
            let _ = writeln!(out, "{:indent$}{}", "", self.node(current), indent = depth * 2);
            stack.extend(
                self.node(current)
                    .children
                    .iter()
                    .rev()
                    .map(|child| (*child, depth + 1)),
            );
        }
        out
    }

    /// Every addressable node in address order.
    pub fn address_table(&self) -> Vec<AddressEntry> {
        self.addresses
            .iter()
            .map(|(address, slot)| AddressEntry {
                address,
                long_name: self.long_name(slot.node).to_string(),
                ntype: slot.ntype,
            })
            .collect()
    }

    /// Description of this tree's shape, suitable for re-encoding.
    pub fn to_def(&self) -> NodeDef {
        self.def_of(self.root)
    }

    fn def_of(&self, id: NodeId) -> NodeDef {
        let node = self.node(id);
        NodeDef {
            ntype: node.ntype,
            name: node.name.clone(),
            path: node.path.clone(),
            children: node.children.iter().map(|c| self.def_of(*c)).collect(),
        }
    }
}

impl std::fmt::Display for ConfigTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.enumerate(self.root))
    }
}

impl std::fmt::Debug for ConfigTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigTree")
            .field("root", &self.node(self.root).name)
            .field("nodes", &self.nodes.len())
            .field("addresses", &self.addresses.len())
            .finish()
    }
}

fn bootstrap_def() -> NodeDef {
    NodeDef::plain(
        ADMIN,
        vec![
            NodeDef::value(NodeType::U32, "CRC32"),
            NodeDef::value(NodeType::Bin, "TREE"),
            NodeDef::value(NodeType::Str, "DIAGNOSTIC"),
        ],
    )
}

fn push_node(nodes: &mut Vec<Node>, def: &NodeDef, is_root: bool) -> Result<NodeId> {
    let path = match def.ntype.class() {
        NodeClass::Reference => {
            let path = def.path.clone().ok_or_else(|| {
                TreeError::MalformedEncoding(format!("{} node without a path", def.ntype))
            })?;
            if def.ntype == NodeType::Copy {
                return Err(TreeError::MalformedEncoding(format!(
                    "COPY {path} present in an inflated tree"
                )));
            }
            Some(path)
        }
        NodeClass::Structural | NodeClass::Value => {
            if !is_root && def.name.is_empty() {
                return Err(TreeError::MalformedEncoding(format!(
                    "unnamed {} node below the root",
                    def.ntype
                )));
            }
            if def.name.contains(SEPARATOR) {
                return Err(TreeError::MalformedEncoding(format!(
                    "node name {:?} contains the separator",
                    def.name
                )));
            }
            None
        }
    };
    if def.ntype.class() != NodeClass::Structural && !def.children.is_empty() {
        return Err(TreeError::MalformedEncoding(format!(
            "{} node {:?} has children",
            def.ntype, def.name
        )));
    }

    let id = NodeId(nodes.len());
    let name = if path.is_some() {
        String::new()
    } else {
        def.name.clone()
    };
    nodes.push(Node::new(def.ntype, name, path));

    let mut seen = HashSet::new();
    let mut children = Vec::with_capacity(def.children.len());
    for child in &def.children {
        if child.ntype.class() != NodeClass::Reference && !seen.insert(child.name.as_str()) {
            return Err(TreeError::MalformedEncoding(format!(
                "duplicate sibling name {:?} under {:?}",
                child.name, def.name
            )));
        }
        children.push(push_node(nodes, child, false)?);
    }
    nodes[id.0].children = children;
    Ok(id)
}
