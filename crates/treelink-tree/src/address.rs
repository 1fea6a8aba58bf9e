use tracing::debug;

use crate::error::{Result, TreeError};
use crate::node::{Node, NodeId, NodeType};

/// Opcodes carry the address in their low 7 bits.
pub const MAX_ADDRESSES: usize = 128;

/// What an address points at: the node and its declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub node: NodeId,
    pub ntype: NodeType,
}

/// Dense short-address table. Index `n` holds the node with address `n`.
///
/// Cheap to clone, so a decoder can hold a snapshot without borrowing the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressMap {
    slots: Vec<Slot>,
}

impl AddressMap {
    pub fn get(&self, address: u8) -> Option<Slot> {
        self.slots.get(usize::from(address)).copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterate `(address, slot)` in address order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, Slot)> + '_ {
        // `assign` caps the table at MAX_ADDRESSES, so every index fits a u8.
        self.slots
            .iter()
            .enumerate()
            .map(|(address, slot)| (address as u8, *slot))
    }
}

/// Walk the arena depth-first, left to right, from `root`.
///
/// Sets every child's parent link, clears stale addresses, and hands out
/// addresses `0, 1, 2, …` to addressable nodes in visit order. The table is
/// rebuilt from scratch on every call.
pub(crate) fn assign(nodes: &mut [Node], root: NodeId) -> Result<AddressMap> {
    let mut slots = Vec::new();
    let mut stack = vec![root];
    nodes[root.0].parent = None;

    while let Some(id) = stack.pop() {
        let children = nodes[id.0].children.clone();
        for child in &children {
            nodes[child.0].parent = Some(id);
        }
        // Reverse push keeps the pop order left to right.
        stack.extend(children.iter().rev());

        let node = &mut nodes[id.0];
        node.address = None;
        if node.ntype.is_addressable() {
            if slots.len() >= MAX_ADDRESSES {
                return Err(TreeError::AddressSpaceExhausted { max: MAX_ADDRESSES });
            }
            let address = slots.len() as u8;
            node.address = Some(address);
            slots.push(Slot {
                node: id,
                ntype: node.ntype,
            });
            debug!(address, name = %node.name, ntype = %node.ntype, "assigned short address");
        }
    }

    Ok(AddressMap { slots })
}
