//! Self-describing configuration tree.
//!
//! The instrument publishes its whole configuration and telemetry surface as
//! a tree of typed nodes. Both ends derive the same dense short addresses
//! from the tree's shape, so addresses never travel on the wire:
//! - [`ConfigTree`]: arena of nodes with lookups, cached values and observers
//! - [`AddressMap`]: short address to node, rebuilt on every inflation
//! - [`codec`]: nested MessagePack structural encoding
//! - [`blob`]: zlib-compressed form carried by the `ADMIN:TREE` field

pub mod address;
pub mod blob;
pub mod codec;
pub mod def;
pub mod error;
pub mod node;
pub mod observer;
pub mod tree;
pub mod value;

pub use address::{AddressMap, Slot, MAX_ADDRESSES};
pub use blob::{checksum, BlobConfig, DEFAULT_MAX_INFLATED};
pub use def::NodeDef;
pub use error::{Result, TreeError};
pub use node::{Node, NodeClass, NodeId, NodeType};
pub use observer::{Handler, ObserverId, ObserverList};
pub use tree::{
    AddressEntry, ConfigTree, ADMIN, CRC32_PATH, DIAGNOSTIC_PATH, SEPARATOR, TREE_PATH,
};
pub use value::Value;
