use treelink_transport::TransportError;
use treelink_tree::NodeType;

/// Errors surfaced by [`encode_command`](crate::encode_command) and
/// [`FrameWriter`](crate::FrameWriter). None of them change any state.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The command string has no path.
    #[error("empty command")]
    Empty,

    /// The path does not resolve against the current tree.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// The node is informational only; read or write one of its children.
    #[error("node {path} is not addressable; children:\n{listing}")]
    NodeNotAddressable { path: String, listing: String },

    /// The encoded frame does not fit one transport frame.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The value text does not parse as the node's declared type.
    #[error("invalid {ntype} value {value:?} for {path}: {reason}")]
    InvalidValue {
        path: String,
        ntype: NodeType,
        value: String,
        reason: String,
    },

    /// Writes to this node type are not supported.
    #[error("writing {ntype} node {path} is not supported")]
    UnsupportedWrite { path: String, ntype: NodeType },

    /// The link rejected the frame.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors raised while decoding inbound messages or instrument requests.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The opcode names no address; the receive buffer was flushed.
    #[error("unknown opcode {opcode:#04x} ({discarded} buffered bytes discarded)")]
    UnknownOpcode { opcode: u8, discarded: usize },

    /// The opcode names a node that never carries a value on the wire.
    #[error("opcode {address} names {ntype} node, which carries no value")]
    UndecodableNode { address: u8, ntype: NodeType },

    /// A string or binary value does not fit its 16-bit length prefix.
    #[error("value too long for a 16-bit length prefix ({len} bytes)")]
    ValueTooLong { len: usize },

    /// A complete frame ended before its payload did.
    #[error("truncated message ({available} of {needed} bytes)")]
    Truncated { needed: usize, available: usize },

    /// An I/O error occurred while reading frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, FrameError>;

pub type CommandResult<T> = std::result::Result<T, CommandError>;
