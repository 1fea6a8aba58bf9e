/// Errors raised while building, querying or (de)serializing a tree.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// A long name or index path does not resolve.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// A chooser operation was applied to some other kind of node.
    #[error("node {0} is not a chooser")]
    NotAChooser(String),

    /// A chooser's cached selection points outside its children.
    #[error("chooser {path} selects index {index} but has {children} children")]
    CorruptedState {
        path: String,
        index: usize,
        children: usize,
    },

    /// The structural encoding is not a well-formed tree.
    #[error("malformed tree encoding: {0}")]
    MalformedEncoding(String),

    /// A field had a different type than its position requires.
    #[error("type mismatch in tree encoding: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    /// A node carries a type tag outside the known set.
    #[error("unknown node type tag {0}")]
    UnknownNodeType(u64),

    /// Serializing the structural encoding failed.
    #[error("failed to encode tree: {0}")]
    EncodeFailed(String),

    /// The compressed tree blob is corrupt.
    #[error("tree blob decompression failed: {0}")]
    DecompressionFailure(String),

    /// The decompressed tree does not fit the scratch allowance.
    #[error("inflated tree exceeds {max} bytes")]
    TreeTooLarge { max: usize },

    /// More addressable nodes than a 7-bit opcode can name.
    #[error("tree has more than {max} addressable nodes")]
    AddressSpaceExhausted { max: usize },

    /// The blob does not match the CRC32 the instrument advertised.
    #[error("tree checksum mismatch (expected {expected:#010x}, computed {computed:#010x})")]
    ChecksumMismatch { expected: u32, computed: u32 },
}

pub type Result<T> = std::result::Result<T, TreeError>;
