//! Host-side protocol stack for instruments that describe themselves.
//!
//! An instrument publishes its configuration and telemetry as a tree of
//! typed nodes. The host fetches the compressed tree over a small-MTU frame
//! link, derives the same short addresses the instrument uses, and from then
//! on reads and writes fields by long name.
//!
//! # Crate Structure
//!
//! - [`transport`]: frame links (in-process channels, Unix datagram sockets)
//! - [`tree`]: the configuration tree, its addressing and its blob form
//! - [`frame`]: command encoding, message decoding and reassembly
//! - [`session`]: host session and simulated instrument

/// Re-export transport types.
pub mod transport {
    pub use treelink_transport::*;
}

/// Re-export tree types.
pub mod tree {
    pub use treelink_tree::*;
}

/// Re-export frame types.
pub mod frame {
    pub use treelink_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use treelink_session::*;
}
