//! Binary message layer for tree-addressed instruments.
//!
//! Every message starts with a one-byte opcode whose low 7 bits are a short
//! address from the current [`AddressMap`](treelink_tree::AddressMap):
//! - outbound: [`encode_command`] turns `"PATH"` / `"PATH VALUE"` into a read
//!   or write frame, and [`FrameWriter`] prefixes the sequence byte
//! - inbound: [`Reassembler`] stitches frames back into typed [`Message`]s and
//!   notifies the tree
//!
//! [`instrument`] holds the other end of the same wire format.

pub mod command;
pub mod error;
pub mod instrument;
pub mod message;
pub mod reassembler;
pub mod sequence;
pub mod writer;

#[cfg(feature = "async")]
pub mod codec;

pub use command::{encode_command, Command, ADDRESS_MASK, DEFAULT_MAX_PAYLOAD, WRITE_BIT};
pub use error::{CommandError, FrameError};
pub use instrument::{decode_request, encode_notification, split_frames, Request};
pub use message::{decode_message, Message, LENGTH_PREFIX};
pub use reassembler::{Reassembler, ReassemblerConfig};
pub use sequence::SequenceCounter;
pub use writer::{FrameWriter, WriterConfig};

#[cfg(feature = "async")]
pub use codec::MessageDecoder;
