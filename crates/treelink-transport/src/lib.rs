//! Frame-preserving link abstraction.
//!
//! The instrument link is a reliable, order-preserving channel of small
//! discrete frames. This crate provides the two halves every upper layer
//! talks to:
//! - [`FrameSink`]: hand one frame to the link
//! - [`FrameSource`]: receive the next frame, in arrival order
//!
//! Two links ship here: an in-process [`ChannelLink`] pair and, on Unix,
//! a [`DatagramLink`] over `SOCK_DGRAM` Unix sockets (datagrams keep frame
//! boundaries intact).

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use traits::{
    channel_pair, ChannelLink, ChannelSender, FrameSink, FrameSource, LinkConfig, DEFAULT_MAX_FRAME,
};

#[cfg(unix)]
pub use uds::DatagramLink;
