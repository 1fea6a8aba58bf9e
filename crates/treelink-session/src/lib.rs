//! Host session and simulated instrument.
//!
//! A [`Session`] starts on the bootstrap tree, fetches the instrument's full
//! tree over the link, swaps it in atomically and from then on encodes
//! commands and decodes notifications against it. An [`Instrument`] is the
//! other end: it serves a tree and answers reads and writes.

pub mod error;
pub mod instrument;
pub mod session;

pub use error::{Result, SessionError};
pub use instrument::{Instrument, InstrumentConfig};
pub use session::{Session, SessionConfig};
