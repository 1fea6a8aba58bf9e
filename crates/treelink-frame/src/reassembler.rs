use std::time::SystemTime;

use bytes::BytesMut;
use tracing::{trace, warn};
use treelink_tree::{AddressMap, ConfigTree};

use crate::error::Result;
use crate::message::{decode_message, Message};

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Configuration for inbound reassembly.
#[derive(Debug, Clone, Default)]
pub struct ReassemblerConfig {
    /// Inbound frames start with a one-byte sequence number to strip.
    /// Gaps are logged, never fatal. Default: `false`.
    pub inbound_sequence: bool,
}

/// Turns an ordered stream of small frames back into complete messages.
///
/// Holds exactly the bytes not yet consumed by a decoded message. A frame may
/// complete zero, one or several messages; a message may span several frames.
pub struct Reassembler {
    buf: BytesMut,
    config: ReassemblerConfig,
    expected_sequence: Option<u8>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::with_config(ReassemblerConfig::default())
    }

    pub fn with_config(config: ReassemblerConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            expected_sequence: None,
        }
    }

    /// Append one inbound frame to the receive buffer.
    pub fn push_frame(&mut self, frame: &[u8]) {
        let payload = if self.config.inbound_sequence {
            let Some((&sequence, rest)) = frame.split_first() else {
                return;
            };
            if let Some(expected) = self.expected_sequence {
                if sequence != expected {
                    warn!(expected, got = sequence, "inbound sequence gap");
                }
            }
            self.expected_sequence = Some(sequence.wrapping_add(1));
            rest
        } else {
            frame
        };
        trace!(len = payload.len(), buffered = self.buf.len(), "frame received");
        self.buf.extend_from_slice(payload);
    }

    /// Decode the next complete message, if the buffer holds one.
    pub fn next_message(&mut self, map: &AddressMap) -> Result<Option<Message>> {
        decode_message(&mut self.buf, map)
    }

    /// Push a frame and apply every message it completes to `tree`.
    ///
    /// Each message is notified on its node, observers included, before the
    /// next one is decoded. On error, messages already applied stay applied.
    pub fn deliver(
        &mut self,
        frame: &[u8],
        tree: &mut ConfigTree,
        timestamp: Option<SystemTime>,
    ) -> Result<Vec<Message>> {
        self.push_frame(frame);
        let mut delivered = Vec::new();
        while let Some(message) = self.next_message(tree.address_map())? {
            tree.notify(message.node, message.value.clone(), timestamp);
            delivered.push(message);
        }
        Ok(delivered)
    }

    /// Bytes waiting for the rest of their message.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    /// Drop any partial message.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn config(&self) -> &ReassemblerConfig {
        &self.config
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}
