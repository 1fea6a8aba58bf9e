use bytes::{BufMut, BytesMut};
use tracing::trace;
use treelink_transport::FrameSink;
use treelink_tree::ConfigTree;

use crate::command::{encode_command, DEFAULT_MAX_PAYLOAD};
use crate::error::{CommandError, CommandResult};
use crate::sequence::SequenceCounter;

/// Configuration for outbound frames.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Largest command frame, excluding the sequence byte. Default: 19.
    pub max_payload: usize,
    /// First sequence number sent. Default: 0.
    pub sequence_start: u8,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_payload: DEFAULT_MAX_PAYLOAD,
            sequence_start: 0,
        }
    }
}

/// Sends command frames to a [`FrameSink`], each prefixed with a wrapping
/// one-byte sequence number.
pub struct FrameWriter<S> {
    inner: S,
    buf: BytesMut,
    sequence: SequenceCounter,
    config: WriterConfig,
}

impl<S: FrameSink> FrameWriter<S> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: S) -> Self {
        Self::with_config(inner, WriterConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: S, config: WriterConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(config.max_payload + 1),
            sequence: SequenceCounter::new(config.sequence_start),
            config,
        }
    }

    /// Send one encoded frame. Returns the sequence number it carried.
    ///
    /// The sequence only advances when the sink accepts the frame.
    pub fn send(&mut self, payload: &[u8]) -> CommandResult<u8> {
        if payload.len() > self.config.max_payload {
            return Err(CommandError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload,
            });
        }

        let sequence = self.sequence.peek();
        self.buf.clear();
        self.buf.put_u8(sequence);
        self.buf.put_slice(payload);
        self.inner.send_frame(&self.buf)?;
        self.sequence.advance();
        trace!(sequence, len = payload.len(), "frame sent");
        Ok(sequence)
    }

    /// Encode `command` against `tree` and send it.
    pub fn send_command(&mut self, tree: &ConfigTree, command: &str) -> CommandResult<u8> {
        let frame = encode_command(tree, command, self.config.max_payload)?;
        self.send(&frame)
    }

    /// Sequence number the next frame will carry.
    pub fn next_sequence(&self) -> u8 {
        self.sequence.peek()
    }

    /// Borrow the underlying sink.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Mutably borrow the underlying sink.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consume the writer and return the inner sink.
    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Current writer configuration.
    pub fn config(&self) -> &WriterConfig {
        &self.config
    }
}
