use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use bytes::Bytes;

use crate::error::{Result, TransportError};

/// Largest frame the instrument radio carries: 19 payload bytes plus the
/// one-byte sequence prefix.
pub const DEFAULT_MAX_FRAME: usize = 20;

/// Outbound half of a frame link.
///
/// The caller guarantees `frame.len()` fits the link; implementations still
/// reject oversized frames rather than fragmenting them.
pub trait FrameSink {
    /// Hand one complete frame to the link.
    fn send_frame(&mut self, frame: &[u8]) -> Result<()>;
}

/// Inbound half of a frame link. Frames arrive one at a time, in order.
pub trait FrameSource {
    /// Block until the next frame arrives.
    fn recv_frame(&mut self) -> Result<Bytes>;
}

impl FrameSink for Vec<Bytes> {
    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.push(Bytes::copy_from_slice(frame));
        Ok(())
    }
}

impl<T: FrameSink + ?Sized> FrameSink for &mut T {
    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        (**self).send_frame(frame)
    }
}

impl<T: FrameSink + ?Sized> FrameSink for Box<T> {
    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        (**self).send_frame(frame)
    }
}

/// Configuration shared by the concrete links.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Largest frame accepted in either direction. Default: 20 bytes.
    pub max_frame_size: usize,
    /// Read timeout for blocking receives.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking sends.
    pub write_timeout: Option<Duration>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

/// One end of an in-process link. Created in pairs by [`channel_pair`].
pub struct ChannelLink {
    tx: Sender<Bytes>,
    rx: Receiver<Bytes>,
    config: LinkConfig,
}

/// Create two connected in-process link ends with default configuration.
pub fn channel_pair() -> (ChannelLink, ChannelLink) {
    let (a_tx, b_rx) = mpsc::channel();
    let (b_tx, a_rx) = mpsc::channel();
    (
        ChannelLink {
            tx: a_tx,
            rx: a_rx,
            config: LinkConfig::default(),
        },
        ChannelLink {
            tx: b_tx,
            rx: b_rx,
            config: LinkConfig::default(),
        },
    )
}

impl ChannelLink {
    /// Replace the link configuration.
    pub fn with_config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Return the next frame if one is already queued.
    pub fn try_recv_frame(&mut self) -> Result<Option<Bytes>> {
        match self.rx.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Closed),
        }
    }

    /// Split off a sender that feeds the same peer.
    pub fn sender(&self) -> ChannelSender {
        ChannelSender {
            tx: self.tx.clone(),
            max_frame_size: self.config.max_frame_size,
        }
    }

    /// Current link configuration.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }
}

impl FrameSink for ChannelLink {
    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        send_checked(&self.tx, frame, self.config.max_frame_size)
    }
}

impl FrameSource for ChannelLink {
    fn recv_frame(&mut self) -> Result<Bytes> {
        match self.config.read_timeout {
            Some(timeout) => self.rx.recv_timeout(timeout).map_err(|err| match err {
                RecvTimeoutError::Timeout => TransportError::Io(std::io::Error::from(
                    std::io::ErrorKind::TimedOut,
                )),
                RecvTimeoutError::Disconnected => TransportError::Closed,
            }),
            None => self.rx.recv().map_err(|_| TransportError::Closed),
        }
    }
}

/// Cloneable outbound handle of a [`ChannelLink`].
#[derive(Clone)]
pub struct ChannelSender {
    tx: Sender<Bytes>,
    max_frame_size: usize,
}

impl FrameSink for ChannelSender {
    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        send_checked(&self.tx, frame, self.max_frame_size)
    }
}

fn send_checked(tx: &Sender<Bytes>, frame: &[u8], max: usize) -> Result<()> {
    if frame.len() > max {
        return Err(TransportError::FrameTooLarge {
            size: frame.len(),
            max,
        });
    }
    tx.send(Bytes::copy_from_slice(frame))
        .map_err(|_| TransportError::Closed)
}

impl std::fmt::Debug for ChannelLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelLink")
            .field("type", &"channel")
            .field("config", &self.config)
            .finish()
    }
}
