use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, info, warn};
use treelink_frame::{decode_request, encode_notification, split_frames, Request, SequenceCounter};
use treelink_transport::{FrameSink, FrameSource, TransportError, DEFAULT_MAX_FRAME};
use treelink_tree::{
    checksum, ConfigTree, NodeDef, NodeId, NodeType, TreeError, Value, CRC32_PATH, TREE_PATH,
};

use crate::error::{Result, SessionError};

/// Configuration for the simulated instrument.
#[derive(Debug, Clone)]
pub struct InstrumentConfig {
    /// Largest outbound frame, sequence byte included. Default: 20.
    pub max_frame: usize,
    /// Inbound command frames start with a sequence byte. Default: `true`.
    pub request_sequence: bool,
    /// Prefix outbound notification frames with a sequence byte.
    /// Default: `false`.
    pub notify_sequence: bool,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            max_frame: DEFAULT_MAX_FRAME,
            request_sequence: true,
            notify_sequence: false,
        }
    }
}

/// A simulated instrument serving a configuration tree.
///
/// Answers reads with the node's current value, applies writes and echoes
/// the stored value, and serves its own compressed structure as
/// `ADMIN:TREE` with the matching `ADMIN:CRC32`.
pub struct Instrument {
    tree: ConfigTree,
    config: InstrumentConfig,
    sequence: SequenceCounter,
}

impl Instrument {
    pub fn new(def: &NodeDef) -> Result<Self> {
        Self::with_config(def, InstrumentConfig::default())
    }

    /// Build the tree and publish its blob.
    ///
    /// The tree must carry the bootstrap fields at the bootstrap addresses,
    /// or a host could never fetch it.
    pub fn with_config(def: &NodeDef, config: InstrumentConfig) -> Result<Self> {
        let mut tree = ConfigTree::build(def)?;
        check_bootstrap(&tree)?;

        let blob = tree.to_blob()?;
        let crc = checksum(&blob);
        let tree_id = resolve(&tree, TREE_PATH)?;
        let crc_id = resolve(&tree, CRC32_PATH)?;
        tree.notify(tree_id, Value::Bin(Bytes::from(blob)), None);
        tree.notify(crc_id, Value::U32(crc), None);
        info!(
            nodes = tree.len(),
            addresses = tree.address_map().len(),
            crc,
            "instrument tree ready"
        );

        Ok(Self {
            tree,
            config,
            sequence: SequenceCounter::default(),
        })
    }

    pub fn tree(&self) -> &ConfigTree {
        &self.tree
    }

    pub fn config(&self) -> &InstrumentConfig {
        &self.config
    }

    /// Handle one command frame and send any answer to `sink`.
    pub fn handle_frame(&mut self, frame: &[u8], sink: &mut impl FrameSink) -> Result<()> {
        let request = if self.config.request_sequence {
            match frame.split_first() {
                Some((sequence, rest)) => {
                    debug!(sequence, "command frame");
                    rest
                }
                None => return Ok(()),
            }
        } else {
            frame
        };

        match decode_request(self.tree.address_map(), request)? {
            Request::Read { address, node } => {
                debug!(address, name = %self.tree.long_name(node), "read");
                self.answer(node, sink)
            }
            Request::Write {
                address,
                node,
                value,
            } => {
                debug!(address, name = %self.tree.long_name(node), %value, "write");
                self.tree.notify(node, value, None);
                self.answer(node, sink)
            }
        }
    }

    /// Store `value` at `long_name` and push it to the host unprompted.
    pub fn publish(&mut self, long_name: &str, value: Value, sink: &mut impl FrameSink) -> Result<()> {
        let node = resolve(&self.tree, long_name)?;
        self.tree.notify(node, value, None);
        self.answer(node, sink)
    }

    /// Serve frames from `link` until `running` is cleared or the link closes.
    ///
    /// `link` should have a read timeout so `running` is rechecked.
    pub fn serve<L>(&mut self, link: &mut L, running: &AtomicBool) -> Result<()>
    where
        L: FrameSource + FrameSink,
    {
        while running.load(Ordering::SeqCst) {
            let frame = match link.recv_frame() {
                Ok(frame) => frame,
                Err(TransportError::Io(err))
                    if matches!(
                        err.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    continue;
                }
                Err(TransportError::Closed) => break,
                Err(err) => return Err(err.into()),
            };
            if let Err(err) = self.handle_frame(&frame, link) {
                warn!(%err, "request failed");
            }
        }
        Ok(())
    }

    fn answer(&mut self, node: NodeId, sink: &mut impl FrameSink) -> Result<()> {
        let address = self
            .tree
            .node(node)
            .address()
            .ok_or_else(|| TreeError::NodeNotFound(self.tree.long_name(node).to_string()))?;
        let value = match self.tree.value(node) {
            Some(value) => value.clone(),
            None => zero_value(self.tree.node(node).ntype()),
        };

        let message = encode_notification(address, &value)?;
        let room = if self.config.notify_sequence {
            self.config.max_frame.saturating_sub(1)
        } else {
            self.config.max_frame
        };
        for chunk in split_frames(&message, room) {
            if self.config.notify_sequence {
                let mut frame = BytesMut::with_capacity(chunk.len() + 1);
                frame.put_u8(self.sequence.advance());
                frame.put_slice(&chunk);
                sink.send_frame(&frame)?;
            } else {
                sink.send_frame(&chunk)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrument")
            .field("tree", &self.tree)
            .field("config", &self.config)
            .finish()
    }
}

fn resolve(tree: &ConfigTree, long_name: &str) -> Result<NodeId> {
    tree.resolve(long_name)
        .ok_or_else(|| TreeError::NodeNotFound(long_name.to_string()).into())
}

fn check_bootstrap(tree: &ConfigTree) -> Result<()> {
    for entry in ConfigTree::bootstrap().address_table() {
        let address = tree
            .resolve(&entry.long_name)
            .and_then(|id| tree.node(id).address());
        if address != Some(entry.address) {
            return Err(SessionError::BootstrapMismatch(format!(
                "{} must have address {}",
                entry.long_name, entry.address
            )));
        }
    }
    Ok(())
}

fn zero_value(ntype: NodeType) -> Value {
    match ntype {
        NodeType::S8 => Value::S8(0),
        NodeType::U16 => Value::U16(0),
        NodeType::S16 => Value::S16(0),
        NodeType::U32 => Value::U32(0),
        NodeType::S32 => Value::S32(0),
        NodeType::Flt => Value::Float(0.0),
        NodeType::Str => Value::Str(String::new()),
        NodeType::Bin => Value::Bin(Bytes::new()),
        _ => Value::U8(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meter_def() -> NodeDef {
        NodeDef::plain(
            "",
            vec![
                NodeDef::plain(
                    "ADMIN",
                    vec![
                        NodeDef::value(NodeType::U32, "CRC32"),
                        NodeDef::value(NodeType::Bin, "TREE"),
                        NodeDef::value(NodeType::Str, "DIAGNOSTIC"),
                    ],
                ),
                NodeDef::value(NodeType::S16, "TEMP"),
            ],
        )
    }

    #[test]
    fn rejects_tree_without_bootstrap_fields() {
        let def = NodeDef::plain("", vec![NodeDef::value(NodeType::U8, "X")]);
        assert!(matches!(
            Instrument::new(&def),
            Err(SessionError::BootstrapMismatch(_))
        ));
    }

    #[test]
    fn answers_reads_with_zero_default() {
        let mut instrument = Instrument::new(&meter_def()).unwrap();
        let mut sent = Vec::<Bytes>::new();
        instrument.handle_frame(&[0x07, 0x03], &mut sent).unwrap();
        assert_eq!(sent, vec![Bytes::from_static(&[0x03, 0x00, 0x00])]);
    }

    #[test]
    fn applies_and_echoes_writes() {
        let mut instrument = Instrument::new(&meter_def()).unwrap();
        let mut sent = Vec::<Bytes>::new();
        instrument
            .handle_frame(&[0x00, 0x83, 0xF6, 0xFF], &mut sent)
            .unwrap();
        assert_eq!(instrument.tree().value_at("TEMP"), Some(&Value::S16(-10)));
        assert_eq!(sent, vec![Bytes::from_static(&[0x03, 0xF6, 0xFF])]);
    }

    #[test]
    fn serves_tree_blob_in_frames() {
        let mut instrument = Instrument::new(&meter_def()).unwrap();
        let mut sent = Vec::<Bytes>::new();
        instrument.handle_frame(&[0x00, 0x01], &mut sent).unwrap();

        assert!(sent.len() > 1);
        assert!(sent.iter().all(|f| f.len() <= DEFAULT_MAX_FRAME));
        let wire: Vec<u8> = sent.iter().flat_map(|f| f.iter().copied()).collect();
        let blob = instrument.tree().to_blob().unwrap();
        assert_eq!(wire[0], 0x01);
        assert_eq!(usize::from(u16::from_be_bytes([wire[1], wire[2]])), blob.len());
        assert_eq!(&wire[3..], blob.as_slice());
    }

    #[test]
    fn sequenced_notifications_fit_the_frame() {
        let config = InstrumentConfig {
            notify_sequence: true,
            ..InstrumentConfig::default()
        };
        let mut instrument = Instrument::with_config(&meter_def(), config).unwrap();
        let mut sent = Vec::<Bytes>::new();
        instrument.handle_frame(&[0x00, 0x01], &mut sent).unwrap();
        assert!(sent.iter().all(|f| f.len() <= DEFAULT_MAX_FRAME));
        assert_eq!(sent[0][0], 0);
        assert_eq!(sent[1][0], 1);
    }
}
