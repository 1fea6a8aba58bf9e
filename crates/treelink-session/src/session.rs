use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, info, warn};
use treelink_frame::{FrameWriter, Message, Reassembler, ReassemblerConfig, WriterConfig};
use treelink_transport::{FrameSink, FrameSource, TransportError};
use treelink_tree::{
    checksum, AddressEntry, BlobConfig, ConfigTree, Handler, ObserverId, TreeError, Value,
    CRC32_PATH, TREE_PATH,
};

use crate::error::{Result, SessionError};

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub writer: WriterConfig,
    pub reassembler: ReassemblerConfig,
    pub blob: BlobConfig,
    /// Check a received tree blob against the cached `ADMIN:CRC32` value.
    /// Default: `true`.
    pub verify_checksum: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            writer: WriterConfig::default(),
            reassembler: ReassemblerConfig::default(),
            blob: BlobConfig::default(),
            verify_checksum: true,
        }
    }
}

struct Subscription {
    id: ObserverId,
    long_name: String,
    handler: Handler,
}

struct Inner<S> {
    tree: ConfigTree,
    writer: FrameWriter<S>,
    reassembler: Reassembler,
    subscriptions: Vec<Subscription>,
    generation: u64,
}

/// Host end of an instrument link.
///
/// Starts on the bootstrap tree. Every operation runs under one lock, so
/// command encoding never sees a tree mid-rebuild and inbound frames are
/// decoded strictly one at a time. Observers run with the lock held and must
/// not call back into the session.
pub struct Session<S> {
    inner: Mutex<Inner<S>>,
    config: SessionConfig,
}

impl<S: FrameSink> Session<S> {
    /// Create a session with default configuration.
    pub fn new(sink: S) -> Self {
        Self::with_config(sink, SessionConfig::default())
    }

    /// Create a session with explicit configuration.
    pub fn with_config(sink: S, config: SessionConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                tree: ConfigTree::bootstrap(),
                writer: FrameWriter::with_config(sink, config.writer.clone()),
                reassembler: Reassembler::with_config(config.reassembler.clone()),
                subscriptions: Vec::new(),
                generation: 0,
            }),
            config,
        }
    }

    /// Encode `command` against the current tree and send it.
    ///
    /// Returns the sequence number the frame carried.
    pub fn execute(&self, command: &str) -> Result<u8> {
        let mut inner = self.lock();
        let inner = &mut *inner;
        Ok(inner.writer.send_command(&inner.tree, command)?)
    }

    /// Ask the instrument for its full tree.
    ///
    /// Reads `ADMIN:CRC32` first when the current tree has it, so the blob
    /// can be verified on arrival.
    pub fn fetch_full_tree(&self) -> Result<()> {
        let mut inner = self.lock();
        let inner = &mut *inner;
        if self.config.verify_checksum && inner.tree.resolve(CRC32_PATH).is_some() {
            inner.writer.send_command(&inner.tree, CRC32_PATH)?;
        }
        inner.writer.send_command(&inner.tree, TREE_PATH)?;
        debug!("requested full tree");
        Ok(())
    }

    /// Feed one inbound frame through the reassembler.
    ///
    /// Every completed message is applied to the tree before the next is
    /// decoded. A completed `ADMIN:TREE` message replaces the tree, and later
    /// messages decode against the new addresses. If the blob is rejected the
    /// current tree stays, the error is returned, and any bytes behind it
    /// stay buffered for the next call.
    pub fn on_frame(&self, frame: &[u8], timestamp: Option<SystemTime>) -> Result<Vec<Message>> {
        let mut inner = self.lock();
        let inner = &mut *inner;
        inner.reassembler.push_frame(frame);

        let mut delivered = Vec::new();
        while let Some(message) = inner.reassembler.next_message(inner.tree.address_map())? {
            inner
                .tree
                .notify(message.node, message.value.clone(), timestamp);
            let is_tree = inner.tree.long_name(message.node) == TREE_PATH;
            if is_tree {
                if let Value::Bin(blob) = &message.value {
                    self.replace_tree(inner, blob)?;
                }
            }
            delivered.push(message);
        }
        Ok(delivered)
    }

    /// Receive one frame from `source` and process it.
    pub fn receive(&self, source: &mut impl FrameSource) -> Result<Vec<Message>> {
        let frame = source.recv_frame()?;
        self.on_frame(&frame, Some(SystemTime::now()))
    }

    /// Fetch the full tree and process inbound frames until it arrives.
    ///
    /// `source` should have a read timeout set so the deadline is honoured.
    pub fn load_tree(&self, source: &mut impl FrameSource, timeout: Duration) -> Result<()> {
        let start = self.generation();
        let deadline = Instant::now() + timeout;
        self.fetch_full_tree()?;
        while self.generation() == start {
            if Instant::now() >= deadline {
                return Err(SessionError::Timeout(timeout));
            }
            match self.receive(source) {
                Ok(_) => {}
                Err(SessionError::Transport(TransportError::Io(err)))
                    if matches!(
                        err.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) => {}
                Err(SessionError::Frame(err)) => warn!(%err, "dropping undecodable input"),
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Attach `handler` to the node at `long_name`.
    ///
    /// The subscription follows the long name: it is re-attached whenever
    /// the tree is replaced and the name still resolves.
    pub fn subscribe(&self, long_name: &str, handler: Handler) -> Result<ObserverId> {
        let mut inner = self.lock();
        let id = inner
            .tree
            .resolve(long_name)
            .ok_or_else(|| TreeError::NodeNotFound(long_name.to_string()))?;
        let observer = inner.tree.add_observer(id, handler.clone());
        inner.subscriptions.push(Subscription {
            id: observer,
            long_name: long_name.to_string(),
            handler,
        });
        Ok(observer)
    }

    /// Remove a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, observer: ObserverId) -> bool {
        let mut inner = self.lock();
        let Some(index) = inner.subscriptions.iter().position(|s| s.id == observer) else {
            return false;
        };
        let subscription = inner.subscriptions.remove(index);
        if let Some(id) = inner.tree.resolve(&subscription.long_name) {
            inner.tree.remove_observer(id, observer);
        }
        true
    }

    /// Cached value of the node at `long_name`.
    pub fn value_at(&self, long_name: &str) -> Option<Value> {
        self.lock().tree.value_at(long_name).cloned()
    }

    /// Name of the child selected by the chooser at `long_name`.
    pub fn chosen_name(&self, long_name: &str) -> Result<String> {
        Ok(self.lock().tree.chosen_name(long_name)?.to_string())
    }

    /// Address table of the current tree.
    pub fn address_table(&self) -> Vec<AddressEntry> {
        self.lock().tree.address_table()
    }

    /// Run `f` against the current tree.
    pub fn with_tree<R>(&self, f: impl FnOnce(&ConfigTree) -> R) -> R {
        f(&self.lock().tree)
    }

    /// Number of times the tree has been replaced.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner<S>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build the new tree completely, then swap it in.
    fn replace_tree(&self, inner: &mut Inner<S>, blob: &[u8]) -> Result<()> {
        if self.config.verify_checksum {
            if let Some(expected) = inner.tree.value_at(CRC32_PATH).and_then(Value::as_u64) {
                let computed = checksum(blob);
                if u64::from(computed) != expected {
                    warn!(expected, computed, "tree blob checksum mismatch, keeping current tree");
                    return Err(TreeError::ChecksumMismatch {
                        expected: expected as u32,
                        computed,
                    }
                    .into());
                }
            }
        }

        let mut tree = match ConfigTree::from_blob(blob, &self.config.blob) {
            Ok(tree) => tree,
            Err(err) => {
                warn!(%err, "rejected tree blob, keeping current tree");
                return Err(err.into());
            }
        };

        for subscription in &inner.subscriptions {
            match tree.resolve(&subscription.long_name) {
                Some(id) => tree.insert_observer(id, subscription.id, subscription.handler.clone()),
                None => debug!(long_name = %subscription.long_name, "subscription has no node in new tree"),
            }
        }

        inner.tree = tree;
        inner.generation += 1;
        info!(
            generation = inner.generation,
            nodes = inner.tree.len(),
            addresses = inner.tree.address_map().len(),
            "tree replaced"
        );
        Ok(())
    }
}

impl<S> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use treelink_frame::encode_notification;
    use treelink_tree::{NodeDef, NodeType, DIAGNOSTIC_PATH};

    use super::*;

    fn full_tree() -> ConfigTree {
        ConfigTree::build(&NodeDef::plain(
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
                NodeDef::chooser(
                    "RANGE",
                    vec![NodeDef::plain("LOW", vec![]), NodeDef::plain("HIGH", vec![])],
                ),
            ],
        ))
        .unwrap()
    }

    fn tree_message(blob: &[u8]) -> Bytes {
        encode_notification(1, &Value::Bin(Bytes::copy_from_slice(blob))).unwrap()
    }

    #[test]
    fn execute_uses_current_tree() {
        let session = Session::new(Vec::<Bytes>::new());
        assert_eq!(session.execute("ADMIN:DIAGNOSTIC").unwrap(), 0);
        assert!(matches!(
            session.execute("RANGE 1"),
            Err(SessionError::Command(treelink_frame::CommandError::NodeNotFound(_)))
        ));
    }

    #[test]
    fn tree_message_swaps_tree() {
        let session = Session::new(Vec::<Bytes>::new());
        let blob = full_tree().to_blob().unwrap();

        let mut message = encode_notification(0, &Value::U32(checksum(&blob))).unwrap().to_vec();
        message.extend_from_slice(&tree_message(&blob));
        // RANGE has address 3 in the new tree only.
        message.extend_from_slice(&[0x03, 0x01]);

        for chunk in message.chunks(20) {
            session.on_frame(chunk, None).unwrap();
        }

        assert_eq!(session.generation(), 1);
        assert_eq!(session.chosen_name("RANGE").unwrap(), "HIGH");
        assert_eq!(session.execute("RANGE 0").unwrap(), 0);
    }

    #[test]
    fn checksum_mismatch_keeps_old_tree() {
        let session = Session::new(Vec::<Bytes>::new());
        let blob = full_tree().to_blob().unwrap();

        session
            .on_frame(&encode_notification(0, &Value::U32(checksum(&blob) ^ 1)).unwrap(), None)
            .unwrap();
        let err = session.on_frame(&tree_message(&blob), None).unwrap_err();
        assert!(matches!(err, SessionError::Tree(TreeError::ChecksumMismatch { .. })));
        assert_eq!(session.generation(), 0);
        assert!(session.value_at(DIAGNOSTIC_PATH).is_none());
    }

    #[test]
    fn corrupt_blob_keeps_old_tree() {
        let session = Session::new(Vec::<Bytes>::new());
        let err = session.on_frame(&tree_message(b"garbage"), None).unwrap_err();
        assert!(matches!(err, SessionError::Tree(TreeError::DecompressionFailure(_))));
        assert_eq!(session.address_table().len(), 3);
    }

    #[test]
    fn subscriptions_survive_rebuild() {
        let session = Session::new(Vec::<Bytes>::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = session
            .subscribe(DIAGNOSTIC_PATH, Arc::new(move |_, v| sink.lock().unwrap().push(v.clone())))
            .unwrap();

        let hello = encode_notification(2, &Value::Str("boot".into())).unwrap();
        session.on_frame(&hello, None).unwrap();

        let blob = full_tree().to_blob().unwrap();
        for chunk in tree_message(&blob).chunks(20) {
            session.on_frame(chunk, None).unwrap();
        }
        assert_eq!(session.generation(), 1);

        let after = encode_notification(2, &Value::Str("full".into())).unwrap();
        session.on_frame(&after, None).unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Value::Str("boot".into()), Value::Str("full".into())]
        );

        assert!(session.unsubscribe(id));
        assert!(!session.unsubscribe(id));
        session.on_frame(&hello, None).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn fetch_reads_checksum_then_tree() {
        let session = Session::new(Vec::<Bytes>::new());
        session.fetch_full_tree().unwrap();
        let sent = session.lock().writer.get_ref().clone();
        assert_eq!(
            sent,
            vec![Bytes::from_static(&[0x00, 0x00]), Bytes::from_static(&[0x01, 0x01])]
        );
    }
}
