use bytes::BytesMut;
use tokio_util::codec::Decoder;
use treelink_tree::AddressMap;

use crate::error::FrameError;
use crate::message::{decode_message, Message};

/// `tokio-util` decoder yielding inbound [`Message`]s from a byte stream.
///
/// Holds a snapshot of the address map; call [`MessageDecoder::set_map`]
/// after every tree rebuild.
#[derive(Debug, Clone, Default)]
pub struct MessageDecoder {
    map: AddressMap,
}

impl MessageDecoder {
    pub fn new(map: AddressMap) -> Self {
        Self { map }
    }

    pub fn set_map(&mut self, map: AddressMap) {
        self.map = map;
    }

    pub fn map(&self) -> &AddressMap {
        &self.map
    }
}

impl Decoder for MessageDecoder {
    type Item = Message;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_message(src, &self.map)
    }
}
