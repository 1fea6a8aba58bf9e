//! The instrument's end of the wire format.
//!
//! Requests arrive as command frames (sequence byte already stripped);
//! answers leave as notification messages, split to the link's frame size.

use bytes::{BufMut, Bytes, BytesMut};
use treelink_tree::{AddressMap, NodeClass, NodeId, Value};

use crate::command::{ADDRESS_MASK, WRITE_BIT};
use crate::error::{FrameError, Result};
use crate::message::{fixed_width, put_value, read_value, LENGTH_PREFIX};

/// A decoded command frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Read { address: u8, node: NodeId },
    Write { address: u8, node: NodeId, value: Value },
}

impl Request {
    pub fn address(&self) -> u8 {
        match self {
            Self::Read { address, .. } | Self::Write { address, .. } => *address,
        }
    }

    pub fn node(&self) -> NodeId {
        match self {
            Self::Read { node, .. } | Self::Write { node, .. } => *node,
        }
    }
}

/// Encode a notification message for `address`.
pub fn encode_notification(address: u8, value: &Value) -> Result<Bytes> {
    let mut dst = BytesMut::with_capacity(8);
    dst.put_u8(address & ADDRESS_MASK);
    put_value(&mut dst, value)?;
    Ok(dst.freeze())
}

/// Split a message into frames of at most `max` bytes, in order.
pub fn split_frames(message: &[u8], max: usize) -> Vec<Bytes> {
    message
        .chunks(max.max(1))
        .map(Bytes::copy_from_slice)
        .collect()
}

/// Parse one command frame against the instrument's address map.
///
/// Trailing bytes after the payload are ignored, so zero-padded frames are
/// accepted.
pub fn decode_request(map: &AddressMap, frame: &[u8]) -> Result<Request> {
    let Some((&opcode, payload)) = frame.split_first() else {
        return Err(FrameError::Truncated {
            needed: 1,
            available: 0,
        });
    };
    let address = opcode & ADDRESS_MASK;
    let slot = map.get(address).ok_or(FrameError::UnknownOpcode {
        opcode,
        discarded: frame.len(),
    })?;

    if opcode & WRITE_BIT == 0 {
        return Ok(Request::Read {
            address,
            node: slot.node,
        });
    }

    let (header, body) = match fixed_width(slot.ntype) {
        Some(width) => (0, width),
        None if slot.ntype.class() != NodeClass::Value => {
            return Err(FrameError::UndecodableNode {
                address,
                ntype: slot.ntype,
            });
        }
        None => {
            if payload.len() < LENGTH_PREFIX {
                return Err(FrameError::Truncated {
                    needed: 1 + LENGTH_PREFIX,
                    available: frame.len(),
                });
            }
            let len = u16::from_be_bytes([payload[0], payload[1]]);
            (LENGTH_PREFIX, usize::from(len))
        }
    };

    if payload.len() < header + body {
        return Err(FrameError::Truncated {
            needed: 1 + header + body,
            available: frame.len(),
        });
    }
    let raw = Bytes::copy_from_slice(&payload[header..header + body]);
    Ok(Request::Write {
        address,
        node: slot.node,
        value: read_value(slot.ntype, raw),
    })
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use treelink_tree::{ConfigTree, DIAGNOSTIC_PATH};

    use super::*;
    use crate::command::{encode_command, DEFAULT_MAX_PAYLOAD};
    use crate::message::decode_message;

    #[test]
    fn notification_layouts() {
        assert_eq!(
            encode_notification(2, &Value::Str("hello".into())).unwrap().as_ref(),
            b"\x02\x00\x05hello"
        );
        assert_eq!(
            encode_notification(0, &Value::U32(42)).unwrap().as_ref(),
            &[0x00, 0x2A, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn split_notification_reassembles() {
        let tree = ConfigTree::bootstrap();
        let message = encode_notification(1, &Value::Bin(Bytes::from(vec![7u8; 50]))).unwrap();
        let frames = split_frames(&message, 19);
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.len() <= 19));

        let mut buf = BytesMut::new();
        let mut decoded = None;
        for frame in &frames {
            buf.extend_from_slice(frame);
            if let Some(msg) = decode_message(&mut buf, tree.address_map()).unwrap() {
                decoded = Some(msg);
            }
        }
        assert_eq!(decoded.unwrap().value, Value::Bin(Bytes::from(vec![7u8; 50])));
    }

    #[test]
    fn decodes_what_the_host_encodes() {
        let tree = ConfigTree::bootstrap();
        let map = tree.address_map();

        let read = encode_command(&tree, "ADMIN:TREE", DEFAULT_MAX_PAYLOAD).unwrap();
        assert!(matches!(decode_request(map, &read).unwrap(), Request::Read { address: 1, .. }));

        let write = encode_command(&tree, "ADMIN:DIAGNOSTIC ok go", DEFAULT_MAX_PAYLOAD).unwrap();
        let request = decode_request(map, &write).unwrap();
        assert_eq!(request.node(), tree.resolve(DIAGNOSTIC_PATH).unwrap());
        assert!(matches!(request, Request::Write { value: Value::Str(s), .. } if s == "ok go"));
    }

    #[test]
    fn accepts_zero_padding() {
        let tree = ConfigTree::bootstrap();
        let mut padded = vec![0x80, 0x01, 0x00, 0x00, 0x00];
        padded.resize(19, 0);
        assert!(matches!(
            decode_request(tree.address_map(), &padded).unwrap(),
            Request::Write { value: Value::U32(1), .. }
        ));
    }

    #[test]
    fn rejects_short_and_unknown_requests() {
        let tree = ConfigTree::bootstrap();
        let map = tree.address_map();
        assert!(matches!(decode_request(map, &[]), Err(FrameError::Truncated { .. })));
        assert!(matches!(
            decode_request(map, &[0x80, 0x01]),
            Err(FrameError::Truncated { needed: 5, available: 2 })
        ));
        assert!(matches!(
            decode_request(map, &[0x82, 0x00, 0x04, b'a']),
            Err(FrameError::Truncated { needed: 7, available: 4 })
        ));
        assert!(matches!(
            decode_request(map, &[0x10]),
            Err(FrameError::UnknownOpcode { opcode: 0x10, .. })
        ));
    }
}
