use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, error, warn};
use treelink_tree::{AddressMap, NodeClass, NodeId, NodeType, Value};

use crate::command::ADDRESS_MASK;
use crate::error::{FrameError, Result};

/// Width of the big-endian length prefix on `STR` and `BIN` messages.
pub const LENGTH_PREFIX: usize = 2;

/// One complete inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Short address from the opcode.
    pub address: u8,
    /// Node the address resolved to when the message was decoded.
    pub node: NodeId,
    pub value: Value,
}

/// Decode one message from the front of `src`.
///
/// Returns `Ok(None)` if `src` is empty or holds only part of a message.
/// On success, consumes exactly the message bytes from `src`.
///
/// Wire format:
/// ```text
/// U8 S8 CHOOSER   [op, b]
/// U16 S16         [op, 2B LE]
/// U32 S32 FLT     [op, 4B LE]
/// STR BIN         [op, len (2B BE), len bytes]
/// ```
///
/// An opcode with no address leaves message boundaries unknown, so the whole
/// buffer is discarded. An opcode naming a node that carries no value is
/// reported without consuming anything.
pub fn decode_message(src: &mut BytesMut, map: &AddressMap) -> Result<Option<Message>> {
    let Some(&opcode) = src.first() else {
        return Ok(None);
    };
    let address = opcode & ADDRESS_MASK;

    let Some(slot) = map.get(address) else {
        let discarded = src.len();
        src.clear();
        warn!(opcode, discarded, "unknown opcode, receive buffer flushed");
        return Err(FrameError::UnknownOpcode { opcode, discarded });
    };

    let (header, body) = match fixed_width(slot.ntype) {
        Some(width) => (1, width),
        None if slot.ntype.class() != NodeClass::Value => {
            error!(address, ntype = %slot.ntype, "notification for a node that carries no value");
            return Err(FrameError::UndecodableNode {
                address,
                ntype: slot.ntype,
            });
        }
        None => {
            if src.len() < 1 + LENGTH_PREFIX {
                return Ok(None);
            }
            let len = u16::from_be_bytes([src[1], src[2]]);
            (1 + LENGTH_PREFIX, usize::from(len))
        }
    };

    if src.len() < header + body {
        return Ok(None); // Need more data
    }

    src.advance(header);
    let payload = src.split_to(body).freeze();
    let value = read_value(slot.ntype, payload);
    debug!(address, ntype = %slot.ntype, %value, "decoded message");

    Ok(Some(Message {
        address,
        node: slot.node,
        value,
    }))
}

/// Payload width of fixed-size types. `None` for `STR`, `BIN` and the
/// non-value types.
pub(crate) fn fixed_width(ntype: NodeType) -> Option<usize> {
    match ntype {
        NodeType::Chooser | NodeType::U8 | NodeType::S8 => Some(1),
        NodeType::U16 | NodeType::S16 => Some(2),
        NodeType::U32 | NodeType::S32 | NodeType::Flt => Some(4),
        _ => None,
    }
}

/// Decode a payload already cut to the right width for `ntype`.
///
/// `ntype` must be a value type or `CHOOSER`.
pub(crate) fn read_value(ntype: NodeType, mut payload: Bytes) -> Value {
    match ntype {
        NodeType::Chooser | NodeType::U8 => Value::U8(payload.get_u8()),
        NodeType::S8 => Value::S8(payload.get_i8()),
        NodeType::U16 => Value::U16(payload.get_u16_le()),
        NodeType::S16 => Value::S16(payload.get_i16_le()),
        NodeType::U32 => Value::U32(payload.get_u32_le()),
        NodeType::S32 => Value::S32(payload.get_i32_le()),
        NodeType::Flt => Value::Float(payload.get_f32_le()),
        NodeType::Str => Value::Str(String::from_utf8_lossy(&payload).into_owned()),
        _ => Value::Bin(payload),
    }
}

/// Append the payload encoding of `value`, length prefix included.
pub(crate) fn put_value(dst: &mut BytesMut, value: &Value) -> Result<()> {
    match value {
        Value::U8(v) => dst.put_u8(*v),
        Value::S8(v) => dst.put_i8(*v),
        Value::U16(v) => dst.put_u16_le(*v),
        Value::S16(v) => dst.put_i16_le(*v),
        Value::U32(v) => dst.put_u32_le(*v),
        Value::S32(v) => dst.put_i32_le(*v),
        Value::Float(v) => dst.put_f32_le(*v),
        Value::Str(s) => put_prefixed(dst, s.as_bytes())?,
        Value::Bin(b) => put_prefixed(dst, b)?,
    }
    Ok(())
}

fn put_prefixed(dst: &mut BytesMut, raw: &[u8]) -> Result<()> {
    let len = u16::try_from(raw.len()).map_err(|_| FrameError::ValueTooLong { len: raw.len() })?;
    dst.put_u16(len);
    dst.put_slice(raw);
    Ok(())
}

#[cfg(test)]
mod tests {
    use treelink_tree::{ConfigTree, NodeDef};

    use super::*;

    fn meter() -> ConfigTree {
        ConfigTree::build(&NodeDef::plain(
            "",
            vec![
                NodeDef::chooser(
                    "RANGE",
                    vec![NodeDef::plain("LOW", vec![]), NodeDef::plain("HIGH", vec![])],
                ),
                NodeDef::value(NodeType::S16, "TEMP"),
                NodeDef::value(NodeType::Flt, "READING"),
                NodeDef::value(NodeType::Bin, "LOG"),
            ],
        ))
        .unwrap()
    }

    #[test]
    fn decodes_fixed_width_messages() {
        let tree = meter();
        let mut buf = BytesMut::from(&[0x00, 0x01, 0x01, 0xFE, 0xFF][..]);

        let range = decode_message(&mut buf, tree.address_map()).unwrap().unwrap();
        assert_eq!(range.value, Value::U8(1));
        let temp = decode_message(&mut buf, tree.address_map()).unwrap().unwrap();
        assert_eq!(temp.value, Value::S16(-2));
        assert_eq!(temp.node, tree.resolve("TEMP").unwrap());
        assert!(buf.is_empty());
        assert!(decode_message(&mut buf, tree.address_map()).unwrap().is_none());
    }

    #[test]
    fn decodes_float_and_binary() {
        let tree = meter();
        let mut buf = BytesMut::new();
        buf.put_u8(0x02);
        buf.put_f32_le(2.5);
        buf.put_slice(&[0x03, 0x00, 0x03, 0xAA, 0xBB, 0xCC]);

        let reading = decode_message(&mut buf, tree.address_map()).unwrap().unwrap();
        assert_eq!(reading.value, Value::Float(2.5));
        let log = decode_message(&mut buf, tree.address_map()).unwrap().unwrap();
        assert_eq!(log.value, Value::Bin(Bytes::from_static(&[0xAA, 0xBB, 0xCC])));
    }

    #[test]
    fn waits_for_partial_messages() {
        let tree = meter();
        let partials: [&[u8]; 5] = [
            &[0x01],
            &[0x01, 0x05],
            &[0x03],
            &[0x03, 0x00],
            &[0x03, 0x00, 0x02, 0x01],
        ];
        for partial in partials {
            let mut buf = BytesMut::from(partial);
            assert!(decode_message(&mut buf, tree.address_map()).unwrap().is_none());
            assert_eq!(buf.as_ref(), partial, "partial input must stay buffered");
        }
    }

    #[test]
    fn unknown_opcode_flushes_everything() {
        let tree = meter();
        let mut buf = BytesMut::from(&[0x09, 0x00, 0x01, 0x02][..]);
        let err = decode_message(&mut buf, tree.address_map()).unwrap_err();
        assert!(matches!(
            err,
            FrameError::UnknownOpcode { opcode: 0x09, discarded: 4 }
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let tree = ConfigTree::bootstrap();
        let mut buf = BytesMut::from(&[0x02, 0x00, 0x02, 0xFF, b'a'][..]);
        let msg = decode_message(&mut buf, tree.address_map()).unwrap().unwrap();
        assert_eq!(msg.value, Value::Str("\u{FFFD}a".into()));
    }
}
