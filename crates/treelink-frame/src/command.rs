use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;
use treelink_tree::{ConfigTree, NodeId, NodeType};

use crate::error::{CommandError, CommandResult};

/// Set on the opcode of a write frame.
pub const WRITE_BIT: u8 = 0x80;

/// Low opcode bits carrying the short address.
pub const ADDRESS_MASK: u8 = 0x7F;

/// Largest frame the instrument accepts, excluding the sequence byte.
pub const DEFAULT_MAX_PAYLOAD: usize = 19;

/// A parsed `"PATH"` or `"PATH VALUE"` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Upper-cased long name.
    pub path: String,
    /// Everything after the first space, verbatim. `None` means read.
    pub value: Option<String>,
}

impl Command {
    pub fn parse(text: &str) -> CommandResult<Self> {
        let text = text.trim();
        let (path, value) = match text.split_once(' ') {
            Some((path, value)) => (path, Some(value.to_string())),
            None => (text, None),
        };
        if path.is_empty() {
            return Err(CommandError::Empty);
        }
        Ok(Self {
            path: path.to_ascii_uppercase(),
            value,
        })
    }
}

/// Encode a command into one read or write frame against `tree`.
///
/// The path is resolved against the tree passed in, never a cached mapping.
/// The frame is rejected, not split, if it exceeds `max_payload`.
///
/// ```text
/// read   [addr]
/// write  [addr | 0x80, payload...]
/// ```
pub fn encode_command(tree: &ConfigTree, command: &str, max_payload: usize) -> CommandResult<Bytes> {
    let command = Command::parse(command)?;
    let id = resolve_target(tree, &command.path)?;
    let node = tree.node(id);
    let Some(address) = node.address() else {
        return Err(CommandError::NodeNotAddressable {
            path: command.path,
            listing: tree.enumerate(id),
        });
    };

    let mut frame = BytesMut::with_capacity(max_payload);
    match &command.value {
        None => frame.put_u8(address),
        Some(text) => {
            frame.put_u8(address | WRITE_BIT);
            put_value(&mut frame, tree, id, &command.path, text)?;
        }
    }

    if frame.len() > max_payload {
        return Err(CommandError::PayloadTooLarge {
            size: frame.len(),
            max: max_payload,
        });
    }
    debug!(path = %command.path, address, write = command.value.is_some(), len = frame.len(), "encoded command");
    Ok(frame.freeze())
}

fn resolve_target(tree: &ConfigTree, path: &str) -> CommandResult<NodeId> {
    tree.resolve(path)
        .ok_or_else(|| CommandError::NodeNotFound(path.to_string()))
}

fn put_value(
    frame: &mut BytesMut,
    tree: &ConfigTree,
    id: NodeId,
    path: &str,
    text: &str,
) -> CommandResult<()> {
    let ntype = tree.node(id).ntype();
    let invalid = |reason: String| CommandError::InvalidValue {
        path: path.to_string(),
        ntype,
        value: text.to_string(),
        reason,
    };
    let trimmed = text.trim();

    match ntype {
        NodeType::Chooser => {
            let index: u8 = trimmed.parse().map_err(|e| invalid(format!("{e}")))?;
            let choices = tree.node(id).children().len();
            if usize::from(index) >= choices {
                return Err(invalid(format!("only {choices} choices")));
            }
            frame.put_u8(index);
        }
        NodeType::U8 => frame.put_u8(trimmed.parse().map_err(|e| invalid(format!("{e}")))?),
        NodeType::S8 => frame.put_i8(trimmed.parse().map_err(|e| invalid(format!("{e}")))?),
        NodeType::U16 => frame.put_u16_le(trimmed.parse().map_err(|e| invalid(format!("{e}")))?),
        NodeType::S16 => frame.put_i16_le(trimmed.parse().map_err(|e| invalid(format!("{e}")))?),
        NodeType::U32 => frame.put_u32_le(trimmed.parse().map_err(|e| invalid(format!("{e}")))?),
        NodeType::S32 => frame.put_i32_le(trimmed.parse().map_err(|e| invalid(format!("{e}")))?),
        NodeType::Flt => {
            let value: f32 = trimmed.parse().map_err(|e| invalid(format!("{e}")))?;
            frame.put_f32_le(value);
        }
        NodeType::Str => {
            let len = u16::try_from(text.len())
                .map_err(|_| invalid(format!("{} bytes exceeds a 16-bit length", text.len())))?;
            frame.put_u16(len);
            frame.put_slice(text.as_bytes());
        }
        NodeType::Bin | NodeType::Plain | NodeType::Link | NodeType::Copy => {
            return Err(CommandError::UnsupportedWrite {
                path: path.to_string(),
                ntype,
            });
        }
    }
    Ok(())
}
