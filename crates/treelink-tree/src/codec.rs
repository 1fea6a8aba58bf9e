//! Nested structural encoding (MessagePack).
//!
//! Every node appends its fields to the array that encloses it:
//!
//! ```text
//! value      tag, name
//! reference  tag, path
//! structural tag, name, [child fields ...]
//! ```
//!
//! A children array's declared length counts fields, not children. The
//! top-level document is an array holding the root's own fields.

use rmp::decode::{self, NumValueReadError, ValueReadError};
use rmp::encode;

use crate::def::NodeDef;
use crate::error::{Result, TreeError};
use crate::node::{NodeClass, NodeType};

/// Deepest nesting accepted while decoding.
const MAX_DEPTH: usize = 64;

/// Serialize a tree description.
pub fn encode(def: &NodeDef) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    encode::write_array_len(&mut out, def.field_count()).map_err(encode_failed)?;
    write_fields(&mut out, def)?;
    Ok(out)
}

fn write_fields(out: &mut Vec<u8>, def: &NodeDef) -> Result<()> {
    encode::write_uint(out, u64::from(def.ntype.tag())).map_err(encode_failed)?;
    match def.ntype.class() {
        NodeClass::Structural => {
            encode::write_str(out, &def.name).map_err(encode_failed)?;
            let fields: u32 = def.children.iter().map(NodeDef::field_count).sum();
            encode::write_array_len(out, fields).map_err(encode_failed)?;
            for child in &def.children {
                write_fields(out, child)?;
            }
        }
        NodeClass::Reference => {
            let path = def.path.as_deref().unwrap_or_default();
            encode::write_str(out, path).map_err(encode_failed)?;
        }
        NodeClass::Value => {
            encode::write_str(out, &def.name).map_err(encode_failed)?;
        }
    }
    Ok(())
}

/// Parse a structural encoding back into a tree description.
///
/// The root must be structural. `COPY` nodes are rejected: they are splice
/// instructions with no defined inflation, and an inflated tree never holds one.
pub fn decode(bytes: &[u8]) -> Result<NodeDef> {
    let mut rd = bytes;
    let declared = decode::read_array_len(&mut rd).map_err(|e| read_failed("top-level array", e))?;

    let tag = peek_tag(rd)?;
    if tag.class() != NodeClass::Structural {
        return Err(TreeError::TypeMismatch {
            expected: "structural root",
            found: tag.to_string(),
        });
    }

    let (root, used) = read_node(&mut rd, 0)?;
    if used != declared {
        return Err(TreeError::MalformedEncoding(format!(
            "top-level array declares {declared} fields, root used {used}"
        )));
    }
    if !rd.is_empty() {
        return Err(TreeError::MalformedEncoding(format!(
            "{} trailing bytes after root",
            rd.len()
        )));
    }
    Ok(root)
}

/// Decode one node and report how many enclosing-array fields it consumed.
fn read_node(rd: &mut &[u8], depth: usize) -> Result<(NodeDef, u32)> {
    if depth > MAX_DEPTH {
        return Err(TreeError::MalformedEncoding(format!(
            "nesting deeper than {MAX_DEPTH}"
        )));
    }

    let ntype = read_tag(rd)?;
    match ntype.class() {
        NodeClass::Structural => {
            let name = read_string(rd, "node name")?;
            let declared = decode::read_array_len(rd).map_err(|e| read_failed("children array", e))?;
            let mut used = 0u32;
            let mut children = Vec::new();
            while used < declared {
                let (child, fields) = read_node(rd, depth + 1)?;
                used += fields;
                children.push(child);
            }
            if used != declared {
                return Err(TreeError::MalformedEncoding(format!(
                    "children of {name:?} overrun their declared {declared} fields"
                )));
            }
            Ok((NodeDef::structural(ntype, name, children), 3))
        }
        NodeClass::Reference => {
            let path = read_string(rd, "reference path")?;
            if ntype == NodeType::Copy {
                return Err(TreeError::MalformedEncoding(format!(
                    "COPY {path} present in an inflated tree"
                )));
            }
            Ok((NodeDef::link(path), 2))
        }
        NodeClass::Value => {
            let name = read_string(rd, "node name")?;
            Ok((NodeDef::value(ntype, name), 2))
        }
    }
}

fn read_tag(rd: &mut &[u8]) -> Result<NodeType> {
    let raw: u64 = decode::read_int(rd).map_err(|err| match err {
        NumValueReadError::TypeMismatch(marker) => TreeError::TypeMismatch {
            expected: "node type tag",
            found: format!("{marker:?}"),
        },
        other => TreeError::MalformedEncoding(format!("node type tag: {other}")),
    })?;
    u8::try_from(raw)
        .ok()
        .and_then(NodeType::from_tag)
        .ok_or(TreeError::UnknownNodeType(raw))
}

fn peek_tag(rd: &[u8]) -> Result<NodeType> {
    let mut probe = rd;
    read_tag(&mut probe)
}

fn read_string(rd: &mut &[u8], what: &'static str) -> Result<String> {
    let len = decode::read_str_len(rd).map_err(|e| read_failed(what, e))? as usize;
    if rd.len() < len {
        return Err(TreeError::MalformedEncoding(format!(
            "{what} truncated ({len} bytes declared, {} available)",
            rd.len()
        )));
    }
    let (raw, rest) = rd.split_at(len);
    *rd = rest;
    String::from_utf8(raw.to_vec())
        .map_err(|err| TreeError::MalformedEncoding(format!("{what} is not UTF-8: {err}")))
}

fn read_failed(what: &'static str, err: ValueReadError<std::io::Error>) -> TreeError {
    match err {
        ValueReadError::TypeMismatch(marker) => TreeError::TypeMismatch {
            expected: what,
            found: format!("{marker:?}"),
        },
        other => TreeError::MalformedEncoding(format!("{what}: {other}")),
    }
}

fn encode_failed(err: encode::ValueWriteError<std::io::Error>) -> TreeError {
    TreeError::EncodeFailed(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::ConfigTree;

    fn sample() -> NodeDef {
        NodeDef::plain(
            "",
            vec![
                NodeDef::value(NodeType::U32, "PCB_VERSION"),
                NodeDef::plain(
                    "CH1",
                    vec![
                        NodeDef::chooser(
                            "MAPPING",
                            vec![
                                NodeDef::plain("CURRENT", vec![]),
                                NodeDef::plain("TEMP", vec![]),
                            ],
                        ),
                        NodeDef::value(NodeType::S16, "OFFSET"),
                    ],
                ),
                NodeDef::link("CH1:OFFSET"),
                NodeDef::value(NodeType::Bin, "BLOB"),
            ],
        )
    }

    #[test]
    fn bootstrap_layout_bytes() {
        let bytes = encode(&ConfigTree::bootstrap().to_def()).unwrap();

        let mut expected = vec![0x93, 0x00, 0xA5];
        expected.extend_from_slice(b"ADMIN");
        expected.push(0x96);
        expected.extend_from_slice(&[0x06, 0xA5]);
        expected.extend_from_slice(b"CRC32");
        expected.extend_from_slice(&[0x0B, 0xA4]);
        expected.extend_from_slice(b"TREE");
        expected.extend_from_slice(&[0x0A, 0xAA]);
        expected.extend_from_slice(b"DIAGNOSTIC");
        assert_eq!(bytes, expected);
    }

    #[test]
    fn decode_reproduces_tree_and_addresses() {
        let original = ConfigTree::build(&sample()).unwrap();
        let bytes = encode(&original.to_def()).unwrap();
        let decoded = ConfigTree::build(&decode(&bytes).unwrap()).unwrap();

        assert_eq!(decoded.len(), original.len());
        assert_eq!(decoded.to_def(), original.to_def());
        assert_eq!(decoded.address_table(), original.address_table());
    }

    #[test]
    fn rejects_copy_nodes() {
        let mut def = sample();
        def.children.push(NodeDef::copy("CH1"));
        let bytes = encode(&def).unwrap();

        assert!(matches!(
            decode(&bytes),
            Err(TreeError::MalformedEncoding(msg)) if msg.contains("COPY")
        ));
    }

    #[test]
    fn rejects_value_root() {
        let mut bytes = Vec::new();
        encode::write_array_len(&mut bytes, 2).unwrap();
        encode::write_uint(&mut bytes, u64::from(NodeType::U8.tag())).unwrap();
        encode::write_str(&mut bytes, "X").unwrap();

        assert!(matches!(
            decode(&bytes),
            Err(TreeError::TypeMismatch { expected: "structural root", .. })
        ));
    }

    #[test]
    fn rejects_string_where_tag_expected() {
        let mut bytes = Vec::new();
        encode::write_array_len(&mut bytes, 3).unwrap();
        encode::write_str(&mut bytes, "PLAIN").unwrap();

        assert!(matches!(
            decode(&bytes),
            Err(TreeError::TypeMismatch { expected: "node type tag", .. })
        ));
    }

    #[test]
    fn rejects_unknown_tag() {
        let mut bytes = Vec::new();
        encode::write_array_len(&mut bytes, 3).unwrap();
        encode::write_uint(&mut bytes, 0).unwrap();
        encode::write_str(&mut bytes, "ROOT").unwrap();
        encode::write_array_len(&mut bytes, 2).unwrap();
        encode::write_uint(&mut bytes, 42).unwrap();
        encode::write_str(&mut bytes, "X").unwrap();

        assert!(matches!(decode(&bytes), Err(TreeError::UnknownNodeType(42))));
    }

    #[test]
    fn rejects_truncated_and_overrun_input() {
        let bytes = encode(&sample()).unwrap();
        assert!(decode(&bytes[..bytes.len() - 3]).is_err());

        // A children array that ends mid-node.
        let mut overrun = Vec::new();
        encode::write_array_len(&mut overrun, 3).unwrap();
        encode::write_uint(&mut overrun, 0).unwrap();
        encode::write_str(&mut overrun, "ROOT").unwrap();
        encode::write_array_len(&mut overrun, 1).unwrap();
        encode::write_uint(&mut overrun, u64::from(NodeType::U8.tag())).unwrap();
        encode::write_str(&mut overrun, "X").unwrap();
        assert!(matches!(
            decode(&overrun),
            Err(TreeError::MalformedEncoding(_))
        ));
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = encode(&sample()).unwrap();
        bytes.push(0xC0);
        assert!(matches!(
            decode(&bytes),
            Err(TreeError::MalformedEncoding(msg)) if msg.contains("trailing")
        ));
    }
}
