use bytes::Bytes;

use crate::node::NodeType;

/// A decoded field value, typed by the node it belongs to.
///
/// Chooser selections are carried as [`Value::U8`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    S8(i8),
    S16(i16),
    S32(i32),
    Float(f32),
    Str(String),
    Bin(Bytes),
}

impl Value {
    /// The value node type this value decodes for.
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::U8(_) => NodeType::U8,
            Self::U16(_) => NodeType::U16,
            Self::U32(_) => NodeType::U32,
            Self::S8(_) => NodeType::S8,
            Self::S16(_) => NodeType::S16,
            Self::S32(_) => NodeType::S32,
            Self::Float(_) => NodeType::Flt,
            Self::Str(_) => NodeType::Str,
            Self::Bin(_) => NodeType::Bin,
        }
    }

    /// Integer view, for chooser indices and checksums.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::U8(v) => Some(u64::from(v)),
            Self::U16(v) => Some(u64::from(v)),
            Self::U32(v) => Some(u64::from(v)),
            Self::S8(v) => u64::try_from(v).ok(),
            Self::S16(v) => u64::try_from(v).ok(),
            Self::S32(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bin(b) => Some(b),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::U8(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::S8(v) => write!(f, "{v}"),
            Self::S16(v) => write!(f, "{v}"),
            Self::S32(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
            Self::Bin(b) => write!(f, "<binary {} bytes>", b.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_view() {
        assert_eq!(Value::U8(3).as_u64(), Some(3));
        assert_eq!(Value::S16(-1).as_u64(), None);
        assert_eq!(Value::U32(0xDEAD_BEEF).as_u64(), Some(0xDEAD_BEEF));
        assert_eq!(Value::Float(1.0).as_u64(), None);
    }

    #[test]
    fn display() {
        assert_eq!(Value::S32(-42).to_string(), "-42");
        assert_eq!(Value::Str("hello".into()).to_string(), "hello");
        assert_eq!(
            Value::Bin(Bytes::from_static(&[1, 2, 3])).to_string(),
            "<binary 3 bytes>"
        );
    }
}
