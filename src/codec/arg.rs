//! Command arguments.
//!
//! Each argument becomes one byte group in the payload:
//! - raw bytes pass through unchanged
//! - a small integer is a single byte
//! - an integer with an explicit width is encoded at exactly that width
//! - text falls back to its UTF-8 bytes

use bytes::Bytes;

/// One argument of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Already-encoded bytes.
    Bytes(Bytes),
    /// Single byte.
    Byte(u8),
    /// Big-endian integer encoded at `width` bytes (1..=8), truncated to
    /// the low bytes.
    Int { value: i64, width: usize },
    /// Text sent as its bytes.
    Text(String),
}

impl Arg {
    /// Big-endian integer of the given width.
    pub fn int(value: i64, width: usize) -> Self {
        Arg::Int { value, width }
    }

    /// Number of bytes this argument occupies.
    pub fn len(&self) -> usize {
        match self {
            Arg::Bytes(b) => b.len(),
            Arg::Byte(_) => 1,
            Arg::Int { width, .. } => (*width).min(8),
            Arg::Text(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert to the byte group placed on the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Arg::Bytes(b) => b.to_vec(),
            Arg::Byte(b) => vec![*b],
            Arg::Int { value, width } => {
                let width = (*width).min(8);
                value.to_be_bytes()[8 - width..].to_vec()
            }
            Arg::Text(s) => s.as_bytes().to_vec(),
        }
    }
}

impl From<u8> for Arg {
    fn from(b: u8) -> Self {
        Arg::Byte(b)
    }
}

impl From<bool> for Arg {
    fn from(b: bool) -> Self {
        Arg::Byte(u8::from(b))
    }
}

impl From<Bytes> for Arg {
    fn from(b: Bytes) -> Self {
        Arg::Bytes(b)
    }
}

impl From<Vec<u8>> for Arg {
    fn from(b: Vec<u8>) -> Self {
        Arg::Bytes(Bytes::from(b))
    }
}

impl From<&[u8]> for Arg {
    fn from(b: &[u8]) -> Self {
        Arg::Bytes(Bytes::copy_from_slice(b))
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Text(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Text(s)
    }
}
