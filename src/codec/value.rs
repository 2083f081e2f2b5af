//! Width-aware decoding of channel values.
//!
//! The element width picks the integer size: 1 byte, 2-3 bytes (16-bit),
//! 4-7 bytes (32-bit), 8+ bytes (64-bit). Extra bytes past the chosen size
//! are ignored. An empty slice decodes to 0.

/// Decode as a native-endian signed integer.
pub fn signed_native(bytes: &[u8]) -> i64 {
    match bytes.len() {
        0 => 0,
        1 => i64::from(bytes[0] as i8),
        2..=3 => i64::from(i16::from_ne_bytes([bytes[0], bytes[1]])),
        4..=7 => i64::from(i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        _ => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[..8]);
            i64::from_ne_bytes(buf)
        }
    }
}

/// Decode as a big-endian unsigned integer.
pub fn unsigned_big_endian(bytes: &[u8]) -> u64 {
    match bytes.len() {
        0 => 0,
        1 => u64::from(bytes[0]),
        2..=3 => u64::from(u16::from_be_bytes([bytes[0], bytes[1]])),
        4..=7 => u64::from(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        _ => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[..8]);
            u64::from_be_bytes(buf)
        }
    }
}
