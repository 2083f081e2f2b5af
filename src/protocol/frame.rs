//! Frame struct with typed accessors, plus `encode` / `decode`.
//!
//! Decoding never rejects a frame for a bad checksum or length: the
//! calculated values are exposed next to the declared ones, and
//! [`Frame::validate`] is the explicit check.
//!
//! # Example
//!
//! ```
//! use dyio_client::codec::Arg;
//! use dyio_client::protocol::{decode, encode, rpc, BoardId, MethodType};
//!
//! let bytes = encode(rpc::SET_CHANNEL_MODE, MethodType::Post, BoardId::BROADCAST, &[
//!     Arg::from(3u8),
//!     Arg::from(0x02u8),
//!     Arg::from(false),
//! ])
//! .unwrap();
//!
//! let frame = decode(&bytes).unwrap();
//! assert_eq!(frame.rpc_name(), Some(rpc::SET_CHANNEL_MODE));
//! assert_eq!(frame.payload(), &[3, 0x02, 0]);
//! assert!(frame.validate().is_ok());
//! ```

use bytes::Bytes;

use super::board_id::{BoardId, BOARD_ID_SIZE};
use super::wire_format::{
    checksum, Direction, MethodType, RpcName, CHECKSUM_OFFSET, HEADER_SIZE, MAX_DECLARED_LENGTH,
    NAMESPACE_MASK, PROTOCOL_REVISION, RPC_NAME_SIZE,
};
use crate::codec::Arg;
use crate::error::{DyioError, Result};

/// A decoded protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Protocol revision (byte 0).
    pub revision: u8,
    /// Board id (bytes 1-6).
    pub board_id: BoardId,
    /// Method type (byte 7).
    pub method: MethodType,
    /// Full transaction-id byte, direction bit included (byte 8).
    pub transaction_id: u8,
    /// Declared rpc-name + payload length (byte 9).
    pub declared_length: u8,
    /// Declared header checksum (byte 10).
    pub checksum: u8,
    /// Rpc name bytes; shorter than 4 only for truncated frames.
    pub rpc: Bytes,
    /// Payload after the rpc name.
    pub payload: Bytes,
    calculated_checksum: u8,
}

impl Frame {
    /// Rpc name, if all four bytes are present.
    pub fn rpc_name(&self) -> Option<RpcName> {
        RpcName::from_slice(&self.rpc)
    }

    /// Rpc name as text, lossy.
    pub fn rpc_str(&self) -> String {
        String::from_utf8_lossy(&self.rpc).into_owned()
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Low seven bits of the transaction-id byte.
    #[inline]
    pub fn namespace(&self) -> u8 {
        self.transaction_id & NAMESPACE_MASK
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        Direction::from_transaction_id(self.transaction_id)
    }

    /// Length actually present: rpc bytes plus payload bytes.
    #[inline]
    pub fn calculated_length(&self) -> usize {
        self.rpc.len() + self.payload.len()
    }

    /// Checksum recomputed over header bytes 0-9.
    #[inline]
    pub fn calculated_checksum(&self) -> u8 {
        self.calculated_checksum
    }

    #[inline]
    pub fn is_status(&self) -> bool {
        self.method == MethodType::Status
    }

    /// Validate the frame for protocol compliance.
    ///
    /// Checks:
    /// - Revision matches
    /// - Declared checksum equals the calculated one
    /// - Declared length equals the bytes present
    pub fn validate(&self) -> Result<()> {
        if self.revision != PROTOCOL_REVISION {
            return Err(DyioError::Protocol(format!(
                "Unsupported revision {} (expected {})",
                self.revision, PROTOCOL_REVISION
            )));
        }

        if self.checksum != self.calculated_checksum {
            return Err(DyioError::Protocol(format!(
                "Checksum mismatch: declared 0x{:02x}, calculated 0x{:02x}",
                self.checksum, self.calculated_checksum
            )));
        }

        if usize::from(self.declared_length) != self.calculated_length() {
            return Err(DyioError::Protocol(format!(
                "Length mismatch: declared {}, calculated {}",
                self.declared_length,
                self.calculated_length()
            )));
        }

        Ok(())
    }
}

/// Encode a downstream frame (transaction id 0).
pub fn encode(
    rpc: RpcName,
    method: MethodType,
    board_id: BoardId,
    args: &[Arg],
) -> Result<Vec<u8>> {
    let groups: Vec<Vec<u8>> = args.iter().map(Arg::to_bytes).collect();
    encode_groups(rpc, method, board_id, 0, &groups)
}

/// Encode a frame from already-converted byte groups with an explicit
/// transaction-id byte.
///
/// Returns an error if the rpc name plus payload does not fit the one-byte
/// length field.
pub fn encode_groups<G: AsRef<[u8]>>(
    rpc: RpcName,
    method: MethodType,
    board_id: BoardId,
    transaction_id: u8,
    groups: &[G],
) -> Result<Vec<u8>> {
    let payload_len: usize = groups.iter().map(|g| g.as_ref().len()).sum();
    let length = RPC_NAME_SIZE + payload_len;
    if length > MAX_DECLARED_LENGTH {
        return Err(DyioError::Protocol(format!(
            "Payload size {} exceeds maximum {}",
            length, MAX_DECLARED_LENGTH
        )));
    }

    let mut buf = Vec::with_capacity(HEADER_SIZE + length);
    buf.push(PROTOCOL_REVISION);
    buf.extend_from_slice(board_id.as_bytes());
    buf.push(method.code());
    buf.push(transaction_id);
    buf.push(length as u8);
    buf.push(checksum(&buf[..CHECKSUM_OFFSET]));
    buf.extend_from_slice(rpc.as_bytes());
    for group in groups {
        buf.extend_from_slice(group.as_ref());
    }
    Ok(buf)
}

/// Decode raw bytes into a frame.
///
/// Returns `None` if the buffer is shorter than the header. Never fails on
/// checksum or length mismatches.
pub fn decode(raw: &[u8]) -> Option<Frame> {
    if raw.len() < HEADER_SIZE {
        return None;
    }

    let mut board = [0u8; BOARD_ID_SIZE];
    board.copy_from_slice(&raw[1..1 + BOARD_ID_SIZE]);

    let rpc_end = raw.len().min(HEADER_SIZE + RPC_NAME_SIZE);
    Some(Frame {
        revision: raw[0],
        board_id: BoardId::new(board),
        method: MethodType::from_code(raw[7]),
        transaction_id: raw[8],
        declared_length: raw[9],
        checksum: raw[CHECKSUM_OFFSET],
        rpc: Bytes::copy_from_slice(&raw[HEADER_SIZE..rpc_end]),
        payload: Bytes::copy_from_slice(&raw[rpc_end..]),
        calculated_checksum: checksum(&raw[..CHECKSUM_OFFSET]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::rpc;

    fn board() -> BoardId {
        BoardId::new([0x74, 0xF7, 0x26, 0x00, 0x00, 0x1A])
    }

    #[test]
    fn test_encode_layout() {
        let bytes = encode(
            rpc::SET_CHANNEL_VALUE,
            MethodType::Post,
            board(),
            &[Arg::from(4u8), Arg::from(128u8)],
        )
        .unwrap();

        assert_eq!(bytes.len(), HEADER_SIZE + 4 + 2);
        assert_eq!(bytes[0], PROTOCOL_REVISION);
        assert_eq!(&bytes[1..7], board().as_bytes());
        assert_eq!(bytes[7], 0x20);
        assert_eq!(bytes[8], 0);
        assert_eq!(bytes[9], 6);
        assert_eq!(bytes[10], checksum(&bytes[..10]));
        assert_eq!(&bytes[11..15], b"schv");
        assert_eq!(&bytes[15..], &[4, 128]);
    }

    #[test]
    fn test_encode_rejects_oversize_payload() {
        let big = Arg::from(vec![0u8; 252]);
        let result = encode(rpc::INFO, MethodType::Critical, board(), &[big]);
        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));

        let fits = Arg::from(vec![0u8; 251]);
        assert!(encode(rpc::INFO, MethodType::Critical, board(), &[fits]).is_ok());
    }

    #[test]
    fn test_decode_too_short_buffer() {
        assert!(decode(&[]).is_none());
        assert!(decode(&[3u8; 10]).is_none());
    }

    #[test]
    fn test_decode_header_only() {
        let frame = decode(&[3u8; HEADER_SIZE]).unwrap();
        assert!(frame.rpc.is_empty());
        assert!(frame.payload.is_empty());
        assert_eq!(frame.rpc_name(), None);
        assert_eq!(frame.calculated_length(), 0);
    }

    #[test]
    fn test_decode_direction_and_namespace() {
        let bytes =
            encode_groups::<&[u8]>(rpc::POWER, MethodType::Get, board(), 0x85, &[]).unwrap();
        let frame = decode(&bytes).unwrap();
        assert_eq!(frame.direction(), Direction::Upstream);
        assert_eq!(frame.namespace(), 5);
        assert_eq!(frame.transaction_id, 0x85);
    }

    #[test]
    fn test_decode_unknown_method_preserved() {
        let mut bytes = encode(rpc::PING, MethodType::Post, board(), &[]).unwrap();
        bytes[7] = 0x99;
        let frame = decode(&bytes).unwrap();
        assert_eq!(frame.method, MethodType::Other(0x99));
    }

    #[test]
    fn test_mismatch_exposed_not_rejected() {
        let mut bytes = encode(rpc::PING, MethodType::Post, board(), &[]).unwrap();
        bytes[10] = bytes[10].wrapping_add(1);
        bytes.push(0xAA);

        let frame = decode(&bytes).unwrap();
        assert_ne!(frame.checksum, frame.calculated_checksum());
        assert_eq!(frame.declared_length, 4);
        assert_eq!(frame.calculated_length(), 5);

        let err = frame.validate().unwrap_err().to_string();
        assert!(err.contains("Checksum mismatch"));
    }

    #[test]
    fn test_validate_length_mismatch() {
        let mut bytes = encode(rpc::PING, MethodType::Post, board(), &[]).unwrap();
        bytes.push(0xAA);
        let frame = decode(&bytes).unwrap();
        assert!(frame
            .validate()
            .unwrap_err()
            .to_string()
            .contains("Length mismatch"));
    }
}
