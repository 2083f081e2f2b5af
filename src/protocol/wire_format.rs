//! Wire format constants and header field types.
//!
//! Implements the 11-byte Bowler header:
//! ```text
//! ┌──────────┬──────────┬────────┬──────────┬────────┬──────────┬──────────┬─────────┐
//! │ Revision │ Board ID │ Method │ Tx ID    │ Length │ Checksum │ RPC name │ Payload │
//! │ 1 byte   │ 6 bytes  │ 1 byte │ 1 byte   │ 1 byte │ 1 byte   │ 4 bytes  │ N bytes │
//! └──────────┴──────────┴────────┴──────────┴────────┴──────────┴──────────┴─────────┘
//! ```
//!
//! `Length` counts the rpc name plus payload. `Checksum` is the sum of the
//! ten bytes before it, modulo 256. The high bit of `Tx ID` is the direction
//! flag; the low seven bits are the namespace.

use std::fmt;

use crate::error::{DyioError, Result};

/// Header size in bytes (fixed, exactly 11).
pub const HEADER_SIZE: usize = 11;

/// Protocol revision carried in byte 0.
pub const PROTOCOL_REVISION: u8 = 3;

/// Length of an rpc name.
pub const RPC_NAME_SIZE: usize = 4;

/// Largest value the one-byte length field can declare.
pub const MAX_DECLARED_LENGTH: usize = u8::MAX as usize;

/// Offset of the checksum byte.
pub const CHECKSUM_OFFSET: usize = 10;

/// Direction bit in the transaction-id byte.
pub const DIRECTION_BIT: u8 = 0b1000_0000;

/// Namespace mask in the transaction-id byte.
pub const NAMESPACE_MASK: u8 = 0b0111_1111;

/// Verb of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodType {
    Status,
    Get,
    Post,
    Critical,
    Async,
    /// Any code outside the five named ones, preserved as-is.
    Other(u8),
}

impl MethodType {
    /// One-byte wire code.
    pub fn code(self) -> u8 {
        match self {
            MethodType::Status => 0x00,
            MethodType::Get => 0x10,
            MethodType::Post => 0x20,
            MethodType::Critical => 0x30,
            MethodType::Async => 0x40,
            MethodType::Other(code) => code,
        }
    }

    /// Map a wire code to a method type. Total: unknown codes become `Other`.
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => MethodType::Status,
            0x10 => MethodType::Get,
            0x20 => MethodType::Post,
            0x30 => MethodType::Critical,
            0x40 => MethodType::Async,
            other => MethodType::Other(other),
        }
    }

    /// Parse the action word used by call-by-name dispatch.
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "status" => Some(MethodType::Status),
            "get" => Some(MethodType::Get),
            "post" => Some(MethodType::Post),
            "critical" => Some(MethodType::Critical),
            "async" => Some(MethodType::Async),
            _ => None,
        }
    }
}

impl From<u8> for MethodType {
    fn from(code: u8) -> Self {
        MethodType::from_code(code)
    }
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodType::Status => f.write_str("status"),
            MethodType::Get => f.write_str("get"),
            MethodType::Post => f.write_str("post"),
            MethodType::Critical => f.write_str("critical"),
            MethodType::Async => f.write_str("async"),
            MethodType::Other(code) => write!(f, "other(0x{code:02x})"),
        }
    }
}

/// Which way a frame travels, from the high bit of the transaction id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to board.
    Downstream,
    /// Board to host.
    Upstream,
}

impl Direction {
    /// Decode from the full transaction-id byte.
    #[inline]
    pub fn from_transaction_id(tx: u8) -> Self {
        if tx & DIRECTION_BIT != 0 {
            Direction::Upstream
        } else {
            Direction::Downstream
        }
    }
}

/// Four-byte ASCII rpc code (e.g. `_pwr`, `gacm`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RpcName([u8; RPC_NAME_SIZE]);

impl RpcName {
    /// Build from a raw 4-byte code.
    pub const fn new(code: [u8; RPC_NAME_SIZE]) -> Self {
        Self(code)
    }

    /// Build from a string that must be exactly four ASCII bytes.
    pub fn parse(name: &str) -> Result<Self> {
        Self::from_slice(name.as_bytes())
            .filter(|_| name.is_ascii())
            .ok_or_else(|| DyioError::UnknownCommand(name.to_string()))
    }

    /// Build from a slice of exactly four bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; RPC_NAME_SIZE]>::try_from(bytes).ok().map(Self)
    }

    /// Raw code bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; RPC_NAME_SIZE] {
        &self.0
    }

    /// Code as text (lossy for non-ASCII codes).
    pub fn as_str(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl fmt::Display for RpcName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

/// Reserved rpc codes.
pub mod rpc {
    use super::RpcName;

    pub const PING: RpcName = RpcName::new(*b"_png");
    pub const POWER: RpcName = RpcName::new(*b"_pwr");
    pub const GET_ALL_CHANNEL_VALUES: RpcName = RpcName::new(*b"gacv");
    pub const GET_CHANNEL_VALUE: RpcName = RpcName::new(*b"gchv");
    pub const GET_ALL_CHANNEL_MODES: RpcName = RpcName::new(*b"gacm");
    pub const GET_CHANNEL_MODE: RpcName = RpcName::new(*b"gchm");
    pub const SET_CHANNEL_VALUE: RpcName = RpcName::new(*b"schv");
    pub const SET_CHANNEL_MODE: RpcName = RpcName::new(*b"schm");
    pub const ERROR: RpcName = RpcName::new(*b"_err");
    pub const READY: RpcName = RpcName::new(*b"_rdy");
    pub const FIRMWARE_REVISION: RpcName = RpcName::new(*b"_rev");
    pub const INFO: RpcName = RpcName::new(*b"info");
    pub const SAFE_MODE: RpcName = RpcName::new(*b"safe");
}

/// Sum of the bytes modulo 256.
#[inline]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size_is_exactly_11() {
        assert_eq!(HEADER_SIZE, 11);
        assert_eq!(CHECKSUM_OFFSET, HEADER_SIZE - 1);
    }

    #[test]
    fn test_method_type_codes() {
        assert_eq!(MethodType::Status.code(), 0x00);
        assert_eq!(MethodType::Get.code(), 0x10);
        assert_eq!(MethodType::Post.code(), 0x20);
        assert_eq!(MethodType::Critical.code(), 0x30);
        assert_eq!(MethodType::Async.code(), 0x40);
        assert_eq!(MethodType::from_code(0x30), MethodType::Critical);
        assert_eq!(MethodType::from_code(0x55), MethodType::Other(0x55));
        assert_eq!(MethodType::Other(0x55).code(), 0x55);
    }

    #[test]
    fn test_method_type_from_action() {
        assert_eq!(MethodType::from_action("get"), Some(MethodType::Get));
        assert_eq!(MethodType::from_action("critical"), Some(MethodType::Critical));
        assert_eq!(MethodType::from_action("set"), None);
        assert_eq!(MethodType::from_action("channel"), None);
    }

    #[test]
    fn test_direction_from_high_bit() {
        assert_eq!(Direction::from_transaction_id(0x00), Direction::Downstream);
        assert_eq!(Direction::from_transaction_id(0x7F), Direction::Downstream);
        assert_eq!(Direction::from_transaction_id(0x80), Direction::Upstream);
        assert_eq!(Direction::from_transaction_id(0xFF), Direction::Upstream);
    }

    #[test]
    fn test_rpc_name_parse() {
        assert_eq!(RpcName::parse("_pwr").unwrap(), rpc::POWER);
        assert_eq!(rpc::GET_ALL_CHANNEL_MODES.to_string(), "gacm");
        assert!(matches!(
            RpcName::parse("power"),
            Err(DyioError::UnknownCommand(_))
        ));
        assert!(RpcName::parse("abc").is_err());
    }

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[1, 2, 3]), 6);
        assert_eq!(checksum(&[0xFF, 0x02]), 0x01);
    }
}
