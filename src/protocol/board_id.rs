//! Six-byte board identifier carried in every frame header.

use std::fmt;
use std::str::FromStr;

use crate::error::{DyioError, Result};

/// Number of bytes in a board id.
pub const BOARD_ID_SIZE: usize = 6;

/// Board (MAC) address. The all-zero id is the broadcast address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BoardId([u8; BOARD_ID_SIZE]);

impl BoardId {
    /// Broadcast address `00:00:00:00:00:00`.
    pub const BROADCAST: BoardId = BoardId([0; BOARD_ID_SIZE]);

    pub const fn new(bytes: [u8; BOARD_ID_SIZE]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; BOARD_ID_SIZE] {
        &self.0
    }

    #[inline]
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl From<[u8; BOARD_ID_SIZE]> for BoardId {
    fn from(bytes: [u8; BOARD_ID_SIZE]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for BoardId {
    type Error = DyioError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        <[u8; BOARD_ID_SIZE]>::try_from(bytes)
            .map(Self)
            .map_err(|_| DyioError::InvalidBoardId(format!("{} bytes, expected 6", bytes.len())))
    }
}

impl TryFrom<Vec<u8>> for BoardId {
    type Error = DyioError;

    fn try_from(bytes: Vec<u8>) -> Result<Self> {
        Self::try_from(bytes.as_slice())
    }
}

/// Wider integer groups (e.g. values read from a config file) must each fit in a byte.
impl TryFrom<&[u32]> for BoardId {
    type Error = DyioError;

    fn try_from(values: &[u32]) -> Result<Self> {
        let bytes = values
            .iter()
            .map(|v| u8::try_from(*v))
            .collect::<std::result::Result<Vec<u8>, _>>()
            .map_err(|_| DyioError::InvalidBoardId(format!("{values:?}")))?;
        Self::try_from(bytes.as_slice())
    }
}

impl TryFrom<u64> for BoardId {
    type Error = DyioError;

    fn try_from(value: u64) -> Result<Self> {
        if value > 0xFFFF_FFFF_FFFF {
            return Err(DyioError::InvalidBoardId(format!("0x{value:x}")));
        }
        let be = value.to_be_bytes();
        Self::try_from(&be[2..])
    }
}

impl FromStr for BoardId {
    type Err = DyioError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("broadcast") {
            return Ok(Self::BROADCAST);
        }

        let invalid = || DyioError::InvalidBoardId(s.to_string());
        let groups = s
            .split(':')
            .map(|part| u32::from_str_radix(part, 16).map_err(|_| invalid()))
            .collect::<Result<Vec<u32>>>()?;
        Self::try_from(groups.as_slice()).map_err(|_| invalid())
    }
}

impl TryFrom<&str> for BoardId {
    type Error = DyioError;

    fn try_from(s: &str) -> Result<Self> {
        s.parse()
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_broadcast() {
        assert!(BoardId::default().is_broadcast());
        assert_eq!(BoardId::BROADCAST.to_string(), "00:00:00:00:00:00");
    }

    #[test]
    fn test_parse_colon_hex() {
        let id: BoardId = "74:F7:26:00:00:1a".parse().unwrap();
        assert_eq!(id.as_bytes(), &[0x74, 0xF7, 0x26, 0x00, 0x00, 0x1A]);
        assert_eq!(id.to_string(), "74:f7:26:00:00:1a");
    }

    #[test]
    fn test_parse_rejects_bad_strings() {
        assert!("74:f7:26:00:00".parse::<BoardId>().is_err());
        assert!("74:f7:26:00:00:00:00".parse::<BoardId>().is_err());
        assert!("74:f7:26:00:00:1ff".parse::<BoardId>().is_err());
        assert!("zz:f7:26:00:00:00".parse::<BoardId>().is_err());
        assert!("".parse::<BoardId>().is_err());
    }

    #[test]
    fn test_from_bytes() {
        let id = BoardId::try_from(&[1u8, 2, 3, 4, 5, 6][..]).unwrap();
        assert_eq!(id.as_bytes(), &[1, 2, 3, 4, 5, 6]);
        assert!(BoardId::try_from(vec![1u8, 2, 3]).is_err());
    }

    #[test]
    fn test_from_wide_groups_checks_range() {
        assert!(BoardId::try_from(&[1u32, 2, 3, 4, 5, 6][..]).is_ok());
        assert!(BoardId::try_from(&[1u32, 2, 3, 4, 5, 256][..]).is_err());
    }

    #[test]
    fn test_from_integer() {
        let id = BoardId::try_from(0x0102_0304_0506u64).unwrap();
        assert_eq!(id.as_bytes(), &[1, 2, 3, 4, 5, 6]);
        assert!(BoardId::try_from(0x01_0000_0000_0000u64).is_err());
    }
}
