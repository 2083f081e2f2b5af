//! Protocol module - wire format, framing, and lookup tables.
//!
//! This module implements the Bowler binary protocol:
//! - 11-byte header encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - Frame struct with typed accessors
//! - Event-name and error taxonomy tables

mod board_id;
mod frame;
mod frame_buffer;
mod lookup;
mod wire_format;

pub use board_id::{BoardId, BOARD_ID_SIZE};
pub use frame::{decode, encode, encode_groups, Frame};
pub use frame_buffer::FrameBuffer;
pub use lookup::{Lookup, RemoteError};
pub use wire_format::{
    checksum, rpc, Direction, MethodType, RpcName, CHECKSUM_OFFSET, DIRECTION_BIT, HEADER_SIZE,
    MAX_DECLARED_LENGTH, NAMESPACE_MASK, PROTOCOL_REVISION, RPC_NAME_SIZE,
};
