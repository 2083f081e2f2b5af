//! Frame buffer for accumulating partial reads.
//!
//! A serial link hands over bytes in arbitrary chunks: a frame may be split
//! across reads, and several frames may arrive in one read. The buffer uses
//! the declared length (byte 9) to find frame boundaries:
//! - `WaitingForHeader`: need at least 11 bytes
//! - `WaitingForBody`: header seen, need `11 + declared_length` bytes total
//!
//! # Example
//!
//! ```
//! use dyio_client::protocol::{encode, rpc, BoardId, FrameBuffer, MethodType};
//!
//! let bytes = encode(rpc::PING, MethodType::Post, BoardId::BROADCAST, &[]).unwrap();
//! let mut buffer = FrameBuffer::new();
//!
//! assert!(buffer.push(&bytes[..6]).is_empty());
//! let frames = buffer.push(&bytes[6..]);
//! assert_eq!(frames.len(), 1);
//! ```

use bytes::BytesMut;

use super::frame::{decode, Frame};
use super::wire_format::HEADER_SIZE;

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for complete header (need 11 bytes).
    WaitingForHeader,
    /// Header parsed, waiting until `total` bytes are buffered.
    WaitingForBody { total: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from transport reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
}

impl FrameBuffer {
    /// Create a new frame buffer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
            state: State::WaitingForHeader,
        }
    }

    /// Push data into the buffer and extract all complete frames, in arrival order.
    ///
    /// Partial data is kept for the next push.
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one() {
            frames.push(frame);
        }
        frames
    }

    /// Try to extract a single frame from the buffer.
    fn try_extract_one(&mut self) -> Option<Frame> {
        match self.state {
            State::WaitingForHeader => {
                if self.buffer.len() < HEADER_SIZE {
                    return None;
                }

                let total = HEADER_SIZE + usize::from(self.buffer[9]);
                self.state = State::WaitingForBody { total };
                self.try_extract_one()
            }

            State::WaitingForBody { total } => {
                if self.buffer.len() < total {
                    return None;
                }

                let raw = self.buffer.split_to(total).freeze();
                self.state = State::WaitingForHeader;
                decode(&raw)
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
