//! Error types for dyio-client.

use thiserror::Error;

use crate::channel::ChannelMode;
use crate::protocol::RemoteError;

/// Main error type for all board operations.
#[derive(Debug, Error)]
pub enum DyioError {
    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading a session configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Protocol error (malformed frame, oversize payload, failed validation).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The board answered with an `_err` frame.
    #[error("{0}")]
    Remote(RemoteError),

    /// Board id could not be normalized to six bytes.
    #[error("Invalid board id: {0}")]
    InvalidBoardId(String),

    /// Mode is not wired to the given channel.
    #[error("Mode {mode} is not an appropriate mode for channel {channel}")]
    UnsupportedMode { mode: ChannelMode, channel: u8 },

    /// Channel number outside 0..24.
    #[error("Invalid channel number: {0}")]
    InvalidChannel(u8),

    /// Command name has no rpc code and is not itself a 4-byte code.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Event subscription name has no recognized prefix.
    #[error("Invalid subscription: {0}")]
    InvalidSubscription(String),

    /// The channel-mode table reported during resync was unusable.
    #[error("Not enough channels: {0}")]
    InsufficientChannels(usize),

    /// Transport closed while a frame was being written.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The owning session was dropped.
    #[error("Session closed")]
    SessionClosed,

    /// A bounded wait on a command reply elapsed.
    #[error("Timed out waiting for reply")]
    Timeout,
}

impl From<RemoteError> for DyioError {
    fn from(err: RemoteError) -> Self {
        DyioError::Remote(err)
    }
}

/// Result type alias using DyioError.
pub type Result<T> = std::result::Result<T, DyioError>;
