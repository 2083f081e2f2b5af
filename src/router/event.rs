//! Decoded events handed to router subscribers.

use bytes::Bytes;
use serde::Serialize;

use crate::channel::{BankState, ChannelMode};
use crate::protocol::{Frame, RemoteError};

/// One routed frame: its readable name, the frame itself and the parsed
/// payload.
#[derive(Debug, Clone)]
pub struct Event {
    /// Readable event name (`channel_values`, `power`, ...) or the raw rpc
    /// code for unnamed rpcs.
    pub name: String,
    pub frame: Frame,
    pub payload: EventPayload,
}

impl Event {
    /// The board error carried by an `_err` frame, if this is one.
    pub fn remote_error(&self) -> Option<&RemoteError> {
        match &self.payload {
            EventPayload::Error(err) => Some(err),
            _ => None,
        }
    }
}

/// Voltage and bank states reported by the power-on reply.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PowerState {
    /// Battery voltage in volts.
    pub voltage: f64,
    pub banks: [BankState; 2],
}

/// Firmware revisions reported by `_rev`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FirmwareRevision {
    pub dyio: [u8; 3],
    pub bootloader: [u8; 3],
}

/// One entry of the all-channel-modes reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelModeEntry {
    /// Code the board reported.
    pub code: u8,
    /// Mapped mode; unmapped codes are coerced to `digital_in`.
    pub mode: ChannelMode,
    /// `false` when the reported code was unmapped and coerced.
    pub editable: bool,
}

/// Type-specific payload, when a parser exists for the event name.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// No parser for this event, or the payload was too short for it.
    Raw,
    Power(PowerState),
    FirmwareRevision(FirmwareRevision),
    Info(String),
    ChannelMode {
        channel: u8,
        mode: Option<ChannelMode>,
    },
    ChannelModes(Vec<ChannelModeEntry>),
    ChannelValue {
        channel: u8,
        raw: Bytes,
    },
    /// Per-channel value groups of up to four bytes.
    ChannelValues(Vec<Bytes>),
    Error(RemoteError),
    /// Async dispatches never get a correlated reply.
    Dispatched,
}
