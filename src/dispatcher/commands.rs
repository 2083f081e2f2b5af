//! Typed wrappers for the board's known commands.

use bytes::Bytes;

use super::{CommandRecord, Dispatcher};
use crate::channel::{ChannelMode, CHANNEL_COUNT};
use crate::codec::Arg;
use crate::error::{DyioError, Result};
use crate::protocol::{rpc, BoardId, MethodType};
use crate::router::{ChannelModeEntry, Event, EventPayload, FirmwareRevision, PowerState};

/// Reply to `get_channel_modes`: the reporting board and one entry per channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelModeTable {
    pub board_id: BoardId,
    pub entries: Vec<ChannelModeEntry>,
}

/// Widths and optional duration for a `set_channel_value` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueOptions {
    /// Bytes used for the value.
    pub value_size: usize,
    /// Duration of the transition, sent after the value when present.
    pub time: Option<u32>,
    /// Bytes used for the duration.
    pub time_size: usize,
}

impl ValueOptions {
    /// A single value byte, no duration.
    pub fn byte() -> Self {
        Self {
            value_size: 1,
            time: None,
            time_size: 0,
        }
    }

    /// Servo move: 1-byte position, 2-byte duration.
    pub fn servo(time: u32) -> Self {
        Self {
            value_size: 1,
            time: Some(time),
            time_size: 2,
        }
    }

    /// Counter move: 4-byte value, 4-byte duration.
    pub fn counter(time: u32) -> Self {
        Self {
            value_size: 4,
            time: Some(time),
            time_size: 4,
        }
    }

    /// Options matching what a channel in `mode` expects.
    pub fn for_mode(mode: ChannelMode, time: u32) -> Self {
        if mode.is_counter() {
            Self::counter(time)
        } else if mode == ChannelMode::ServoOut {
            Self::servo(time)
        } else {
            Self::byte()
        }
    }
}

impl Default for ValueOptions {
    fn default() -> Self {
        Self::byte()
    }
}

fn check_channel(channel: u8) -> Result<()> {
    if usize::from(channel) < CHANNEL_COUNT {
        Ok(())
    } else {
        Err(DyioError::InvalidChannel(channel))
    }
}

fn unexpected(event: &Event) -> DyioError {
    DyioError::Protocol(format!(
        "Unexpected reply to {}: {:?}",
        event.name, event.payload
    ))
}

impl Dispatcher {
    /// No-op liveness check.
    pub async fn ping(&self) -> Result<Event> {
        self.request(CommandRecord::new(rpc::PING, MethodType::Post, &[]))
            .await
    }

    /// Power-on handshake; reports voltage and bank states.
    pub async fn power_on(&self) -> Result<PowerState> {
        let event = self
            .request(CommandRecord::new(rpc::POWER, MethodType::Get, &[]))
            .await?;
        match event.payload {
            EventPayload::Power(state) => Ok(state),
            _ => Err(unexpected(&event)),
        }
    }

    /// Ask the board to expect a heartbeat every `period_ms` milliseconds.
    pub async fn start_heartbeat(&self, period_ms: u16) -> Result<Event> {
        let args = [Arg::from(1u8), Arg::int(i64::from(period_ms), 2)];
        self.request(CommandRecord::new(rpc::SAFE_MODE, MethodType::Post, &args))
            .await
    }

    pub async fn get_firmware_revision(&self) -> Result<FirmwareRevision> {
        let event = self
            .request(CommandRecord::new(
                rpc::FIRMWARE_REVISION,
                MethodType::Get,
                &[],
            ))
            .await?;
        match event.payload {
            EventPayload::FirmwareRevision(revision) => Ok(revision),
            _ => Err(unexpected(&event)),
        }
    }

    /// The board's info (name) string.
    pub async fn get_info(&self) -> Result<String> {
        let event = self
            .request(CommandRecord::new(rpc::INFO, MethodType::Get, &[]))
            .await?;
        match event.payload {
            EventPayload::Info(info) => Ok(info),
            _ => Err(unexpected(&event)),
        }
    }

    pub async fn set_info(&self, name: &str) -> Result<Event> {
        self.request(CommandRecord::new(
            rpc::INFO,
            MethodType::Critical,
            &[Arg::from(name)],
        ))
        .await
    }

    /// Mode of one channel; `None` when the board reports an unmapped code.
    pub async fn get_channel_mode(&self, channel: u8) -> Result<Option<ChannelMode>> {
        check_channel(channel)?;
        let event = self
            .request(CommandRecord::new(
                rpc::GET_CHANNEL_MODE,
                MethodType::Get,
                &[Arg::from(channel)],
            ))
            .await?;
        match event.payload {
            EventPayload::ChannelMode { mode, .. } => Ok(mode),
            _ => Err(unexpected(&event)),
        }
    }

    pub async fn get_channel_modes(&self) -> Result<ChannelModeTable> {
        let event = self
            .request(CommandRecord::new(
                rpc::GET_ALL_CHANNEL_MODES,
                MethodType::Get,
                &[],
            ))
            .await?;
        match event.payload {
            EventPayload::ChannelModes(entries) => Ok(ChannelModeTable {
                board_id: event.frame.board_id,
                entries,
            }),
            _ => Err(unexpected(&event)),
        }
    }

    /// Raw value bytes of one channel.
    pub async fn get_channel_value(&self, channel: u8) -> Result<Bytes> {
        check_channel(channel)?;
        let event = self
            .request(CommandRecord::new(
                rpc::GET_CHANNEL_VALUE,
                MethodType::Get,
                &[Arg::from(channel)],
            ))
            .await?;
        match event.payload {
            EventPayload::ChannelValue { raw, .. } => Ok(raw),
            _ => Err(unexpected(&event)),
        }
    }

    /// Raw value groups of every channel.
    pub async fn get_channel_values(&self) -> Result<Vec<Bytes>> {
        let event = self
            .request(CommandRecord::new(
                rpc::GET_ALL_CHANNEL_VALUES,
                MethodType::Get,
                &[],
            ))
            .await?;
        match event.payload {
            EventPayload::ChannelValues(groups) => Ok(groups),
            _ => Err(unexpected(&event)),
        }
    }

    /// Set a channel's mode; `async_enabled` asks the board to push value
    /// changes for it.
    pub async fn set_channel_mode(
        &self,
        channel: u8,
        mode: ChannelMode,
        async_enabled: bool,
    ) -> Result<Event> {
        check_channel(channel)?;
        let args = [
            Arg::from(channel),
            Arg::from(mode.code()),
            Arg::from(async_enabled),
        ];
        self.request(CommandRecord::new(
            rpc::SET_CHANNEL_MODE,
            MethodType::Post,
            &args,
        ))
        .await
    }

    pub async fn set_channel_value(
        &self,
        channel: u8,
        value: i64,
        options: ValueOptions,
    ) -> Result<Event> {
        check_channel(channel)?;
        let mut args = vec![Arg::from(channel), Arg::int(value, options.value_size)];
        if let Some(time) = options.time {
            args.push(Arg::int(i64::from(time), options.time_size));
        }
        self.request(CommandRecord::new(
            rpc::SET_CHANNEL_VALUE,
            MethodType::Post,
            &args,
        ))
        .await
    }
}
