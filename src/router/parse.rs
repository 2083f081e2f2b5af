//! Response parsers, selected by event name.

use bytes::Bytes;

use super::event::{ChannelModeEntry, EventPayload, FirmwareRevision, PowerState};
use crate::channel::{BankState, ChannelMode};
use crate::codec::value;
use crate::protocol::{Frame, Lookup};

/// Size of one channel's group in a `channel_values` reply.
pub const VALUE_GROUP_SIZE: usize = 4;

/// Below this voltage an unregulated bank counts as unpowered.
const POWERED_VOLTAGE: f64 = 5.0;

/// Parse a frame payload for the given event name.
///
/// Unknown names, and payloads too short for their parser, come back as
/// [`EventPayload::Raw`].
pub fn parse_payload(name: &str, frame: &Frame, lookup: &Lookup) -> EventPayload {
    let data = frame.payload();
    let parsed = match name {
        "power" => parse_power(data).map(EventPayload::Power),
        "firmware_revision" => parse_firmware_revision(data).map(EventPayload::FirmwareRevision),
        "info" => Some(EventPayload::Info(
            String::from_utf8_lossy(data).into_owned(),
        )),
        "channel_mode" => parse_channel_mode(data),
        "channel_modes" => Some(EventPayload::ChannelModes(parse_channel_modes(data))),
        "channel_value" => parse_channel_value(&frame.payload),
        "channel_values" => Some(EventPayload::ChannelValues(parse_channel_values(
            &frame.payload,
        ))),
        "error" => parse_error(data, lookup),
        _ => return EventPayload::Raw,
    };

    parsed.unwrap_or_else(|| {
        tracing::warn!(
            "Payload of {} bytes too short for {} parser",
            data.len(),
            name
        );
        EventPayload::Raw
    })
}

/// `[bank0, bank1, voltage_hi, voltage_lo]`, voltage in millivolts.
pub fn parse_power(data: &[u8]) -> Option<PowerState> {
    if data.len() < 4 {
        return None;
    }
    let voltage = f64::from(u16::from_be_bytes([data[2], data[3]])) / 1000.0;
    Some(PowerState {
        voltage,
        banks: [bank_state(data[0], voltage), bank_state(data[1], voltage)],
    })
}

fn bank_state(code: u8, voltage: f64) -> BankState {
    match code {
        1 => BankState::Regulated,
        0 if voltage < POWERED_VOLTAGE => BankState::Unpowered,
        _ => BankState::Powered,
    }
}

fn parse_firmware_revision(data: &[u8]) -> Option<FirmwareRevision> {
    if data.len() < 6 {
        return None;
    }
    Some(FirmwareRevision {
        dyio: [data[0], data[1], data[2]],
        bootloader: [data[3], data[4], data[5]],
    })
}

fn parse_channel_mode(data: &[u8]) -> Option<EventPayload> {
    match data {
        [channel, code, ..] => Some(EventPayload::ChannelMode {
            channel: *channel,
            mode: ChannelMode::from_code(*code),
        }),
        _ => None,
    }
}

/// One byte per channel; unmapped codes are coerced to `digital_in`.
pub fn parse_channel_modes(data: &[u8]) -> Vec<ChannelModeEntry> {
    data.iter()
        .map(|&code| match ChannelMode::from_code(code) {
            Some(mode) => ChannelModeEntry {
                code,
                mode,
                editable: true,
            },
            None => ChannelModeEntry {
                code,
                mode: ChannelMode::DigitalIn,
                editable: false,
            },
        })
        .collect()
}

fn parse_channel_value(payload: &Bytes) -> Option<EventPayload> {
    let channel = *payload.first()?;
    Some(EventPayload::ChannelValue {
        channel,
        raw: payload.slice(1..),
    })
}

/// Split into consecutive four-byte groups; the last may be shorter.
pub fn parse_channel_values(payload: &Bytes) -> Vec<Bytes> {
    (0..payload.len())
        .step_by(VALUE_GROUP_SIZE)
        .map(|start| payload.slice(start..(start + VALUE_GROUP_SIZE).min(payload.len())))
        .collect()
}

fn parse_error(data: &[u8], lookup: &Lookup) -> Option<EventPayload> {
    match data {
        [zone, section, ..] => Some(EventPayload::Error(lookup.remote_error(*zone, *section))),
        _ => None,
    }
}

/// Integer value of one channel group for the given mode.
pub fn channel_value(raw: &[u8], mode: ChannelMode) -> i64 {
    if mode.reads_signed() {
        value::signed_native(raw)
    } else {
        value::unsigned_big_endian(raw) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Arg;
    use crate::protocol::{decode, encode, rpc, BoardId, MethodType, RpcName};

    fn frame(name: RpcName, payload: &[u8]) -> Frame {
        let bytes = encode(
            name,
            MethodType::Get,
            BoardId::BROADCAST,
            &[Arg::from(payload)],
        )
        .unwrap();
        decode(&bytes).unwrap()
    }

    #[test]
    fn test_power_parse() {
        let state = parse_power(&[1, 0, 0x13, 0x88]).unwrap();
        assert_eq!(state.voltage, 5.0);
        assert_eq!(state.banks, [BankState::Regulated, BankState::Powered]);
    }

    #[test]
    fn test_power_low_voltage_unpowered() {
        let state = parse_power(&[0, 7, 0x0F, 0xA0]).unwrap();
        assert_eq!(state.voltage, 4.0);
        assert_eq!(state.banks, [BankState::Unpowered, BankState::Powered]);
        assert!(parse_power(&[1, 0, 0x13]).is_none());
    }

    #[test]
    fn test_firmware_revision() {
        let lookup = Lookup::new();
        let payload = parse_payload(
            "firmware_revision",
            &frame(rpc::FIRMWARE_REVISION, &[3, 8, 2, 0, 1, 9]),
            &lookup,
        );
        assert_eq!(
            payload,
            EventPayload::FirmwareRevision(FirmwareRevision {
                dyio: [3, 8, 2],
                bootloader: [0, 1, 9],
            })
        );
    }

    #[test]
    fn test_channel_modes_coerces_unmapped() {
        let entries = parse_channel_modes(&[0x02, 0x07, 0x55]);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].mode, ChannelMode::ServoOut);
        assert!(entries[1].editable);
        assert_eq!(entries[2].mode, ChannelMode::DigitalIn);
        assert_eq!(entries[2].code, 0x55);
        assert!(!entries[2].editable);
    }

    #[test]
    fn test_channel_values_groups_of_four() {
        let groups = parse_channel_values(&Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8, 9]));
        assert_eq!(groups.len(), 3);
        assert_eq!(&groups[1][..], &[5, 6, 7, 8]);
        assert_eq!(&groups[2][..], &[9]);
        assert!(parse_channel_values(&Bytes::new()).is_empty());
    }

    #[test]
    fn test_channel_value_and_mode() {
        let lookup = Lookup::new();
        let payload = parse_payload(
            "channel_value",
            &frame(rpc::GET_CHANNEL_VALUE, &[9, 0, 200]),
            &lookup,
        );
        match payload {
            EventPayload::ChannelValue { channel, raw } => {
                assert_eq!(channel, 9);
                assert_eq!(channel_value(&raw, ChannelMode::AnalogIn), 200);
            }
            other => panic!("unexpected payload {:?}", other),
        }

        let mode = parse_payload(
            "channel_mode",
            &frame(rpc::GET_CHANNEL_MODE, &[4, 0x06]),
            &lookup,
        );
        assert_eq!(
            mode,
            EventPayload::ChannelMode {
                channel: 4,
                mode: Some(ChannelMode::PwmOut)
            }
        );
    }

    #[test]
    fn test_error_payload() {
        let lookup = Lookup::new();
        let payload = parse_payload("error", &frame(rpc::ERROR, &[0, 2]), &lookup);
        match payload {
            EventPayload::Error(err) => assert_eq!(err.section_name, "undefined_post"),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_unknown_and_short_payloads_are_raw() {
        let lookup = Lookup::new();
        assert_eq!(
            parse_payload("ready", &frame(rpc::READY, &[]), &lookup),
            EventPayload::Raw
        );
        assert_eq!(
            parse_payload("power", &frame(rpc::POWER, &[1]), &lookup),
            EventPayload::Raw
        );
    }

    #[test]
    fn test_counter_value_signed_native() {
        let raw = (-5i32).to_ne_bytes();
        assert_eq!(channel_value(&raw, ChannelMode::CountInInt), -5);
        assert_eq!(
            channel_value(&raw, ChannelMode::DigitalIn),
            i64::from(u32::from_be_bytes(raw))
        );
    }
}
