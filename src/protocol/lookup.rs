//! Lookup tables shared by the dispatcher and router.
//!
//! Built once when a session starts and handed around behind an `Arc`:
//! - event names ↔ rpc codes
//! - the board's two-level (zone, section) error taxonomy

use std::collections::HashMap;
use std::fmt;

use super::wire_format::{rpc, RpcName};

const UNKNOWN: &str = "unknown";

/// Reserved rpc codes and their readable event names.
const EVENT_NAMES: &[(RpcName, &str)] = &[
    (rpc::PING, "ping"),
    (rpc::POWER, "power"),
    (rpc::GET_ALL_CHANNEL_VALUES, "channel_values"),
    (rpc::GET_CHANNEL_VALUE, "channel_value"),
    (rpc::GET_ALL_CHANNEL_MODES, "channel_modes"),
    (rpc::GET_CHANNEL_MODE, "channel_mode"),
    (rpc::SET_CHANNEL_VALUE, "set_channel_value"),
    (rpc::SET_CHANNEL_MODE, "set_channel_mode"),
    (rpc::ERROR, "error"),
    (rpc::READY, "ready"),
    (rpc::FIRMWARE_REVISION, "firmware_revision"),
];

const ZONES: &[(u8, &str)] = &[
    (0, "comm_stack"),
    (85, "coprocessor"),
    (1, "get_parser"),
    (2, "post_parser"),
    (3, "config"),
    (6, "config"),
];

const SECTIONS: &[(u8, u8, &str)] = &[
    (0, 0x7F, "invalid_method"),
    (0, 0, "non_synchronous"),
    (0, 1, "undefined_get"),
    (0, 2, "undefined_post"),
    (0, 3, "undefined_critical"),
    (85, 1, "not_responding"),
    (85, 2, "not_responding"),
    (1, 0, "invalid_channel"),
    (2, 0, "value_not_set"),
    (2, 1, "mode_not_set"),
    (2, 2, "input_value_not_set"),
    (3, 0, "channel_not_config"),
    (3, 1, "pid_not_config"),
    (3, 3, "invalid_name_string"),
    (6, 0, "channel_not_config"),
    (6, 1, "pid_not_config"),
    (6, 3, "invalid_name_string"),
];

/// Messages keyed by (zone name, section name); section `unknown` is the
/// per-zone fallback.
const MESSAGES: &[(&str, &str, &str)] = &[
    ("comm_stack", UNKNOWN, "Unknown communications stack error"),
    ("comm_stack", "invalid_method", "Invalid method"),
    ("comm_stack", "non_synchronous", "Packet not sent synchronously"),
    ("comm_stack", "undefined_get", "Undefined GET RPC"),
    ("comm_stack", "undefined_post", "Undefined POST RPC"),
    ("comm_stack", "undefined_critical", "Undefined CRITICAL RPC"),
    ("coprocessor", UNKNOWN, "Unknown co-processor error"),
    ("coprocessor", "not_responding", "Co-processor not responding"),
    ("get_parser", UNKNOWN, "Unknown GET parser error"),
    (
        "get_parser",
        "invalid_channel",
        "Error with GET parser, most likely the channel mode does not have GET functionality",
    ),
    ("post_parser", UNKNOWN, "Unknown error in POST processor"),
    ("post_parser", "value_not_set", "Failed to set the value of the channel"),
    ("post_parser", "mode_not_set", "Failed to set the mode of the channel"),
    (
        "post_parser",
        "input_value_not_set",
        "Failed to set the value of the input channel",
    ),
    ("config", UNKNOWN, "Unknown CRITICAL parser error"),
    ("config", "channel_not_config", "Failed to configure channel"),
    ("config", "pid_not_config", "Failed to configure PID channel"),
    (
        "config",
        "invalid_name_string",
        "Invalid name string (either too short or too long)",
    ),
];

const UNKNOWN_MESSAGE: &str = "Unknown error";

/// Error reported by the board in an `_err` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// Numeric zone.
    pub zone: u8,
    /// Numeric section within the zone.
    pub section: u8,
    /// Symbolic zone, `unknown` if unmapped.
    pub zone_name: &'static str,
    /// Symbolic section, `unknown` if unmapped.
    pub section_name: &'static str,
    /// Human-readable message.
    pub message: &'static str,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Board error ({}, {}): {}",
            self.zone_name, self.section_name, self.message
        )
    }
}

impl std::error::Error for RemoteError {}

/// Immutable name and error tables.
#[derive(Debug)]
pub struct Lookup {
    names: HashMap<RpcName, &'static str>,
    rpcs: HashMap<&'static str, RpcName>,
    zones: HashMap<u8, &'static str>,
    sections: HashMap<(u8, u8), &'static str>,
    messages: HashMap<(&'static str, &'static str), &'static str>,
}

impl Lookup {
    pub fn new() -> Self {
        Self {
            names: EVENT_NAMES.iter().copied().collect(),
            rpcs: EVENT_NAMES.iter().map(|(code, name)| (*name, *code)).collect(),
            zones: ZONES.iter().copied().collect(),
            sections: SECTIONS.iter().map(|(z, s, n)| ((*z, *s), *n)).collect(),
            messages: MESSAGES.iter().map(|(z, s, m)| ((*z, *s), *m)).collect(),
        }
    }

    /// Readable event name for an rpc code, falling back to the code itself.
    pub fn event_name(&self, code: &[u8]) -> String {
        RpcName::from_slice(code)
            .and_then(|code| self.names.get(&code))
            .map(|name| name.to_string())
            .unwrap_or_else(|| String::from_utf8_lossy(code).into_owned())
    }

    /// Rpc code for an event name, falling back to the name as a raw 4-byte code.
    pub fn rpc_for(&self, name: &str) -> Option<RpcName> {
        self.rpcs
            .get(name)
            .copied()
            .or_else(|| RpcName::parse(name).ok())
    }

    /// Resolve a (zone, section) pair to symbolic names and a message.
    pub fn remote_error(&self, zone: u8, section: u8) -> RemoteError {
        let zone_name = self.zones.get(&zone).copied().unwrap_or(UNKNOWN);
        let section_name = self
            .sections
            .get(&(zone, section))
            .copied()
            .unwrap_or(UNKNOWN);
        let message = self
            .messages
            .get(&(zone_name, section_name))
            .or_else(|| self.messages.get(&(zone_name, UNKNOWN)))
            .copied()
            .unwrap_or(UNKNOWN_MESSAGE);

        RemoteError {
            zone,
            section,
            zone_name,
            section_name,
            message,
        }
    }
}

impl Default for Lookup {
    fn default() -> Self {
        Self::new()
    }
}
