//! Session configuration loaded from JSON.
//!
//! Every field is optional:
//!
//! ```json
//! {
//!   "board_id": "74:f7:26:00:00:1a",
//!   "heartbeat_period_ms": 1000,
//!   "brownout_detection": false,
//!   "channel_capacity": 256,
//!   "command_timeout_ms": 2000
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::session::{SessionBuilder, DEFAULT_HEARTBEAT_PERIOD};
use crate::writer::DEFAULT_CHANNEL_CAPACITY;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Colon-hex board id, or `broadcast`.
    pub board_id: String,
    pub heartbeat_period_ms: u64,
    pub brownout_detection: bool,
    /// Writer queue capacity.
    pub channel_capacity: usize,
    /// Bound on every command wait; none by default.
    pub command_timeout_ms: Option<u64>,
}

impl SessionConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn into_builder(self) -> Result<SessionBuilder> {
        SessionBuilder::from_config(&self)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            board_id: "00:00:00:00:00:00".to_string(),
            heartbeat_period_ms: DEFAULT_HEARTBEAT_PERIOD.as_millis() as u64,
            brownout_detection: true,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            command_timeout_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DyioError;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = SessionConfig::from_json_str("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.heartbeat_period_ms, 3000);
        assert!(config.brownout_detection);
        assert_eq!(config.command_timeout_ms, None);
    }

    #[test]
    fn test_partial_override() {
        let config =
            SessionConfig::from_json_str(r#"{"brownout_detection": false, "heartbeat_period_ms": 500}"#)
                .unwrap();
        assert!(!config.brownout_detection);
        assert_eq!(config.heartbeat_period_ms, 500);
        assert_eq!(config.channel_capacity, 1024);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            SessionConfig::from_json_str("{"),
            Err(DyioError::Json(_))
        ));
    }

    #[test]
    fn test_into_builder() {
        assert!(SessionConfig::default().into_builder().is_ok());
    }
}
