//! Which modes each channel is wired for.
//!
//! The board does not report its own capabilities, so the wiring is fixed
//! here per channel number. Servo outputs additionally depend on the power
//! bank feeding the channel when brownout detection is enabled.

use serde::{Deserialize, Serialize};

use super::mode::ChannelMode;
use crate::error::{DyioError, Result};

/// Number of channels on a board.
pub const CHANNEL_COUNT: usize = 24;

/// Power bank feeding a group of channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bank {
    /// Channels 0-11.
    A,
    /// Channels 12-23.
    B,
}

impl Bank {
    pub fn for_channel(channel: u8) -> Self {
        if channel < 12 {
            Bank::A
        } else {
            Bank::B
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Bank::A => 0,
            Bank::B => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Bank::A),
            1 => Some(Bank::B),
            _ => None,
        }
    }
}

/// Power state of one bank, as reported by the power-on reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankState {
    Regulated,
    Powered,
    Unpowered,
}

/// Board-level facts that mode validation depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardContext {
    pub brownout_detection: bool,
    /// Bank states, `None` before the first power-on reply.
    pub banks: Option<[BankState; 2]>,
}

impl BoardContext {
    pub fn bank_state(&self, bank: Bank) -> Option<BankState> {
        self.banks.map(|banks| banks[bank.index()])
    }
}

impl Default for BoardContext {
    fn default() -> Self {
        Self {
            brownout_detection: true,
            banks: None,
        }
    }
}

/// Check that `mode` is wired to `channel`.
///
/// Returns [`DyioError::UnsupportedMode`] otherwise.
pub fn validate_mode(mode: ChannelMode, channel: u8, context: &BoardContext) -> Result<()> {
    if is_mode_appropriate(mode, channel, context) {
        Ok(())
    } else {
        Err(DyioError::UnsupportedMode { mode, channel })
    }
}

fn is_mode_appropriate(mode: ChannelMode, channel: u8, context: &BoardContext) -> bool {
    use ChannelMode::*;

    match mode {
        DigitalIn | DigitalOut => true,
        ServoOut => {
            !context.brownout_detection
                || context.bank_state(Bank::for_channel(channel)) != Some(BankState::Regulated)
        }
        SpiClock => channel == 0,
        SpiMiso => channel == 1,
        SpiMosi => channel == 2,
        CountInHome | CountOutHome => channel <= 3,
        CountInDir | CountOutDir => matches!(channel, 16 | 18 | 20 | 22),
        CountInInt | CountOutInt => matches!(channel, 17 | 19 | 21 | 23),
        AnalogIn => (8..=15).contains(&channel),
        PwmOut | DcMotorVel => (4..=7).contains(&channel),
        // The board documents no channel range for motor direction.
        DcMotorDir => false,
        UsartTx => channel == 16,
        UsartRx => channel == 17,
        PpmIn => channel == 23,
        NoChange | Off | AnalogOut | SpiSelect => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regulated_a(brownout_detection: bool) -> BoardContext {
        BoardContext {
            brownout_detection,
            banks: Some([BankState::Regulated, BankState::Powered]),
        }
    }

    fn ok(mode: ChannelMode, channel: u8) -> bool {
        validate_mode(mode, channel, &regulated_a(true)).is_ok()
    }

    #[test]
    fn test_servo_depends_on_brownout_and_bank() {
        assert!(validate_mode(ChannelMode::ServoOut, 0, &regulated_a(true)).is_err());
        assert!(validate_mode(ChannelMode::ServoOut, 0, &regulated_a(false)).is_ok());
        assert!(validate_mode(ChannelMode::ServoOut, 12, &regulated_a(true)).is_ok());
        assert!(validate_mode(ChannelMode::ServoOut, 3, &BoardContext::default()).is_ok());
    }

    #[test]
    fn test_fixed_assignments() {
        assert!(ok(ChannelMode::UsartTx, 16));
        assert!(!ok(ChannelMode::UsartRx, 16));
        assert!(ok(ChannelMode::UsartRx, 17));
        assert!(ok(ChannelMode::PpmIn, 23));
        assert!(!ok(ChannelMode::PpmIn, 22));
        assert!(ok(ChannelMode::PwmOut, 5));
        assert!(!ok(ChannelMode::AnalogIn, 5));
        assert!(ok(ChannelMode::AnalogIn, 8));
        assert!(ok(ChannelMode::SpiClock, 0));
        assert!(!ok(ChannelMode::SpiClock, 1));
        assert!(ok(ChannelMode::SpiMosi, 2));
    }

    #[test]
    fn test_counter_groups() {
        for channel in 0..=3 {
            assert!(ok(ChannelMode::CountOutHome, channel));
        }
        assert!(!ok(ChannelMode::CountInHome, 4));
        assert!(ok(ChannelMode::CountInDir, 20));
        assert!(!ok(ChannelMode::CountInDir, 21));
        assert!(ok(ChannelMode::CountOutInt, 21));
    }

    #[test]
    fn test_digital_any_channel() {
        for channel in 0..CHANNEL_COUNT as u8 {
            assert!(ok(ChannelMode::DigitalIn, channel));
            assert!(ok(ChannelMode::DigitalOut, channel));
        }
    }

    #[test]
    fn test_unreachable_modes() {
        for channel in 0..CHANNEL_COUNT as u8 {
            assert!(!ok(ChannelMode::DcMotorDir, channel));
            assert!(!ok(ChannelMode::Off, channel));
            assert!(!ok(ChannelMode::SpiSelect, channel));
        }
    }

    #[test]
    fn test_error_message_names_mode_and_channel() {
        let err = validate_mode(ChannelMode::AnalogIn, 5, &BoardContext::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Mode analog_in is not an appropriate mode for channel 5"
        );
    }

    #[test]
    fn test_bank_for_channel() {
        assert_eq!(Bank::for_channel(11), Bank::A);
        assert_eq!(Bank::for_channel(12), Bank::B);
        assert_eq!(Bank::from_index(1), Some(Bank::B));
        assert_eq!(Bank::from_index(2), None);
    }
}
