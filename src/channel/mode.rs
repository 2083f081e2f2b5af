//! Channel modes and their one-byte wire codes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DyioError, Result};

/// Function a channel is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMode {
    NoChange,
    Off,
    DigitalIn,
    DigitalOut,
    AnalogIn,
    AnalogOut,
    PwmOut,
    ServoOut,
    UsartTx,
    UsartRx,
    SpiMosi,
    SpiMiso,
    SpiClock,
    SpiSelect,
    CountInInt,
    CountInDir,
    CountInHome,
    CountOutInt,
    CountOutDir,
    CountOutHome,
    DcMotorVel,
    DcMotorDir,
    PpmIn,
}

const MODES: &[(ChannelMode, u8, &str)] = &[
    (ChannelMode::NoChange, 0x00, "no_change"),
    (ChannelMode::Off, 0x01, "off"),
    (ChannelMode::DigitalIn, 0x02, "digital_in"),
    (ChannelMode::DigitalOut, 0x03, "digital_out"),
    (ChannelMode::AnalogIn, 0x04, "analog_in"),
    (ChannelMode::AnalogOut, 0x05, "analog_out"),
    (ChannelMode::PwmOut, 0x06, "pwm_out"),
    (ChannelMode::ServoOut, 0x07, "servo_out"),
    (ChannelMode::UsartTx, 0x08, "usart_tx"),
    (ChannelMode::UsartRx, 0x09, "usart_rx"),
    (ChannelMode::SpiMosi, 0x0A, "spi_mosi"),
    (ChannelMode::SpiMiso, 0x0B, "spi_miso"),
    (ChannelMode::SpiClock, 0x0C, "spi_clock"),
    (ChannelMode::SpiSelect, 0x0D, "spi_select"),
    (ChannelMode::CountInInt, 0x0E, "count_in_int"),
    (ChannelMode::CountInDir, 0x0F, "count_in_dir"),
    (ChannelMode::CountInHome, 0x10, "count_in_home"),
    (ChannelMode::CountOutInt, 0x11, "count_out_int"),
    (ChannelMode::CountOutDir, 0x12, "count_out_dir"),
    (ChannelMode::CountOutHome, 0x13, "count_out_home"),
    (ChannelMode::DcMotorVel, 0x14, "dc_motor_vel"),
    (ChannelMode::DcMotorDir, 0x15, "dc_motor_dir"),
    (ChannelMode::PpmIn, 0x16, "ppm_in"),
];

impl ChannelMode {
    /// All modes, in wire-code order.
    pub fn all() -> impl Iterator<Item = ChannelMode> {
        MODES.iter().map(|(mode, _, _)| *mode)
    }

    /// Wire code.
    pub fn code(self) -> u8 {
        self.entry().1
    }

    /// Mode for a wire code; `None` for codes the board should not report.
    pub fn from_code(code: u8) -> Option<Self> {
        MODES
            .iter()
            .find(|(_, c, _)| *c == code)
            .map(|(mode, _, _)| *mode)
    }

    pub fn name(self) -> &'static str {
        self.entry().2
    }

    /// Counter modes. Value writes carry a 4-byte value and 4-byte duration.
    pub fn is_counter(self) -> bool {
        matches!(
            self,
            ChannelMode::CountInInt
                | ChannelMode::CountInDir
                | ChannelMode::CountInHome
                | ChannelMode::CountOutInt
                | ChannelMode::CountOutDir
                | ChannelMode::CountOutHome
        )
    }

    /// Modes whose values are read back as signed native-endian integers.
    pub fn reads_signed(self) -> bool {
        matches!(
            self,
            ChannelMode::CountInInt
                | ChannelMode::CountInDir
                | ChannelMode::CountOutInt
                | ChannelMode::CountOutDir
        )
    }

    /// Modes that can push value changes asynchronously.
    pub fn supports_async(self) -> bool {
        matches!(
            self,
            ChannelMode::AnalogIn
                | ChannelMode::CountInInt
                | ChannelMode::CountOutInt
                | ChannelMode::DigitalIn
        )
    }

    fn entry(self) -> &'static (ChannelMode, u8, &'static str) {
        // MODES lists every variant, in declaration order.
        &MODES[self as usize]
    }
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChannelMode {
    type Err = DyioError;

    fn from_str(s: &str) -> Result<Self> {
        MODES
            .iter()
            .find(|(_, _, name)| *name == s)
            .map(|(mode, _, _)| *mode)
            .ok_or_else(|| DyioError::Protocol(format!("Unknown channel mode: {}", s)))
    }
}
