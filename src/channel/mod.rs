//! Channels: modes, wiring validation and the per-channel handle.
//!
//! - [`ChannelMode`] - the 23 modes a channel can be put in, with wire codes
//! - [`validate_mode`] - which modes each channel number is wired for
//! - [`Channel`] - cached mode, flags, value access and change notifications

mod handle;
mod mode;
mod validation;

pub use handle::{ChangeHandlerId, Channel, ChannelChange};
pub use mode::ChannelMode;
pub use validation::{validate_mode, Bank, BankState, BoardContext, CHANNEL_COUNT};
