//! # dyio-client
//!
//! Host-side driver for DyIO boards speaking the Bowler binary protocol.
//!
//! The crate takes any async byte stream to the board (serial port, TCP
//! bridge, in-memory pipe) and provides:
//!
//! - **Protocol**: byte-exact frame encoding/decoding and stream framing
//! - **Dispatcher**: commands by name or through typed wrappers, each
//!   returning a [`PendingOperation`] whose [`Promise`] settles with the
//!   board's reply
//! - **Router**: demultiplexing of replies and pushed events to one-shot
//!   and persistent handlers, each run as its own task
//! - **Channels**: per-channel mode state with wiring validation
//! - **Session**: power-on, heartbeat and resync lifecycle
//!
//! ## Example
//!
//! ```ignore
//! use dyio_client::{ChannelMode, Session};
//!
//! #[tokio::main]
//! async fn main() -> dyio_client::Result<()> {
//!     let port = open_serial_port("/dev/ttyACM0")?;
//!     let session = Session::builder().connect(port).await?;
//!
//!     println!("{:?} at {:?} V", session.info(), session.battery_voltage());
//!
//!     let mut pot = session.channel(8, ChannelMode::AnalogIn, false).await?;
//!     pot.set_async(true).await?;
//!     pot.on_every_change(|change| async move {
//!         println!("channel {} -> {}", change.channel, change.value);
//!         Ok(())
//!     })?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod promise;
pub mod protocol;
pub mod router;
pub mod session;
pub mod writer;

pub use channel::{Bank, BankState, Channel, ChannelChange, ChannelMode};
pub use config::SessionConfig;
pub use dispatcher::{Dispatcher, PendingOperation};
pub use error::{DyioError, Result};
pub use promise::{Promise, PromiseState};
pub use protocol::{BoardId, Frame, MethodType, RemoteError};
pub use router::{Event, EventPayload, Router};
pub use session::{Session, SessionBuilder, SessionEvent};
