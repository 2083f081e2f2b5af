//! Codec module - argument and channel value encoding.
//!
//! - [`Arg`] - one command argument, converted to a byte group on the wire
//! - [`value`] - width-aware integer decoding for channel values
//!
//! # Example
//!
//! ```
//! use dyio_client::codec::Arg;
//!
//! assert_eq!(Arg::from(7u8).to_bytes(), vec![7]);
//! assert_eq!(Arg::int(1000, 2).to_bytes(), vec![0x03, 0xE8]);
//! assert_eq!(Arg::from("abc").to_bytes(), b"abc".to_vec());
//! ```

mod arg;
pub mod value;

pub use arg::Arg;
