#![cfg_attr(docsrs, feature(doc_cfg))]
//! # c11204_lib
//!
//! This crate provides a library for controlling Hamamatsu C11204 high voltage
//! power supplies (the bias supply for MPPC / SiPM detectors) over their serial
//! command protocol.
//!
//! The protocol core ([`protocol`]) and the transaction engine ([`PowerSupply`])
//! work on any byte stream implementing [`transport::Transport`].
//!
//! ## Features
//!
//! - `default`: Enables `bin-dependencies`, which is intended for compiling the `c11204` command-line tool and pulls in `serialport` and `serde`.
//!
//! ### Transport Features
//! - `serialport`: Enables the serial port transport using the `serialport` crate.
//!
//! ### Utility Features
//! - `serde`: Enables `serde` serialization of the decoded data structures.
//! - `bin-dependencies`: Enables all features required by the `c11204` binary executable.
//!
//! ## Example
//!
//! ```no_run
//! # #[cfg(feature = "serialport")]
//! # fn main() -> c11204_lib::Result<()> {
//! use c11204_lib::serialport::SerialPowerSupply;
//!
//! let mut psu = SerialPowerSupply::open("/dev/ttyUSB0")?;
//! psu.set_voltage(55.0)?;
//! psu.set_high_voltage_on()?;
//! println!("{}", psu.get_monitor_info()?);
//! psu.close()
//! # }
//! # #[cfg(not(feature = "serialport"))]
//! # fn main() {}
//! ```

/// Contains error types for the library.
mod error;
/// Session object running one transaction per call.
mod power_supply;
/// Defines the communication protocol of the C11204.
pub mod protocol;
pub mod transport;

pub use error::{Error, Result};
pub use power_supply::PowerSupply;

/// Serial port transport and port discovery.
#[cfg_attr(docsrs, doc(cfg(feature = "serialport")))]
#[cfg(feature = "serialport")]
pub mod serialport;
