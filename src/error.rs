use crate::protocol::{Command, DeviceError};

/// Errors returned by the C11204 protocol library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested voltage is below the configured lower limit. Nothing was sent.
    #[error("Voltage {requested} V is too low (lower limit {limit} V)")]
    VoltageTooLow { requested: f64, limit: f64 },
    /// The requested voltage is above the configured upper limit. Nothing was sent.
    #[error("Voltage {requested} V is too high (upper limit {limit} V)")]
    VoltageTooHigh { requested: f64, limit: f64 },
    /// The requested voltage is NaN or infinite. Nothing was sent.
    #[error("Voltage {0} V is not a finite number")]
    InvalidVoltage(f64),
    /// Voltage limits outside of what the hardware supports.
    #[error("Value out of range")]
    RangeError,
    /// A command that only makes sense with a parameter was built without one,
    /// or with one that is not a register value.
    #[error("{0} requires a register value")]
    PayloadRequired(Command),
    /// The power supply answered with `hxx` and an error code.
    #[error("Device error: {0}")]
    Device(DeviceError),
    /// The reply matched neither the expected echo nor the error pattern.
    #[error("Malformed reply to {command} - expected {expected} bytes, received {received:02X?}")]
    MalformedReply {
        command: Command,
        expected: usize,
        received: Vec<u8>,
    },
    #[error("Frame encoding error: {0}")]
    Encoding(#[from] hex::FromHexError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "serialport")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
    #[cfg(feature = "serialport")]
    #[error("No serial port matching '{0}' was found")]
    PortNotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
