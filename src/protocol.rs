use crate::{Error, Result};
use std::fmt;
use std::ops::Range;

#[cfg(feature = "serde")]
use serde::Serialize;

pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;
pub const CR: u8 = 0x0D;

/// Volts per unit of the voltage register.
pub const VOLTAGE_CONVERSION: f64 = 1.812e-3;
/// Milliamps per unit of the current register.
pub const CURRENT_CONVERSION: f64 = 4.980e-3;

pub const DEFAULT_LOWER_VOLTAGE_LIMIT: f64 = 40.0;
pub const DEFAULT_UPPER_VOLTAGE_LIMIT: f64 = 60.0;
/// The C11204 cannot output more than this, whatever the configured limit.
pub const HARDWARE_VOLTAGE_LIMIT: f64 = 90.0;

const SHORT_REPLY_LENGTH: usize = 8;
const MONITOR_REPLY_LENGTH: usize = 28;
// ETX + two checksum characters + CR
const TRAILER_LENGTH: usize = 4;

const ECHO: Range<usize> = 1..4;
const ERROR_ECHO: &[u8] = b"hxx";
const FIRST_FIELD: Range<usize> = 4..8;
const MONITOR_VOLTAGE_FIELD: Range<usize> = 12..16;
const MONITOR_CURRENT_FIELD: Range<usize> = 16..20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Command {
    /// `HPO`: status, output voltage and output current in one reply
    Monitor,
    /// `HBV`: set the output voltage
    SetVoltage,
    /// `HGV`: output voltage
    GetVoltage,
    /// `HGC`: output current
    GetCurrent,
    /// `HGS`: status word
    GetStatus,
    /// `HON`
    HighVoltageOn,
    /// `HOF`
    HighVoltageOff,
    /// `HRE`
    Reset,
}

impl Command {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Command::Monitor => "HPO",
            Command::SetVoltage => "HBV",
            Command::GetVoltage => "HGV",
            Command::GetCurrent => "HGC",
            Command::GetStatus => "HGS",
            Command::HighVoltageOn => "HON",
            Command::HighVoltageOff => "HOF",
            Command::Reset => "HRE",
        }
    }

    /// The lowercase mnemonic the power supply echoes back on success.
    pub fn echo(&self) -> [u8; 3] {
        let mnemonic = self.mnemonic().as_bytes();
        [
            mnemonic[0].to_ascii_lowercase(),
            mnemonic[1].to_ascii_lowercase(),
            mnemonic[2].to_ascii_lowercase(),
        ]
    }

    pub fn reply_size(&self) -> usize {
        match self {
            Command::Monitor => MONITOR_REPLY_LENGTH,
            _ => SHORT_REPLY_LENGTH,
        }
    }

    /// Whether a successful reply always ends with `ETX cs cs CR` within
    /// [`Self::reply_size`] bytes.
    pub fn has_trailer(&self) -> bool {
        matches!(self, Command::Monitor)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

fn byte_sum(field: &[u8]) -> u32 {
    field.iter().map(|b| u32::from(*b)).sum()
}

/// Renders a frame field as uppercase hex and returns it together with the
/// plain (not yet reduced) sum of its bytes.
pub fn encode(field: &[u8]) -> (String, u32) {
    (hex::encode_upper(field), byte_sum(field))
}

fn checksum_from_sums(command_sum: u32, payload_sum: u32) -> [u8; 2] {
    let sum = u32::from(STX) + command_sum + u32::from(ETX) + payload_sum;
    let checksum = hex::encode_upper([(sum % 256) as u8]);
    let checksum = checksum.as_bytes();
    [checksum[0], checksum[1]]
}

/// `(STX + sum(command) + ETX + sum(payload)) mod 256` as two uppercase hex characters.
pub fn checksum(command: &[u8], payload: &[u8]) -> [u8; 2] {
    checksum_from_sums(byte_sum(command), byte_sum(payload))
}

/// Halves round to even, e.g. register 2.5 becomes 2.
pub fn volts_to_register(volts: f64) -> u16 {
    (volts / VOLTAGE_CONVERSION).round_ties_even() as u16
}

pub fn register_to_volts(register: u16) -> f64 {
    f64::from(register) * VOLTAGE_CONVERSION
}

pub fn register_to_milliamps(register: u16) -> f64 {
    f64::from(register) * CURRENT_CONVERSION
}

/// Allowed range for [`SetVoltage`].
///
/// The upper limit should match the MPPC connected to the supply; it can be
/// raised up to [`HARDWARE_VOLTAGE_LIMIT`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct VoltageLimits {
    lower: f64,
    upper: f64,
}

impl Default for VoltageLimits {
    fn default() -> Self {
        Self {
            lower: DEFAULT_LOWER_VOLTAGE_LIMIT,
            upper: DEFAULT_UPPER_VOLTAGE_LIMIT,
        }
    }
}

impl VoltageLimits {
    /// Both limits have to lie within 40..=90 V and `lower <= upper`.
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        let hardware = DEFAULT_LOWER_VOLTAGE_LIMIT..=HARDWARE_VOLTAGE_LIMIT;
        if !hardware.contains(&lower) || !hardware.contains(&upper) || lower > upper {
            log::warn!("Invalid voltage limits - lower={lower} upper={upper}");
            return Err(Error::RangeError);
        }
        Ok(Self { lower, upper })
    }

    pub fn with_upper(upper: f64) -> Result<Self> {
        Self::new(DEFAULT_LOWER_VOLTAGE_LIMIT, upper)
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn check(&self, volts: f64) -> Result<()> {
        if !volts.is_finite() {
            return Err(Error::InvalidVoltage(volts));
        }
        if volts > self.upper {
            return Err(Error::VoltageTooHigh {
                requested: volts,
                limit: self.upper,
            });
        }
        if volts < self.lower {
            return Err(Error::VoltageTooLow {
                requested: volts,
                limit: self.lower,
            });
        }
        Ok(())
    }

    /// Same policy as [`Self::check`] for a register value that is about to
    /// be sent with `HBV`.
    pub fn check_register(&self, register: u16) -> Result<()> {
        let requested = register_to_volts(register);
        if register > volts_to_register(self.upper) {
            return Err(Error::VoltageTooHigh {
                requested,
                limit: self.upper,
            });
        }
        if register < volts_to_register(self.lower) {
            return Err(Error::VoltageTooLow {
                requested,
                limit: self.lower,
            });
        }
        Ok(())
    }
}

/// A command together with its optional hex payload, ready to be framed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    command: Command,
    payload: Option<String>,
}

impl Request {
    fn without_payload(command: Command) -> Self {
        Self {
            command,
            payload: None,
        }
    }

    /// A request for any command that takes no parameter.
    ///
    /// `HBV` needs a voltage and has to be built with [`Self::set_voltage`].
    pub fn query(command: Command) -> Result<Self> {
        if command == Command::SetVoltage {
            return Err(Error::PayloadRequired(command));
        }
        Ok(Self::without_payload(command))
    }

    /// Checks `volts` against `limits` and builds an `HBV` request carrying the
    /// register value as uppercase hex.
    pub fn set_voltage(volts: f64, limits: &VoltageLimits) -> Result<Self> {
        limits.check(volts)?;
        let register = volts_to_register(volts);
        Ok(Self {
            command: Command::SetVoltage,
            payload: Some(format!("{register:X}")),
        })
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    /// The payload read back as a register value.
    pub fn register(&self) -> Option<u16> {
        self.payload
            .as_deref()
            .and_then(|payload| u16::from_str_radix(payload, 16).ok())
    }

    fn payload_bytes(&self) -> &[u8] {
        self.payload.as_deref().map(str::as_bytes).unwrap_or_default()
    }

    pub fn checksum(&self) -> [u8; 2] {
        checksum(self.command.mnemonic().as_bytes(), self.payload_bytes())
    }

    /// The frame with every field rendered as hex digit pairs.
    pub fn to_hex(&self) -> String {
        let (command_hex, command_sum) = encode(self.command.mnemonic().as_bytes());
        let (payload_hex, payload_sum) = encode(self.payload_bytes());
        let (checksum_hex, _) = encode(&checksum_from_sums(command_sum, payload_sum));
        format!("{STX:02X}{command_hex}{payload_hex}{ETX:02X}{checksum_hex}{CR:02X}")
    }

    /// The raw bytes to transmit: [`Self::to_hex`] decoded pair by pair.
    pub fn to_frame(&self) -> Result<Vec<u8>> {
        Ok(hex::decode(self.to_hex())?)
    }
}

/// Faults reported by the power supply with an `hxx` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum DeviceError {
    Uart,
    Timeout,
    Syntax,
    Checksum,
    UndefinedCommand,
    InvalidParameter,
    ParameterSize,
    /// A code outside the documented set, kept verbatim.
    Unknown(String),
}

impl DeviceError {
    pub fn from_code(code: &[u8]) -> Self {
        match code {
            b"0001" => DeviceError::Uart,
            b"0002" => DeviceError::Timeout,
            b"0003" => DeviceError::Syntax,
            b"0004" => DeviceError::Checksum,
            b"0005" => DeviceError::UndefinedCommand,
            b"0006" => DeviceError::InvalidParameter,
            b"0007" => DeviceError::ParameterSize,
            other => DeviceError::Unknown(String::from_utf8_lossy(other).into_owned()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            DeviceError::Uart => "0001",
            DeviceError::Timeout => "0002",
            DeviceError::Syntax => "0003",
            DeviceError::Checksum => "0004",
            DeviceError::UndefinedCommand => "0005",
            DeviceError::InvalidParameter => "0006",
            DeviceError::ParameterSize => "0007",
            DeviceError::Unknown(code) => code,
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeviceError::Uart => write!(
                f,
                "UART communication error: parity error, overrun error or framing error"
            ),
            DeviceError::Timeout => write!(
                f,
                "Timeout error: CR was not received within 1000ms of STX, the packet was discarded"
            ),
            DeviceError::Syntax => write!(
                f,
                "Syntax error: the command does not start with STX or exceeds 256 bytes"
            ),
            DeviceError::Checksum => write!(f, "Checksum error: the checksum does not match"),
            DeviceError::UndefinedCommand => write!(f, "Command error: undefined command"),
            DeviceError::InvalidParameter => write!(
                f,
                "Parameter error: the parameter contains characters other than 0-F"
            ),
            DeviceError::ParameterSize => write!(
                f,
                "Parameter size error: the parameter length is outside the specified length"
            ),
            DeviceError::Unknown(code) => write!(f, "Unknown device error code '{code}'"),
        }
    }
}

/// A reply sorted by its echo field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Success(Vec<u8>),
    DeviceError(DeviceError),
    Malformed(Vec<u8>),
}

impl Reply {
    pub fn classify(command: Command, rx_buffer: &[u8]) -> Self {
        match rx_buffer.get(ECHO) {
            Some(echo) if echo == ERROR_ECHO => match rx_buffer.get(FIRST_FIELD) {
                Some(code) => {
                    let err = DeviceError::from_code(code);
                    log::warn!("{command} rejected by device: {err}");
                    Reply::DeviceError(err)
                }
                None => {
                    log::warn!("Truncated error reply to {command}: {rx_buffer:02X?}");
                    Reply::Malformed(rx_buffer.to_vec())
                }
            },
            Some(echo) if echo == command.echo().as_slice() => {
                if rx_buffer.len() < command.reply_size() {
                    log::warn!(
                        "Invalid buffer size - required={} received={}",
                        command.reply_size(),
                        rx_buffer.len()
                    );
                    Reply::Malformed(rx_buffer.to_vec())
                } else if !trailer_matches(command, rx_buffer) {
                    Reply::Malformed(rx_buffer.to_vec())
                } else {
                    Reply::Success(rx_buffer.to_vec())
                }
            }
            _ => {
                log::warn!("Unexpected reply to {command}: {rx_buffer:02X?}");
                Reply::Malformed(rx_buffer.to_vec())
            }
        }
    }

    /// Success bytes, or the device error / malformed reply as an [`Error`].
    pub fn into_success(self, command: Command) -> Result<Vec<u8>> {
        match self {
            Reply::Success(rx_buffer) => Ok(rx_buffer),
            Reply::DeviceError(err) => Err(Error::Device(err)),
            Reply::Malformed(received) => Err(Error::MalformedReply {
                command,
                expected: command.reply_size(),
                received,
            }),
        }
    }
}

// `ETX cs cs CR` is verified with the same checksum as outgoing frames. It is
// mandatory for commands with `has_trailer`, otherwise only checked when an ETX
// sits where the trailer would start.
fn trailer_matches(command: Command, rx_buffer: &[u8]) -> bool {
    let len = rx_buffer.len();
    let has_etx = len >= TRAILER_LENGTH + ECHO.end && rx_buffer[len - TRAILER_LENGTH] == ETX;
    if !has_etx {
        if command.has_trailer() {
            log::warn!("Missing ETX in reply to {command}: {rx_buffer:02X?}");
            return false;
        }
        return true;
    }
    let body = &rx_buffer[1..len - TRAILER_LENGTH];
    let calculated = checksum(body, &[]);
    let received = &rx_buffer[len - 3..len - 1];
    if calculated.as_slice() != received || rx_buffer[len - 1] != CR {
        log::warn!(
            "Invalid checksum - calculated={:02X?} received={:02X?} buffer={:02X?}",
            calculated,
            received,
            rx_buffer
        );
        return false;
    }
    true
}

fn validate(command: Command, rx_buffer: &[u8]) -> Result<Vec<u8>> {
    Reply::classify(command, rx_buffer).into_success(command)
}

fn read_register(command: Command, rx_buffer: &[u8], field: Range<usize>) -> Result<u16> {
    rx_buffer
        .get(field.clone())
        .and_then(|digits| std::str::from_utf8(digits).ok())
        .and_then(|digits| u16::from_str_radix(digits, 16).ok())
        .ok_or_else(|| {
            log::warn!("Invalid register field {field:?} in reply to {command}: {rx_buffer:02X?}");
            Error::MalformedReply {
                command,
                expected: command.reply_size(),
                received: rx_buffer.to_vec(),
            }
        })
}

macro_rules! read_bit {
    ($word:expr,$position:expr) => {
        ($word >> $position) & 1 != 0
    };
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct StatusFlags {
    pub high_voltage_on: bool,
    pub over_current_protection: bool,
    pub current_out_of_spec: bool,
    pub temperature_sensor_connected: bool,
    pub temperature_out_of_spec: bool,
    pub temperature_correction: bool,
}

impl StatusFlags {
    pub fn from_word(word: u16) -> Self {
        Self {
            high_voltage_on: read_bit!(word, 0),
            over_current_protection: read_bit!(word, 1),
            current_out_of_spec: read_bit!(word, 2),
            temperature_sensor_connected: read_bit!(word, 3),
            temperature_out_of_spec: read_bit!(word, 4),
            temperature_correction: read_bit!(word, 5),
        }
    }

    pub fn current_within_spec(&self) -> bool {
        !self.current_out_of_spec
    }

    pub fn temperature_within_spec(&self) -> bool {
        !self.temperature_out_of_spec
    }

    pub fn request() -> Request {
        Request::without_payload(Command::GetStatus)
    }

    pub fn reply_size() -> usize {
        Command::GetStatus.reply_size()
    }

    pub fn decode(rx_buffer: &[u8]) -> Result<Self> {
        let rx_buffer = validate(Command::GetStatus, rx_buffer)?;
        let word = read_register(Command::GetStatus, &rx_buffer, FIRST_FIELD)?;
        Ok(Self::from_word(word))
    }
}

impl fmt::Display for StatusFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fn label(flag: bool, set: &'static str, clear: &'static str) -> &'static str {
            if flag {
                set
            } else {
                clear
            }
        }
        writeln!(
            f,
            "High Voltage Output      :   {}",
            label(self.high_voltage_on, "ON", "OFF")
        )?;
        writeln!(
            f,
            "Over-current protection  :   {}",
            label(self.over_current_protection, "Yes", "No")
        )?;
        writeln!(
            f,
            "Current Value            :   {}",
            label(
                self.current_out_of_spec,
                "Outside Specifications",
                "Within Specifications"
            )
        )?;
        writeln!(
            f,
            "MPPC temperature sensor  :   {}",
            label(self.temperature_sensor_connected, "Connected", "Disconnected")
        )?;
        writeln!(
            f,
            "MPPC temperature         :   {}",
            label(
                self.temperature_out_of_spec,
                "Outside Specifications",
                "Within Specifications"
            )
        )?;
        write!(
            f,
            "Temperature Correction   :   {}",
            label(self.temperature_correction, "Effective", "Invalid")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct MonitorInfo {
    pub status: StatusFlags,
    /// Output voltage in volts
    pub voltage: f64,
    /// Output current in milliamps
    pub current: f64,
}

impl MonitorInfo {
    pub fn request() -> Request {
        Request::without_payload(Command::Monitor)
    }

    pub fn reply_size() -> usize {
        Command::Monitor.reply_size()
    }

    pub fn decode(rx_buffer: &[u8]) -> Result<Self> {
        let command = Command::Monitor;
        let rx_buffer = validate(command, rx_buffer)?;
        Ok(Self {
            status: StatusFlags::from_word(read_register(command, &rx_buffer, FIRST_FIELD)?),
            voltage: register_to_volts(read_register(
                command,
                &rx_buffer,
                MONITOR_VOLTAGE_FIELD,
            )?),
            current: register_to_milliamps(read_register(
                command,
                &rx_buffer,
                MONITOR_CURRENT_FIELD,
            )?),
        })
    }
}

impl fmt::Display for MonitorInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.status)?;
        writeln!(f, "High Voltage Output      :   {} V", self.voltage)?;
        write!(f, "Output current           :   {} mA", self.current)
    }
}

pub struct GetVoltage;

impl GetVoltage {
    pub fn request() -> Request {
        Request::without_payload(Command::GetVoltage)
    }

    pub fn reply_size() -> usize {
        Command::GetVoltage.reply_size()
    }

    /// Output voltage in volts.
    pub fn decode(rx_buffer: &[u8]) -> Result<f64> {
        let rx_buffer = validate(Command::GetVoltage, rx_buffer)?;
        Ok(register_to_volts(read_register(
            Command::GetVoltage,
            &rx_buffer,
            FIRST_FIELD,
        )?))
    }
}

pub struct GetCurrent;

impl GetCurrent {
    pub fn request() -> Request {
        Request::without_payload(Command::GetCurrent)
    }

    pub fn reply_size() -> usize {
        Command::GetCurrent.reply_size()
    }

    /// Output current in milliamps.
    pub fn decode(rx_buffer: &[u8]) -> Result<f64> {
        let rx_buffer = validate(Command::GetCurrent, rx_buffer)?;
        Ok(register_to_milliamps(read_register(
            Command::GetCurrent,
            &rx_buffer,
            FIRST_FIELD,
        )?))
    }
}

pub struct SetVoltage;

impl SetVoltage {
    pub fn request(volts: f64, limits: &VoltageLimits) -> Result<Request> {
        Request::set_voltage(volts, limits)
    }

    pub fn reply_size() -> usize {
        Command::SetVoltage.reply_size()
    }

    pub fn decode(rx_buffer: &[u8]) -> Result<()> {
        validate(Command::SetVoltage, rx_buffer).map(|_| ())
    }
}

pub struct HighVoltageOn;

impl HighVoltageOn {
    pub fn request() -> Request {
        Request::without_payload(Command::HighVoltageOn)
    }

    pub fn reply_size() -> usize {
        Command::HighVoltageOn.reply_size()
    }

    pub fn decode(rx_buffer: &[u8]) -> Result<()> {
        validate(Command::HighVoltageOn, rx_buffer).map(|_| ())
    }
}

pub struct HighVoltageOff;

impl HighVoltageOff {
    pub fn request() -> Request {
        Request::without_payload(Command::HighVoltageOff)
    }

    pub fn reply_size() -> usize {
        Command::HighVoltageOff.reply_size()
    }

    pub fn decode(rx_buffer: &[u8]) -> Result<()> {
        validate(Command::HighVoltageOff, rx_buffer).map(|_| ())
    }
}

pub struct PowerSupplyReset;

impl PowerSupplyReset {
    pub fn request() -> Request {
        Request::without_payload(Command::Reset)
    }

    pub fn reply_size() -> usize {
        Command::Reset.reply_size()
    }

    pub fn decode(rx_buffer: &[u8]) -> Result<()> {
        validate(Command::Reset, rx_buffer).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_with_trailer(body: &[u8]) -> Vec<u8> {
        let mut rx_buffer = vec![STX];
        rx_buffer.extend_from_slice(body);
        rx_buffer.push(ETX);
        rx_buffer.extend_from_slice(&checksum(body, &[]));
        rx_buffer.push(CR);
        rx_buffer
    }

    #[test]
    fn encode_renders_hex_and_sums_bytes() {
        let (hex, sum) = encode(b"HGV");
        assert_eq!(hex, "484756");
        assert_eq!(sum, 0x48 + 0x47 + 0x56);

        assert_eq!(encode(b""), (String::new(), 0));
    }

    #[test]
    fn checksum_without_payload() {
        // 0x02 + 0x48 + 0x47 + 0x56 + 0x03 = 0xEA
        assert_eq!(&checksum(b"HGV", &[]), b"EA");
        assert_eq!(checksum(b"HGV", &[]), checksum(b"HGV", &[]));
    }

    #[test]
    fn checksum_wraps_around() {
        // 0x02 + 0x48 + 0x42 + 0x56 + 0x03 + '7' + '6' + '9' + '1' = 0x1BC
        assert_eq!(&checksum(b"HBV", b"7691"), b"BC");
    }

    #[test]
    fn checksum_of_small_sum_keeps_leading_zero() {
        assert_eq!(&checksum(&[0x01], &[]), b"06");
        assert_eq!(&checksum(&[0xFB], &[]), b"00");
    }

    #[test]
    fn frame_without_payload() {
        let request = GetVoltage::request();
        assert_eq!(request.to_hex(), "024847560345410D");
        assert_eq!(
            request.to_frame().unwrap(),
            vec![STX, b'H', b'G', b'V', ETX, b'E', b'A', CR]
        );
    }

    #[test]
    fn frame_with_voltage_payload() {
        let request = SetVoltage::request(55.0, &VoltageLimits::default()).unwrap();
        assert_eq!(request.command(), Command::SetVoltage);
        assert_eq!(request.payload(), Some("7691"));
        assert_eq!(
            request.to_frame().unwrap(),
            b"\x02HBV7691\x03BC\x0D".to_vec()
        );
    }

    #[test]
    fn voltage_payload_is_uppercase_without_prefix() {
        let request = Request::set_voltage(55.0, &VoltageLimits::default()).unwrap();
        let expected = format!("{:X}", (55.0f64 / VOLTAGE_CONVERSION).round() as u16);
        assert_eq!(request.payload(), Some(expected.as_str()));

        let request = Request::set_voltage(40.0, &VoltageLimits::default()).unwrap();
        assert_eq!(request.payload(), Some("563B"));
    }

    #[test]
    fn voltage_policy() {
        let limits = VoltageLimits::default();
        assert!(matches!(
            Request::set_voltage(39.9, &limits),
            Err(Error::VoltageTooLow { .. })
        ));
        assert!(matches!(
            Request::set_voltage(60.1, &limits),
            Err(Error::VoltageTooHigh { .. })
        ));
        assert!(matches!(
            Request::set_voltage(f64::NAN, &limits),
            Err(Error::InvalidVoltage(_))
        ));
        assert!(matches!(
            Request::set_voltage(f64::INFINITY, &limits),
            Err(Error::InvalidVoltage(_))
        ));
        assert!(Request::set_voltage(40.0, &limits).is_ok());
        assert!(Request::set_voltage(60.0, &limits).is_ok());
    }

    #[test]
    fn register_halves_round_to_even() {
        assert_eq!(volts_to_register(30352.5 * VOLTAGE_CONVERSION), 30352);
        assert_eq!(volts_to_register(30353.5 * VOLTAGE_CONVERSION), 30354);
        assert_eq!(volts_to_register(55.0), 0x7691);
    }

    #[test]
    fn register_policy_matches_voltage_policy() {
        let limits = VoltageLimits::default();
        for volts in [40.0, 55.0, 60.0] {
            let request = Request::set_voltage(volts, &limits).unwrap();
            assert!(limits.check_register(request.register().unwrap()).is_ok());
        }
        assert!(matches!(
            limits.check_register(volts_to_register(60.1)),
            Err(Error::VoltageTooHigh { .. })
        ));
        assert!(matches!(
            limits.check_register(volts_to_register(39.9)),
            Err(Error::VoltageTooLow { .. })
        ));
    }

    #[test]
    fn set_voltage_cannot_be_built_without_payload() {
        assert!(matches!(
            Request::query(Command::SetVoltage),
            Err(Error::PayloadRequired(Command::SetVoltage))
        ));
        let request = Request::query(Command::GetStatus).unwrap();
        assert_eq!(request.payload(), None);
        assert_eq!(request, StatusFlags::request());
    }

    #[test]
    fn voltage_limits_are_bounded_by_hardware() {
        assert!(VoltageLimits::with_upper(90.0).is_ok());
        assert!(matches!(
            VoltageLimits::with_upper(90.5),
            Err(Error::RangeError)
        ));
        assert!(matches!(
            VoltageLimits::new(35.0, 60.0),
            Err(Error::RangeError)
        ));
        assert!(matches!(
            VoltageLimits::new(70.0, 60.0),
            Err(Error::RangeError)
        ));

        let limits = VoltageLimits::with_upper(80.0).unwrap();
        assert_eq!(limits.lower(), 40.0);
        assert!(Request::set_voltage(75.0, &limits).is_ok());
    }

    #[test]
    fn decode_voltage() {
        let volts = GetVoltage::decode(b"\x02hgv0960").unwrap();
        assert!((volts - 0x0960 as f64 * 1.812e-3).abs() < 1e-6);
    }

    #[test]
    fn decode_current() {
        let milliamps = GetCurrent::decode(b"\x02hgc00C8").unwrap();
        assert!((milliamps - 200.0 * 4.980e-3).abs() < 1e-9);
    }

    #[test]
    fn decode_lowercase_register_digits() {
        assert_eq!(
            GetVoltage::decode(b"\x02hgv00ff").unwrap(),
            GetVoltage::decode(b"\x02hgv00FF").unwrap()
        );
    }

    #[test]
    fn decode_status_bits() {
        let status = StatusFlags::decode(b"\x02hgs0029").unwrap();
        assert!(status.high_voltage_on);
        assert!(!status.over_current_protection);
        assert!(status.current_within_spec());
        assert!(status.temperature_sensor_connected);
        assert!(status.temperature_within_spec());
        assert!(status.temperature_correction);

        assert_eq!(StatusFlags::from_word(0), StatusFlags::default());
        let all = StatusFlags::from_word(0x003F);
        assert!(all.over_current_protection && all.current_out_of_spec && all.temperature_out_of_spec);
    }

    #[test]
    fn status_display_lists_every_flag() {
        let text = StatusFlags::from_word(0x0001).to_string();
        assert!(text.contains("High Voltage Output      :   ON"));
        assert!(text.contains("Temperature Correction   :   Invalid"));
        assert_eq!(text.lines().count(), 6);
    }

    #[test]
    fn decode_monitor_info() {
        let rx_buffer = reply_with_trailer(b"hpo0001000075EC00C80000");
        assert_eq!(rx_buffer.len(), 28);
        let info = MonitorInfo::decode(&rx_buffer).unwrap();
        assert!(info.status.high_voltage_on);
        assert!((info.voltage - 0x75EC as f64 * VOLTAGE_CONVERSION).abs() < 1e-9);
        assert!((info.current - 0x00C8 as f64 * CURRENT_CONVERSION).abs() < 1e-9);
    }

    #[test]
    fn monitor_reply_with_bad_checksum_is_malformed() {
        let mut rx_buffer = reply_with_trailer(b"hpo0001000075EC00C80000");
        rx_buffer[25] = b'0';
        rx_buffer[26] = b'0';
        assert!(matches!(
            Reply::classify(Command::Monitor, &rx_buffer),
            Reply::Malformed(_)
        ));
        assert!(matches!(
            MonitorInfo::decode(&rx_buffer),
            Err(Error::MalformedReply { command: Command::Monitor, .. })
        ));
    }

    #[test]
    fn monitor_reply_without_trailer_is_malformed() {
        let mut rx_buffer = reply_with_trailer(b"hpo0001000075EC00C80000");
        rx_buffer[24] = b'Z';
        rx_buffer[25] = b'0';
        rx_buffer[26] = b'0';
        assert!(matches!(
            Reply::classify(Command::Monitor, &rx_buffer),
            Reply::Malformed(_)
        ));
        assert!(MonitorInfo::decode(&rx_buffer).is_err());

        let mut rx_buffer = reply_with_trailer(b"hpo0001000075EC00C80000");
        rx_buffer[27] = b'\n';
        assert!(matches!(
            Reply::classify(Command::Monitor, &rx_buffer),
            Reply::Malformed(_)
        ));
    }

    #[test]
    fn classify_device_errors() {
        assert_eq!(
            Reply::classify(Command::GetVoltage, b"\x02hxx0004"),
            Reply::DeviceError(DeviceError::Checksum)
        );
        assert_eq!(
            Reply::classify(Command::GetVoltage, b"\x02hxx00FF"),
            Reply::DeviceError(DeviceError::Unknown("00FF".into()))
        );
        let codes = [
            (b"0001", DeviceError::Uart),
            (b"0002", DeviceError::Timeout),
            (b"0003", DeviceError::Syntax),
            (b"0004", DeviceError::Checksum),
            (b"0005", DeviceError::UndefinedCommand),
            (b"0006", DeviceError::InvalidParameter),
            (b"0007", DeviceError::ParameterSize),
        ];
        for (code, expected) in codes {
            let err = DeviceError::from_code(code);
            assert_eq!(err.code().as_bytes(), code);
            assert_eq!(err, expected);
        }
    }

    #[test]
    fn error_reply_to_monitor_is_shorter_than_expected() {
        // An error reply is 12 bytes, even when 28 were requested
        let rx_buffer = reply_with_trailer(b"hxx0005");
        assert_eq!(
            Reply::classify(Command::Monitor, &rx_buffer),
            Reply::DeviceError(DeviceError::UndefinedCommand)
        );
        assert!(matches!(
            MonitorInfo::decode(&rx_buffer),
            Err(Error::Device(DeviceError::UndefinedCommand))
        ));
    }

    #[test]
    fn classify_malformed() {
        assert!(matches!(
            Reply::classify(Command::GetVoltage, b"\x02hgc0960"),
            Reply::Malformed(_)
        ));
        assert!(matches!(
            Reply::classify(Command::GetVoltage, b"\x02HGV0960"),
            Reply::Malformed(_)
        ));
        assert!(matches!(
            Reply::classify(Command::GetVoltage, b"\x02hg"),
            Reply::Malformed(_)
        ));
        assert!(matches!(
            Reply::classify(Command::GetVoltage, b""),
            Reply::Malformed(_)
        ));
        assert!(matches!(
            Reply::classify(Command::Monitor, b"\x02hpo0001"),
            Reply::Malformed(_)
        ));
        assert!(matches!(
            Reply::classify(Command::GetVoltage, b"\x02hxx00"),
            Reply::Malformed(_)
        ));
    }

    #[test]
    fn non_hex_register_is_malformed() {
        assert!(matches!(
            GetVoltage::decode(b"\x02hgv09G0"),
            Err(Error::MalformedReply { .. })
        ));
    }

    #[test]
    fn classification_is_repeatable() {
        for rx_buffer in [&b"\x02hgv0960"[..], b"\x02hxx0004", b"\x02abc0000"] {
            assert_eq!(
                Reply::classify(Command::GetVoltage, rx_buffer),
                Reply::classify(Command::GetVoltage, rx_buffer)
            );
        }
    }

    #[test]
    fn acknowledgements() {
        assert!(HighVoltageOn::decode(&reply_with_trailer(b"hon")).is_ok());
        assert!(matches!(
            HighVoltageOn::decode(b"\x02hon\x03FF\x0D"),
            Err(Error::MalformedReply { .. })
        ));
        assert!(HighVoltageOff::decode(b"\x02hof0000").is_ok());
        assert!(PowerSupplyReset::decode(b"\x02hre0000").is_ok());
        assert!(SetVoltage::decode(b"\x02hbv0000").is_ok());
        assert!(matches!(
            HighVoltageOn::decode(b"\x02hof0000"),
            Err(Error::MalformedReply { .. })
        ));
    }

    #[test]
    fn reply_sizes() {
        assert_eq!(MonitorInfo::reply_size(), 28);
        for size in [
            GetVoltage::reply_size(),
            GetCurrent::reply_size(),
            StatusFlags::reply_size(),
            SetVoltage::reply_size(),
            HighVoltageOn::reply_size(),
            HighVoltageOff::reply_size(),
            PowerSupplyReset::reply_size(),
        ] {
            assert_eq!(size, 8);
        }
    }

    #[test]
    fn echo_is_lowercase_mnemonic() {
        assert_eq!(&Command::Monitor.echo(), b"hpo");
        assert_eq!(Command::HighVoltageOff.to_string(), "HOF");
    }
}
