use crate::power_supply::PowerSupply;
use crate::transport::{Transport, TransportResolver};
use crate::{Error, Result};
use serialport::{ClearBuffer, SerialPortType};
use std::io::{self, Read, Write};
use std::time::Duration;

pub const BAUD_RATE: u32 = 38400;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);
/// USB product string of the UART bridge built into the C11204 evaluation board.
pub const DEFAULT_PORT_DESCRIPTION: &str = "CP2102 USB to UART Bridge Controller";

pub type SerialPowerSupply = PowerSupply<SerialTransport>;

#[derive(Debug)]
pub struct SerialTransport {
    serial: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    pub fn open(port: &str, timeout: Duration) -> Result<Self> {
        let serial = serialport::new(port, BAUD_RATE)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::Even)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(timeout)
            .open()?;
        log::debug!("Opened serial port '{port}' with timeout {timeout:?}");
        Ok(Self { serial })
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        log::trace!("set timeout to {timeout:?}");
        Ok(self.serial.set_timeout(timeout)?)
    }

    pub fn name(&self) -> Option<String> {
        self.serial.name()
    }
}

impl Transport for SerialTransport {
    fn flush_input(&mut self) -> io::Result<()> {
        Ok(self.serial.clear(ClearBuffer::Input)?)
    }

    fn flush_output(&mut self) -> io::Result<()> {
        Ok(self.serial.clear(ClearBuffer::Output)?)
    }

    fn write(&mut self, buffer: &[u8]) -> io::Result<usize> {
        self.serial.write_all(buffer)?;
        Ok(buffer.len())
    }

    fn read(&mut self, size: usize) -> io::Result<Vec<u8>> {
        let mut rx_buffer = vec![0; size];
        let mut received = 0;
        while received < size {
            match self.serial.read(&mut rx_buffer[received..]) {
                Ok(0) => break,
                Ok(n) => received += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == io::ErrorKind::TimedOut => {
                    log::trace!("Timed out after {received} of {size} bytes");
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        rx_buffer.truncate(received);
        Ok(rx_buffer)
    }

    fn close(self) -> io::Result<()> {
        log::debug!("Closing serial port {:?}", self.serial.name());
        drop(self.serial);
        Ok(())
    }
}

/// Name of the first USB serial port whose product string contains `description`.
pub fn find_port(description: &str) -> Result<String> {
    let ports = serialport::available_ports()?;
    if ports.is_empty() {
        log::warn!("Could not find any serial device");
    }
    ports
        .into_iter()
        .find(|port| match &port.port_type {
            SerialPortType::UsbPort(info) => info
                .product
                .as_deref()
                .is_some_and(|product| product.contains(description)),
            _ => false,
        })
        .map(|port| {
            log::debug!("Found '{description}' at {}", port.port_name);
            port.port_name
        })
        .ok_or_else(|| Error::PortNotFound(description.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSelector {
    /// A device path such as `/dev/ttyUSB0` or `COM3`
    Path(String),
    /// A substring of the USB product description
    Description(String),
}

#[derive(Debug, Clone)]
pub struct SerialResolver {
    selector: PortSelector,
    timeout: Duration,
}

impl SerialResolver {
    pub fn path(port: impl Into<String>) -> Self {
        Self {
            selector: PortSelector::Path(port.into()),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn description(description: impl Into<String>) -> Self {
        Self {
            selector: PortSelector::Description(description.into()),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn selector(&self) -> &PortSelector {
        &self.selector
    }
}

impl Default for SerialResolver {
    fn default() -> Self {
        Self::description(DEFAULT_PORT_DESCRIPTION)
    }
}

impl TransportResolver for SerialResolver {
    type Transport = SerialTransport;

    fn resolve(&self) -> Result<SerialTransport> {
        let port = match &self.selector {
            PortSelector::Path(port) => port.clone(),
            PortSelector::Description(description) => find_port(description)?,
        };
        SerialTransport::open(&port, self.timeout)
    }
}

impl PowerSupply<SerialTransport> {
    /// Opens the power supply on the named serial port.
    pub fn open(port: &str) -> Result<Self> {
        Self::connect(&SerialResolver::path(port))
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.transport_mut().set_timeout(timeout)
    }
}
