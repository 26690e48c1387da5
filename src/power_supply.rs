use crate::protocol::*;
use crate::transport::{Transport, TransportResolver};
use crate::{Error, Result};
use std::io;

/// A session with one C11204 power supply.
///
/// Every method runs one complete transaction: flush the transport, write a
/// frame, block until the reply has been read, decode it. Nothing is cached
/// between transactions and nothing is retried.
#[derive(Debug)]
pub struct PowerSupply<T: Transport> {
    transport: T,
    limits: VoltageLimits,
}

impl<T: Transport> PowerSupply<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            limits: VoltageLimits::default(),
        }
    }

    pub fn connect<R>(resolver: &R) -> Result<Self>
    where
        R: TransportResolver<Transport = T>,
    {
        Ok(Self::new(resolver.resolve()?))
    }

    pub fn with_limits(mut self, limits: VoltageLimits) -> Self {
        self.set_limits(limits);
        self
    }

    pub fn set_limits(&mut self, limits: VoltageLimits) {
        log::trace!(
            "set voltage limits to {} V .. {} V",
            limits.lower(),
            limits.upper()
        );
        self.limits = limits;
    }

    pub fn limits(&self) -> &VoltageLimits {
        &self.limits
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn send_bytes(&mut self, tx_buffer: &[u8]) -> Result<()> {
        // drop stale bytes, e.g. the unread tail of a previous reply
        self.transport.flush_input()?;
        self.transport.flush_output()?;

        log::trace!("send_bytes: {tx_buffer:02X?}");
        let written = self.transport.write(tx_buffer)?;
        if written != tx_buffer.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("wrote {written} of {} bytes", tx_buffer.len()),
            )
            .into());
        }
        Ok(())
    }

    fn receive_bytes(&mut self, size: usize) -> Result<Vec<u8>> {
        let rx_buffer = self.transport.read(size)?;
        log::trace!("receive_bytes: {rx_buffer:02X?}");
        if rx_buffer.len() < size {
            log::debug!("Received {} of {} bytes", rx_buffer.len(), size);
        }
        Ok(rx_buffer)
    }

    fn check_set_voltage(&self, request: &Request) -> Result<()> {
        let register = request
            .register()
            .ok_or(Error::PayloadRequired(Command::SetVoltage))?;
        self.limits.check_register(register)
    }

    fn transact(&mut self, request: &Request) -> Result<Vec<u8>> {
        let tx_buffer = request.to_frame()?;
        self.send_bytes(&tx_buffer)?;
        self.receive_bytes(request.command().reply_size())
    }

    /// Sends `request` and classifies the reply without decoding it.
    ///
    /// Transport failures are returned as `Err`, and so is an `HBV` request
    /// outside of [`Self::limits`], which is never written.
    pub fn execute(&mut self, request: &Request) -> Result<Reply> {
        if request.command() == Command::SetVoltage {
            self.check_set_voltage(request).inspect_err(|err| {
                log::warn!("{err}");
            })?;
        }
        let rx_buffer = self.transact(request)?;
        Ok(Reply::classify(request.command(), &rx_buffer))
    }

    /// Status, output voltage and output current in a single transaction.
    pub fn get_monitor_info(&mut self) -> Result<MonitorInfo> {
        log::trace!("get monitor info");
        MonitorInfo::decode(&self.transact(&MonitorInfo::request())?)
    }

    /// Output voltage in volts and output current in milliamps.
    pub fn get_power_info(&mut self) -> Result<(f64, f64)> {
        let info = self.get_monitor_info()?;
        Ok((info.voltage, info.current))
    }

    /// Output voltage in volts.
    pub fn get_voltage(&mut self) -> Result<f64> {
        log::trace!("get voltage");
        GetVoltage::decode(&self.transact(&GetVoltage::request())?)
    }

    /// Output current in milliamps.
    pub fn get_current(&mut self) -> Result<f64> {
        log::trace!("get current");
        GetCurrent::decode(&self.transact(&GetCurrent::request())?)
    }

    pub fn get_status(&mut self) -> Result<StatusFlags> {
        log::trace!("get status");
        StatusFlags::decode(&self.transact(&StatusFlags::request())?)
    }

    /// Sets the output voltage.
    ///
    /// Voltages outside of [`Self::limits`] are rejected before anything is
    /// written to the transport.
    pub fn set_voltage(&mut self, volts: f64) -> Result<()> {
        log::trace!("set voltage to {volts} V");
        let request = SetVoltage::request(volts, &self.limits).inspect_err(|err| {
            log::warn!("{err}");
        })?;
        SetVoltage::decode(&self.transact(&request)?)
    }

    pub fn set_high_voltage_on(&mut self) -> Result<()> {
        log::trace!("set high voltage on");
        HighVoltageOn::decode(&self.transact(&HighVoltageOn::request())?)
    }

    pub fn set_high_voltage_off(&mut self) -> Result<()> {
        log::trace!("set high voltage off");
        HighVoltageOff::decode(&self.transact(&HighVoltageOff::request())?)
    }

    pub fn reset(&mut self) -> Result<()> {
        log::trace!("reset power supply");
        PowerSupplyReset::decode(&self.transact(&PowerSupplyReset::request())?)
    }

    pub fn close(self) -> Result<()> {
        log::trace!("close transport");
        Ok(self.transport.close()?)
    }
}
