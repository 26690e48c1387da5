//! The byte stream the power supply is reached through.
//!
//! The protocol core never opens or configures a port itself. It talks to
//! anything implementing [`Transport`]; a [`TransportResolver`] decides how a
//! transport is found and opened.

use crate::Result;
use std::io;

pub trait Transport {
    /// Discard everything received but not read yet.
    fn flush_input(&mut self) -> io::Result<()>;

    /// Discard everything written but not transmitted yet.
    fn flush_output(&mut self) -> io::Result<()>;

    fn write(&mut self, buffer: &[u8]) -> io::Result<usize>;

    /// Block until `size` bytes arrived or the transport timed out.
    ///
    /// On timeout the bytes received so far are returned, so the result may be
    /// shorter than `size`.
    fn read(&mut self, size: usize) -> io::Result<Vec<u8>>;

    fn close(self) -> io::Result<()>
    where
        Self: Sized;
}

/// Finds and opens a transport, e.g. by port name or by USB descriptor.
pub trait TransportResolver {
    type Transport: Transport;

    fn resolve(&self) -> Result<Self::Transport>;
}
