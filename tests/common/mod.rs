#![allow(dead_code)]

use c11204_lib::protocol::{checksum, CR, ETX, STX};
use c11204_lib::transport::{Transport, TransportResolver};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{Error, ErrorKind};
use std::rc::Rc;

/// Scripted serial line: every `read` hands out the next queued reply.
#[derive(Debug, Default)]
pub struct SerialInterface {
    replies: VecDeque<Vec<u8>>,
    pub written: Vec<Vec<u8>>,
    pub input_flushes: usize,
    pub output_flushes: usize,
    pub reads: Vec<usize>,
    pub closed: bool,
    do_read_error: bool,
    do_write_error: bool,
}

impl SerialInterface {
    pub fn new() -> Rc<RefCell<SerialInterface>> {
        Rc::new(RefCell::new(SerialInterface::default()))
    }

    pub fn queue_reply(&mut self, reply: &[u8]) {
        self.replies.push_back(reply.to_vec());
    }

    pub fn trigger_write_error(&mut self) {
        self.do_write_error = true;
    }

    pub fn trigger_read_error(&mut self) {
        self.do_read_error = true;
    }
}

#[derive(Debug)]
pub struct MockTransport(Rc<RefCell<SerialInterface>>);

impl MockTransport {
    pub fn new(serial_if: &Rc<RefCell<SerialInterface>>) -> MockTransport {
        MockTransport(serial_if.clone())
    }
}

impl Transport for MockTransport {
    fn flush_input(&mut self) -> std::io::Result<()> {
        self.0.borrow_mut().input_flushes += 1;
        Ok(())
    }

    fn flush_output(&mut self) -> std::io::Result<()> {
        self.0.borrow_mut().output_flushes += 1;
        Ok(())
    }

    fn write(&mut self, buffer: &[u8]) -> std::io::Result<usize> {
        let mut inner = self.0.borrow_mut();
        if inner.do_write_error {
            inner.do_write_error = false;
            return Err(Error::new(ErrorKind::BrokenPipe, "simulated write error"));
        }
        inner.written.push(buffer.to_vec());
        Ok(buffer.len())
    }

    fn read(&mut self, size: usize) -> std::io::Result<Vec<u8>> {
        let mut inner = self.0.borrow_mut();
        inner.reads.push(size);
        if inner.do_read_error {
            inner.do_read_error = false;
            return Err(Error::new(ErrorKind::PermissionDenied, "simulated read error"));
        }
        // nothing queued behaves like a timeout: no bytes at all
        let mut reply = inner.replies.pop_front().unwrap_or_default();
        reply.truncate(size);
        Ok(reply)
    }

    fn close(self) -> std::io::Result<()> {
        self.0.borrow_mut().closed = true;
        Ok(())
    }
}

pub struct MockResolver(pub Rc<RefCell<SerialInterface>>);

impl TransportResolver for MockResolver {
    type Transport = MockTransport;

    fn resolve(&self) -> c11204_lib::Result<MockTransport> {
        Ok(MockTransport::new(&self.0))
    }
}

/// `STX body ETX checksum CR`, the way the power supply frames a full reply.
pub fn reply_with_trailer(body: &[u8]) -> Vec<u8> {
    let mut reply = vec![STX];
    reply.extend_from_slice(body);
    reply.push(ETX);
    reply.extend_from_slice(&checksum(body, &[]));
    reply.push(CR);
    reply
}
