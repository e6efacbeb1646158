//! # Transport
//!
//! This module exposes the byte stream the control and data channels are built on

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// How long [`TcpTransport::available`] waits for incoming bytes
const POLL_INTERVAL: Duration = Duration::from_millis(5);

const READ_CHUNK: usize = 512;

/// A byte-stream connection.
///
/// Reads are non-blocking at the byte level: [`Transport::available`] tells whether
/// [`Transport::read_byte`] can return a byte right now. The engine implements every
/// timeout on top of these primitives.
pub trait Transport {
    /// Open a connection to `host:port`, giving up after `timeout`
    fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> io::Result<()>;

    /// Pop one received byte, if any is pending
    fn read_byte(&mut self) -> Option<u8>;

    /// Whether at least one byte can be read without waiting
    fn available(&mut self) -> bool;

    /// Write bytes to the peer; returns the amount of bytes accepted
    fn write(&mut self, buf: &[u8]) -> usize;

    /// Whether the connection is still open
    fn is_connected(&mut self) -> bool;

    /// Close the connection; closing a closed transport does nothing
    fn close(&mut self);
}

/// [`Transport`] over a std [`TcpStream`]
#[derive(Debug, Default)]
pub struct TcpTransport {
    stream: Option<TcpStream>,
    pending: VecDeque<u8>,
    peer_closed: bool,
}

impl TcpTransport {
    /// Returns a reference to the underlying [`TcpStream`], if connected
    pub fn get_ref(&self) -> Option<&TcpStream> {
        self.stream.as_ref()
    }

    /// Read a chunk from the socket into the pending buffer.
    /// Returns whether new bytes arrived
    fn fill(&mut self) -> bool {
        let Some(stream) = self.stream.as_mut() else {
            return false;
        };
        let mut chunk = [0u8; READ_CHUNK];
        match stream.read(&mut chunk) {
            Ok(0) => {
                trace!("peer closed connection");
                self.peer_closed = true;
                false
            }
            Ok(n) => {
                self.pending.extend(&chunk[..n]);
                true
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                false
            }
            Err(err) => {
                debug!("read failed: {err}");
                self.peer_closed = true;
                false
            }
        }
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> io::Result<()> {
        self.close();
        debug!("Connecting to {host}:{port}");
        let mut last_err = io::Error::new(io::ErrorKind::NotFound, "host didn't resolve");
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(POLL_INTERVAL))?;
                    stream.set_write_timeout(Some(timeout))?;
                    stream.set_nodelay(true)?;
                    trace!("connected to {addr}");
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(err) => {
                    trace!("failed to connect to {addr}: {err}");
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    fn read_byte(&mut self) -> Option<u8> {
        if self.pending.is_empty() {
            self.fill();
        }
        self.pending.pop_front()
    }

    fn available(&mut self) -> bool {
        !self.pending.is_empty() || self.fill()
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        let Some(stream) = self.stream.as_mut() else {
            return 0;
        };
        match stream.write(buf) {
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => 0,
            Err(err) => {
                debug!("write failed: {err}");
                if err.kind() != io::ErrorKind::WouldBlock && err.kind() != io::ErrorKind::TimedOut
                {
                    self.peer_closed = true;
                }
                0
            }
        }
    }

    fn is_connected(&mut self) -> bool {
        self.stream.is_some() && (!self.peer_closed || !self.pending.is_empty())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.pending.clear();
        self.peer_closed = false;
    }
}
