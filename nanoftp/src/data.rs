//! # Data channel
//!
//! Passive mode negotiation and bulk transfers over a short-lived data connection

use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::command::Command;
use crate::control::ControlChannel;
use crate::regex::PASV_PORT_RE;
use crate::sink::Sink;
use crate::transport::Transport;
use crate::types::{FtpError, FtpResult, Response};
use crate::Status;

/// Default time limit of a single read or write on the data connection
pub const DEFAULT_DATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Address announced by the server in a `227` reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassiveEndpoint {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl PassiveEndpoint {
    /// Parse the endpoint from a PASV reply
    pub fn from_response(response: &Response) -> FtpResult<Self> {
        trace!("PASV response: {}", response.message);
        Self::from_str(&response.message).map_err(|_| FtpError::BadResponse(response.clone()))
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip.into(), self.port)
    }
}

impl FromStr for PassiveEndpoint {
    type Err = FtpError;

    /// Parses the first `(h1,h2,h3,h4,p1,p2)` group found in `s`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FtpError::InvalidArgument(format!("no passive address in '{s}'"));
        let caps = PASV_PORT_RE.captures(s).ok_or_else(invalid)?;
        let mut parts = [0u8; 6];
        for (i, part) in parts.iter_mut().enumerate() {
            *part = caps[i + 1].parse::<u8>().map_err(|_| invalid())?;
        }
        let [h1, h2, h3, h4, p1, p2] = parts;
        Ok(Self {
            ip: Ipv4Addr::new(h1, h2, h3, h4),
            port: (u16::from(p1) << 8) | u16::from(p2),
        })
    }
}

/// Data connection opened in passive mode
pub struct DataChannel<T>
where
    T: Transport,
{
    transport: T,
    timeout: Duration,
}

impl<T> DataChannel<T>
where
    T: Transport,
{
    /// Send `PASV` on the control channel and connect `transport` to the announced endpoint.
    ///
    /// The control timeout is the connect deadline; `timeout` bounds the transfer.
    pub fn open_passive(
        control: &mut ControlChannel<T>,
        mut transport: T,
        timeout: Duration,
    ) -> FtpResult<Self> {
        debug!("PASV command");
        let response = control.send(Command::Pasv, Status::PassiveMode)?;
        let endpoint = PassiveEndpoint::from_response(&response)?;
        trace!("Passive address: {}", endpoint.socket_addr());
        transport
            .connect(&endpoint.ip.to_string(), endpoint.port, control.timeout())
            .map_err(|err| {
                error!("data connection cannot be established: {err}");
                match err.kind() {
                    std::io::ErrorKind::TimedOut => FtpError::Timeout,
                    _ => FtpError::ConnectionError(err),
                }
            })?;
        debug!("data connection established");
        Ok(Self { transport, timeout })
    }

    /// Read until the peer closes, the sink is full or the timeout elapses.
    /// The timeout runs from the start of the call
    pub fn read_all<S: Sink + ?Sized>(&mut self, sink: &mut S) -> usize {
        self.read(sink, None)
    }

    /// Read at most `amount` bytes
    pub fn read_up_to<S: Sink + ?Sized>(&mut self, sink: &mut S, amount: usize) -> usize {
        self.read(sink, Some(amount))
    }

    fn read<S: Sink + ?Sized>(&mut self, sink: &mut S, amount: Option<usize>) -> usize {
        let mut read = 0usize;
        let start = Instant::now();
        loop {
            if amount.is_some_and(|amount| read >= amount) || sink.is_full() {
                break;
            }
            if start.elapsed() >= self.timeout {
                debug!("data read stopped after {:?}", self.timeout);
                break;
            }
            if self.transport.available() {
                if let Some(byte) = self.transport.read_byte() {
                    sink.push(byte);
                    read += 1;
                }
            } else if !self.transport.is_connected() {
                break;
            } else {
                std::thread::yield_now();
            }
        }
        trace!("DC IN: {read} bytes");
        read
    }

    /// Write until everything is sent, the peer closes or the timeout, counted from
    /// the start of the call, elapses. Returns the amount of bytes written
    pub fn write_all(&mut self, data: &[u8]) -> usize {
        let mut written = 0usize;
        let start = Instant::now();
        while written < data.len() {
            if !self.transport.is_connected() {
                break;
            }
            if start.elapsed() >= self.timeout {
                debug!("data write stopped after {:?}", self.timeout);
                break;
            }
            let n = self.transport.write(&data[written..]);
            if n > 0 {
                written += n;
            } else {
                std::thread::yield_now();
            }
        }
        trace!("DC OUT: {written} bytes");
        written
    }

    pub fn close(mut self) {
        trace!("closing data connection");
        self.transport.close();
    }
}
