//! # Control channel
//!
//! The long-lived command connection. Every FTP verb goes through [`ControlChannel::send`].

mod response;

use std::time::{Duration, Instant};

pub use response::DEFAULT_MAX_MESSAGE_LEN;
use response::ResponseParser;

use crate::command::Command;
use crate::transport::Transport;
use crate::types::{FtpError, FtpResult, Response};
use crate::Status;

/// Default timeout for control channel replies
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// Command connection to the FTP server
pub struct ControlChannel<T>
where
    T: Transport,
{
    transport: T,
    parser: ResponseParser,
    last_response: Option<Response>,
}

impl<T> ControlChannel<T>
where
    T: Transport,
{
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            parser: ResponseParser::new(DEFAULT_CONTROL_TIMEOUT, DEFAULT_MAX_MESSAGE_LEN),
            last_response: None,
        }
    }

    /// Reply timeout; also used as connect deadline for data connections
    pub fn timeout(&self) -> Duration {
        self.parser.timeout()
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.parser.set_timeout(timeout);
    }

    /// Set the maximum amount of reply message bytes kept. Replies already read are not affected
    pub fn set_max_message_len(&mut self, len: usize) {
        self.parser.set_max_message_len(len);
    }

    /// Last reply read from the server, whether it was the expected one or not
    pub fn last_response(&self) -> Option<&Response> {
        self.last_response.as_ref()
    }

    pub fn is_connected(&mut self) -> bool {
        self.transport.is_connected()
    }

    /// Connect to the server and read its banner
    pub fn connect(&mut self, host: &str, port: u16) -> FtpResult<Response> {
        debug!("Connecting to {host}:{port}");
        let timeout = self.timeout();
        self.transport
            .connect(host, port, timeout)
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::TimedOut => FtpError::Timeout,
                _ => FtpError::ConnectionError(err),
            })?;
        debug!("Reading server response...");
        self.expect(Status::Ready)
    }

    pub fn close(&mut self) {
        trace!("closing control connection");
        self.transport.close();
    }

    /// Send `command` and read the reply, which must carry `expected` code
    pub fn send(&mut self, command: Command, expected: Status) -> FtpResult<Response> {
        self.send_in(command, &[expected])
    }

    /// Send `command` and read the reply, which must carry one of `expected` codes
    pub fn send_in(&mut self, command: Command, expected: &[Status]) -> FtpResult<Response> {
        let line = command.log_line();
        self.perform(command)?;
        self.expect_in(expected).inspect_err(|err| {
            error!("{line} FAILED: {err}");
        })
    }

    /// Write the command line to the server
    pub fn perform(&mut self, command: Command) -> FtpResult<()> {
        command.validate()?;
        if !self.transport.is_connected() {
            error!("{} FAILED: control connection is closed", command.verb());
            return Err(FtpError::Timeout);
        }
        let stale = self.drain();
        if stale > 1 {
            trace!("discarded {stale} bytes left over from previous replies");
        }
        trace!("CC OUT: {}", command.log_line());

        let line = command.to_string();
        let mut buf = line.as_bytes();
        let start = Instant::now();
        while !buf.is_empty() {
            let written = self.transport.write(buf);
            buf = &buf[written..];
            if written == 0 {
                if !self.transport.is_connected() || start.elapsed() >= self.timeout() {
                    return Err(FtpError::Timeout);
                }
                std::thread::yield_now();
            }
        }
        Ok(())
    }

    /// Drop whatever the server sent after the last reply read, such as
    /// continuation lines of a multi-line reply
    fn drain(&mut self) -> usize {
        let mut drained = 0usize;
        while self.transport.available() {
            if self.transport.read_byte().is_some() {
                drained += 1;
            }
        }
        drained
    }

    /// Read the next reply, which must carry `expected` code
    pub fn expect(&mut self, expected: Status) -> FtpResult<Response> {
        self.expect_in(&[expected])
    }

    /// Read the next reply, which must carry one of `expected` codes
    pub fn expect_in(&mut self, expected: &[Status]) -> FtpResult<Response> {
        let response = self.read_response()?;
        if expected.iter().any(|status| status.code() == response.code) {
            Ok(response)
        } else {
            Err(FtpError::UnexpectedResponse(response))
        }
    }

    /// Read one reply and keep it as last response
    pub fn read_response(&mut self) -> FtpResult<Response> {
        let response = match self.parser.read(&mut self.transport) {
            Ok(response) => response,
            Err(FtpError::BadResponse(response)) => {
                self.last_response = Some(response.clone());
                return Err(FtpError::BadResponse(response));
            }
            Err(err) => return Err(err),
        };
        trace!("CC IN: {response}");
        self.last_response = Some(response.clone());
        Ok(response)
    }
}
