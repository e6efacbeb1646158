//! # Response parser
//!
//! Reads a single control channel reply byte by byte, storing at most a configured
//! amount of message bytes.

use std::time::{Duration, Instant};

use crate::sink::{Capped, Sink};
use crate::transport::Transport;
use crate::types::{FtpError, FtpResult, Response};

/// Default amount of reply message bytes kept in memory
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 60;

#[derive(Debug, Clone, Copy)]
pub(crate) struct ResponseParser {
    timeout: Duration,
    max_message_len: usize,
}

impl ResponseParser {
    pub(crate) fn new(timeout: Duration, max_message_len: usize) -> Self {
        Self {
            timeout,
            max_message_len,
        }
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub(crate) fn set_max_message_len(&mut self, len: usize) {
        self.max_message_len = len;
    }

    /// Read one reply.
    ///
    /// The first three bytes are the code, the fourth is the separator, the rest up to
    /// `\r` is the message. Nothing past the terminator is consumed; line feeds left
    /// over by a previous reply are skipped.
    pub(crate) fn read<T: Transport + ?Sized>(&self, transport: &mut T) -> FtpResult<Response> {
        let start = Instant::now();
        let mut index = 0usize;
        let mut code: u16 = 0;
        let mut valid_code = true;
        let mut message = Capped::new(self.max_message_len);

        loop {
            if start.elapsed() >= self.timeout {
                debug!("no reply within {:?}", self.timeout);
                return Err(FtpError::Timeout);
            }
            if !transport.available() {
                if !transport.is_connected() {
                    debug!("control connection closed while waiting for reply");
                    return Err(FtpError::Timeout);
                }
                std::thread::yield_now();
                continue;
            }
            let Some(byte) = transport.read_byte() else {
                continue;
            };
            match index {
                // leftovers of a previous terminator
                0 if byte == b'\r' || byte == b'\n' => continue,
                0..=2 if byte == b'\r' => {
                    valid_code = false;
                    break;
                }
                0..=2 => match byte {
                    b'0'..=b'9' => code = code * 10 + u16::from(byte - b'0'),
                    _ => valid_code = false,
                },
                _ if byte == b'\r' => break,
                3 => {}
                _ => {
                    message.push(byte);
                }
            }
            index += 1;
        }

        if message.discarded() > 0 {
            trace!("reply message truncated, {} bytes dropped", message.discarded());
        }
        let mut message = String::from_utf8_lossy(&message.into_inner()).into_owned();
        // a character split by the cap decodes to a wider replacement character
        while message.len() > self.max_message_len {
            message.pop();
        }
        if !valid_code || !(100..600).contains(&code) {
            error!("reply doesn't start with a valid code: {message:?}");
            return Err(FtpError::BadResponse(Response::new(
                if valid_code { code } else { 0 },
                message,
            )));
        }
        Ok(Response::new(code, message))
    }
}
