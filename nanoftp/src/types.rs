//! # Types
//!
//! Errors, replies and the set of valid values for the engine operations

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::Status;

/// A shorthand for a Result whose error type is always an FtpError.
pub type FtpResult<T> = std::result::Result<T, FtpError>;

/// `FtpError` is a library-global error type to describe the different kinds of
/// errors that might occur while using FTP.
#[derive(Debug, Error)]
pub enum FtpError {
    /// The control channel didn't answer in time or it has been disconnected
    #[error("Control channel timed out or disconnected")]
    Timeout,
    /// A value passed by the caller can't be used
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The operation conflicts with the current transfer state or connection state
    #[error("Client is busy")]
    Busy,
    /// The command expected a certain reply code, but got another one.
    /// Contains the response data.
    #[error("Invalid response: {0}")]
    UnexpectedResponse(Response),
    /// The reply has the expected code, but its payload can't be parsed
    #[error("Response contains an invalid syntax: {0}")]
    BadResponse(Response),
    /// The transport failed to connect or to move bytes
    #[error("Connection error: {0}")]
    ConnectionError(std::io::Error),
}

impl FtpError {
    /// Numeric code describing the error.
    ///
    /// `1` timeout or transport failure, `2` invalid argument, `3` busy;
    /// any other value is the reply code sent by the server.
    pub fn code(&self) -> u16 {
        match self {
            FtpError::Timeout | FtpError::ConnectionError(_) => 1,
            FtpError::InvalidArgument(_) => 2,
            FtpError::Busy => 3,
            FtpError::UnexpectedResponse(response) | FtpError::BadResponse(response) => {
                response.code
            }
        }
    }

    /// Returns the reply sent by the server, if the error was caused by one
    pub fn response(&self) -> Option<&Response> {
        match self {
            FtpError::UnexpectedResponse(response) | FtpError::BadResponse(response) => {
                Some(response)
            }
            _ => None,
        }
    }
}

/// A single control channel reply
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Response {
    /// Three digit reply code; `0` if the reply didn't start with a valid code
    pub code: u16,
    /// Reply text, separator and terminator excluded. Bounded by the configured length
    pub message: String,
}

impl Response {
    /// Instantiates a new `Response`
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the reply code as a [`Status`]
    pub fn status(&self) -> Status {
        Status::from(self.code)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Data representation used in `TYPE` command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    /// ASCII text
    Ascii,
    /// Image (binary); the default
    Binary,
}

/// How `init_upload` opens the remote file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create the file or overwrite it (`STOR`)
    CreateReplace,
    /// Append to the file, creating it if missing (`APPE`)
    Append,
}

/// Format of a directory listing.
///
/// - Human: `-rw-r--r-- 1 user group 12345 Oct 15 09:30 file.txt`
/// - Machine: `type=file;size=12345;modify=20231015093000; file.txt`
/// - Simple: `file.txt`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFormat {
    /// `LIST`
    Human,
    /// `MLSD`
    Machine,
    /// `NLST`
    Simple,
}

/// Transfer state of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferState {
    #[default]
    Idle,
    Uploading,
    Downloading,
}

impl fmt::Display for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferType::Ascii => write!(f, "A"),
            TransferType::Binary => write!(f, "I"),
        }
    }
}

impl FromStr for TransferType {
    type Err = FtpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "a" | "ascii" => Ok(Self::Ascii),
            "i" | "binary" | "image" => Ok(Self::Binary),
            _ => Err(FtpError::InvalidArgument(format!("unknown transfer type '{s}'"))),
        }
    }
}

impl FromStr for OpenMode {
    type Err = FtpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stor" | "create" | "replace" | "create_replace" => Ok(Self::CreateReplace),
            "appe" | "append" => Ok(Self::Append),
            _ => Err(FtpError::InvalidArgument(format!("unknown open mode '{s}'"))),
        }
    }
}

impl FromStr for ListFormat {
    type Err = FtpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "list" | "human" => Ok(Self::Human),
            "mlsd" | "machine" => Ok(Self::Machine),
            "nlst" | "simple" => Ok(Self::Simple),
            _ => Err(FtpError::InvalidArgument(format!("unknown list format '{s}'"))),
        }
    }
}
