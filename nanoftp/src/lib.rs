#![crate_name = "nanoftp"]
#![crate_type = "lib"]

//! # nanoftp
//!
//! nanoftp is a small, synchronous FTP client engine meant for constrained devices.
//! It keeps one control connection and at most one passive data connection open,
//! stores only a bounded amount of every server reply and never allocates for
//! transfers unless the caller asks for a growable buffer.
//!
//! - Upload and download either in a single call or in chunks, through an explicit transfer state
//! - Any byte stream can carry the connections by implementing [`Transport`]
//! - File management: rename, delete, size, modification time
//! - Directory management: mkdir, rmdir, cwd, pwd and the recursive `mktree` and `rmtree`
//! - `LIST`, `NLST` and `MLSD` listings, with a parser for machine-readable entries
//!
//! ## Get started
//!
//! ```toml
//! nanoftp = "^0.1"
//! ```
//!
//! ### Features
//!
//! - `no-log`: compile out every log statement
//!
//! ## Usage
//!
//! ```rust,no_run
//! use nanoftp::{FtpClient, OpenMode};
//!
//! let mut client = FtpClient::new("127.0.0.1", 21);
//! client.connect_with_password("test", "test").unwrap();
//!
//! client.mktree("/logs/2024").unwrap();
//! client
//!     .upload_singleshot("/logs/2024/boot.log", b"booted", OpenMode::CreateReplace)
//!     .unwrap();
//! assert_eq!(client.download_singleshot("/logs/2024/boot.log").unwrap(), b"booted");
//!
//! client.disconnect().unwrap();
//! ```
//!
//! ### Chunked transfers
//!
//! While a transfer is open only the data primitives can be used; every other operation
//! fails with [`FtpError::Busy`]. Data primitives called without a matching transfer
//! do nothing and return `0`.
//!
//! ```rust,no_run
//! use nanoftp::{FtpClient, OpenMode, TransferState};
//!
//! let mut client = FtpClient::new("127.0.0.1", 21);
//! client.connect_with_password("test", "test").unwrap();
//!
//! client.init_upload("/readings.csv", OpenMode::Append).unwrap();
//! for reading in [b"1,20.5\n", b"2,20.7\n"] {
//!     client.upload_data(reading);
//! }
//! client.finish_upload().unwrap();
//!
//! client.init_download("/readings.csv").unwrap();
//! let mut buf = Vec::new();
//! while client.download_data(&mut buf, Some(64)) > 0 {}
//! assert_eq!(client.state(), TransferState::Idle);
//! ```

// -- common deps
#[macro_use]
extern crate lazy_regex;
#[macro_use]
extern crate log;

// -- private
mod client;
pub(crate) mod command;
mod control;
mod data;
mod regex;
mod status;
#[cfg(test)]
mod test_server;

// -- public
pub mod list;
pub mod sink;
pub mod transport;
pub mod tree;
pub mod types;

// -- export
pub use client::{FtpClient, ImplFtpClient, TransportBuilder};
pub use control::{DEFAULT_CONTROL_TIMEOUT, DEFAULT_MAX_MESSAGE_LEN};
pub use data::{PassiveEndpoint, DEFAULT_DATA_TIMEOUT};
pub use status::Status;
pub use transport::{TcpTransport, Transport};
pub use types::{
    FtpError, FtpResult, ListFormat, OpenMode, Response, TransferState, TransferType,
};

// -- test logging
#[cfg(test)]
pub fn log_init() {
    let _ = env_logger::builder().is_test(true).try_init();
}
