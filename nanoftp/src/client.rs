//! # Client
//!
//! The FTP client: one control connection, at most one data connection and the
//! transfer state gating which operations are valid.

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::command::Command;
use crate::control::ControlChannel;
use crate::data::{DataChannel, DEFAULT_DATA_TIMEOUT};
use crate::list::{self, ListingEntry};
use crate::regex::{MDTM_RE, SIZE_RE};
use crate::sink::{Sink, SliceSink};
use crate::transport::{TcpTransport, Transport};
use crate::tree::{self, DirectoryOps};
use crate::types::{
    FtpError, FtpResult, ListFormat, OpenMode, Response, TransferState, TransferType,
};
use crate::Status;

/// A function creating a new, unconnected transport for each data connection
pub type TransportBuilder<T> = dyn Fn() -> T + Send + Sync;

/// FTP client over the bundled TCP transport
pub type FtpClient = ImplFtpClient<TcpTransport>;

const TRANSFER_START: [Status; 2] = [Status::AboutToSend, Status::AlreadyOpen];
const TRANSFER_DONE: [Status; 2] = [Status::ClosingDataConnection, Status::RequestedFileActionOk];

/// FTP client generic over the [`Transport`] used for its connections
pub struct ImplFtpClient<T>
where
    T: Transport,
{
    host: String,
    port: u16,
    control: ControlChannel<T>,
    data: Option<DataChannel<T>>,
    state: TransferState,
    welcome_msg: Option<String>,
    data_timeout: Duration,
    transport_builder: Box<TransportBuilder<T>>,
}

impl<T> ImplFtpClient<T>
where
    T: Transport + Default + 'static,
{
    /// Create a client for `host:port`. Nothing is connected until [`Self::connect_with_password`]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_transports(host, port, T::default(), T::default)
    }
}

impl<T> ImplFtpClient<T>
where
    T: Transport,
{
    /// Create a client using `control` for the command connection and `transport_builder`
    /// to obtain a transport for each data connection
    pub fn with_transports<F>(
        host: impl Into<String>,
        port: u16,
        control: T,
        transport_builder: F,
    ) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            host: host.into(),
            port,
            control: ControlChannel::new(control),
            data: None,
            state: TransferState::Idle,
            welcome_msg: None,
            data_timeout: DEFAULT_DATA_TIMEOUT,
            transport_builder: Box::new(transport_builder),
        }
    }

    /// Set the timeout for control channel replies and data connection setup
    pub fn control_timeout(mut self, timeout: Duration) -> Self {
        self.set_control_timeout(timeout);
        self
    }

    /// Set the idle timeout for data transfers
    pub fn data_timeout(mut self, timeout: Duration) -> Self {
        self.set_data_timeout(timeout);
        self
    }

    /// Set a custom [`TransportBuilder`] for data connections
    pub fn transport_builder<F>(mut self, transport_builder: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.transport_builder = Box::new(transport_builder);
        self
    }

    pub fn set_control_timeout(&mut self, timeout: Duration) {
        debug!("Control timeout set to {timeout:?}");
        self.control.set_timeout(timeout);
    }

    pub fn set_data_timeout(&mut self, timeout: Duration) {
        debug!("Data timeout set to {timeout:?}");
        self.data_timeout = timeout;
    }

    /// Set how many bytes of each reply message are kept. Must be greater than zero
    pub fn set_max_response_len(&mut self, len: usize) -> FtpResult<()> {
        if len == 0 {
            return Err(FtpError::InvalidArgument(String::from(
                "maximum response length must be greater than zero",
            )));
        }
        self.control.set_max_message_len(len);
        Ok(())
    }

    /// Banner sent by the server when the connection was established
    pub fn welcome_msg(&self) -> Option<&str> {
        self.welcome_msg.as_deref()
    }

    /// Last reply read from the server
    pub fn last_response(&self) -> Option<&Response> {
        self.control.last_response()
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn is_connected(&mut self) -> bool {
        self.control.is_connected()
    }

    // -- session

    /// Connect to the server and log in.
    ///
    /// On failure the control connection is closed again.
    pub fn connect_with_password(&mut self, user: &str, password: &str) -> FtpResult<()> {
        if self.control.is_connected() {
            error!("already connected to {}:{}", self.host, self.port);
            return Err(FtpError::Busy);
        }
        info!("Connecting to {}:{} as {user}", self.host, self.port);
        let result = self.open_session(user, password);
        if let Err(err) = result.as_ref() {
            error!("connection failed: {err}");
            self.control.close();
        }
        result
    }

    fn open_session(&mut self, user: &str, password: &str) -> FtpResult<()> {
        let banner = self.control.connect(&self.host, self.port)?;
        debug!("Server READY; response: {}", banner.message);
        self.welcome_msg = Some(banner.message);
        self.state = TransferState::Idle;

        debug!("Signin in with user '{user}'");
        let response = self
            .control
            .send_in(Command::User(user.to_string()), &[Status::LoggedIn, Status::NeedPassword])?;
        if response.code == Status::NeedPassword.code() {
            trace!("Password is required");
            self.control
                .send(Command::Pass(password.to_string()), Status::LoggedIn)?;
        }
        debug!("Login OK");
        Ok(())
    }

    /// Quit the session and close the control connection. Any open transfer is abandoned
    pub fn disconnect(&mut self) -> FtpResult<()> {
        debug!("Quitting stream");
        if !self.control.is_connected() {
            return Err(FtpError::Busy);
        }
        if let Some(data) = self.data.take() {
            warn!("abandoning {:?} transfer", self.state);
            data.close();
            // the server answers the interrupted transfer before QUIT
            let _ = self.control.read_response();
        }
        self.state = TransferState::Idle;
        let result = self.control.send(Command::Quit, Status::Closing).map(|_| ());
        self.control.close();
        result
    }

    // -- upload

    /// Open the remote file for writing; data is then sent with [`Self::upload_data`].
    ///
    /// The server may open the transfer with either `150` or `125`
    pub fn init_upload(&mut self, path: &str, mode: OpenMode) -> FtpResult<()> {
        debug!("Initializing upload of {path} ({mode:?})");
        let command = match mode {
            OpenMode::CreateReplace => Command::Store(path.to_string()),
            OpenMode::Append => Command::Appe(path.to_string()),
        };
        self.start_transfer(command)?;
        self.state = TransferState::Uploading;
        Ok(())
    }

    /// Write `data` to the open upload. Returns the amount of bytes written;
    /// `0` if no upload is in progress
    pub fn upload_data(&mut self, data: &[u8]) -> usize {
        if self.state != TransferState::Uploading {
            trace!("no upload in progress; {} bytes ignored", data.len());
            return 0;
        }
        let written = self.data.as_mut().map(|d| d.write_all(data)).unwrap_or(0);
        trace!("{written} bytes uploaded");
        written
    }

    /// Close the upload and wait for the server to acknowledge it with `226` or `250`.
    /// Does nothing if no upload is in progress
    pub fn finish_upload(&mut self) -> FtpResult<()> {
        if self.state != TransferState::Uploading {
            return Ok(());
        }
        debug!("Finalizing upload");
        self.finish_transfer()
    }

    /// Upload `data` to `path` in a single transfer
    pub fn upload_singleshot(&mut self, path: &str, data: &[u8], mode: OpenMode) -> FtpResult<()> {
        self.check_idle()?;
        self.init_upload(path, mode)?;
        let written = self.upload_data(data);
        self.finish_upload()?;
        if written < data.len() {
            error!("only {written} of {} bytes uploaded", data.len());
            return Err(FtpError::ConnectionError(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("only {written} of {} bytes written", data.len()),
            )));
        }
        Ok(())
    }

    // -- download

    /// Open the remote file for reading; data is then read with [`Self::download_data`].
    ///
    /// As for uploads, `150` and `125` both open the transfer
    pub fn init_download(&mut self, path: &str) -> FtpResult<()> {
        debug!("Initializing download of {path}");
        self.start_transfer(Command::Retr(path.to_string()))?;
        self.state = TransferState::Downloading;
        Ok(())
    }

    /// Read from the open download into `dest`.
    ///
    /// With `amount` set at most that many bytes are read; otherwise everything is read
    /// until the server closes the data connection. The download is over, and the client
    /// back to idle, after an unbounded read or after a bounded read returning `0`;
    /// the completion reply may be `226` or `250`. An `amount` of `Some(0)` reads
    /// nothing and leaves the download open.
    /// Returns `0` if no download is in progress.
    pub fn download_data<S>(&mut self, dest: &mut S, amount: Option<usize>) -> usize
    where
        S: Sink + ?Sized,
    {
        if self.state != TransferState::Downloading {
            trace!("no download in progress");
            return 0;
        }
        if amount == Some(0) {
            return 0;
        }
        let Some(data) = self.data.as_mut() else {
            return 0;
        };
        let read = match amount {
            Some(amount) => data.read_up_to(dest, amount),
            None => data.read_all(dest),
        };
        trace!("{read} bytes downloaded");
        if amount.is_none() || read == 0 {
            debug!("Download finished");
            if let Err(err) = self.finish_transfer() {
                error!("download not acknowledged: {err}");
            }
        }
        read
    }

    /// Download the whole file at `path`
    pub fn download_singleshot(&mut self, path: &str) -> FtpResult<Vec<u8>> {
        debug!("Retrieving {path}");
        let mut buf = Vec::new();
        self.transfer_into(Command::Retr(path.to_string()), &mut buf)?;
        Ok(buf)
    }

    /// Download the file at `path` into `dest`, returning the amount of bytes stored.
    ///
    /// A file larger than `dest` makes the server report an aborted transfer.
    pub fn download_singleshot_into(&mut self, path: &str, dest: &mut [u8]) -> FtpResult<usize> {
        debug!("Retrieving {path} into a {} bytes buffer", dest.len());
        let mut sink = SliceSink::new(dest);
        self.transfer_into(Command::Retr(path.to_string()), &mut sink)
    }

    // -- files

    /// Rename `from` to `to`
    pub fn rename(&mut self, from: &str, to: &str) -> FtpResult<()> {
        debug!("Renaming '{from}' to '{to}'");
        self.command(Command::RenameFrom(from.to_string()), Status::RequestFilePending)?;
        self.command(Command::RenameTo(to.to_string()), Status::RequestedFileActionOk)
            .map(|_| ())
    }

    pub fn delete_file(&mut self, path: &str) -> FtpResult<()> {
        debug!("Removing file {path}");
        self.command(Command::Dele(path.to_string()), Status::RequestedFileActionOk)
            .map(|_| ())
    }

    /// Size in bytes of the file at `path`
    pub fn file_size(&mut self, path: &str) -> FtpResult<usize> {
        debug!("Getting file size for {path}");
        let response = self.command(Command::Size(path.to_string()), Status::File)?;
        let size = SIZE_RE
            .captures(&response.message)
            .and_then(|caps| caps[1].parse::<usize>().ok());
        size.ok_or(FtpError::BadResponse(response))
    }

    /// Last modification time of the file at `path`
    pub fn mdtm(&mut self, path: &str) -> FtpResult<NaiveDateTime> {
        debug!("Getting modification time for {path}");
        let response = self.command(Command::Mdtm(path.to_string()), Status::File)?;
        let bad = || FtpError::BadResponse(response.clone());
        let caps = MDTM_RE.captures(&response.message).ok_or_else(bad)?;
        let field = |i: usize| caps[i].parse::<u32>().map_err(|_| bad());
        let year = caps[1].parse::<i32>().map_err(|_| bad())?;
        let date = NaiveDate::from_ymd_opt(year, field(2)?, field(3)?).ok_or_else(bad)?;
        let time = NaiveTime::from_hms_opt(field(4)?, field(5)?, field(6)?).ok_or_else(bad)?;
        Ok(NaiveDateTime::new(date, time))
    }

    /// Operating system of the server, as reported by `SYST`
    pub fn system_info(&mut self) -> FtpResult<String> {
        debug!("Getting system info");
        self.command(Command::Syst, Status::Name)
            .map(|response| response.message)
    }

    /// Set the representation used for transfers
    pub fn transfer_type(&mut self, transfer_type: TransferType) -> FtpResult<()> {
        debug!("Setting transfer type {transfer_type:?}");
        self.command(Command::Type(transfer_type), Status::CommandOk)
            .map(|_| ())
    }

    // -- directories

    pub fn mkdir(&mut self, path: &str) -> FtpResult<()> {
        debug!("Creating directory at {path}");
        self.command(Command::Mkd(path.to_string()), Status::PathCreated)
            .map(|_| ())
    }

    /// Change the working directory
    pub fn cwd(&mut self, path: &str) -> FtpResult<()> {
        debug!("Changing working directory to {path}");
        self.command(Command::Cwd(path.to_string()), Status::RequestedFileActionOk)
            .map(|_| ())
    }

    /// Remove the empty directory at `path`
    pub fn rmdir(&mut self, path: &str) -> FtpResult<()> {
        debug!("Removing directory {path}");
        self.command(Command::Rmd(path.to_string()), Status::RequestedFileActionOk)
            .map(|_| ())
    }

    /// Current working directory
    pub fn pwd(&mut self) -> FtpResult<String> {
        debug!("Getting working directory");
        let response = self.command(Command::Pwd, Status::PathCreated)?;
        let body = response.message.as_str();
        match (body.find('"'), body.rfind('"')) {
            (Some(begin), Some(end)) if begin < end => Ok(body[begin + 1..end].to_string()),
            _ => Err(FtpError::BadResponse(response)),
        }
    }

    /// Create `path` along with its missing parents; existing directories are left untouched
    pub fn mktree(&mut self, path: &str) -> FtpResult<()> {
        self.check_idle()?;
        tree::mktree(self, path)
    }

    /// Remove `path` and everything below it. The root directory is emptied but kept
    pub fn rmtree(&mut self, path: &str) -> FtpResult<()> {
        self.check_idle()?;
        tree::rmtree(self, path)
    }

    // -- listing

    /// List `dir` (the working directory if `None`) in the requested format
    pub fn list(&mut self, dir: Option<&str>, format: ListFormat) -> FtpResult<Vec<String>> {
        debug!("Listing {} as {format:?}", dir.unwrap_or("working directory"));
        let dir = dir.map(str::to_string);
        let command = match format {
            ListFormat::Human => Command::List(dir),
            ListFormat::Machine => Command::Mlsd(dir),
            ListFormat::Simple => Command::Nlst(dir),
        };
        let mut buf = Vec::new();
        self.transfer_into(command, &mut buf)?;
        Ok(list::lines(&buf))
    }

    /// Machine-readable listing of `dir`; lines which can't be parsed are skipped
    pub fn mlsd(&mut self, dir: Option<&str>) -> FtpResult<Vec<ListingEntry>> {
        let lines = self.list(dir, ListFormat::Machine)?;
        let mut entries = Vec::with_capacity(lines.len());
        for line in lines {
            match ListingEntry::from_mlsd_line(&line) {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {}
                Err(err) => warn!("skipping MLSD line '{line}': {err}"),
            }
        }
        Ok(entries)
    }

    /// Names in `dir`, as returned by the server
    pub fn nlst(&mut self, dir: Option<&str>) -> FtpResult<Vec<String>> {
        self.list(dir, ListFormat::Simple)
    }

    // -- private

    fn check_idle(&self) -> FtpResult<()> {
        if self.state == TransferState::Idle {
            Ok(())
        } else {
            error!("operation refused: {:?} transfer in progress", self.state);
            Err(FtpError::Busy)
        }
    }

    /// Control command allowed only while no transfer is open
    fn command(&mut self, command: Command, expected: Status) -> FtpResult<Response> {
        self.check_idle()?;
        self.control.send(command, expected)
    }

    /// Negotiate a passive data connection and issue `command` over it
    fn start_transfer(&mut self, command: Command) -> FtpResult<()> {
        self.check_idle()?;
        if self.data.is_some() {
            return Err(FtpError::Busy);
        }
        let data = self.open_data_channel(&command)?;
        self.data = Some(data);
        Ok(())
    }

    fn open_data_channel(&mut self, command: &Command) -> FtpResult<DataChannel<T>> {
        command.validate()?;
        let transport = (self.transport_builder)();
        let data = DataChannel::open_passive(&mut self.control, transport, self.data_timeout)?;
        match self.control.send_in(command.clone(), &TRANSFER_START) {
            Ok(_) => Ok(data),
            Err(err) => {
                data.close();
                Err(err)
            }
        }
    }

    /// Close the data connection and read the completion reply
    fn finish_transfer(&mut self) -> FtpResult<()> {
        if let Some(data) = self.data.take() {
            data.close();
        }
        self.state = TransferState::Idle;
        self.control.expect_in(&TRANSFER_DONE).map(|_| ())
    }

    /// Run a whole download-like transfer, storing the received bytes in `sink`
    fn transfer_into<S>(&mut self, command: Command, sink: &mut S) -> FtpResult<usize>
    where
        S: Sink + ?Sized,
    {
        self.check_idle()?;
        let mut data = self.open_data_channel(&command)?;
        let read = data.read_all(sink);
        data.close();
        self.control.expect_in(&TRANSFER_DONE)?;
        Ok(read)
    }
}

impl<T> DirectoryOps for ImplFtpClient<T>
where
    T: Transport,
{
    fn list_names(&mut self, dir: Option<&str>) -> FtpResult<Vec<String>> {
        self.nlst(dir)
    }

    fn list_entries(&mut self, dir: &str) -> FtpResult<Vec<ListingEntry>> {
        self.mlsd(Some(dir))
    }

    fn make_dir(&mut self, path: &str) -> FtpResult<()> {
        self.mkdir(path)
    }

    fn remove_dir(&mut self, path: &str) -> FtpResult<()> {
        self.rmdir(path)
    }

    fn remove_file(&mut self, path: &str) -> FtpResult<()> {
        self.delete_file(path)
    }
}
