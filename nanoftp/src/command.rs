//! # Command
//!
//! The set of FTP commands issued by the engine

use std::fmt;

use crate::types::{FtpError, FtpResult, TransferType};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Ftp commands with their arguments
pub enum Command {
    /// Append to file
    Appe(String),
    /// Change working directory
    Cwd(String),
    /// Remove file at specified path
    Dele(String),
    /// List entries at specified path. If path is not provided list entries at current working directory
    List(Option<String>),
    /// Get modification time for file at specified path
    Mdtm(String),
    /// Make directory
    Mkd(String),
    /// Machine-readable listing of the directory at specified path
    Mlsd(Option<String>),
    /// Get the list of file names at specified path. If path is not provided list entries at current working directory
    Nlst(Option<String>),
    /// Provide login password
    Pass(String),
    /// Passive mode
    Pasv,
    /// Print working directory
    Pwd,
    /// Quit
    Quit,
    /// Select file to rename
    RenameFrom(String),
    /// Rename selected file to
    RenameTo(String),
    /// Retrieve file
    Retr(String),
    /// Remove directory
    Rmd(String),
    /// Get file size of specified path
    Size(String),
    /// Put file at specified path
    Store(String),
    /// Get the system type
    Syst,
    /// Set transfer type
    Type(TransferType),
    /// Provide user to login as
    User(String),
}

impl Command {
    /// The command verb as sent on the wire
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Appe(_) => "APPE",
            Self::Cwd(_) => "CWD",
            Self::Dele(_) => "DELE",
            Self::List(_) => "LIST",
            Self::Mdtm(_) => "MDTM",
            Self::Mkd(_) => "MKD",
            Self::Mlsd(_) => "MLSD",
            Self::Nlst(_) => "NLST",
            Self::Pass(_) => "PASS",
            Self::Pasv => "PASV",
            Self::Pwd => "PWD",
            Self::Quit => "QUIT",
            Self::RenameFrom(_) => "RNFR",
            Self::RenameTo(_) => "RNTO",
            Self::Retr(_) => "RETR",
            Self::Rmd(_) => "RMD",
            Self::Size(_) => "SIZE",
            Self::Store(_) => "STOR",
            Self::Syst => "SYST",
            Self::Type(_) => "TYPE",
            Self::User(_) => "USER",
        }
    }

    /// The command argument, if any
    pub fn argument(&self) -> Option<String> {
        match self {
            Self::Appe(p)
            | Self::Cwd(p)
            | Self::Dele(p)
            | Self::Mdtm(p)
            | Self::Mkd(p)
            | Self::Pass(p)
            | Self::RenameFrom(p)
            | Self::RenameTo(p)
            | Self::Retr(p)
            | Self::Rmd(p)
            | Self::Size(p)
            | Self::Store(p)
            | Self::User(p) => Some(p.clone()),
            Self::List(p) | Self::Mlsd(p) | Self::Nlst(p) => p.clone(),
            Self::Type(t) => Some(t.to_string()),
            Self::Pasv | Self::Pwd | Self::Quit | Self::Syst => None,
        }
    }

    /// Make sure the argument can't break the line framing
    pub fn validate(&self) -> FtpResult<()> {
        match self.argument() {
            Some(arg) if arg.contains(['\r', '\n']) => Err(FtpError::InvalidArgument(format!(
                "{} argument contains a line terminator",
                self.verb()
            ))),
            _ => Ok(()),
        }
    }

    /// Line to print in logs; secrets are masked
    pub fn log_line(&self) -> String {
        match self {
            Self::Pass(_) => "PASS ******".to_string(),
            cmd => cmd.to_string().trim_end_matches("\r\n").to_string(),
        }
    }
}

// -- stringify

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.argument() {
            Some(arg) => write!(f, "{} {}\r\n", self.verb(), arg),
            None => write!(f, "{}\r\n", self.verb()),
        }
    }
}
