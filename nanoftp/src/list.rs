//! # List
//!
//! Parsers for directory listings: `MLSD` entries and `NLST` names.
//!
//! An `MLSD` line is a list of `key=value;` facts followed by a space and the entry name:
//!
//! ```text
//! type=file;size=12345;modify=20231015093000; file.txt
//! ```
//!
//! ```rust
//! use nanoftp::list::{EntryKind, ListingEntry};
//!
//! let entry = ListingEntry::from_mlsd_line("type=dir;modify=20231015093000; docs")
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(entry.kind, EntryKind::Directory);
//! assert_eq!(entry.name, "docs");
//! ```

use std::fmt;

use thiserror::Error;

/// Kind of a listed entry
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum EntryKind {
    Directory,
    /// Anything which is not a directory: regular files, links, devices
    File,
}

impl EntryKind {
    pub fn is_directory(&self) -> bool {
        matches!(self, EntryKind::Directory)
    }

    pub fn is_file(&self) -> bool {
        matches!(self, EntryKind::File)
    }
}

/// One entry of a machine-readable listing
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ListingEntry {
    pub kind: EntryKind,
    /// Entry name, relative to the listed directory
    pub name: String,
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ParseError {
    #[error("syntax error: invalid line")]
    SyntaxError,
    #[error("entry has no name")]
    MissingName,
}

impl ListingEntry {
    pub fn new(kind: EntryKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Parse an `MLSD` line.
    ///
    /// Returns `Ok(None)` for the entries describing the listed directory itself (`type=cdir`)
    /// or its parent (`type=pdir`).
    pub fn from_mlsd_line(line: &str) -> Result<Option<Self>, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (facts, name) = line.split_once(' ').ok_or(ParseError::SyntaxError)?;
        if name.is_empty() {
            return Err(ParseError::MissingName);
        }
        let mut kind = EntryKind::File;
        for fact in facts.split(';').filter(|fact| !fact.is_empty()) {
            let (key, value) = fact.split_once('=').ok_or(ParseError::SyntaxError)?;
            if !key.eq_ignore_ascii_case("type") {
                continue;
            }
            if value.eq_ignore_ascii_case("dir") {
                kind = EntryKind::Directory;
            } else if value.eq_ignore_ascii_case("cdir") || value.eq_ignore_ascii_case("pdir") {
                return Ok(None);
            }
        }
        Ok(Some(Self::new(kind, name)))
    }
}

impl fmt::Display for ListingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EntryKind::Directory => write!(f, "{}/", self.name),
            EntryKind::File => write!(f, "{}", self.name),
        }
    }
}

/// Name of an `NLST` entry.
///
/// Servers may prefix the names with the listed path; only the last segment is kept.
pub fn nlst_name(line: &str) -> &str {
    let line = line.trim_end_matches(['\r', '\n']).trim_end_matches('/');
    line.rsplit('/').next().unwrap_or(line)
}

/// Split a listing buffer into lines, dropping terminators and empty lines
pub fn lines(buf: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(buf)
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
