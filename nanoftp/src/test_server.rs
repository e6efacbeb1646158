//! # Test server
//!
//! In-memory transports for unit tests: [`ByteTransport`] replays canned bytes,
//! [`MockServer`] answers FTP commands against a virtual file system.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::client::ImplFtpClient;
use crate::transport::Transport;

/// Transport replaying the bytes it is fed and recording what is written to it
#[derive(Debug)]
pub struct ByteTransport {
    input: VecDeque<u8>,
    output: Vec<u8>,
    connected: bool,
    write_limit: Option<usize>,
    replies: VecDeque<Vec<u8>>,
}

impl ByteTransport {
    pub fn new(input: &[u8]) -> Self {
        Self {
            input: input.iter().copied().collect(),
            output: Vec::new(),
            connected: true,
            write_limit: None,
            replies: VecDeque::new(),
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.input.extend(bytes);
    }

    /// Queue `reply`; it becomes readable once the next full line is written
    pub fn reply_on_write(&mut self, reply: &[u8]) {
        self.replies.push_back(reply.to_vec());
    }

    /// Peer hang up; bytes already fed can still be read
    pub fn disconnect(&mut self) {
        self.connected = false;
    }

    pub fn written(&self) -> &[u8] {
        &self.output
    }

    /// Stop accepting bytes once `limit` bytes have been written
    pub fn set_write_limit(&mut self, limit: Option<usize>) {
        self.write_limit = limit;
    }
}

impl Transport for ByteTransport {
    fn connect(&mut self, _host: &str, _port: u16, _timeout: Duration) -> io::Result<()> {
        self.connected = true;
        Ok(())
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.input.pop_front()
    }

    fn available(&mut self) -> bool {
        !self.input.is_empty()
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        if !self.connected {
            return 0;
        }
        let room = self
            .write_limit
            .map(|limit| limit.saturating_sub(self.output.len()))
            .unwrap_or(buf.len());
        let amount = room.min(buf.len());
        self.output.extend_from_slice(&buf[..amount]);
        if amount > 0 && self.output.ends_with(b"\n") {
            if let Some(reply) = self.replies.pop_front() {
                self.input.extend(reply);
            }
        }
        amount
    }

    fn is_connected(&mut self) -> bool {
        self.connected
    }

    fn close(&mut self) {
        self.connected = false;
    }
}

pub const CONTROL_PORT: u16 = 21;
const FIRST_DATA_PORT: u16 = 51256;
const MODIFY: &str = "20230201111632";

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
}

#[derive(Debug)]
enum Transfer {
    Upload { path: String, append: bool },
    Download,
}

#[derive(Debug)]
struct DataConn {
    port: u16,
    client_open: bool,
    server_closed: bool,
    to_client: VecDeque<u8>,
    from_client: Vec<u8>,
    transfer: Option<Transfer>,
}

#[derive(Debug)]
struct ServerState {
    fs: BTreeMap<String, Node>,
    cwd: String,
    control_open: bool,
    to_client: VecDeque<u8>,
    from_client: Vec<u8>,
    user: Option<String>,
    logged_in: bool,
    rename_from: Option<String>,
    passive_port: Option<u16>,
    next_port: u16,
    data: Option<DataConn>,
    commands: Vec<String>,
    mute: bool,
    forced: HashMap<String, String>,
}

/// Scripted FTP server with a virtual file system.
///
/// Cloning shares the server; transports obtained from it talk to the same state.
#[derive(Debug, Clone)]
pub struct MockServer {
    state: Arc<Mutex<ServerState>>,
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockServer {
    pub fn new() -> Self {
        let mut fs = BTreeMap::new();
        fs.insert(String::from("/"), Node::Dir);
        Self {
            state: Arc::new(Mutex::new(ServerState {
                fs,
                cwd: String::from("/"),
                control_open: false,
                to_client: VecDeque::new(),
                from_client: Vec::new(),
                user: None,
                logged_in: false,
                rename_from: None,
                passive_port: None,
                next_port: FIRST_DATA_PORT,
                data: None,
                commands: Vec::new(),
                mute: false,
                forced: HashMap::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap()
    }

    pub fn with_file(self, path: &str, content: &[u8]) -> Self {
        {
            let mut state = self.state();
            state.make_parents(path);
            state
                .fs
                .insert(path.to_string(), Node::File(content.to_vec()));
        }
        self
    }

    pub fn with_dir(self, path: &str) -> Self {
        {
            let mut state = self.state();
            state.make_parents(path);
            state.fs.insert(path.to_string(), Node::Dir);
        }
        self
    }

    pub fn control(&self) -> MockTransport {
        MockTransport {
            server: self.clone(),
            role: Role::Control,
            connected: false,
        }
    }

    pub fn data(&self) -> MockTransport {
        MockTransport {
            server: self.clone(),
            role: Role::Data(0),
            connected: false,
        }
    }

    /// Client wired to this server, not connected yet
    pub fn client(&self) -> ImplFtpClient<MockTransport> {
        let server = self.clone();
        ImplFtpClient::with_transports("127.0.0.1", CONTROL_PORT, self.control(), move || {
            server.data()
        })
        .control_timeout(Duration::from_millis(500))
        .data_timeout(Duration::from_millis(500))
    }

    /// Client connected and logged in
    pub fn logged_in_client(&self) -> ImplFtpClient<MockTransport> {
        let mut client = self.client();
        client.connect_with_password("test", "test").unwrap();
        client
    }

    /// Command lines received, in order
    pub fn commands(&self) -> Vec<String> {
        self.state().commands.clone()
    }

    /// Amount of commands received with `verb`
    pub fn count(&self, verb: &str) -> usize {
        self.state()
            .commands
            .iter()
            .filter(|line| line.split(' ').next() == Some(verb))
            .count()
    }

    pub fn clear_commands(&self) {
        self.state().commands.clear();
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        match self.state().fs.get(path) {
            Some(Node::File(content)) => Some(content.clone()),
            _ => None,
        }
    }

    pub fn is_dir(&self, path: &str) -> bool {
        matches!(self.state().fs.get(path), Some(Node::Dir))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.state().fs.contains_key(path)
    }

    /// Stop answering; commands are still recorded
    pub fn set_mute(&self, mute: bool) {
        self.state().mute = mute;
    }

    /// Answer the next `verb` command with `reply` instead of executing it
    pub fn fail_next(&self, verb: &str, reply: &str) {
        self.state()
            .forced
            .insert(verb.to_string(), reply.to_string());
    }
}

impl ServerState {
    fn reply(&mut self, line: &str) {
        self.to_client.extend(line.as_bytes());
        self.to_client.extend(b"\r\n");
    }

    fn receive(&mut self, bytes: &[u8]) {
        self.from_client.extend_from_slice(bytes);
        while let Some(pos) = self.from_client.windows(2).position(|w| w == b"\r\n") {
            let line: Vec<u8> = self.from_client.drain(..pos + 2).collect();
            let line = String::from_utf8_lossy(&line[..pos]).into_owned();
            self.handle(line);
        }
    }

    fn handle(&mut self, line: String) {
        self.commands.push(line.clone());
        if self.mute {
            return;
        }
        let (verb, arg) = match line.split_once(' ') {
            Some((verb, arg)) => (verb.to_ascii_uppercase(), Some(arg)),
            None => (line.to_ascii_uppercase(), None),
        };
        let reply = match self.forced.remove(&verb) {
            Some(reply) => reply,
            None => self.dispatch(&verb, arg),
        };
        self.reply(&reply);
    }

    fn dispatch(&mut self, verb: &str, arg: Option<&str>) -> String {
        match verb {
            "USER" => {
                self.user = arg.map(str::to_string);
                self.logged_in = false;
                String::from("331 Please specify the password.")
            }
            "PASS" if self.user.is_some() && arg != Some("wrong") => {
                self.logged_in = true;
                String::from("230 Login successful.")
            }
            "PASS" => String::from("530 Login incorrect."),
            "QUIT" => {
                self.control_open = false;
                String::from("221 Goodbye.")
            }
            _ if !self.logged_in => String::from("530 Please login with USER and PASS."),
            "SYST" => String::from("215 UNIX Type: L8"),
            "TYPE" => match arg {
                Some("A") => String::from("200 Switching to ASCII mode."),
                Some("I") => String::from("200 Switching to Binary mode."),
                _ => String::from("500 Unrecognised TYPE command."),
            },
            "PWD" => format!("257 \"{}\" is the current directory", self.cwd),
            "PASV" => {
                let port = self.next_port;
                self.next_port += 1;
                self.passive_port = Some(port);
                self.data = None;
                format!(
                    "227 Entering Passive Mode (127,0,0,1,{},{}).",
                    port >> 8,
                    port & 0xff
                )
            }
            "STOR" => self.start_upload(arg, false),
            "APPE" => self.start_upload(arg, true),
            "RETR" => self.start_download(arg),
            "LIST" | "NLST" | "MLSD" => self.start_listing(verb, arg),
            _ => match arg {
                Some(arg) => self.path_command(verb, arg),
                None => String::from("501 Missing argument."),
            },
        }
    }

    fn path_command(&mut self, verb: &str, arg: &str) -> String {
        let path = self.resolve(arg);
        match (verb, self.fs.get(&path)) {
            ("CWD", Some(Node::Dir)) => {
                self.cwd = path;
                String::from("250 Directory successfully changed.")
            }
            ("CWD", _) => String::from("550 Failed to change directory."),
            ("SIZE", Some(Node::File(content))) => format!("213 {}", content.len()),
            ("SIZE", _) => String::from("550 Could not get file size."),
            ("MDTM", Some(Node::File(_))) => format!("213 {MODIFY}"),
            ("MDTM", _) => String::from("550 Could not get file modification time."),
            ("DELE", Some(Node::File(_))) => {
                self.fs.remove(&path);
                String::from("250 Delete operation successful.")
            }
            ("DELE", _) => String::from("550 Delete operation failed."),
            ("MKD", None) if self.is_dir(parent(&path)) => {
                self.fs.insert(path.clone(), Node::Dir);
                format!("257 \"{path}\" created")
            }
            ("MKD", _) => String::from("550 Create directory operation failed."),
            ("RMD", Some(Node::Dir)) if path != "/" && self.children(&path).is_empty() => {
                self.fs.remove(&path);
                String::from("250 Remove directory operation successful.")
            }
            ("RMD", _) => String::from("550 Remove directory operation failed."),
            ("RNFR", Some(_)) => {
                self.rename_from = Some(path);
                String::from("350 Ready for RNTO.")
            }
            ("RNFR", None) => String::from("550 RNFR command failed."),
            ("RNTO", _) => match self.rename_from.take() {
                Some(from) => {
                    self.rename(&from, &path);
                    String::from("250 Rename successful.")
                }
                None => String::from("503 RNFR required first."),
            },
            _ => String::from("502 Command not implemented."),
        }
    }

    fn data_ready(&mut self) -> Option<&mut DataConn> {
        self.data
            .as_mut()
            .filter(|conn| conn.client_open && conn.transfer.is_none())
    }

    fn start_upload(&mut self, arg: Option<&str>, append: bool) -> String {
        let Some(arg) = arg else {
            return String::from("501 Missing argument.");
        };
        let path = self.resolve(arg);
        if !self.is_dir(parent(&path)) || self.is_dir(&path) {
            return String::from("553 Could not create file.");
        }
        match self.data_ready() {
            Some(conn) => {
                conn.transfer = Some(Transfer::Upload { path, append });
                String::from("150 Ok to send data.")
            }
            None => String::from("425 Use PORT or PASV first."),
        }
    }

    fn start_download(&mut self, arg: Option<&str>) -> String {
        let Some(arg) = arg else {
            return String::from("501 Missing argument.");
        };
        let content = match self.fs.get(&self.resolve(arg)) {
            Some(Node::File(content)) => content.clone(),
            _ => return String::from("550 Failed to open file."),
        };
        let len = content.len();
        if self.send_data(content) {
            format!("150 Opening BINARY mode data connection for {arg} ({len} bytes).")
        } else {
            String::from("425 Use PORT or PASV first.")
        }
    }

    fn start_listing(&mut self, verb: &str, arg: Option<&str>) -> String {
        let dir = self.resolve(arg.unwrap_or("."));
        if !self.is_dir(&dir) {
            return String::from("550 Failed to list directory.");
        }
        let mut listing = Vec::new();
        if verb == "MLSD" {
            listing.extend_from_slice(format!("type=cdir;modify={MODIFY}; .\r\n").as_bytes());
            listing.extend_from_slice(format!("type=pdir;modify={MODIFY}; ..\r\n").as_bytes());
        }
        for (name, node) in self.children(&dir) {
            let line = match (verb, node) {
                ("NLST", _) => match arg {
                    Some(arg) => format!("{}/{name}", arg.trim_end_matches('/')),
                    None => name,
                },
                ("MLSD", Node::Dir) => format!("type=dir;modify={MODIFY}; {name}"),
                ("MLSD", Node::File(content)) => {
                    format!("type=file;size={};modify={MODIFY}; {name}", content.len())
                }
                (_, Node::Dir) => format!("drwxr-xr-x 1 ftp ftp 0 Feb 01 11:16 {name}"),
                (_, Node::File(content)) => format!(
                    "-rw-r--r-- 1 ftp ftp {} Feb 01 11:16 {name}",
                    content.len()
                ),
            };
            listing.extend_from_slice(line.as_bytes());
            listing.extend_from_slice(b"\r\n");
        }
        if self.send_data(listing) {
            String::from("150 Here comes the directory listing.")
        } else {
            String::from("425 Use PORT or PASV first.")
        }
    }

    /// Queue `bytes` on the data connection, then close the server side
    fn send_data(&mut self, bytes: Vec<u8>) -> bool {
        match self.data_ready() {
            Some(conn) => {
                conn.to_client.extend(bytes);
                conn.server_closed = true;
                conn.transfer = Some(Transfer::Download);
                true
            }
            None => false,
        }
    }

    /// The client closed the data connection
    fn finish_data(&mut self) {
        let Some(conn) = self.data.take() else {
            return;
        };
        let reply = match conn.transfer {
            Some(Transfer::Download) if conn.to_client.is_empty() => "226 Transfer complete.",
            Some(Transfer::Download) => "426 Failure writing network stream.",
            Some(Transfer::Upload { path, append }) => {
                match self.fs.get_mut(&path) {
                    Some(Node::File(content)) if append => {
                        content.extend_from_slice(&conn.from_client)
                    }
                    _ => {
                        self.fs.insert(path, Node::File(conn.from_client));
                    }
                }
                "226 Transfer complete."
            }
            None => return,
        };
        if !self.mute {
            self.reply(reply);
        }
    }

    fn rename(&mut self, from: &str, to: &str) {
        let moved: Vec<String> = self
            .fs
            .keys()
            .filter(|key| key.as_str() == from || key.starts_with(&format!("{from}/")))
            .cloned()
            .collect();
        for key in moved {
            if let Some(node) = self.fs.remove(&key) {
                self.fs.insert(format!("{to}{}", &key[from.len()..]), node);
            }
        }
    }

    fn resolve(&self, path: &str) -> String {
        let mut segments: Vec<&str> = if path.starts_with('/') {
            Vec::new()
        } else {
            self.cwd.split('/').filter(|s| !s.is_empty()).collect()
        };
        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                segment => segments.push(segment),
            }
        }
        format!("/{}", segments.join("/"))
    }

    fn is_dir(&self, path: &str) -> bool {
        matches!(self.fs.get(path), Some(Node::Dir))
    }

    fn children(&self, dir: &str) -> Vec<(String, Node)> {
        self.fs
            .iter()
            .filter(|(path, _)| path.as_str() != "/" && parent(path) == dir)
            .map(|(path, node)| {
                let name = path.rsplit('/').next().unwrap_or(path).to_string();
                (name, node.clone())
            })
            .collect()
    }

    fn make_parents(&mut self, path: &str) {
        let mut dir = parent(path);
        while dir != "/" {
            self.fs.entry(dir.to_string()).or_insert(Node::Dir);
            dir = parent(dir);
        }
    }
}

fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}

#[derive(Debug, Clone, Copy)]
enum Role {
    Control,
    Data(u16),
}

/// Transport connected to a [`MockServer`]
#[derive(Debug)]
pub struct MockTransport {
    server: MockServer,
    role: Role,
    connected: bool,
}

impl MockTransport {
    fn with_conn<R>(&self, f: impl FnOnce(&mut DataConn) -> R) -> Option<R> {
        let Role::Data(port) = self.role else {
            return None;
        };
        let mut state = self.server.state();
        state
            .data
            .as_mut()
            .filter(|conn| conn.port == port && conn.client_open)
            .map(f)
    }
}

impl Transport for MockTransport {
    fn connect(&mut self, _host: &str, port: u16, _timeout: Duration) -> io::Result<()> {
        let mut state = self.server.state();
        match self.role {
            Role::Control if port == CONTROL_PORT => {
                state.control_open = true;
                state.logged_in = false;
                state.cwd = String::from("/");
                state.to_client.clear();
                state.from_client.clear();
                if !state.mute {
                    state.reply("220 Service ready for new user.");
                }
            }
            Role::Data(_) if state.passive_port == Some(port) => {
                state.passive_port = None;
                state.data = Some(DataConn {
                    port,
                    client_open: true,
                    server_closed: false,
                    to_client: VecDeque::new(),
                    from_client: Vec::new(),
                    transfer: None,
                });
                self.role = Role::Data(port);
            }
            _ => return Err(io::ErrorKind::ConnectionRefused.into()),
        }
        self.connected = true;
        Ok(())
    }

    fn read_byte(&mut self) -> Option<u8> {
        if !self.connected {
            return None;
        }
        match self.role {
            Role::Control => self.server.state().to_client.pop_front(),
            Role::Data(_) => self.with_conn(|conn| conn.to_client.pop_front()).flatten(),
        }
    }

    fn available(&mut self) -> bool {
        if !self.connected {
            return false;
        }
        match self.role {
            Role::Control => !self.server.state().to_client.is_empty(),
            Role::Data(_) => self
                .with_conn(|conn| !conn.to_client.is_empty())
                .unwrap_or(false),
        }
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        if !self.connected {
            return 0;
        }
        match self.role {
            Role::Control => {
                let mut state = self.server.state();
                if !state.control_open {
                    return 0;
                }
                state.receive(buf);
                buf.len()
            }
            Role::Data(_) => self
                .with_conn(|conn| {
                    if conn.server_closed {
                        0
                    } else {
                        conn.from_client.extend_from_slice(buf);
                        buf.len()
                    }
                })
                .unwrap_or(0),
        }
    }

    fn is_connected(&mut self) -> bool {
        if !self.connected {
            return false;
        }
        match self.role {
            Role::Control => {
                let state = self.server.state();
                state.control_open || !state.to_client.is_empty()
            }
            Role::Data(_) => self
                .with_conn(|conn| !conn.server_closed || !conn.to_client.is_empty())
                .unwrap_or(false),
        }
    }

    fn close(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        let mut state = self.server.state();
        match self.role {
            Role::Control => state.control_open = false,
            Role::Data(port) => {
                if state.data.as_ref().is_some_and(|conn| conn.port == port) {
                    state.finish_data();
                }
            }
        }
    }
}
