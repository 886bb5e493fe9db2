//! In-memory FTP backend for unit tests.
//!
//! [`MemoryFs`] is the shared server-side tree; each [`MemoryFtp`] is one
//! control connection over it with its own working directory. Every call
//! that reaches the backend is appended to `MemoryFs::calls`.

use crate::ftp::error::{FtpError, FtpErrorKind, FtpResult};
use crate::ftp::primitives::{FtpConnector, FtpPrimitives};
use crate::ftp::session::FtpSession;
use crate::ftp::types::{FtpConnectionConfig, FtpResponse};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use webfuse_core::WebfuseConfig;

pub const USER: &str = "user";
pub const PASSWORD: &str = "secret";

#[derive(Debug, Clone)]
pub enum MemoryNode {
    Dir,
    File(Vec<u8>),
    /// Symbolic link; the target is resolved relative to the link's parent.
    Link(String),
}

#[derive(Debug)]
pub struct MemoryFs {
    /// Absolute `/`-separated paths; the root is implicit.
    pub nodes: BTreeMap<String, MemoryNode>,
    pub system: String,
    pub calls: Vec<String>,
    pub connections: u32,
    pub passive: bool,
    pub quit_received: bool,
    pub refuse_connections: bool,
    /// Next call fails as if the server hung up.
    pub drop_connection: bool,
    /// Paths whose `RETR`/`STOR` fails.
    pub failing_transfers: Vec<String>,
    /// `PASV`/`PORT` mode switches are rejected.
    pub refuse_mode_switch: bool,
}

pub type SharedFs = Arc<Mutex<MemoryFs>>;

impl MemoryFs {
    pub fn shared() -> SharedFs {
        Arc::new(Mutex::new(Self {
            nodes: BTreeMap::new(),
            system: "UNIX Type: L8".into(),
            calls: Vec::new(),
            connections: 0,
            passive: true,
            quit_received: false,
            refuse_connections: false,
            drop_connection: false,
            failing_transfers: Vec::new(),
            refuse_mode_switch: false,
        }))
    }

    pub fn add_dir(&mut self, path: &str) {
        let path = normalize("/", path);
        for ancestor in ancestors(&path) {
            self.nodes.insert(ancestor, MemoryNode::Dir);
        }
    }

    pub fn add_file(&mut self, path: &str, content: &[u8]) {
        let path = normalize("/", path);
        self.add_dir(&parent(&path));
        self.nodes.insert(path, MemoryNode::File(content.to_vec()));
    }

    pub fn add_link(&mut self, path: &str, target: &str) {
        let path = normalize("/", path);
        self.add_dir(&parent(&path));
        self.nodes.insert(path, MemoryNode::Link(target.to_string()));
    }

    /// Follow links along `path` the way a server resolves it.
    fn resolve(&self, path: &str) -> String {
        let mut current = "/".to_string();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let mut next = normalize(&current, segment);
            let mut hops = 0;
            while let Some(MemoryNode::Link(target)) = self.nodes.get(&next) {
                hops += 1;
                if hops > 8 {
                    break;
                }
                next = normalize(&parent(&next), target);
            }
            current = next;
        }
        current
    }

    pub fn is_dir(&self, path: &str) -> bool {
        let resolved = self.resolve(path);
        resolved == "/" || matches!(self.nodes.get(&resolved), Some(MemoryNode::Dir))
    }

    pub fn exists(&self, path: &str) -> bool {
        path == "/" || self.nodes.contains_key(path)
    }

    pub fn file(&self, path: &str) -> Option<&[u8]> {
        match self.nodes.get(&self.resolve(path)) {
            Some(MemoryNode::File(data)) => Some(data),
            _ => None,
        }
    }

    /// Direct children of `dir` as `(name, node)`.
    pub fn children(&self, dir: &str) -> Vec<(String, MemoryNode)> {
        let dir = self.resolve(dir);
        let prefix = if dir == "/" { "/".to_string() } else { format!("{}/", dir) };
        self.nodes
            .iter()
            .filter_map(|(path, node)| {
                let rest = path.strip_prefix(&prefix)?;
                if rest.is_empty() || rest.contains('/') {
                    None
                } else {
                    Some((rest.to_string(), node.clone()))
                }
            })
            .collect()
    }

    /// Every path at or below `dir`.
    pub fn subtree(&self, dir: &str) -> Vec<String> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.nodes
            .keys()
            .filter(|p| p.as_str() == dir || p.starts_with(&prefix))
            .cloned()
            .collect()
    }
}

fn ancestors(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        current.push('/');
        current.push_str(segment);
        out.push(current.clone());
    }
    out
}

fn parent(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

/// Resolve `path` against `cwd`, folding `.` and `..`.
pub fn normalize(cwd: &str, path: &str) -> String {
    let path = path.replace('\\', "/");
    let joined = if path.starts_with('/') { path } else { format!("{}/{}", cwd, path) };
    let mut stack: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            s => stack.push(s),
        }
    }
    format!("/{}", stack.join("/"))
}

fn not_found(path: &str) -> FtpError {
    FtpError::from_reply(550, &format!("{}: No such file or directory", path))
}

fn list_line(name: &str, node: &MemoryNode) -> String {
    match node {
        MemoryNode::Dir => format!("drwxr-xr-x 2 owner group 4096 Jan 1 00:00 {}", name),
        MemoryNode::File(data) => {
            format!("-rw-r--r-- 1 owner group {} Jan 1 00:00 {}", data.len(), name)
        }
        MemoryNode::Link(target) => {
            format!("lrwxrwxrwx 1 owner group {} Jan 1 00:00 {} -> {}", target.len(), name, target)
        }
    }
}

/// One control connection over a [`MemoryFs`].
pub struct MemoryFtp {
    fs: SharedFs,
    cwd: String,
    logged_in: bool,
}

impl MemoryFtp {
    fn enter(&self, call: String, needs_login: bool) -> FtpResult<std::sync::MutexGuard<'_, MemoryFs>> {
        let mut fs = self.fs.lock().map_err(|_| FtpError::protocol_error("poisoned"))?;
        fs.calls.push(call);
        if fs.drop_connection {
            return Err(FtpError::new(FtpErrorKind::NotConnected, "Server closed connection"));
        }
        if needs_login && !self.logged_in {
            return Err(FtpError::from_reply(530, "Please login with USER and PASS"));
        }
        Ok(fs)
    }
}

#[async_trait]
impl FtpPrimitives for MemoryFtp {
    async fn login(&mut self, username: &str, password: &str) -> FtpResult<()> {
        self.enter(format!("USER {}", username), false)?;
        if username == USER && password == PASSWORD {
            self.logged_in = true;
            Ok(())
        } else {
            Err(FtpError::auth_failed("Login incorrect").with_code(530))
        }
    }

    async fn system_type(&mut self) -> FtpResult<String> {
        let fs = self.enter("SYST".into(), false)?;
        Ok(fs.system.clone())
    }

    async fn set_passive(&mut self, passive: bool) -> FtpResult<()> {
        let mut fs = self.enter(format!("PASV {}", passive), true)?;
        if fs.refuse_mode_switch {
            return Err(FtpError::command_rejected(502, "Command not implemented"));
        }
        fs.passive = passive;
        Ok(())
    }

    async fn pwd(&mut self) -> FtpResult<String> {
        self.enter("PWD".into(), true)?;
        Ok(self.cwd.clone())
    }

    async fn chdir(&mut self, path: &str) -> FtpResult<()> {
        let target = normalize(&self.cwd, path);
        let fs = self.enter(format!("CWD {}", target), true)?;
        if !fs.is_dir(&target) {
            return Err(not_found(path));
        }
        drop(fs);
        self.cwd = target;
        Ok(())
    }

    async fn cdup(&mut self) -> FtpResult<()> {
        self.enter("CDUP".into(), true)?;
        self.cwd = parent(&self.cwd);
        Ok(())
    }

    async fn mkdir(&mut self, path: &str) -> FtpResult<String> {
        let target = normalize(&self.cwd, path);
        let mut fs = self.enter(format!("MKD {}", target), true)?;
        if fs.exists(&target) {
            return Err(FtpError::from_reply(550, &format!("{}: File exists", path)));
        }
        if !fs.is_dir(&parent(&target)) {
            return Err(not_found(path));
        }
        fs.nodes.insert(target.clone(), MemoryNode::Dir);
        Ok(target)
    }

    async fn rmdir(&mut self, path: &str) -> FtpResult<()> {
        let target = normalize(&self.cwd, path);
        let in_use = self.cwd == target || self.cwd.starts_with(&format!("{}/", target));
        let mut fs = self.enter(format!("RMD {}", target), true)?;
        if !fs.is_dir(&target) || target == "/" {
            return Err(not_found(path));
        }
        if in_use {
            return Err(FtpError::from_reply(550, &format!("{}: Directory is in use", path)));
        }
        if !fs.children(&target).is_empty() {
            return Err(FtpError::from_reply(550, &format!("{}: Directory not empty", path)));
        }
        fs.nodes.remove(&target);
        Ok(())
    }

    async fn delete(&mut self, path: &str) -> FtpResult<()> {
        let target = normalize(&self.cwd, path);
        let mut fs = self.enter(format!("DELE {}", target), true)?;
        match fs.nodes.get(&target) {
            Some(MemoryNode::File(_) | MemoryNode::Link(_)) => {
                fs.nodes.remove(&target);
                Ok(())
            }
            _ => Err(not_found(path)),
        }
    }

    async fn rename(&mut self, from: &str, to: &str) -> FtpResult<()> {
        let source = normalize(&self.cwd, from);
        let dest = normalize(&self.cwd, to);
        let mut fs = self.enter(format!("RNFR {} RNTO {}", source, dest), true)?;
        if !fs.exists(&source) || source == "/" {
            return Err(not_found(from));
        }
        for old in fs.subtree(&source) {
            if let Some(node) = fs.nodes.remove(&old) {
                let moved = format!("{}{}", dest, &old[source.len()..]);
                fs.nodes.insert(moved, node);
            }
        }
        Ok(())
    }

    async fn size(&mut self, path: &str) -> FtpResult<u64> {
        let target = normalize(&self.cwd, path);
        let fs = self.enter(format!("SIZE {}", target), true)?;
        fs.file(&target)
            .map(|data| data.len() as u64)
            .ok_or_else(|| FtpError::from_reply(550, &format!("{}: not a regular file", path)))
    }

    async fn mdtm(&mut self, path: &str) -> FtpResult<DateTime<Utc>> {
        let target = normalize(&self.cwd, path);
        let fs = self.enter(format!("MDTM {}", target), true)?;
        if fs.file(&target).is_none() {
            return Err(not_found(path));
        }
        Utc.with_ymd_and_hms(2026, 1, 15, 9, 30, 0)
            .single()
            .ok_or_else(|| FtpError::protocol_error("bad timestamp"))
    }

    async fn rawlist(&mut self, path: &str) -> FtpResult<Vec<String>> {
        let target = normalize(&self.cwd, path);
        let fs = self.enter(format!("LIST {}", target), true)?;
        if let Some(data) = fs.file(&target) {
            let name = target.rsplit('/').next().unwrap_or_default();
            return Ok(vec![list_line(name, &MemoryNode::File(data.to_vec()))]);
        }
        if !fs.is_dir(&target) {
            return Err(not_found(path));
        }
        let children = fs.children(&target);
        let mut lines = vec![
            format!("total {}", children.len()),
            list_line(".", &MemoryNode::Dir),
            list_line("..", &MemoryNode::Dir),
        ];
        lines.extend(children.iter().map(|(name, node)| list_line(name, node)));
        Ok(lines)
    }

    async fn nlist(&mut self, path: &str) -> FtpResult<Vec<String>> {
        let target = normalize(&self.cwd, path);
        let fs = self.enter(format!("NLST {}", target), true)?;
        if !fs.is_dir(&target) {
            return Err(not_found(path));
        }
        // Path-prefixed names, as vsftpd answers `NLST <dir>`.
        let prefix = if target == "/" { String::new() } else { target.clone() };
        Ok(fs
            .children(&target)
            .into_iter()
            .map(|(name, _)| format!("{}/{}", prefix, name))
            .collect())
    }

    async fn get(&mut self, remote: &str, local: &Path) -> FtpResult<u64> {
        let target = normalize(&self.cwd, remote);
        let data = {
            let fs = self.enter(format!("RETR {}", target), true)?;
            if fs.failing_transfers.contains(&target) {
                return Err(FtpError::from_reply(451, "Transfer aborted"));
            }
            fs.file(&target).map(<[u8]>::to_vec).ok_or_else(|| not_found(remote))?
        };
        tokio::fs::write(local, &data).await?;
        Ok(data.len() as u64)
    }

    async fn put(&mut self, local: &Path, remote: &str) -> FtpResult<u64> {
        let target = normalize(&self.cwd, remote);
        let data = tokio::fs::read(local).await?;
        let mut fs = self.enter(format!("STOR {}", target), true)?;
        if fs.failing_transfers.contains(&target) {
            return Err(FtpError::from_reply(451, "Transfer aborted"));
        }
        if !fs.is_dir(&parent(&target)) {
            return Err(not_found(remote));
        }
        let len = data.len() as u64;
        fs.nodes.insert(target, MemoryNode::File(data));
        Ok(len)
    }

    async fn chmod(&mut self, mode: u32, path: &str) -> FtpResult<()> {
        let target = normalize(&self.cwd, path);
        let fs = self.enter(format!("SITE CHMOD {:o} {}", mode, target), true)?;
        if fs.exists(&target) {
            Ok(())
        } else {
            Err(not_found(path))
        }
    }

    async fn alloc(&mut self, size: u64) -> FtpResult<FtpResponse> {
        self.enter(format!("ALLO {}", size), true)?;
        Ok(reply(202, &["202 No storage allocation necessary."]))
    }

    async fn raw(&mut self, command: &str) -> FtpResult<FtpResponse> {
        self.enter(command.to_string(), true)?;
        let verb = command.split_whitespace().next().unwrap_or_default().to_uppercase();
        Ok(match verb.as_str() {
            "HELP" => reply(
                214,
                &[
                    "214-The following commands are recognized.",
                    " CWD LIST NLST PWD RETR STOR",
                    "214 Help OK.",
                ],
            ),
            "NOOP" => reply(200, &["200 NOOP ok."]),
            _ => reply(500, &["500 Unknown command."]),
        })
    }

    async fn site(&mut self, args: &str) -> FtpResult<FtpResponse> {
        self.enter(format!("SITE {}", args), true)?;
        Ok(reply(200, &["200 SITE ok."]))
    }

    async fn exec(&mut self, command: &str) -> FtpResult<FtpResponse> {
        self.enter(format!("SITE EXEC {}", command), true)?;
        Err(FtpError::from_reply(500, "SITE EXEC is disabled"))
    }

    async fn quit(&mut self) -> FtpResult<()> {
        let mut fs = self.enter("QUIT".into(), false)?;
        fs.quit_received = true;
        Ok(())
    }
}

fn reply(code: u16, lines: &[&str]) -> FtpResponse {
    FtpResponse {
        code,
        lines: lines.iter().map(|l| l.to_string()).collect(),
    }
}

pub struct MemoryConnector {
    pub fs: SharedFs,
}

#[async_trait]
impl FtpConnector for MemoryConnector {
    async fn open(&self, config: &FtpConnectionConfig) -> FtpResult<Box<dyn FtpPrimitives>> {
        let mut fs = self.fs.lock().map_err(|_| FtpError::protocol_error("poisoned"))?;
        if fs.refuse_connections {
            return Err(FtpError::connection_failed(format!(
                "TCP connect to {}:{}: Connection refused",
                config.host, config.port
            )));
        }
        fs.connections += 1;
        Ok(Box::new(MemoryFtp {
            fs: Arc::clone(&self.fs),
            cwd: "/".into(),
            logged_in: false,
        }))
    }
}

/// Disconnected session over `fs`, staging under a fresh temp root.
pub fn memory_session(fs: &SharedFs) -> (FtpSession, tempfile::TempDir) {
    let root = tempfile::tempdir().expect("temp root");
    let app = WebfuseConfig::from_root(root.path());
    let connector = Arc::new(MemoryConnector { fs: Arc::clone(fs) });
    (FtpSession::with_connector(&app, connector), root)
}

/// Authenticated session over `fs`.
pub async fn logged_in_session(fs: &SharedFs) -> (FtpSession, tempfile::TempDir) {
    let (mut session, root) = memory_session(fs);
    session.connect("memory", 21, 5).await.expect("connect");
    session.login(USER, PASSWORD, true).await.expect("login");
    (session, root)
}
