//! The native FTP operation set.
//!
//! [`FtpPrimitives`] has one typed method per protocol primitive the tree
//! layer needs. The production implementation is
//! [`FtpClient`](crate::ftp::client::FtpClient); sessions only ever see the
//! trait object, so any backend (including in-memory ones) can be plugged in
//! through an [`FtpConnector`].

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::types::{FtpConnectionConfig, FtpResponse};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Name of a primitive operation; used to label captured errors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum FtpOperation {
    Connect,
    Login,
    Systype,
    Pasv,
    Pwd,
    Chdir,
    Cdup,
    Mkdir,
    Rmdir,
    Delete,
    Rename,
    Size,
    Mdtm,
    Rawlist,
    Nlist,
    Get,
    Put,
    Chmod,
    Alloc,
    Raw,
    Site,
    Exec,
    Close,
}

impl FtpOperation {
    pub const ALL: [FtpOperation; 23] = [
        Self::Connect,
        Self::Login,
        Self::Systype,
        Self::Pasv,
        Self::Pwd,
        Self::Chdir,
        Self::Cdup,
        Self::Mkdir,
        Self::Rmdir,
        Self::Delete,
        Self::Rename,
        Self::Size,
        Self::Mdtm,
        Self::Rawlist,
        Self::Nlist,
        Self::Get,
        Self::Put,
        Self::Chmod,
        Self::Alloc,
        Self::Raw,
        Self::Site,
        Self::Exec,
        Self::Close,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Login => "login",
            Self::Systype => "systype",
            Self::Pasv => "pasv",
            Self::Pwd => "pwd",
            Self::Chdir => "chdir",
            Self::Cdup => "cdup",
            Self::Mkdir => "mkdir",
            Self::Rmdir => "rmdir",
            Self::Delete => "delete",
            Self::Rename => "rename",
            Self::Size => "size",
            Self::Mdtm => "mdtm",
            Self::Rawlist => "rawlist",
            Self::Nlist => "nlist",
            Self::Get => "get",
            Self::Put => "put",
            Self::Chmod => "chmod",
            Self::Alloc => "alloc",
            Self::Raw => "raw",
            Self::Site => "site",
            Self::Exec => "exec",
            Self::Close => "close",
        }
    }

    /// Whether the operation may run before `login` succeeds.
    pub fn allowed_before_login(self) -> bool {
        matches!(self, Self::Login | Self::Systype | Self::Close)
    }
}

impl fmt::Display for FtpOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FtpOperation {
    type Err = FtpError;

    /// Accepts bare names (`chdir`) and `ftp_`-prefixed ones (`ftp_chdir`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let bare = lower.strip_prefix("ftp_").unwrap_or(&lower);
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.name() == bare)
            .ok_or_else(|| FtpError::unsupported(format!("'{}' is not a valid FTP function", s)))
    }
}

/// One open control connection.
#[async_trait]
pub trait FtpPrimitives: Send {
    /// `USER` / `PASS`.
    async fn login(&mut self, username: &str, password: &str) -> FtpResult<()>;
    /// `SYST`, without the reply code.
    async fn system_type(&mut self) -> FtpResult<String>;
    /// Switch between passive and active data connections.
    async fn set_passive(&mut self, passive: bool) -> FtpResult<()>;
    async fn pwd(&mut self) -> FtpResult<String>;
    async fn chdir(&mut self, path: &str) -> FtpResult<()>;
    async fn cdup(&mut self) -> FtpResult<()>;
    /// Returns the created path as reported by the server.
    async fn mkdir(&mut self, path: &str) -> FtpResult<String>;
    async fn rmdir(&mut self, path: &str) -> FtpResult<()>;
    async fn delete(&mut self, path: &str) -> FtpResult<()>;
    async fn rename(&mut self, from: &str, to: &str) -> FtpResult<()>;
    async fn size(&mut self, path: &str) -> FtpResult<u64>;
    async fn mdtm(&mut self, path: &str) -> FtpResult<DateTime<Utc>>;
    /// `LIST`, one string per line.
    async fn rawlist(&mut self, path: &str) -> FtpResult<Vec<String>>;
    /// `NLST`, one name per line.
    async fn nlist(&mut self, path: &str) -> FtpResult<Vec<String>>;
    /// `RETR` into a local file; returns bytes written.
    async fn get(&mut self, remote: &str, local: &Path) -> FtpResult<u64>;
    /// `STOR` from a local file; returns bytes sent.
    async fn put(&mut self, local: &Path, remote: &str) -> FtpResult<u64>;
    /// `SITE CHMOD`.
    async fn chmod(&mut self, mode: u32, path: &str) -> FtpResult<()>;
    /// `ALLO`.
    async fn alloc(&mut self, size: u64) -> FtpResult<FtpResponse>;
    /// Any command; the reply is returned whatever its code.
    async fn raw(&mut self, command: &str) -> FtpResult<FtpResponse>;
    /// `SITE <args>`.
    async fn site(&mut self, args: &str) -> FtpResult<FtpResponse>;
    /// `SITE EXEC <command>`.
    async fn exec(&mut self, command: &str) -> FtpResult<FtpResponse>;
    /// `QUIT` and close the socket.
    async fn quit(&mut self) -> FtpResult<()>;
}

/// Opens control connections for a session.
#[async_trait]
pub trait FtpConnector: Send + Sync {
    async fn open(&self, config: &FtpConnectionConfig) -> FtpResult<Box<dyn FtpPrimitives>>;
}
