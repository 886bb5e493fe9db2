//! Authenticated FTP session.
//!
//! [`FtpSession`] owns one control connection and walks the
//! `Disconnected → Connected → Authenticated` lifecycle. Every primitive is
//! reachable through a typed forwarding method that clears the last error
//! before the call and records the failure text afterwards.

use crate::ftp::client::TcpConnector;
use crate::ftp::error::{FtpError, FtpErrorKind, FtpResult};
use crate::ftp::path::PathNormalizer;
use crate::ftp::primitives::{FtpConnector, FtpOperation, FtpPrimitives};
use crate::ftp::types::{FtpConnectionConfig, FtpResponse, FtpSecurityMode, RemoteSystem, SessionState};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;
use webfuse_core::WebfuseConfig;

/// Run one primitive on the open handle with error capture.
macro_rules! forward {
    ($session:ident, $op:expr, |$handle:ident| $call:expr) => {{
        let op = $op;
        let result = match $session.primitive(op) {
            Ok($handle) => $call.await,
            Err(e) => Err(e),
        };
        $session.record(op, result)
    }};
}

pub struct FtpSession {
    pub id: String,
    config: FtpConnectionConfig,
    connector: Arc<dyn FtpConnector>,
    handle: Option<Box<dyn FtpPrimitives>>,
    state: SessionState,
    system: RemoteSystem,
    pub(crate) remote: PathNormalizer,
    pub(crate) local: PathNormalizer,
    last_error: Option<String>,
    staging_dir: PathBuf,
}

impl fmt::Debug for FtpSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FtpSession")
            .field("id", &self.id)
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("state", &self.state)
            .field("system", &self.system)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl FtpSession {
    /// Session over native TCP/TLS connections.
    pub fn new(app: &WebfuseConfig) -> Self {
        Self::with_connector(app, Arc::new(TcpConnector))
    }

    /// Session over any connection backend.
    pub fn with_connector(app: &WebfuseConfig, connector: Arc<dyn FtpConnector>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            config: FtpConnectionConfig::default(),
            connector,
            handle: None,
            state: SessionState::Disconnected,
            system: RemoteSystem::Unix,
            remote: PathNormalizer::default(),
            local: PathNormalizer::local(),
            last_error: None,
            staging_dir: app.staging_dir(),
        }
    }

    /// Replace the connection settings used by [`open`](Self::open) and as
    /// defaults for [`connect`](Self::connect).
    pub fn with_config(mut self, config: FtpConnectionConfig) -> Self {
        self.config = config;
        self
    }

    // ─── Lifecycle ───────────────────────────────────────────────

    /// Open a plain control connection. A no-op when already connected.
    pub async fn connect(&mut self, host: &str, port: u16, timeout_sec: u64) -> FtpResult<()> {
        self.connect_with(host, port, timeout_sec, FtpSecurityMode::None).await
    }

    /// Open an explicit-FTPS control connection (`AUTH TLS`).
    pub async fn secure_connect(&mut self, host: &str, port: u16, timeout_sec: u64) -> FtpResult<()> {
        self.connect_with(host, port, timeout_sec, FtpSecurityMode::Explicit).await
    }

    async fn connect_with(
        &mut self,
        host: &str,
        port: u16,
        timeout_sec: u64,
        security: FtpSecurityMode,
    ) -> FtpResult<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.config.host = host.to_string();
        self.config.port = port;
        self.config.connect_timeout_sec = timeout_sec;
        self.config.security = security;
        self.open_connection().await
    }

    async fn open_connection(&mut self) -> FtpResult<()> {
        self.last_error = None;
        match self.connector.open(&self.config).await {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = SessionState::Connected;
                log::info!(
                    "FTP session {} connected to {}:{}",
                    self.id,
                    self.config.host,
                    self.config.port
                );
                Ok(())
            }
            Err(e) => {
                let e = e.with_operation(FtpOperation::Connect);
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Connect and log in with the stored configuration.
    pub async fn open(&mut self) -> FtpResult<()> {
        if !self.is_connected() {
            self.open_connection().await?;
        }
        let username = self.config.username.clone();
        let password = self.config.password.clone();
        let passive = self.config.data_channel_mode.is_passive();
        self.login(&username, &password, passive).await
    }

    /// Authenticate, then detect the remote system and pick its separator.
    ///
    /// The session only stays `Authenticated` once the data-channel mode has
    /// been applied; when that last step fails it drops back to `Connected`
    /// so a retried login runs the whole sequence again.
    pub async fn login(&mut self, username: &str, password: &str, passive: bool) -> FtpResult<()> {
        match self.state {
            SessionState::Disconnected => {
                let e = FtpError::not_connected().with_operation(FtpOperation::Login);
                self.last_error = Some(e.to_string());
                return Err(e);
            }
            SessionState::Authenticated => return Ok(()),
            SessionState::Connected => {}
        }

        forward!(self, FtpOperation::Login, |h| h.login(username, password))?;
        self.state = SessionState::Authenticated;

        let syst = match self.systype().await {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("SYST failed, assuming a UNIX server: {}", e);
                String::new()
            }
        };
        self.system = RemoteSystem::detect(&syst);
        self.remote = PathNormalizer::for_system(self.system);
        log::debug!(
            "FTP session {} authenticated; remote system {:?} ('{}')",
            self.id,
            self.system,
            syst
        );

        if let Err(e) = self.pasv(passive).await {
            self.state = SessionState::Connected;
            return Err(e);
        }
        Ok(())
    }

    /// Send `QUIT` and reset to `Disconnected`. Close failures are recorded,
    /// never returned.
    pub async fn disconnect(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            self.last_error = None;
            if let Err(e) = handle.quit().await {
                let e = e.with_operation(FtpOperation::Close);
                log::debug!("FTP session {} close failed: {}", self.id, e);
                self.last_error = Some(e.to_string());
            }
            log::info!("FTP session {} disconnected", self.id);
        }
        self.state = SessionState::Disconnected;
    }

    // ─── State ───────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state != SessionState::Disconnected
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// Detected remote system; `Unix` until login.
    pub fn system(&self) -> RemoteSystem {
        self.system
    }

    pub fn remote_paths(&self) -> &PathNormalizer {
        &self.remote
    }

    pub fn local_paths(&self) -> &PathNormalizer {
        &self.local
    }

    pub fn config(&self) -> &FtpConnectionConfig {
        &self.config
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Failure text of the most recent primitive, if it failed.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub(crate) fn ensure_authenticated(&self) -> FtpResult<()> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(FtpError::not_authenticated())
        }
    }

    // ─── Forwarding core ─────────────────────────────────────────

    fn primitive(&mut self, op: FtpOperation) -> FtpResult<&mut Box<dyn FtpPrimitives>> {
        self.last_error = None;
        if self.state != SessionState::Authenticated && !op.allowed_before_login() {
            return Err(FtpError::not_authenticated());
        }
        self.handle.as_mut().ok_or_else(FtpError::not_connected)
    }

    fn record<T>(&mut self, op: FtpOperation, result: FtpResult<T>) -> FtpResult<T> {
        result.map_err(|e| {
            let e = if e.operation.is_none() { e.with_operation(op) } else { e };
            log::debug!("FTP session {}: {}", self.id, e);
            self.last_error = Some(e.to_string());
            if e.kind == FtpErrorKind::NotConnected && self.handle.is_some() {
                log::warn!("FTP session {} lost its control connection", self.id);
                self.handle = None;
                self.state = SessionState::Disconnected;
            }
            e
        })
    }

    // ─── Typed primitives ────────────────────────────────────────

    pub async fn systype(&mut self) -> FtpResult<String> {
        forward!(self, FtpOperation::Systype, |h| h.system_type())
    }

    /// Switch passive (`true`) or active data connections.
    pub async fn pasv(&mut self, passive: bool) -> FtpResult<()> {
        forward!(self, FtpOperation::Pasv, |h| h.set_passive(passive))
    }

    pub async fn pwd(&mut self) -> FtpResult<String> {
        forward!(self, FtpOperation::Pwd, |h| h.pwd())
    }

    pub async fn chdir(&mut self, path: &str) -> FtpResult<()> {
        forward!(self, FtpOperation::Chdir, |h| h.chdir(path))
    }

    pub async fn cdup(&mut self) -> FtpResult<()> {
        forward!(self, FtpOperation::Cdup, |h| h.cdup())
    }

    pub async fn mkdir(&mut self, path: &str) -> FtpResult<String> {
        forward!(self, FtpOperation::Mkdir, |h| h.mkdir(path))
    }

    pub async fn rmdir(&mut self, path: &str) -> FtpResult<()> {
        forward!(self, FtpOperation::Rmdir, |h| h.rmdir(path))
    }

    pub async fn delete(&mut self, path: &str) -> FtpResult<()> {
        forward!(self, FtpOperation::Delete, |h| h.delete(path))
    }

    pub async fn rename(&mut self, from: &str, to: &str) -> FtpResult<()> {
        forward!(self, FtpOperation::Rename, |h| h.rename(from, to))
    }

    pub async fn size(&mut self, path: &str) -> FtpResult<u64> {
        forward!(self, FtpOperation::Size, |h| h.size(path))
    }

    pub async fn mdtm(&mut self, path: &str) -> FtpResult<DateTime<Utc>> {
        forward!(self, FtpOperation::Mdtm, |h| h.mdtm(path))
    }

    pub async fn rawlist(&mut self, path: &str) -> FtpResult<Vec<String>> {
        forward!(self, FtpOperation::Rawlist, |h| h.rawlist(path))
    }

    pub async fn nlist(&mut self, path: &str) -> FtpResult<Vec<String>> {
        forward!(self, FtpOperation::Nlist, |h| h.nlist(path))
    }

    pub async fn get(&mut self, remote: &str, local: &Path) -> FtpResult<u64> {
        forward!(self, FtpOperation::Get, |h| h.get(remote, local))
    }

    pub async fn put(&mut self, local: &Path, remote: &str) -> FtpResult<u64> {
        forward!(self, FtpOperation::Put, |h| h.put(local, remote))
    }

    pub async fn chmod(&mut self, mode: u32, path: &str) -> FtpResult<()> {
        forward!(self, FtpOperation::Chmod, |h| h.chmod(mode, path))
    }

    pub async fn alloc(&mut self, size: u64) -> FtpResult<FtpResponse> {
        forward!(self, FtpOperation::Alloc, |h| h.alloc(size))
    }

    /// Any command; the reply comes back whatever its code.
    pub async fn raw(&mut self, command: &str) -> FtpResult<FtpResponse> {
        forward!(self, FtpOperation::Raw, |h| h.raw(command))
    }

    pub async fn site(&mut self, args: &str) -> FtpResult<FtpResponse> {
        forward!(self, FtpOperation::Site, |h| h.site(args))
    }

    pub async fn exec(&mut self, command: &str) -> FtpResult<FtpResponse> {
        forward!(self, FtpOperation::Exec, |h| h.exec(command))
    }
}

impl Drop for FtpSession {
    fn drop(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };
        let id = self.id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = handle.quit().await {
                        log::debug!("FTP session {} close on drop failed: {}", id, e);
                    }
                });
            }
            Err(_) => log::debug!("FTP session {} dropped outside a runtime without QUIT", id),
        }
    }
}
