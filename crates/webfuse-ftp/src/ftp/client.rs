//! Native FTP client: owns the control connection and issues commands.
//!
//! Lifecycle: `connect()` reads the banner (and runs `AUTH TLS` for
//! explicit FTPS) → `login()` authenticates, protects the data channel and
//! sets TYPE → primitives → `quit()`.

use crate::ftp::connection;
use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::primitives::{FtpConnector, FtpPrimitives};
use crate::ftp::protocol::{parse_quoted_path, FtpCodec};
use crate::ftp::tls;
use crate::ftp::transfer::{self, DataChannelSettings, DataStream};
use crate::ftp::types::{DataChannelMode, FtpConnectionConfig, FtpResponse, FtpSecurityMode, TransferType};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_rustls::TlsConnector;
use uuid::Uuid;

/// A connected FTP control channel.
pub struct FtpClient {
    pub id: String,
    codec: FtpCodec,
    config: FtpConnectionConfig,
    /// Greeting sent by the server on connect.
    pub banner: String,
    mode: DataChannelMode,
    /// `PROT P` is in effect.
    protected: bool,
    /// Shared by the control and data channels so data handshakes can
    /// resume the control session.
    tls: Option<TlsConnector>,
    pub bytes_uploaded: u64,
    pub bytes_downloaded: u64,
}

impl FtpClient {
    /// Open the control connection. Authentication is a separate step.
    pub async fn connect(config: FtpConnectionConfig) -> FtpResult<Self> {
        let connector = match config.security {
            FtpSecurityMode::None => None,
            _ => Some(tls::build_tls_connector(config.accept_invalid_certs)?),
        };
        let (mut codec, banner) = connection::connect(&config, connector.as_ref()).await?;

        // ── Explicit FTPS: AUTH TLS ──────────────────────────────
        if config.security == FtpSecurityMode::Explicit {
            let resp = codec.execute("AUTH TLS").await?;
            if resp.code != 234 {
                return Err(FtpError::tls_failed(format!("AUTH TLS rejected: {}", resp.text())));
            }
            if let Some(connector) = &connector {
                codec = tls::upgrade_to_tls(codec, connector, &config.host).await?;
            }
        }

        let id = Uuid::new_v4().to_string();
        log::info!(
            "FTP control connection {} open to {}:{} ({:?})",
            id,
            config.host,
            config.port,
            config.security
        );
        Ok(Self {
            id,
            codec,
            mode: config.data_channel_mode,
            config,
            banner: banner.text(),
            protected: false,
            tls: connector,
            bytes_uploaded: 0,
            bytes_downloaded: 0,
        })
    }

    pub fn config(&self) -> &FtpConnectionConfig {
        &self.config
    }

    pub fn data_channel_mode(&self) -> DataChannelMode {
        self.mode
    }

    fn settings<'a>(
        config: &'a FtpConnectionConfig,
        mode: DataChannelMode,
        tls: Option<&'a TlsConnector>,
    ) -> DataChannelSettings<'a> {
        DataChannelSettings {
            mode,
            host: &config.host,
            tls,
            timeout: Duration::from_secs(config.data_timeout_sec.max(1)),
            active_bind: config.active_bind_address.as_deref(),
        }
    }

    // ─── Data channel helper ─────────────────────────────────────

    /// Open a data channel and issue `cmd` over the control channel.
    ///
    /// Returns the connected stream and whether a completion reply is still
    /// pending (the server answered 1xx rather than 2xx).
    async fn open_transfer(&mut self, cmd: &str) -> FtpResult<(DataStream, bool)> {
        let protected = self.protected;
        let tls = self.tls.as_ref().filter(|_| protected);
        let settings = Self::settings(&self.config, self.mode, tls);
        let pending = transfer::prepare_data_channel(&mut self.codec, &settings).await?;
        let resp = self.codec.execute(cmd).await?;
        if !resp.is_preliminary() && !resp.is_completion() {
            return Err(FtpError::from_reply(resp.code, &resp.text()));
        }
        let stream = transfer::finish_data_channel(pending, &settings).await?;
        Ok((stream, resp.is_preliminary()))
    }

    /// Read the 226 that closes a transfer.
    async fn finish_transfer(&mut self, awaiting_reply: bool) -> FtpResult<()> {
        if !awaiting_reply {
            return Ok(());
        }
        let done = self.codec.read_response().await?;
        if !done.is_completion() {
            return Err(FtpError::from_reply(done.code, &done.text()));
        }
        Ok(())
    }

    /// Generic helper: run a data command and collect the body as lines.
    async fn retrieve_lines(&mut self, cmd: &str) -> FtpResult<Vec<String>> {
        let (mut stream, awaiting) = self.open_transfer(cmd).await?;
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await?;
        drop(stream);
        self.finish_transfer(awaiting).await?;
        self.bytes_downloaded += buf.len() as u64;

        // Listing bytes are not guaranteed to be UTF-8.
        Ok(String::from_utf8_lossy(&buf)
            .lines()
            .map(|l| l.trim_end_matches('\r').to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    fn path_arg(cmd: &str, path: &str) -> String {
        if path.is_empty() {
            cmd.to_string()
        } else {
            format!("{} {}", cmd, path)
        }
    }
}

// ─── Primitive operations ────────────────────────────────────────────

#[async_trait]
impl FtpPrimitives for FtpClient {
    async fn login(&mut self, username: &str, password: &str) -> FtpResult<()> {
        let user_resp = self.codec.execute(&format!("USER {}", username)).await?;
        if user_resp.code == 331 {
            // Server wants a password
            let pass_resp = self.codec.execute(&format!("PASS {}", password)).await?;
            if !pass_resp.is_completion() {
                return Err(FtpError::auth_failed(format!("Login failed: {}", pass_resp.text()))
                    .with_code(pass_resp.code));
            }
        } else if !user_resp.is_completion() {
            return Err(FtpError::auth_failed(format!("USER rejected: {}", user_resp.text()))
                .with_code(user_resp.code));
        }

        if self.codec.is_tls() {
            self.codec.expect_ok("PBSZ 0").await?;
            self.codec.expect_ok("PROT P").await?;
            self.protected = true;
        }

        let type_cmd = match self.config.transfer_type {
            TransferType::Ascii => "TYPE A",
            TransferType::Binary => "TYPE I",
        };
        self.codec.expect_ok(type_cmd).await?;

        if let Some(dir) = self.config.initial_directory.clone() {
            if let Err(e) = self.chdir(&dir).await {
                log::warn!("Initial directory '{}' unavailable: {}", dir, e);
            }
        }
        log::debug!("FTP session {} logged in as {}", self.id, username);
        Ok(())
    }

    async fn system_type(&mut self) -> FtpResult<String> {
        let resp = self.codec.expect_ok("SYST").await?;
        let last = resp.lines.last().map(String::as_str).unwrap_or_default();
        Ok(last.get(4..).unwrap_or_default().trim().to_string())
    }

    async fn set_passive(&mut self, passive: bool) -> FtpResult<()> {
        let extended = matches!(
            self.config.data_channel_mode,
            DataChannelMode::ExtendedPassive | DataChannelMode::ExtendedActive
        );
        self.mode = match (passive, extended) {
            (true, false) => DataChannelMode::Passive,
            (true, true) => DataChannelMode::ExtendedPassive,
            (false, false) => DataChannelMode::Active,
            (false, true) => DataChannelMode::ExtendedActive,
        };
        Ok(())
    }

    async fn pwd(&mut self) -> FtpResult<String> {
        let resp = self.codec.expect_ok("PWD").await?;
        parse_quoted_path(&resp.text())
            .ok_or_else(|| FtpError::protocol_error(format!("Cannot parse PWD: {}", resp.text())))
    }

    async fn chdir(&mut self, path: &str) -> FtpResult<()> {
        self.codec.expect_ok(&format!("CWD {}", path)).await?;
        Ok(())
    }

    async fn cdup(&mut self) -> FtpResult<()> {
        self.codec.expect_ok("CDUP").await?;
        Ok(())
    }

    async fn mkdir(&mut self, path: &str) -> FtpResult<String> {
        let resp = self.codec.expect_ok(&format!("MKD {}", path)).await?;
        Ok(parse_quoted_path(&resp.text()).unwrap_or_else(|| path.to_string()))
    }

    async fn rmdir(&mut self, path: &str) -> FtpResult<()> {
        self.codec.expect_ok(&format!("RMD {}", path)).await?;
        Ok(())
    }

    async fn delete(&mut self, path: &str) -> FtpResult<()> {
        self.codec.expect_ok(&format!("DELE {}", path)).await?;
        Ok(())
    }

    async fn rename(&mut self, from: &str, to: &str) -> FtpResult<()> {
        self.codec.expect(&format!("RNFR {}", from), 3).await?;
        self.codec.expect_ok(&format!("RNTO {}", to)).await?;
        Ok(())
    }

    async fn size(&mut self, path: &str) -> FtpResult<u64> {
        let resp = self.codec.expect_ok(&format!("SIZE {}", path)).await?;
        let text = resp.text();
        // "213 12345"
        text.split_whitespace()
            .nth(1)
            .and_then(|n| n.parse::<u64>().ok())
            .ok_or_else(|| FtpError::protocol_error(format!("Cannot parse SIZE: {}", text)))
    }

    async fn mdtm(&mut self, path: &str) -> FtpResult<DateTime<Utc>> {
        let resp = self.codec.expect_ok(&format!("MDTM {}", path)).await?;
        let text = resp.text();
        // "213 20260101120000[.sss]"
        text.split_whitespace()
            .nth(1)
            .and_then(parse_mdtm)
            .ok_or_else(|| FtpError::protocol_error(format!("Cannot parse MDTM: {}", text)))
    }

    async fn rawlist(&mut self, path: &str) -> FtpResult<Vec<String>> {
        let cmd = Self::path_arg("LIST", path);
        self.retrieve_lines(&cmd).await
    }

    async fn nlist(&mut self, path: &str) -> FtpResult<Vec<String>> {
        let cmd = Self::path_arg("NLST", path);
        self.retrieve_lines(&cmd).await
    }

    /// The body lands in a temp file next to `local`, which replaces
    /// `local` only once the server confirmed the transfer.
    async fn get(&mut self, remote: &str, local: &Path) -> FtpResult<u64> {
        let dir = local
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let partial = tempfile::Builder::new()
            .prefix(".webfuse-")
            .suffix(".part")
            .tempfile_in(dir)
            .map_err(|e| FtpError::io_error(format!("Cannot stage in '{}': {}", dir.display(), e)))?;
        let mut file = tokio::fs::File::from_std(partial.reopen()?);

        let (mut stream, awaiting) = self.open_transfer(&format!("RETR {}", remote)).await?;
        let bytes = tokio::io::copy(&mut stream, &mut file)
            .await
            .map_err(|e| FtpError::transfer_failed(format!("RETR {}: {}", remote, e)))?;
        file.flush().await?;
        drop(file);
        drop(stream);
        self.finish_transfer(awaiting).await?;

        partial.persist(local).map_err(|e| {
            FtpError::io_error(format!("Cannot write '{}': {}", local.display(), e.error))
        })?;
        self.bytes_downloaded += bytes;
        log::debug!("Downloaded {} ({} bytes) to {}", remote, bytes, local.display());
        Ok(bytes)
    }

    async fn put(&mut self, local: &Path, remote: &str) -> FtpResult<u64> {
        let mut file = tokio::fs::File::open(local).await.map_err(|e| {
            FtpError::io_error(format!("Cannot open '{}': {}", local.display(), e))
        })?;
        let (mut stream, awaiting) = self.open_transfer(&format!("STOR {}", remote)).await?;
        let bytes = tokio::io::copy(&mut file, &mut stream)
            .await
            .map_err(|e| FtpError::transfer_failed(format!("STOR {}: {}", remote, e)))?;
        stream.shutdown().await?;
        drop(stream);
        self.finish_transfer(awaiting).await?;
        self.bytes_uploaded += bytes;
        log::debug!("Uploaded {} ({} bytes) to {}", local.display(), bytes, remote);
        Ok(bytes)
    }

    async fn chmod(&mut self, mode: u32, path: &str) -> FtpResult<()> {
        self.codec
            .expect_ok(&format!("SITE CHMOD {:o} {}", mode, path))
            .await?;
        Ok(())
    }

    async fn alloc(&mut self, size: u64) -> FtpResult<FtpResponse> {
        let resp = self.codec.execute(&format!("ALLO {}", size)).await?;
        if !resp.is_success() {
            return Err(FtpError::from_reply(resp.code, &resp.text()));
        }
        Ok(resp)
    }

    async fn raw(&mut self, command: &str) -> FtpResult<FtpResponse> {
        self.codec.execute(command).await
    }

    async fn site(&mut self, args: &str) -> FtpResult<FtpResponse> {
        let resp = self.codec.execute(&format!("SITE {}", args)).await?;
        if !resp.is_success() {
            return Err(FtpError::from_reply(resp.code, &resp.text()));
        }
        Ok(resp)
    }

    async fn exec(&mut self, command: &str) -> FtpResult<FtpResponse> {
        let resp = self.codec.execute(&format!("SITE EXEC {}", command)).await?;
        if !resp.is_success() {
            return Err(FtpError::from_reply(resp.code, &resp.text()));
        }
        Ok(resp)
    }

    async fn quit(&mut self) -> FtpResult<()> {
        let result = self.codec.execute("QUIT").await;
        self.codec.shutdown().await;
        log::info!(
            "FTP session {} closed ({} bytes up, {} bytes down)",
            self.id,
            self.bytes_uploaded,
            self.bytes_downloaded
        );
        result.map(|_| ())
    }
}

/// Parse an MDTM timestamp (`YYYYMMDDhhmmss`, optional fraction).
pub fn parse_mdtm(stamp: &str) -> Option<DateTime<Utc>> {
    let whole = stamp.get(..14)?;
    NaiveDateTime::parse_from_str(whole, "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Opens native TCP/TLS control connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl FtpConnector for TcpConnector {
    async fn open(&self, config: &FtpConnectionConfig) -> FtpResult<Box<dyn FtpPrimitives>> {
        let client = FtpClient::connect(config.clone()).await?;
        Ok(Box::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_mdtm() {
        let ts = parse_mdtm("20260115093007").unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2026, 1, 15));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (9, 30, 7));
        assert_eq!(parse_mdtm("20260115093007.123"), Some(ts));
        assert!(parse_mdtm("2026").is_none());
        assert!(parse_mdtm("20261345000000").is_none());
    }

    #[test]
    fn test_path_arg() {
        assert_eq!(FtpClient::path_arg("LIST", ""), "LIST");
        assert_eq!(FtpClient::path_arg("NLST", "/pub"), "NLST /pub");
    }
}
