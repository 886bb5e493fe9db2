//! TCP + TLS transport, establishes the FTP control connection.
//!
//! Handles plain-TCP connect, implicit-FTPS wrapping, and the
//! timeout policy from `FtpConnectionConfig`.

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::protocol::FtpCodec;
use crate::ftp::tls;
use crate::ftp::types::{FtpConnectionConfig, FtpResponse, FtpSecurityMode};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

/// Establish the control connection and return a ready-to-use codec
/// **plus** the server welcome banner.
///
/// For Explicit FTPS the caller must later issue AUTH TLS themselves
/// (handled in `client.rs`). Implicit FTPS handshakes with `tls`.
pub async fn connect(
    config: &FtpConnectionConfig,
    tls: Option<&TlsConnector>,
) -> FtpResult<(FtpCodec, FtpResponse)> {
    if config.host.trim().is_empty() {
        return Err(FtpError::invalid_config("FTP host is empty"));
    }
    let addr = format!("{}:{}", config.host, config.port);
    let dur = Duration::from_secs(config.connect_timeout_sec.max(1));

    let tcp = timeout(dur, TcpStream::connect(&addr))
        .await
        .map_err(|_| FtpError::timeout(format!("TCP connect to {} timed out", addr)))?
        .map_err(|e| FtpError::connection_failed(format!("TCP connect to {}: {}", addr, e)))?;

    tcp.set_nodelay(true).ok();
    log::debug!("TCP connected to {}", addr);

    let mut codec = match config.security {
        FtpSecurityMode::Implicit => {
            let connector = tls
                .ok_or_else(|| FtpError::invalid_config("Implicit FTPS needs a TLS connector"))?;
            let stream = tls::handshake(connector, tcp, &config.host).await?;
            FtpCodec::from_tls(stream, dur)
        }
        // Explicit upgrades after the banner.
        _ => FtpCodec::from_tcp(tcp, dur),
    };

    let banner = codec.read_response().await?;
    if banner.code != 220 {
        return Err(FtpError::from_reply(banner.code, &banner.text()));
    }
    Ok((codec, banner))
}
