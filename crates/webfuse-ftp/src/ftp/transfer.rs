//! Data-channel management for FTP transfers.
//!
//! Supports four modes (RFC 959 + RFC 2428):
//! - **PASV**: server opens a port, client connects
//! - **EPSV**: extended passive (IPv6-ready)
//! - **PORT**: client opens a port, tells server
//! - **EPRT**: extended active (IPv6-ready)
//!
//! The data socket is TLS-wrapped when the session negotiated `PROT P`.

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::protocol::FtpCodec;
use crate::ftp::tls;
use crate::ftp::types::DataChannelMode;
use lazy_static::lazy_static;
use regex::Regex;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

lazy_static! {
    static ref PASV_RE: Regex =
        Regex::new(r"\((\d+),(\d+),(\d+),(\d+),(\d+),(\d+)\)").expect("valid PASV pattern");
    static ref EPSV_RE: Regex = Regex::new(r"\|\|\|(\d+)\|").expect("valid EPSV pattern");
}

/// Plain or TLS-wrapped data stream.
pub enum DataStream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for DataStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            DataStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            DataStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for DataStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            DataStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            DataStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            DataStream::Plain(s) => Pin::new(s).poll_flush(cx),
            DataStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            DataStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            DataStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Settings the data channel needs from the owning client.
pub struct DataChannelSettings<'a> {
    pub mode: DataChannelMode,
    pub host: &'a str,
    /// Connector of the control channel, present once `PROT P` was
    /// negotiated. Data connections are then TLS-wrapped with it.
    pub tls: Option<&'a TlsConnector>,
    pub timeout: Duration,
    pub active_bind: Option<&'a str>,
}

/// A data channel announced to the server but not yet connected.
///
/// Passive channels are connected before the transfer command is sent;
/// active ones are accepted only after it, once the server dials back.
pub enum PendingData {
    Connected(TcpStream),
    Listening(TcpListener),
}

/// Announce a data channel to the server according to `settings.mode`.
pub async fn prepare_data_channel(
    codec: &mut FtpCodec,
    settings: &DataChannelSettings<'_>,
) -> FtpResult<PendingData> {
    match settings.mode {
        DataChannelMode::Passive => {
            open_pasv(codec, settings.host, settings.timeout).await.map(PendingData::Connected)
        }
        DataChannelMode::ExtendedPassive => {
            open_epsv(codec, settings.host, settings.timeout).await.map(PendingData::Connected)
        }
        DataChannelMode::Active => {
            announce_port(codec, settings.active_bind).await.map(PendingData::Listening)
        }
        DataChannelMode::ExtendedActive => {
            announce_eprt(codec, settings.active_bind).await.map(PendingData::Listening)
        }
    }
}

/// Finish the connection after the transfer command was accepted.
pub async fn finish_data_channel(
    pending: PendingData,
    settings: &DataChannelSettings<'_>,
) -> FtpResult<DataStream> {
    let tcp = match pending {
        PendingData::Connected(tcp) => tcp,
        PendingData::Listening(listener) => {
            let (tcp, peer) = timeout(settings.timeout, listener.accept())
                .await
                .map_err(|_| FtpError::data_channel("Active data accept timed out"))?
                .map_err(|e| FtpError::data_channel(format!("Active data accept: {}", e)))?;
            log::trace!("Accepted active data connection from {}", peer);
            tcp
        }
    };

    if let Some(connector) = settings.tls {
        let stream = tls::handshake(connector, tcp, settings.host)
            .await
            .map_err(|e| FtpError::data_channel(format!("Data channel TLS: {}", e.message)))?;
        Ok(DataStream::Tls(Box::new(stream)))
    } else {
        Ok(DataStream::Plain(tcp))
    }
}

// ─── PASV ────────────────────────────────────────────────────────────

/// Issue `PASV`, parse the response, connect to the returned address.
///
/// Response format: `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`
async fn open_pasv(codec: &mut FtpCodec, host: &str, data_timeout: Duration) -> FtpResult<TcpStream> {
    let resp = codec.expect_ok("PASV").await?;
    let mut addr = parse_pasv_response(&resp.text())?;
    // Servers behind NAT often announce an unroutable address.
    if addr.ip().is_unspecified() {
        if let Ok(ip) = host.parse::<IpAddr>() {
            addr.set_ip(ip);
        }
    }
    timeout(data_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| FtpError::data_channel("PASV data connect timed out"))?
        .map_err(|e| FtpError::data_channel(format!("PASV data connect to {}: {}", addr, e)))
}

/// Parse `(h1,h2,h3,h4,p1,p2)` from a 227 response.
pub fn parse_pasv_response(text: &str) -> FtpResult<SocketAddr> {
    let caps = PASV_RE
        .captures(text)
        .ok_or_else(|| FtpError::protocol_error(format!("Cannot parse PASV: {}", text)))?;

    let nums = (1..=6)
        .map(|i| {
            caps[i]
                .parse::<u8>()
                .map_err(|_| FtpError::protocol_error("PASV number out of range"))
        })
        .collect::<FtpResult<Vec<u8>>>()?;

    let ip = IpAddr::from([nums[0], nums[1], nums[2], nums[3]]);
    let port = u16::from(nums[4]) * 256 + u16::from(nums[5]);
    Ok(SocketAddr::new(ip, port))
}

// ─── EPSV ────────────────────────────────────────────────────────────

/// Issue `EPSV`, parse port, connect to the *same host* on that port.
///
/// Response format: `229 Entering Extended Passive Mode (|||port|)`
async fn open_epsv(codec: &mut FtpCodec, host: &str, data_timeout: Duration) -> FtpResult<TcpStream> {
    let resp = codec.expect_ok("EPSV").await?;
    let port = parse_epsv_response(&resp.text())?;
    let addr = format!("{}:{}", host, port);
    timeout(data_timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| FtpError::data_channel("EPSV data connect timed out"))?
        .map_err(|e| FtpError::data_channel(format!("EPSV data connect to {}: {}", addr, e)))
}

pub fn parse_epsv_response(text: &str) -> FtpResult<u16> {
    let caps = EPSV_RE
        .captures(text)
        .ok_or_else(|| FtpError::protocol_error(format!("Cannot parse EPSV: {}", text)))?;
    caps[1]
        .parse::<u16>()
        .map_err(|_| FtpError::protocol_error("EPSV port out of range"))
}

// ─── PORT / EPRT ─────────────────────────────────────────────────────

/// Listen for the server's data connection.
///
/// Without a configured bind address, or with an unspecified one, the
/// listener sits on the control connection's local IP: that is the address
/// the server already reaches us on.
async fn bind_active(
    codec: &FtpCodec,
    bind_addr: Option<&str>,
    label: &str,
) -> FtpResult<(TcpListener, SocketAddr)> {
    let configured = bind_addr
        .map(|a| {
            a.parse::<IpAddr>()
                .map_err(|_| FtpError::invalid_config(format!("Invalid active bind address '{}'", a)))
        })
        .transpose()?;
    let ip = match configured {
        Some(ip) if !ip.is_unspecified() => ip,
        _ => codec.local_addr()?.ip(),
    };
    let listener = TcpListener::bind(SocketAddr::new(ip, 0))
        .await
        .map_err(|e| FtpError::data_channel(format!("{} bind on {}: {}", label, ip, e)))?;
    let local = listener
        .local_addr()
        .map_err(|e| FtpError::data_channel(format!("{} local_addr: {}", label, e)))?;
    Ok((listener, local))
}

/// Bind a local TCP listener and tell the server via `PORT`.
async fn announce_port(codec: &mut FtpCodec, bind_addr: Option<&str>) -> FtpResult<TcpListener> {
    let (listener, local) = bind_active(codec, bind_addr, "PORT").await?;
    let octets = match local.ip() {
        IpAddr::V4(v4) => v4.octets(),
        _ => return Err(FtpError::data_channel("PORT requires IPv4")),
    };
    codec.expect_ok(&format_port_command(octets, local.port())).await?;
    Ok(listener)
}

/// `PORT h1,h2,h3,h4,p1,p2`.
pub fn format_port_command(octets: [u8; 4], port: u16) -> String {
    format!(
        "PORT {},{},{},{},{},{}",
        octets[0],
        octets[1],
        octets[2],
        octets[3],
        port / 256,
        port % 256
    )
}

/// Bind a local listener and tell the server via `EPRT |af|ip|port|`.
async fn announce_eprt(codec: &mut FtpCodec, bind_addr: Option<&str>) -> FtpResult<TcpListener> {
    let (listener, local) = bind_active(codec, bind_addr, "EPRT").await?;
    let af = match local.ip() {
        IpAddr::V4(_) => 1,
        IpAddr::V6(_) => 2,
    };
    codec
        .expect_ok(&format!("EPRT |{}|{}|{}|", af, local.ip(), local.port()))
        .await?;
    Ok(listener)
}
