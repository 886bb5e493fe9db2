//! Low-level FTP command/response codec (RFC 959 §4).
//!
//! Handles:
//! - Sending FTP commands terminated with `\r\n`
//! - Reading single-line and multi-line replies
//! - Parsing the 3-digit reply code
//! - Bounding every reply read by the connection timeout

use crate::ftp::error::{FtpError, FtpErrorKind, FtpResult};
use crate::ftp::types::FtpResponse;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

/// Plain TCP or TLS-wrapped control stream.
pub enum ControlStream {
    Plain(BufReader<TcpStream>),
    Tls(Box<BufReader<TlsStream<TcpStream>>>),
}

/// The FTP command/response codec.
pub struct FtpCodec {
    pub stream: ControlStream,
    pub timeout: Duration,
}

impl FtpCodec {
    /// Create a codec from a plain TCP stream.
    pub fn from_tcp(stream: TcpStream, timeout: Duration) -> Self {
        Self {
            stream: ControlStream::Plain(BufReader::new(stream)),
            timeout,
        }
    }

    /// Create a codec from a TLS-wrapped TCP stream.
    pub fn from_tls(stream: TlsStream<TcpStream>, timeout: Duration) -> Self {
        Self {
            stream: ControlStream::Tls(Box::new(BufReader::new(stream))),
            timeout,
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self.stream, ControlStream::Tls(_))
    }

    /// Local address of the control socket.
    pub fn local_addr(&self) -> FtpResult<std::net::SocketAddr> {
        let tcp = match &self.stream {
            ControlStream::Plain(r) => r.get_ref(),
            ControlStream::Tls(r) => r.get_ref().get_ref().0,
        };
        Ok(tcp.local_addr()?)
    }

    /// Send a raw FTP command; the trailing CRLF is appended here.
    pub async fn send_command(&mut self, cmd: &str) -> FtpResult<()> {
        let line = format!("{}\r\n", cmd);
        match &mut self.stream {
            ControlStream::Plain(s) => {
                s.write_all(line.as_bytes()).await?;
                s.flush().await?;
            }
            ControlStream::Tls(s) => {
                s.write_all(line.as_bytes()).await?;
                s.flush().await?;
            }
        }
        if cmd.starts_with("PASS ") {
            log::trace!(">>> PASS ****");
        } else {
            log::trace!(">>> {}", cmd);
        }
        Ok(())
    }

    /// Read a single line from the control channel (including CRLF).
    async fn read_line_raw(&mut self) -> FtpResult<String> {
        let mut buf = String::new();
        let read = async {
            match &mut self.stream {
                ControlStream::Plain(r) => r.read_line(&mut buf).await,
                ControlStream::Tls(r) => r.read_line(&mut buf).await,
            }
        };
        let n = tokio::time::timeout(self.timeout, read)
            .await
            .map_err(|_| FtpError::timeout("Timed out waiting for server reply"))??;
        if n == 0 {
            return Err(FtpError::new(FtpErrorKind::NotConnected, "Server closed connection"));
        }
        Ok(buf)
    }

    /// Read a complete FTP response (possibly multi-line).
    ///
    /// Multi-line responses look like:
    /// ```text
    /// 220-Welcome to my FTP server
    /// 220-This is line 2
    /// 220 End of greeting
    /// ```
    pub async fn read_response(&mut self) -> FtpResult<FtpResponse> {
        let first = self.read_line_raw().await?;
        let first_trimmed = first.trim_end_matches(['\r', '\n']);

        let code = parse_code(first_trimmed)?;
        let mut lines = vec![first_trimmed.to_string()];

        // "NNN-" means more lines follow until "NNN " is seen.
        let is_multi = first_trimmed.as_bytes().get(3) == Some(&b'-');
        if is_multi {
            let terminator = format!("{} ", code);
            loop {
                let next = self.read_line_raw().await?;
                let next_trimmed = next.trim_end_matches(['\r', '\n']);
                lines.push(next_trimmed.to_string());
                if next_trimmed.starts_with(&terminator) || next_trimmed == code.to_string() {
                    break;
                }
            }
        }

        let resp = FtpResponse { code, lines };
        log::trace!("<<< {}", resp.lines.last().map(String::as_str).unwrap_or(""));
        Ok(resp)
    }

    /// Send a command and return the response.
    pub async fn execute(&mut self, cmd: &str) -> FtpResult<FtpResponse> {
        self.send_command(cmd).await?;
        self.read_response().await
    }

    /// Convenience: send a command, expect a specific response-code class.
    pub async fn expect(&mut self, cmd: &str, expected_first_digit: u16) -> FtpResult<FtpResponse> {
        let resp = self.execute(cmd).await?;
        if resp.code / 100 != expected_first_digit {
            return Err(FtpError::from_reply(resp.code, &resp.text()));
        }
        Ok(resp)
    }

    /// Expect a 2xx reply.
    pub async fn expect_ok(&mut self, cmd: &str) -> FtpResult<FtpResponse> {
        self.expect(cmd, 2).await
    }

    /// Shut the write side down; errors are irrelevant once we are leaving.
    pub async fn shutdown(&mut self) {
        let _ = match &mut self.stream {
            ControlStream::Plain(s) => s.shutdown().await,
            ControlStream::Tls(s) => s.shutdown().await,
        };
    }
}

/// Parse the 3-digit reply code from the start of a line.
pub fn parse_code(line: &str) -> FtpResult<u16> {
    line.get(..3)
        .filter(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse::<u16>().ok())
        .ok_or_else(|| FtpError::protocol_error(format!("Invalid reply code in: '{}'", line)))
}

/// Extract the quoted path from a `257 "/some/path"` reply.
pub fn parse_quoted_path(text: &str) -> Option<String> {
    let start = text.find('"')?;
    let rest = &text[start + 1..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn codec_with_server(script: &'static [u8]) -> FtpCodec {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(script).await.unwrap();
            let mut sink = Vec::new();
            let _ = sock.read_to_end(&mut sink).await;
        });
        let tcp = TcpStream::connect(addr).await.unwrap();
        FtpCodec::from_tcp(tcp, Duration::from_secs(5))
    }

    #[test]
    fn test_parse_code() {
        assert_eq!(parse_code("220 Ready").unwrap(), 220);
        assert_eq!(parse_code("550-Failed").unwrap(), 550);
        assert!(parse_code("2x0 nope").is_err());
        assert!(parse_code("22").is_err());
    }

    #[test]
    fn test_parse_quoted_path() {
        assert_eq!(
            parse_quoted_path("257 \"/home/user\" is current directory").as_deref(),
            Some("/home/user")
        );
        assert_eq!(parse_quoted_path("257 created"), None);
    }

    #[tokio::test]
    async fn test_multiline_response() {
        let mut codec = codec_with_server(
            b"220-Welcome\r\n220-Second line\r\n 220 not the end\r\n220 Ready\r\n",
        )
        .await;
        let resp = codec.read_response().await.unwrap();
        assert_eq!(resp.code, 220);
        assert_eq!(resp.lines.len(), 4);
        assert_eq!(resp.lines.last().unwrap(), "220 Ready");
    }

    #[tokio::test]
    async fn test_consecutive_replies() {
        let mut codec = codec_with_server(b"220 Hi\r\n331 Password required\r\n").await;
        assert_eq!(codec.read_response().await.unwrap().code, 220);
        let resp = codec.read_response().await.unwrap();
        assert_eq!(resp.code, 331);
        assert!(resp.is_intermediate());
    }

    #[tokio::test]
    async fn test_closed_connection_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            drop(sock);
        });
        let tcp = TcpStream::connect(addr).await.unwrap();
        let mut codec = FtpCodec::from_tcp(tcp, Duration::from_secs(5));
        let err = codec.read_response().await.unwrap_err();
        assert_eq!(err.kind, FtpErrorKind::NotConnected);
    }
}
