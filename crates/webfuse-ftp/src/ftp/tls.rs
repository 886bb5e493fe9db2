//! TLS helpers for Explicit and Implicit FTPS (RFC 4217).
//!
//! - Builds a rustls `TlsConnector` over the native root store, with
//!   optional self-signed cert acceptance.
//! - Provides `upgrade_to_tls` for wrapping an existing plain codec.
//!
//! A client builds one connector and reuses it for the control channel and
//! every data channel. The shared `ClientConfig` session cache lets data
//! handshakes resume the control session, which servers enforcing TLS
//! session reuse require.

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::protocol::{ControlStream, FtpCodec};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// Build a `TlsConnector` according to our configuration.
pub fn build_tls_connector(accept_invalid_certs: bool) -> FtpResult<TlsConnector> {
    let mut root_store = rustls::RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for err in &native.errors {
        log::debug!("Skipping native root certificate: {}", err);
    }
    let (added, ignored) = root_store.add_parsable_certificates(native.certs);
    log::trace!("Loaded {} native roots ({} ignored)", added, ignored);

    let mut tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    if accept_invalid_certs {
        log::warn!("FTPS certificate verification disabled");
        tls_config
            .dangerous()
            .set_certificate_verifier(Arc::new(NoCertVerifier));
    }
    Ok(TlsConnector::from(Arc::new(tls_config)))
}

/// Run the client handshake over `tcp`.
pub async fn handshake(
    connector: &TlsConnector,
    tcp: TcpStream,
    host: &str,
) -> FtpResult<TlsStream<TcpStream>> {
    let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
        .map_err(|e| FtpError::tls_failed(format!("Invalid server name '{}': {}", host, e)))?;
    connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| FtpError::tls_failed(format!("TLS handshake with {}: {}", host, e)))
}

/// Upgrade an existing **plain** control connection to TLS.
///
/// Called after a successful `AUTH TLS` + 234 reply.
pub async fn upgrade_to_tls(
    codec: FtpCodec,
    connector: &TlsConnector,
    host: &str,
) -> FtpResult<FtpCodec> {
    let timeout = codec.timeout;
    let tcp = match codec.stream {
        ControlStream::Plain(reader) => reader.into_inner(),
        ControlStream::Tls(_) => {
            return Err(FtpError::protocol_error(
                "Cannot upgrade: connection is already TLS",
            ))
        }
    };
    let tls = handshake(connector, tcp, host).await?;
    Ok(FtpCodec::from_tls(tls, timeout))
}

// ─── NoCertVerifier (for self-signed certs) ─────────────────────────

#[derive(Debug)]
struct NoCertVerifier;

impl rustls::client::danger::ServerCertVerifier for NoCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ED25519,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
        ]
    }
}
