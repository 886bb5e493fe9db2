//! # webfuse
//!
//! Utility toolkit whose core is an FTP/FTPS tree client: a UNIX listing
//! parser, a local/remote path model, and recursive clean, delete, size and
//! mirroring operations on top of an authenticated session.
//!
//! The building blocks live in the workspace crates and are re-exported
//! here; this crate adds the logging bootstrap.

pub use webfuse_ftp::ftp;

pub use webfuse_core::{CoreError, LoggingConfig, WebfuseConfig};
pub use webfuse_ftp::ftp::{
    FtpConnectionConfig, FtpError, FtpErrorKind, FtpResult, FtpSession, ListOptions, MirrorReport,
    PathNormalizer, RemoteEntry, RemoteListing, SortOrder,
};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides `config.filter`. `log` records emitted by the
/// library crates are forwarded into tracing. Returns `false` when a
/// subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let json = config.json || cfg!(feature = "logs-json");

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .try_init()
        .is_ok()
}

/// Connect and log in using an `ftp://` or `ftps://` URL.
pub async fn open_url(app: &WebfuseConfig, url: &str) -> FtpResult<FtpSession> {
    let config = FtpConnectionConfig::from_url(url)?;
    tracing::info!(host = %config.host, port = config.port, "opening FTP session");
    let mut session = FtpSession::new(app).with_config(config);
    session.open().await?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_installs_once() {
        let config = LoggingConfig::default();
        init_logging(&config);
        assert!(!init_logging(&config));
    }

    #[tokio::test]
    async fn open_url_rejects_bad_scheme() {
        let root = tempfile::tempdir().unwrap();
        let app = WebfuseConfig::from_root(root.path());
        let err = open_url(&app, "sftp://example.com").await.unwrap_err();
        assert_eq!(err.kind, FtpErrorKind::InvalidConfig);
    }
}
