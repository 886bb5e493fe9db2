//! # webfuse-ftp: FTP/FTPS tree client
//!
//! Implementation of the FTP protocol (RFC 959) with the extensions the
//! tree layer relies on:
//! - **RFC 2228 / 4217**: AUTH TLS / FTPS (Explicit & Implicit)
//! - **RFC 3659**: SIZE, MDTM
//! - **RFC 2428**: EPSV / EPRT (IPv6-ready)
//!
//! Architecture:
//! - `types`: data structures, enums, config
//! - `error`: FTP-specific error type
//! - `path`: separator normalisation for local and remote paths
//! - `parser`: UNIX `LIST` line parsing
//! - `primitives`: the typed primitive trait and its connector
//! - `protocol`: low-level command/response codec
//! - `connection`: TCP + TLS transport
//! - `tls`: TLS upgrade and FTPS configuration
//! - `transfer`: data channel management (PASV/EPSV/PORT/EPRT)
//! - `client`: native primitive implementation
//! - `session`: connection state machine and forwarding layer
//! - `tree`: listing, predicates, clean/delete, sizes, raw commands
//! - `mirror`: recursive upload / download
//! - `file_ops`: single-file transfers through staging files

pub mod types;
pub mod error;
pub mod path;
pub mod parser;
pub mod primitives;
pub mod protocol;
pub mod connection;
pub mod tls;
pub mod transfer;
pub mod client;
pub mod session;
pub mod tree;
pub mod mirror;
pub mod file_ops;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for lib.rs consumers
pub use types::*;
pub use error::{FtpError, FtpErrorKind, FtpResult};
pub use path::PathNormalizer;
pub use primitives::{FtpConnector, FtpOperation, FtpPrimitives};
pub use client::{FtpClient, TcpConnector};
pub use session::FtpSession;
