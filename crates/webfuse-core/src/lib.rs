//! # webfuse-core
//!
//! Shared building blocks used by every webfuse crate:
//!   • `config`: the explicit [`WebfuseConfig`] passed into constructors
//!     (data / plugins / libraries directory roots, logging settings)
//!   • `format`: human-readable byte sizes
//!   • `fs`: local directory scanning and creation helpers
//!   • `error`: [`CoreError`]

pub mod config;
pub mod error;
pub mod format;
pub mod fs;

pub use config::{LoggingConfig, WebfuseConfig};
pub use error::{CoreError, CoreResult};
pub use format::format_bytes;
pub use fs::{ensure_dir, scan_dir_recursively};
