//! # webfuse – FTP
//!
//! FTP/FTPS tree client providing:
//!   • UNIX `ls -l` listing parser with stable per-entry identity keys
//!   • Local / remote path-separator normalisation
//!   • A session state machine (disconnected → connected → authenticated)
//!     with remote system detection
//!   • Recursive listing, clean, delete, size aggregation
//!   • Recursive upload / download mirroring between local and remote trees

pub mod ftp;
