//! smtpd-rs: SMTP receiver
//!
//! Accepts inbound SMTP connections, drives each through the command grammar
//! with per-connection limits, and hands complete messages to a storage backend.
//!
//! # Example
//!
//! ```no_run
//! use smtpd_rs::config::Config;
//! use smtpd_rs::smtp::{ServerContext, SmtpServer};
//! use smtpd_rs::storage::MemoryStorage;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let storage = Arc::new(MemoryStorage::new());
//!
//!     let server = SmtpServer::new(config.smtp, storage, ServerContext::new());
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading
//! - [`error`]: Error types and reply-code mapping
//! - [`smtp`]: Protocol implementation
//! - [`storage`]: Message storage backends
//! - [`utils`]: Address helpers

pub mod config;
pub mod error;
pub mod smtp;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use error::{CommandError, Result, SmtpdError};
