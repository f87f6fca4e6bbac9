//! Message storage backends
//!
//! - [`maildir`]: Maildir on disk, written through `tmp/` and renamed into `new/`
//! - [`memory`]: process-local store, used by tests and the `memory` backend

pub mod maildir;
pub mod memory;

pub use maildir::MaildirStorage;
pub use memory::MemoryStorage;

use crate::error::Result;

/// Destination for accepted messages.
///
/// Sessions call [`deliver`](MailStore::deliver) once per recipient, possibly
/// from many tasks at the same time.
#[async_trait::async_trait]
pub trait MailStore: Send + Sync {
    /// Persist one copy of `message` in `mailbox` and return its id.
    async fn deliver(&self, mailbox: &str, message: &[u8]) -> Result<String>;
}
