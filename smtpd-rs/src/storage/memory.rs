use super::MailStore;
use crate::error::{Result, SmtpdError};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Keeps every delivered message in memory, keyed by mailbox.
#[derive(Default)]
pub struct MemoryStorage {
    mailboxes: Mutex<HashMap<String, Vec<Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of the messages in `mailbox`, oldest first
    pub fn messages(&self, mailbox: &str) -> Vec<Vec<u8>> {
        self.mailboxes
            .lock()
            .map(|m| m.get(mailbox).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn mailboxes(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .mailboxes
            .lock()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn message_count(&self) -> usize {
        self.mailboxes
            .lock()
            .map(|m| m.values().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl MailStore for MemoryStorage {
    async fn deliver(&self, mailbox: &str, message: &[u8]) -> Result<String> {
        let mut mailboxes = self
            .mailboxes
            .lock()
            .map_err(|_| SmtpdError::Storage("memory store lock poisoned".to_string()))?;

        let messages = mailboxes.entry(mailbox.to_string()).or_default();
        messages.push(message.to_vec());
        let id = format!("{}-{}", mailbox, messages.len());

        debug!("Stored {} bytes in memory as {}", message.len(), id);
        Ok(id)
    }
}
