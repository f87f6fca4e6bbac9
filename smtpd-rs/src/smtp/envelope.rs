//! Mail transaction accumulator

use crate::error::CommandError;

/// Sender, recipients and body for one mail transaction.
#[derive(Debug, Default, Clone)]
pub struct Envelope {
    sender: Option<String>,
    recipients: Vec<String>,
    declared_size: usize,
    body: Vec<u8>,
    body_len: usize,
    oversized: bool,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn recipient_count(&self) -> usize {
        self.recipients.len()
    }

    /// `SIZE=` declared by the client, 0 if none
    pub fn declared_size(&self) -> usize {
        self.declared_size
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Bytes received so far, including those dropped after the limit was crossed
    pub fn received_bytes(&self) -> usize {
        self.body_len
    }

    pub fn is_oversized(&self) -> bool {
        self.oversized
    }

    /// Start a new transaction; any previous recipients and body are dropped.
    pub fn begin(&mut self, sender: String, declared_size: Option<usize>) {
        *self = Self {
            sender: Some(sender),
            declared_size: declared_size.unwrap_or(0),
            ..Self::default()
        };
    }

    pub fn add_recipient(&mut self, recipient: String, max: usize) -> Result<(), CommandError> {
        if self.recipients.len() >= max {
            return Err(CommandError::TooManyRecipients { max });
        }

        self.recipients.push(recipient);
        Ok(())
    }

    pub fn can_start_data(&self) -> bool {
        self.sender.is_some() && !self.recipients.is_empty()
    }

    /// Append one unstuffed body line, restoring its CRLF.
    ///
    /// Once `max` is exceeded the body is released and every later call fails.
    pub fn append_line(&mut self, line: &[u8], max: usize) -> Result<(), CommandError> {
        self.body_len = self.body_len.saturating_add(line.len() + 2);

        if self.oversized || self.body_len > max {
            self.mark_oversized();
            return Err(CommandError::MessageTooLarge { max });
        }

        self.body.extend_from_slice(line);
        self.body.extend_from_slice(b"\r\n");
        Ok(())
    }

    pub fn mark_oversized(&mut self) {
        self.oversized = true;
        self.body = Vec::new();
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
