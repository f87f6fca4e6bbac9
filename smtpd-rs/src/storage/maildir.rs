use super::MailStore;
use crate::error::{Result, SmtpdError};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

pub struct MaildirStorage {
    base_path: PathBuf,
}

impl MaildirStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    async fn ensure_maildir_structure(&self, mailbox_path: &Path) -> Result<()> {
        for subdir in &["tmp", "new", "cur"] {
            let dir = mailbox_path.join(subdir);
            fs::create_dir_all(&dir).await.map_err(|e| {
                SmtpdError::Storage(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }
        Ok(())
    }

    fn generate_filename(&self) -> Result<String> {
        // timestamp.unique.hostname
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| SmtpdError::Storage(format!("System clock before epoch: {}", e)))?
            .as_secs();

        let unique = uuid::Uuid::new_v4().simple();
        let hostname = gethostname::gethostname()
            .to_string_lossy()
            .replace(['/', ':'], "_");

        Ok(format!("{}.{}.{}", timestamp, unique, hostname))
    }
}

#[async_trait::async_trait]
impl MailStore for MaildirStorage {
    async fn deliver(&self, mailbox: &str, message: &[u8]) -> Result<String> {
        validate_mailbox(mailbox)?;

        let mailbox_path = self.base_path.join(mailbox);
        self.ensure_maildir_structure(&mailbox_path).await?;

        let filename = self.generate_filename()?;
        let tmp_path = mailbox_path.join("tmp").join(&filename);
        let new_path = mailbox_path.join("new").join(&filename);

        fs::write(&tmp_path, message).await?;

        // Readers only ever see complete files in new/
        if let Err(e) = fs::rename(&tmp_path, &new_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(SmtpdError::Storage(format!(
                "Failed to move {:?} into new/: {}",
                tmp_path, e
            )));
        }

        debug!("Wrote {} bytes to {}", message.len(), new_path.display());
        info!("Stored message for {} as {}", mailbox, filename);

        Ok(filename)
    }
}

fn validate_mailbox(mailbox: &str) -> Result<()> {
    if mailbox.is_empty() || mailbox.contains('/') || mailbox.contains('\\') || mailbox.contains("..") {
        return Err(SmtpdError::Storage(format!(
            "Invalid mailbox name {:?}",
            mailbox
        )));
    }
    Ok(())
}
