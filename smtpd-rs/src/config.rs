use crate::error::{Result, SmtpdError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix for environment overrides, e.g. `SMTPD__SMTP__MAX_RECIPIENTS=5`
pub const ENV_PREFIX: &str = "SMTPD";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub smtp: SmtpConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Limits and identity of the SMTP listener
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub listen_addr: String,
    /// Name announced in the greeting and `Received:` headers
    pub domain: String,
    /// Recipients at this domain are accepted but never stored
    pub domain_no_store: Option<String>,
    pub max_recipients: usize,
    pub max_message_bytes: usize,
    pub max_idle_seconds: u64,
    /// When false every transaction is accepted and discarded
    pub store_messages: bool,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            domain: "localhost".to_string(),
            domain_no_store: None,
            max_recipients: 100,
            max_message_bytes: 10 * 1024 * 1024, // 10MB
            max_idle_seconds: 300,
            store_messages: true,
        }
    }
}

impl SmtpConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.max_idle_seconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Maildir,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub maildir_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Maildir,
            maildir_path: "/tmp/maildir".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:2500".to_string()
}

impl Config {
    /// Defaults, overlaid by the optional TOML file, overlaid by `SMTPD__*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    pub fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(true),
            );
        }

        let config: Config = builder
            .add_source(
                ::config::Environment::with_prefix(prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let smtp = &self.smtp;

        if smtp.domain.trim().is_empty() {
            return Err(SmtpdError::Config("smtp.domain must not be empty".to_string()));
        }

        for (name, value) in [
            ("smtp.max_recipients", smtp.max_recipients as u64),
            ("smtp.max_message_bytes", smtp.max_message_bytes as u64),
            ("smtp.max_idle_seconds", smtp.max_idle_seconds),
        ] {
            if value == 0 {
                return Err(SmtpdError::Config(format!("{} must be greater than 0", name)));
            }
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(SmtpdError::Config(format!(
                "logging.format must be pretty or json, got {}",
                self.logging.format
            )));
        }

        Ok(())
    }
}
