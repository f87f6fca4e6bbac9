use smtpd_rs::config::{Config, LoggingConfig, StorageBackend};
use smtpd_rs::smtp::{ServerContext, SmtpServer};
use smtpd_rs::storage::{MailStore, MaildirStorage, MemoryStorage};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    init_logging(&config.logging);

    info!("Starting smtpd-rs v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => info!("No config file specified, using defaults and environment"),
    }
    info!("  Domain: {}", config.smtp.domain);
    info!("  Max recipients: {}", config.smtp.max_recipients);
    info!("  Max message size: {} bytes", config.smtp.max_message_bytes);
    info!("  Idle timeout: {}s", config.smtp.max_idle_seconds);
    if let Some(domain) = &config.smtp.domain_no_store {
        info!("  Not storing mail for: {}", domain);
    }

    let storage: Arc<dyn MailStore> = match config.storage.backend {
        StorageBackend::Maildir => {
            info!("  Maildir path: {}", config.storage.maildir_path);
            Arc::new(MaildirStorage::new(&config.storage.maildir_path))
        }
        StorageBackend::Memory => {
            info!("  Using in-memory storage");
            Arc::new(MemoryStorage::new())
        }
    };

    let context = ServerContext::new();

    let signal_context = context.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, shutting down");
                signal_context.shutdown();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    let server = SmtpServer::new(config.smtp, storage, context);
    server.run().await?;

    info!("smtpd-rs stopped");
    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("smtpd_rs={}", logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);

    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    }
}
