use crate::config::SmtpConfig;
use crate::error::Result;
use crate::smtp::context::ServerContext;
use crate::smtp::session::SmtpSession;
use crate::storage::MailStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, Instrument};

pub struct SmtpServer {
    config: Arc<SmtpConfig>,
    storage: Arc<dyn MailStore>,
    context: ServerContext,
}

impl SmtpServer {
    pub fn new(config: SmtpConfig, storage: Arc<dyn MailStore>, context: ServerContext) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            context,
        }
    }

    pub fn context(&self) -> &ServerContext {
        &self.context
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        info!("SMTP server listening on {}", self.config.listen_addr);

        self.serve(listener).await
    }

    /// Accept connections until shutdown is requested, then wait for live
    /// sessions to finish.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.context.shutdown_requested() => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((socket, addr)) => {
                        info!("New SMTP connection from {}", addr);
                        self.start_session(socket, Some(addr));
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                },
            }
        }

        drop(listener);

        let live = self.context.live_sessions();
        if live > 0 {
            info!("Waiting for {} sessions to finish", live);
        }
        self.context.drained().await;
        info!("All sessions finished");

        Ok(())
    }

    /// Spawn a session task for an already accepted stream.
    pub fn start_session<S>(&self, stream: S, peer: Option<SocketAddr>) -> JoinHandle<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let guard = self.context.enter_session();
        let id = guard.id();
        let session =
            SmtpSession::new(Arc::clone(&self.config), Arc::clone(&self.storage)).with_peer(peer);

        let peer_field = peer
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "local".to_string());
        let span = info_span!("smtp_session", id, peer = %peer_field);

        tokio::spawn(
            async move {
                // Counted as live until this task ends, whatever the outcome
                let _guard = guard;

                match session.run(stream).await {
                    Ok(reason) => info!("Session closed: {:?}", reason),
                    Err(e) => error!("Session error: {}", e),
                }
            }
            .instrument(span),
        )
    }
}
