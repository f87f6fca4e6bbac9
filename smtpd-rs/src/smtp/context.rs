//! Process-wide server state shared by the accept loop and its sessions

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::debug;

/// Live-session accounting and the shutdown signal.
///
/// Cheap to clone; all clones share the same counters.
#[derive(Clone, Default)]
pub struct ServerContext {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    live: AtomicUsize,
    next_id: AtomicU64,
    drained: Notify,
    shutdown: CancellationToken,
}

impl ServerContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_sessions(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// Ask the accept loop to stop. Sessions already running are not interrupted.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    pub fn shutdown_requested(&self) -> WaitForCancellationFuture<'_> {
        self.inner.shutdown.cancelled()
    }

    /// Register a new session; it stays counted until the guard is dropped.
    pub fn enter_session(&self) -> SessionGuard {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.live.fetch_add(1, Ordering::SeqCst);

        SessionGuard {
            id,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Resolves once no session is live.
    pub async fn drained(&self) {
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            // Register before checking so a decrement in between is not missed
            notified.as_mut().enable();

            if self.live_sessions() == 0 {
                return;
            }
            notified.await;
        }
    }
}

pub struct SessionGuard {
    id: u64,
    inner: Arc<Inner>,
}

impl SessionGuard {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let remaining = self.inner.live.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!("Session {} ended, {} still live", self.id, remaining);

        if remaining == 0 {
            self.inner.drained.notify_waiters();
        }
    }
}
