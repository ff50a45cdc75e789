use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Notify;

pub struct ShutdownHandler {
    shutdown_requested: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
}

impl Default for ShutdownHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandler {
    pub fn new() -> Self {
        Self {
            shutdown_requested: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
        }
    }

    /// Spawns the signal listener and returns the guard the service blocks on.
    pub async fn install(self) -> ShutdownGuard {
        let shutdown_requested = Arc::clone(&self.shutdown_requested);
        let shutdown_notify = Arc::clone(&self.shutdown_notify);

        tokio::spawn(async move {
            wait_for_signal().await;
            tracing::info!("Shutdown requested via signal");
            shutdown_requested.store(true, Ordering::SeqCst);
            shutdown_notify.notify_waiters();
        });

        ShutdownGuard {
            shutdown_requested: self.shutdown_requested,
            shutdown_notify: self.shutdown_notify,
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal as unix_signal, SignalKind};

    let mut sigterm =
        unix_signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
    tokio::select! {
        _ = signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl-C handler");
}

#[derive(Clone)]
pub struct ShutdownGuard {
    shutdown_requested: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
}

impl ShutdownGuard {
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        if self.is_shutdown_requested() {
            return;
        }
        self.shutdown_notify.notified().await;
    }

    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn request_wakes_waiters() {
        let guard = ShutdownHandler::new().install().await;
        assert!(!guard.is_shutdown_requested());

        let waiter = guard.clone();
        let handle = tokio::spawn(async move {
            waiter.wait().await;
        });

        guard.request_shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake after request_shutdown")
            .unwrap();
        assert!(guard.is_shutdown_requested());
    }

    #[tokio::test]
    async fn wait_returns_immediately_once_requested() {
        let guard = ShutdownHandler::new().install().await;
        guard.request_shutdown();
        // must not hang even though the notification already fired
        tokio::time::timeout(Duration::from_millis(100), guard.wait())
            .await
            .expect("wait should return immediately");
    }
}
