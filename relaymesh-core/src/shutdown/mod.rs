//! Shutdown coordination for long-running components
//!
//! Each `Controller` and `Router` owns one coordinator. Background loops
//! `select!` on [`ShutdownCoordinator::wait`]; socket errors that arrive
//! after shutdown has been triggered are expected and logged at debug.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tracing::info;

/// Running flag plus a broadcast wake-up for every waiting loop
#[derive(Debug)]
pub struct ShutdownCoordinator {
    component: &'static str,
    stopping: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl ShutdownCoordinator {
    pub fn new(component: &'static str) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            component,
            stopping: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Flip the flag and wake all waiters
    ///
    /// Returns `true` only for the call that actually initiated shutdown.
    pub fn trigger(&self) -> bool {
        if self
            .stopping
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        info!(component = self.component, "Shutdown initiated");
        // No receivers simply means no loop is currently waiting.
        let _ = self.shutdown_tx.send(());
        true
    }

    pub fn is_shutting_down(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown has been triggered, immediately if it already was
    pub async fn wait(&self) {
        let mut rx = self.shutdown_tx.subscribe();
        if self.is_shutting_down() {
            return;
        }
        let _ = rx.recv().await;
    }
}

/// Wait for SIGINT or SIGTERM
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
    Ok(())
}

/// Wait for Ctrl+C
#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C");
    Ok(())
}
