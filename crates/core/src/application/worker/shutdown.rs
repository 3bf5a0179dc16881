// Cooperative shutdown signal shared by the pool and its workers.

use std::time::Duration;
use tokio::sync::watch;

/// Receiver half; cheap to clone, one per worker.
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested.
    pub async fn wait(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        let _ = self.rx.changed().await;
    }

    /// Sleep for `duration` unless shutdown arrives first.
    /// Returns true when the sleep was interrupted.
    pub async fn sleep_interruptible(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.wait() => true,
        }
    }
}

/// Sender half, held by the pool supervisor.
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Request shutdown on every outstanding token.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}
