//! Process-wide shutdown flag.
//!
//! Set from the ctrl-c handler (or a test), observed by the polling loop
//! once per cycle and during the inter-cycle sleep.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Sleep for `duration` unless shutdown is requested first.
    /// Returns `true` if the sleep was cut short.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        let mut rx = self.rx.clone();
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_triggered(),
            _ = rx.wait_for(|stopped| *stopped) => true,
        }
    }
}
