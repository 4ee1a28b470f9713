use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

/// One-shot "this mount has fully stopped" notification.
///
/// Any number of waiters may subscribe before or after it fires; only the
/// first `fulfill` has an effect.
#[derive(Debug)]
pub struct CompletionSignal {
    tx: watch::Sender<bool>,
    fired: AtomicBool,
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            tx,
            fired: AtomicBool::new(false),
        }
    }

    /// Returns `true` for the call that actually fired the signal.
    pub fn fulfill(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.tx.send_replace(true);
        true
    }

    pub fn is_fulfilled(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    pub fn waiter(&self) -> CompletionWaiter {
        CompletionWaiter {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionWaiter {
    rx: watch::Receiver<bool>,
}

impl CompletionWaiter {
    pub async fn wait(mut self) {
        // The sender lives as long as the mount; if it is gone the mount is too.
        let _ = self.rx.wait_for(|done| *done).await;
    }
}
