//! Cooperative session cancellation.
//!
//! A [`CancellationFlag`] is cloned into whatever may end a session (the Ctrl-C
//! handler, a duration limit, a test). The session only looks at it between
//! ticks, so a read or an append is never interrupted halfway.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::Notify;

/// A shared flag for requesting the end of a session.
///
/// Lock-free to check; waiters are woken through a [`Notify`].
#[derive(Clone)]
pub struct CancellationFlag {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
    reason: Arc<RwLock<Option<String>>>,
}

impl Default for CancellationFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationFlag {
    /// Create a new, unraised flag.
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
            reason: Arc::new(RwLock::new(None)),
        }
    }

    /// Raise the flag. Only the first reason is kept.
    pub fn cancel(&self, reason: impl Into<String>) {
        if let Ok(mut r) = self.reason.write() {
            if r.is_none() {
                *r = Some(reason.into());
            }
        }
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Why the session was cancelled.
    pub fn reason(&self) -> Option<String> {
        self.reason.read().ok().and_then(|r| r.clone())
    }

    /// Wait until the flag is raised.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking so a concurrent `cancel` cannot slip between.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl std::fmt::Debug for CancellationFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationFlag")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
