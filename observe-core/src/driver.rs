//! Async Flush Driver
//!
//! Connects a [`Scheduler`] to a tokio runtime. The scheduler's waker posts
//! a permit on a [`Notify`]; the driver awaits that permit and flushes. The
//! flush therefore always runs after the synchronous code that caused it
//! has returned to the runtime, never inside it.
//!
//! Everything here is `!Send`, so the driver runs on a
//! [`LocalSet`](tokio::task::LocalSet) or a current-thread runtime.

use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::reactive::Scheduler;

/// Flushes a scheduler whenever it asks for it.
pub struct FlushDriver {
    scheduler: Scheduler,
    notify: Arc<Notify>,
}

impl FlushDriver {
    /// Install the driver's waker on `scheduler`.
    ///
    /// Replaces any waker already installed.
    pub fn new(scheduler: &Scheduler) -> Self {
        let notify = Arc::new(Notify::new());
        let waker = Arc::clone(&notify);
        scheduler.set_waker(move || waker.notify_one());
        if scheduler.is_pending() {
            notify.notify_one();
        }
        Self {
            scheduler: scheduler.clone(),
            notify,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Wait for the next flush request and run it.
    pub async fn tick(&self) -> usize {
        self.notify.notified().await;
        let work = self.scheduler.flush();
        trace!(work, "driver flushed");
        work
    }

    /// Flush on every request, forever.
    pub async fn run(&self) {
        debug!("flush driver started");
        loop {
            self.tick().await;
        }
    }

    /// Run the driver as a local task. Must be called inside a `LocalSet`.
    pub fn spawn_local(self) -> JoinHandle<()> {
        tokio::task::spawn_local(async move { self.run().await })
    }
}

impl Drop for FlushDriver {
    fn drop(&mut self) {
        self.scheduler.clear_waker();
    }
}

impl std::fmt::Debug for FlushDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushDriver")
            .field("pending", &self.scheduler.is_pending())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
