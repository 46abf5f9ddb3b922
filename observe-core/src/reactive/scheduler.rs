//! Flush Scheduler
//!
//! The scheduler is the batch boundary of the engine. Mutations never run
//! listeners directly; they append records to listener queues and mark the
//! listener dirty. The host later calls [`Scheduler::flush`] (the "end of
//! the microtask") and every dirty listener receives its whole batch at
//! once.
//!
//! # How It Works
//!
//! 1. A listener that receives its first pending record is pushed onto the
//!    dirty list, and the scheduler asks the host for a flush through its
//!    wake hook. Requests are coalesced: only the first one per flush wakes
//!    the host.
//!
//! 2. `flush` runs rounds until nothing is left:
//!    a. run and clear the one-shot tasks queued with [`Scheduler::schedule`]
//!    b. snapshot and clear the dirty list
//!    c. sort the snapshot by listener sequence number (registration order)
//!    d. deliver each listener's queue
//!
//! 3. Anything dirtied while a round runs lands in the next round of the
//!    same flush, so changes caused by a delivered callback are visible
//!    before `flush` returns.
//!
//! # Failure Isolation
//!
//! A listener or task that fails, either by returning an error or by
//! panicking, is logged and skipped. The rest of the round still runs.
//!
//! # Threading
//!
//! There is none. A scheduler and everything registered with it live on one
//! thread; state is shared through `Rc` and guarded with `Cell`/`RefCell`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use tracing::{debug, error, warn};

use super::callback::CallbackInner;
use crate::config::SchedulerConfig;

/// Identifier of a scheduled one-shot task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

struct Task {
    id: TaskId,
    run: Box<dyn FnOnce()>,
}

pub(crate) struct SchedulerInner {
    config: SchedulerConfig,
    next_sequence: Cell<u64>,
    next_task: Cell<u64>,
    tasks: RefCell<Vec<Task>>,
    dirty: RefCell<Vec<Weak<CallbackInner>>>,
    pending: Cell<bool>,
    flushing: Cell<bool>,
    waker: RefCell<Option<Rc<dyn Fn()>>>,
}

impl SchedulerInner {
    /// Hand out the next listener sequence number. Never reused.
    pub(crate) fn next_sequence(&self) -> u64 {
        let sequence = self.next_sequence.get();
        self.next_sequence.set(sequence + 1);
        sequence
    }

    /// Queue a listener for the next flush round.
    pub(crate) fn mark_dirty(&self, callback: Weak<CallbackInner>) {
        self.dirty.borrow_mut().push(callback);
        self.request_flush();
    }

    fn has_work(&self) -> bool {
        !self.tasks.borrow().is_empty() || !self.dirty.borrow().is_empty()
    }

    fn request_flush(&self) {
        // A running flush picks new work up in its next round.
        if self.flushing.get() || self.pending.replace(true) {
            return;
        }
        let waker = self.waker.borrow().clone();
        if let Some(wake) = waker {
            wake();
        }
    }
}

/// Resets the re-entrancy flag even if a round unwinds.
struct FlushGuard<'a>(&'a Cell<bool>);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// The batch delivery scheduler.
///
/// Cloning a `Scheduler` creates another handle to the same queue.
///
/// # Example
///
/// ```rust,ignore
/// let scheduler = Scheduler::new();
/// let object = ObservableObject::new();
/// let listener = ChangeCallback::new(&scheduler, |records: &[ChangeRecord]| {
///     println!("{} changes", records.len());
/// });
/// let _subscription = object.observe(&listener, AcceptTypes::OBJECT);
///
/// object.set("x", 1);
/// object.set("y", 2);
/// scheduler.flush(); // prints "2 changes"
/// ```
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

impl Scheduler {
    /// Create a scheduler with the default configuration.
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            inner: Rc::new(SchedulerInner {
                config,
                next_sequence: Cell::new(0),
                next_task: Cell::new(0),
                tasks: RefCell::new(Vec::new()),
                dirty: RefCell::new(Vec::new()),
                pending: Cell::new(false),
                flushing: Cell::new(false),
                waker: RefCell::new(None),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub(crate) fn downgrade(&self) -> Weak<SchedulerInner> {
        Rc::downgrade(&self.inner)
    }

    /// Install the hook called when the scheduler first needs a flush.
    ///
    /// The hook must not call `flush` synchronously; it should arrange for
    /// the host to call it once the current synchronous work has finished.
    pub fn set_waker<F>(&self, wake: F)
    where
        F: Fn() + 'static,
    {
        *self.inner.waker.borrow_mut() = Some(Rc::new(wake));
    }

    pub fn clear_waker(&self) {
        self.inner.waker.borrow_mut().take();
    }

    /// Whether a flush has been requested and not yet run.
    pub fn is_pending(&self) -> bool {
        self.inner.pending.get()
    }

    /// Run `task` once at the next flush.
    ///
    /// The returned handle can cancel the task until the flush runs it.
    pub fn schedule<F>(&self, task: F) -> TaskHandle
    where
        F: FnOnce() + 'static,
    {
        let id = TaskId(self.inner.next_task.get());
        self.inner.next_task.set(id.0 + 1);
        self.inner.tasks.borrow_mut().push(Task {
            id,
            run: Box::new(task),
        });
        self.inner.request_flush();

        TaskHandle {
            scheduler: self.downgrade(),
            id,
        }
    }

    /// Deliver all pending work, repeating until a fixed point.
    ///
    /// Returns the number of tasks run plus listeners that received records.
    /// A call made while a flush is already running returns 0 immediately.
    pub fn flush(&self) -> usize {
        let inner = &self.inner;
        if inner.flushing.replace(true) {
            return 0;
        }
        inner.pending.set(false);

        let mut work = 0;
        {
            let _guard = FlushGuard(&inner.flushing);
            let max_rounds = inner.config.max_flush_rounds.max(1);
            let mut round = 0;

            while inner.has_work() {
                if round == max_rounds {
                    warn!(max_rounds, "flush did not settle; deferring remaining work");
                    break;
                }
                round += 1;

                let tasks = std::mem::take(&mut *inner.tasks.borrow_mut());
                let mut dirty: Vec<Rc<CallbackInner>> = std::mem::take(&mut *inner.dirty.borrow_mut())
                    .into_iter()
                    .filter_map(|weak| weak.upgrade())
                    .collect();

                debug!(round, tasks = tasks.len(), listeners = dirty.len(), "flush round");

                for task in tasks {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task.run)) {
                        error!(
                            task = task.id.0,
                            panic = panic_message(payload.as_ref()),
                            "scheduled task panicked"
                        );
                    }
                    work += 1;
                }

                for callback in &dirty {
                    callback.clear_dirty();
                }
                dirty.sort_by_key(|callback| callback.sequence());

                for callback in dirty {
                    if callback.deliver() {
                        work += 1;
                    }
                }
            }
        }

        if inner.has_work() {
            inner.request_flush();
        }

        work
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.inner.pending.get())
            .field("tasks", &self.inner.tasks.borrow().len())
            .field("dirty", &self.inner.dirty.borrow().len())
            .finish()
    }
}

/// Cancellation handle for a scheduled task.
///
/// Dropping the handle does not cancel the task.
#[derive(Debug)]
pub struct TaskHandle {
    scheduler: Weak<SchedulerInner>,
    id: TaskId,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Cancel the task if it has not run yet. Safe to call repeatedly.
    pub fn remove(&self) {
        if let Some(scheduler) = self.scheduler.upgrade() {
            scheduler.tasks.borrow_mut().retain(|task| task.id != self.id);
        }
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
