//! Change Listeners
//!
//! A [`ChangeCallback`] is the unit of delivery: one function, one pending
//! record queue, one sequence number. The same callback may be registered
//! on many containers; all of their records funnel into its single queue
//! and arrive together, in mutation order, at the next flush.
//!
//! # Sequence Numbers
//!
//! A callback gets its sequence number from the scheduler the first time it
//! is registered on any container, and keeps it for life. The scheduler
//! delivers dirty callbacks in ascending sequence order, so a callback
//! registered earlier always sees its batch first, whichever order the
//! underlying mutations happened in.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use tracing::{error, trace};

use super::record::ChangeRecord;
use super::scheduler::{panic_message, Scheduler, SchedulerInner};
use crate::error::{Diagnostic, ListenerOutcome};

type RecordFn = dyn FnMut(&[ChangeRecord]) -> Result<(), Diagnostic>;

pub(crate) struct CallbackInner {
    scheduler: Weak<SchedulerInner>,
    sequence: Cell<Option<u64>>,
    queue: RefCell<Vec<ChangeRecord>>,
    dirty: Cell<bool>,
    func: RefCell<Box<RecordFn>>,
}

impl CallbackInner {
    /// Delivery order key. Unregistered callbacks sort last.
    pub(crate) fn sequence(&self) -> u64 {
        self.sequence.get().unwrap_or(u64::MAX)
    }

    /// Assign a sequence number on first registration.
    pub(crate) fn ensure_sequence(&self) {
        if self.sequence.get().is_none() {
            if let Some(scheduler) = self.scheduler.upgrade() {
                self.sequence.set(Some(scheduler.next_sequence()));
            }
        }
    }

    pub(crate) fn clear_dirty(&self) {
        self.dirty.set(false);
    }

    /// Append a record and make sure the scheduler will deliver it.
    pub(crate) fn enqueue(self: &Rc<Self>, record: ChangeRecord) {
        trace!(
            sequence = self.sequence(),
            change = %record.change_type(),
            "change record queued"
        );
        self.queue.borrow_mut().push(record);

        if !self.dirty.replace(true) {
            if let Some(scheduler) = self.scheduler.upgrade() {
                scheduler.mark_dirty(Rc::downgrade(self));
            }
        }
    }

    /// Drain the queue into the function.
    ///
    /// Returns false without touching the queue if the function is already
    /// running further up the stack; the records stay for the next flush.
    pub(crate) fn deliver(&self) -> bool {
        let Ok(mut func) = self.func.try_borrow_mut() else {
            return false;
        };
        let records = std::mem::take(&mut *self.queue.borrow_mut());
        if records.is_empty() {
            return false;
        }

        trace!(sequence = self.sequence(), count = records.len(), "delivering change records");
        match panic::catch_unwind(AssertUnwindSafe(|| (*func)(&records))) {
            Ok(Ok(())) => {}
            Ok(Err(diagnostic)) => {
                error!(sequence = self.sequence(), error = %diagnostic, "change listener failed");
            }
            Err(payload) => {
                error!(
                    sequence = self.sequence(),
                    panic = panic_message(payload.as_ref()),
                    "change listener panicked"
                );
            }
        }
        true
    }

    pub(crate) fn discard(&self) -> bool {
        !std::mem::take(&mut *self.queue.borrow_mut()).is_empty()
    }
}

/// A listener that receives batched [`ChangeRecord`]s.
///
/// Cloning yields another handle to the same listener (same queue, same
/// sequence number). Registrations hold it weakly: once every handle is
/// dropped, the listener stops receiving records.
///
/// # Example
///
/// ```rust,ignore
/// let listener = ChangeCallback::new(&scheduler, |records: &[ChangeRecord]| {
///     for record in records {
///         println!("{:?}", record.change_type());
///     }
/// });
/// ```
#[derive(Clone)]
pub struct ChangeCallback {
    inner: Rc<CallbackInner>,
}

impl ChangeCallback {
    /// Create a listener bound to `scheduler`.
    ///
    /// The function may return `()` or a `Result`; errors are logged at the
    /// delivery boundary and do not affect other listeners.
    pub fn new<F, R>(scheduler: &Scheduler, mut func: F) -> Self
    where
        F: FnMut(&[ChangeRecord]) -> R + 'static,
        R: ListenerOutcome,
    {
        Self {
            inner: Rc::new(CallbackInner {
                scheduler: scheduler.downgrade(),
                sequence: Cell::new(None),
                queue: RefCell::new(Vec::new()),
                dirty: Cell::new(false),
                func: RefCell::new(Box::new(move |records| func(records).into_outcome())),
            }),
        }
    }

    /// Registration-order sequence number, assigned on first registration.
    pub fn sequence(&self) -> Option<u64> {
        self.inner.sequence.get()
    }

    /// Number of records waiting for delivery.
    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Deliver pending records now instead of at the next flush.
    ///
    /// Returns whether there was anything to deliver.
    pub fn deliver(&self) -> bool {
        self.inner.deliver()
    }

    /// Throw pending records away without calling the function.
    ///
    /// Returns whether anything was discarded.
    pub fn discard(&self) -> bool {
        self.inner.discard()
    }

    pub fn ptr_eq(&self, other: &ChangeCallback) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn inner(&self) -> &Rc<CallbackInner> {
        &self.inner
    }
}

impl fmt::Debug for ChangeCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeCallback")
            .field("sequence", &self.sequence())
            .field("pending", &self.pending())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
