//! Per-container Notifier
//!
//! Each observable container lazily owns one [`Notifier`]: the ordered list
//! of listeners registered on it, each with the record types it accepts.
//!
//! Registrations hold listeners weakly, so a container never keeps an
//! observer alive. Registering the same listener again refreshes its accept
//! filter and bumps a count; the registration disappears when every
//! matching [`Subscription`] has been removed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::callback::{CallbackInner, ChangeCallback};
use super::record::{AcceptTypes, ChangeRecord};

struct Registration {
    callback: Weak<CallbackInner>,
    accept: AcceptTypes,
    count: usize,
}

#[derive(Default)]
pub(crate) struct Notifier {
    registrations: RefCell<Vec<Registration>>,
}

impl Notifier {
    pub(crate) fn observe(self: &Rc<Self>, callback: &ChangeCallback, accept: AcceptTypes) -> Subscription {
        callback.inner().ensure_sequence();
        let weak = Rc::downgrade(callback.inner());

        let mut registrations = self.registrations.borrow_mut();
        registrations.retain(|r| r.callback.strong_count() > 0);
        match registrations.iter_mut().find(|r| r.callback.ptr_eq(&weak)) {
            Some(existing) => {
                existing.accept = accept;
                existing.count += 1;
            }
            None => registrations.push(Registration {
                callback: weak.clone(),
                accept,
                count: 1,
            }),
        }

        Subscription {
            notifier: Rc::downgrade(self),
            callback: weak,
            active: Cell::new(true),
        }
    }

    fn unobserve(&self, callback: &Weak<CallbackInner>) {
        let mut registrations = self.registrations.borrow_mut();
        if let Some(position) = registrations.iter().position(|r| r.callback.ptr_eq(callback)) {
            let registration = &mut registrations[position];
            registration.count -= 1;
            if registration.count == 0 {
                registrations.remove(position);
            }
        }
    }

    /// Whether building a record for this container is worth the effort.
    pub(crate) fn has_observers(&self) -> bool {
        self.registrations
            .borrow()
            .iter()
            .any(|r| r.callback.strong_count() > 0)
    }

    /// Queue `record` on every listener that accepts its type.
    pub(crate) fn notify(&self, record: ChangeRecord) {
        let change = record.change_type();
        let targets: Vec<Rc<CallbackInner>> = self
            .registrations
            .borrow()
            .iter()
            .filter(|r| r.accept.contains(change))
            .filter_map(|r| r.callback.upgrade())
            .collect();

        for target in targets {
            target.enqueue(record.clone());
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.registrations.borrow().len()
    }
}

/// Handle for one registration of a listener on a container.
///
/// The registration ends on [`remove`](Subscription::remove) or when the
/// handle is dropped, whichever comes first.
pub struct Subscription {
    notifier: Weak<Notifier>,
    callback: Weak<CallbackInner>,
    active: Cell<bool>,
}

impl Subscription {
    /// Unregister. Safe to call any number of times.
    pub fn remove(&self) {
        if self.active.replace(false) {
            if let Some(notifier) = self.notifier.upgrade() {
                notifier.unobserve(&self.callback);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.active.get())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
