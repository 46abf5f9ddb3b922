//! Composed Observers
//!
//! Observers sit on top of the reactive primitives and turn raw record
//! batches into higher-level notifications:
//!
//! | Observer               | Watches                        | Reports                 |
//! |------------------------|--------------------------------|-------------------------|
//! | [`PathObserver`]       | a value at a path under a root | `(new, old)`            |
//! | [`ArrayObserver`]      | one array                      | merged splices          |
//! | [`ObjectObserver`]     | one object                     | an [`ObjectDiff`]       |
//! | [`AggregateObserver`]  | many sources                   | `(values, old_values)`  |
//! | [`ElementsObserver`]   | sub-paths of every element     | per-element value rows  |
//! | [`TransformObserver`]  | another observer               | converted `(new, old)`  |
//!
//! # Lifecycle
//!
//! Every observer starts `Unopened`, becomes `Open` on its first `open` and
//! ends `Closed`. Opening twice, or after closing, is an error. `close` is
//! idempotent and may be called from inside the observer's own callback.
//!
//! # Traits
//!
//! Value-producing observers implement [`Observable`], [`Mutable`] and
//! [`Closable`]; anything implementing all three is [`Bindable`] and can be
//! fed into an aggregate as a [`Source`].

mod aggregate;
mod array;
mod elements;
mod object;
mod path;
mod source;
mod transform;

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};

use tracing::error;

use crate::error::{Diagnostic, ListenerOutcome, Result};
use crate::reactive::{panic_message, ObserverState, Value};

pub use aggregate::AggregateObserver;
pub use array::{ArrayObserver, SpliceMode};
pub use elements::ElementsObserver;
pub use object::{ObjectDiff, ObjectObserver};
pub use path::PathObserver;
pub use source::Source;
pub use transform::{Converter, TransformObserver};

/// Boxed `(new, old)` callback taken by [`Observable::open_with`].
pub type ValueCallback = Box<dyn FnMut(&Value, &Value) -> Result<(), Diagnostic>>;

/// Box a `(new, old)` closure returning `()` or a `Result`.
pub fn value_callback<F, R>(mut callback: F) -> ValueCallback
where
    F: FnMut(&Value, &Value) -> R + 'static,
    R: ListenerOutcome,
{
    Box::new(move |new, old| callback(new, old).into_outcome())
}

/// An observer that reports one value.
pub trait Observable {
    /// Start observing. Returns the current value.
    fn open_with(&self, callback: ValueCallback) -> Result<Value>;

    /// Process pending changes now. Returns whether anything was pending.
    fn deliver(&self) -> bool;

    /// Drop pending changes without calling back. Returns the settled value.
    fn discard_changes(&self) -> Value;

    /// Last value seen by the observer.
    fn value(&self) -> Value;

    fn state(&self) -> ObserverState;

    /// Current value, opening the observer with a silent callback if it has
    /// not been opened yet.
    fn get_from(&self) -> Value {
        if self.state() == ObserverState::Unopened {
            if let Err(err) = self.open_with(value_callback(|_: &Value, _: &Value| {})) {
                tracing::debug!(error = %err, "implicit open failed");
            }
        }
        self.value()
    }
}

/// An observer whose value can be written back.
pub trait Mutable {
    /// Write through to the observed data. Returns whether a write happened.
    fn set_value(&self, value: Value) -> bool;
}

/// An observer holding subscriptions that must be released.
pub trait Closable {
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Everything an aggregate needs from a source.
pub trait Bindable: Observable + Mutable + Closable {}

impl<T: Observable + Mutable + Closable + ?Sized> Bindable for T {}

pub(crate) fn check_openable(state: ObserverState) -> Result<()> {
    match state {
        ObserverState::Unopened => Ok(()),
        ObserverState::Open => Err(crate::error::ObserveError::AlreadyOpened),
        ObserverState::Closed => Err(crate::error::ObserveError::Closed),
    }
}

/// Holder for an observer's user callback.
///
/// The callback is moved out while it runs, so it can close its own
/// observer (or re-enter it) without a `RefCell` conflict. A re-entrant
/// invocation finds the slot empty and is skipped.
pub(crate) struct CallbackSlot<F: ?Sized> {
    slot: RefCell<Option<Box<F>>>,
    closed: Cell<bool>,
}

impl<F: ?Sized> CallbackSlot<F> {
    pub(crate) fn new() -> Self {
        Self {
            slot: RefCell::new(None),
            closed: Cell::new(false),
        }
    }

    pub(crate) fn set(&self, callback: Box<F>) {
        *self.slot.borrow_mut() = Some(callback);
    }

    /// Drop the callback for good.
    pub(crate) fn clear(&self) {
        self.closed.set(true);
        self.slot.borrow_mut().take();
    }

    /// Run the callback through `call`, logging failures.
    ///
    /// Returns false if there was no callback to run.
    pub(crate) fn invoke<C>(&self, observer: &'static str, call: C) -> bool
    where
        C: FnOnce(&mut F) -> Result<(), Diagnostic>,
    {
        let Some(mut callback) = self.slot.borrow_mut().take() else {
            return false;
        };

        match panic::catch_unwind(AssertUnwindSafe(|| call(&mut *callback))) {
            Ok(Ok(())) => {}
            Ok(Err(diagnostic)) => {
                error!(observer, error = %diagnostic, "observer callback failed");
            }
            Err(payload) => {
                error!(
                    observer,
                    panic = panic_message(payload.as_ref()),
                    "observer callback panicked"
                );
            }
        }

        if !self.closed.get() {
            *self.slot.borrow_mut() = Some(callback);
        }
        true
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
